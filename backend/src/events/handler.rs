//! Scheduled event execution
//!
//! This module handles:
//! - Scheduling events by tick
//! - Applying events to the graph through the mutation API
//! - Remembering the parameters each event overwrote, so a run can put them
//!   back when it finishes

use crate::core::{ConnectorId, ProcessId};
use crate::error::KernelError;
use crate::events::types::{GraphEvent, ScheduledEvent};
use crate::models::connector::Apportionment;
use crate::models::property::PropertyValue;
use crate::simulation::Simulation;

/// Holds the scheduled events of a simulation
#[derive(Debug, Clone, Default)]
pub struct ScheduledEventHandler {
    events: Vec<ScheduledEvent>,
}

impl ScheduledEventHandler {
    /// Create a new event handler with the given events
    pub fn new(events: Vec<ScheduledEvent>) -> Self {
        Self { events }
    }

    pub fn push(&mut self, event: ScheduledEvent) {
        self.events.push(event);
    }

    pub fn events(&self) -> &[ScheduledEvent] {
        &self.events
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    /// Get all events scheduled for a specific tick, in declaration order
    pub fn get_events_for_tick(&self, tick: usize) -> Vec<&GraphEvent> {
        self.events
            .iter()
            .filter(|scheduled| scheduled.schedule.should_execute(tick))
            .map(|scheduled| &scheduled.event)
            .collect()
    }
}

/// A parameter value as it was before an event overwrote it
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Restore {
    Property {
        process: ProcessId,
        name: String,
        value: PropertyValue,
    },
    Weights {
        connector: ConnectorId,
        mode: Apportionment,
        biases: Vec<f64>,
    },
}

impl Restore {
    pub(crate) fn apply(self, sim: &mut Simulation) -> Result<(), KernelError> {
        match self {
            Restore::Property {
                process,
                name,
                value,
            } => sim.set_property(process, &name, value, false).map(|_| ()),
            Restore::Weights {
                connector,
                mode,
                biases,
            } => sim.restore_weights(connector, mode, &biases),
        }
    }
}

impl GraphEvent {
    /// Apply this event, returning what it overwrote
    ///
    /// Nothing changes when an error is returned.
    pub(crate) fn apply(&self, sim: &mut Simulation) -> Result<Restore, KernelError> {
        match self {
            GraphEvent::SetProperty {
                entity,
                process,
                property,
                value,
                additive,
            } => {
                let entry = sim.process_by_name(entity, process)?;
                let id = entry.id();
                let previous = entry.properties().get(property)?;
                sim.set_property(id, property, *value, *additive)?;
                Ok(Restore::Property {
                    process: id,
                    name: property.clone(),
                    value: previous,
                })
            }

            GraphEvent::SetBias {
                from,
                to,
                unit,
                bias,
            } => {
                let connector = output_connector_of(sim, from, unit)?;
                let endpoint = sim
                    .entity_by_name(to)?
                    .input(unit)
                    .map(|c| c.id())
                    .ok_or_else(|| KernelError::NotConnected { unit: unit.clone() })?;
                let previous = weights_of(sim, connector)?;
                sim.set_bias(connector, endpoint, *bias)?;
                Ok(previous)
            }

            GraphEvent::SetBiases {
                entity,
                unit,
                biases,
            } => {
                let connector = output_connector_of(sim, entity, unit)?;
                let previous = weights_of(sim, connector)?;
                sim.set_biases(connector, biases)?;
                Ok(previous)
            }

            GraphEvent::SetApportionment { entity, unit, mode } => {
                let mode: Apportionment = mode.parse()?;
                let connector = output_connector_of(sim, entity, unit)?;
                let previous = weights_of(sim, connector)?;
                sim.set_apportionment(connector, mode)?;
                Ok(previous)
            }
        }
    }
}

fn output_connector_of(sim: &Simulation, entity: &str, unit: &str) -> Result<ConnectorId, KernelError> {
    sim.entity_by_name(entity)?
        .output(unit)
        .map(|c| c.id())
        .ok_or_else(|| KernelError::NotConnected {
            unit: unit.to_string(),
        })
}

fn weights_of(sim: &Simulation, connector: ConnectorId) -> Result<Restore, KernelError> {
    let connector = sim.output_connector(connector)?;
    Ok(Restore::Weights {
        connector: connector.id(),
        mode: connector.mode(),
        biases: connector.biases(),
    })
}
