//! Scheduled graph event types
//!
//! Scheduled events change model parameters at specific ticks, before the
//! tick's sources are seeded. Examples: a budget increase mid-year, a shift
//! of funding weights between two programs, switching a fan-out to copy mode.
//!
//! # Design Principles
//!
//! 1. **Determinism**: events are applied in declaration order at fixed ticks
//! 2. **Parameters only**: events never change graph topology
//! 3. **Self-contained**: events address objects by name, so they can be
//!    written in a model file before any id exists
//! 4. **Repeatable runs**: every parameter an event touches is restored when
//!    the run finishes

use crate::models::property::PropertyValue;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A parameter change applied before a tick fires
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GraphEvent {
    /// Set (or add to) a process property
    ///
    /// # Example
    /// Budget increase: add 600 to a periodic budget's `amount`
    SetProperty {
        entity: String,
        process: String,
        property: String,
        value: PropertyValue,
        #[serde(default)]
        additive: bool,
    },

    /// Set the bias of the endpoint feeding `to`, redistributing the rest
    ///
    /// # Example
    /// Shift funding from Records toward Scanning
    SetBias {
        from: String,
        to: String,
        unit: String,
        bias: f64,
    },

    /// Replace every bias of an output connector
    SetBiases {
        entity: String,
        unit: String,
        biases: Vec<f64>,
    },

    /// Change an output connector's apportionment mode
    SetApportionment {
        entity: String,
        unit: String,
        mode: String,
    },
}

impl fmt::Display for GraphEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GraphEvent::SetProperty {
                entity,
                process,
                property,
                value,
                additive,
            } => {
                let op = if *additive { "+=" } else { "=" };
                write!(f, "set_property {}/{}.{} {} {}", entity, process, property, op, value)
            }
            GraphEvent::SetBias {
                from,
                to,
                unit,
                bias,
            } => write!(f, "set_bias {}->{} [{}] = {}", from, to, unit, bias),
            GraphEvent::SetBiases {
                entity,
                unit,
                biases,
            } => write!(f, "set_biases {} [{}] = {:?}", entity, unit, biases),
            GraphEvent::SetApportionment { entity, unit, mode } => {
                write!(f, "set_apportionment {} [{}] = {}", entity, unit, mode)
            }
        }
    }
}

/// When to apply a scheduled event
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EventSchedule {
    /// Apply once at a specific tick
    OneTime { tick: usize },

    /// Apply at regular intervals starting from start_tick
    Repeating { start_tick: usize, interval: usize },
}

impl EventSchedule {
    /// Check if this schedule triggers at the given tick
    pub fn should_execute(&self, tick: usize) -> bool {
        match self {
            EventSchedule::OneTime { tick: event_tick } => tick == *event_tick,
            EventSchedule::Repeating {
                start_tick,
                interval,
            } => {
                *interval > 0 && tick >= *start_tick && (tick - start_tick) % interval == 0
            }
        }
    }
}

/// A graph event paired with its schedule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledEvent {
    pub event: GraphEvent,
    pub schedule: EventSchedule,
}
