//! Drives a single process outside a simulation

use crate::core::{ConnectorId, EntityId, NodeId, UnitType};
use crate::models::connector::{Delivery, InputConnector, OutputConnector};
use crate::models::process::{PortBinding, PortDirection, Process, ProcessEntry, ProcessError};
use crate::models::property::{PropertySet, PropertyValue};
use indexmap::IndexMap;

/// Binds every port of a process to its own unit type (named after the
/// port), with one upstream source per input and one endpoint per output.
pub(crate) struct Harness {
    entry: ProcessEntry,
    inputs: IndexMap<UnitType, InputConnector>,
    outputs: IndexMap<UnitType, OutputConnector>,
    sources: IndexMap<String, ConnectorId>,
    deliveries: Vec<Delivery>,
}

impl Harness {
    pub(crate) fn new(process: Box<dyn Process>) -> Self {
        let parent = EntityId::new();
        let mut inputs = IndexMap::new();
        let mut outputs = IndexMap::new();
        let mut sources = IndexMap::new();
        let mut ports = Vec::new();

        for decl in process.ports() {
            let unit = UnitType::from(decl.name);
            match decl.direction {
                PortDirection::Input => {
                    let mut connector =
                        InputConnector::new(NodeId::Entity(parent), "E", unit.clone(), false);
                    let source = ConnectorId::new();
                    connector.add_source(source);
                    sources.insert(decl.name.to_string(), source);
                    inputs.insert(unit.clone(), connector);
                }
                PortDirection::Output => {
                    let mut connector = OutputConnector::new(parent, "E", unit.clone());
                    connector.add_endpoint(ConnectorId::new());
                    outputs.insert(unit.clone(), connector);
                }
            }
            ports.push(PortBinding {
                name: decl.name.to_string(),
                direction: decl.direction,
                unit,
            });
        }

        let properties = PropertySet::from_decls(&process.properties());
        let entry = ProcessEntry::new("under_test".to_string(), 0, parent, ports, properties, process);

        Self {
            entry,
            inputs,
            outputs,
            sources,
            deliveries: Vec::new(),
        }
    }

    pub(crate) fn set(&mut self, name: &str, value: PropertyValue) {
        self.entry.properties_mut().set(name, value, false).unwrap();
    }

    pub(crate) fn reset(&mut self) {
        self.entry.reset();
    }

    /// Deliver `amount` on an input port at `tick`
    pub(crate) fn feed(&mut self, port: &str, amount: f64, tick: usize) {
        let source = self.sources[port];
        self.inputs
            .get_mut(port)
            .unwrap()
            .receive(source, amount, tick);
    }

    pub(crate) fn compute(&mut self, tick: usize) -> Result<(), ProcessError> {
        self.deliveries.clear();
        self.entry
            .compute(tick, &mut self.inputs, &mut self.outputs, &mut self.deliveries)
    }

    /// Amount left on an input port
    pub(crate) fn remaining(&self, port: &str) -> f64 {
        self.inputs[port].value()
    }

    /// Total delivered from an output port during the last compute
    pub(crate) fn output(&self, port: &str) -> f64 {
        let source = self.outputs[port].id();
        self.deliveries
            .iter()
            .filter(|d| d.source == source)
            .map(|d| d.amount)
            .sum()
    }

    /// Whether an output port was written during the last compute
    pub(crate) fn written(&self, port: &str, tick: usize) -> bool {
        self.outputs[port].time() == Some(tick)
    }
}
