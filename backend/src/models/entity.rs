//! Entity (capability, resource or asset) model
//!
//! An entity is a flow-graph node. It owns:
//! - at most one input connector and one output connector per unit type,
//! - processes grouped by integer priority (lower fires first, insertion
//!   order within a priority),
//! - a position in the administrative parent/child tree, which is used for
//!   grouping and lookup only and never affects flow.
//!
//! # Firing
//!
//! `tick(t)` runs the readiness state machine of [`NodeClock`]. When every
//! input connector carries timestamp `t` (vacuously true with no inputs) the
//! entity runs its processes in priority order and reports the deliveries
//! produced by its output connectors, for the simulation to route downstream.

use crate::core::{EntityId, NodeClock, NodeId, ProcessId, TickPhase, UnitType};
use crate::models::connector::{Delivery, InputConnector, OutputConnector};
use crate::models::process::{PortDirection, ProcessEntry, ProcessError};
use indexmap::IndexMap;
use std::collections::{BTreeMap, BTreeSet};

/// Outcome of `Entity::tick`
#[derive(Debug)]
pub enum EntityTick {
    /// Stale tick or already fired for this tick
    Ignored,
    /// Waiting on at least one input
    Pending,
    /// Fired; carries what must be routed downstream
    Fired(Firing),
}

/// What happened while an entity fired
#[derive(Debug, Default)]
pub struct Firing {
    pub deliveries: Vec<Delivery>,
    pub failures: Vec<ProcessFailure>,
}

/// A process that returned an error during a firing
#[derive(Debug, Clone)]
pub struct ProcessFailure {
    pub process: ProcessId,
    pub process_name: String,
    pub error: ProcessError,
}

/// A flow-graph node
#[derive(Debug)]
pub struct Entity {
    id: EntityId,
    name: String,
    attributes: BTreeSet<String>,
    parent: Option<EntityId>,
    children: Vec<EntityId>,
    inputs: IndexMap<UnitType, InputConnector>,
    outputs: IndexMap<UnitType, OutputConnector>,
    processes: BTreeMap<i32, Vec<ProcessEntry>>,
    clock: NodeClock,
}

impl Entity {
    pub(crate) fn new(name: String, attributes: BTreeSet<String>, parent: Option<EntityId>) -> Self {
        Self {
            id: EntityId::new(),
            name,
            attributes,
            parent,
            children: Vec::new(),
            inputs: IndexMap::new(),
            outputs: IndexMap::new(),
            processes: BTreeMap::new(),
            clock: NodeClock::new(),
        }
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attributes(&self) -> &BTreeSet<String> {
        &self.attributes
    }

    pub fn has_attribute(&self, attribute: &str) -> bool {
        self.attributes.contains(attribute)
    }

    pub fn parent(&self) -> Option<EntityId> {
        self.parent
    }

    pub fn children(&self) -> &[EntityId] {
        &self.children
    }

    pub fn clock(&self) -> &NodeClock {
        &self.clock
    }

    pub fn current_time(&self) -> Option<usize> {
        self.clock.current_time()
    }

    pub fn processed(&self) -> bool {
        self.clock.processed()
    }

    /// Entities with no input connectors seed propagation each tick
    pub fn is_source(&self) -> bool {
        self.inputs.is_empty()
    }

    pub fn input(&self, unit: &str) -> Option<&InputConnector> {
        self.inputs.get(unit)
    }

    pub fn output(&self, unit: &str) -> Option<&OutputConnector> {
        self.outputs.get(unit)
    }

    pub fn inputs(&self) -> impl Iterator<Item = &InputConnector> {
        self.inputs.values()
    }

    pub fn outputs(&self) -> impl Iterator<Item = &OutputConnector> {
        self.outputs.values()
    }

    /// Processes in firing order
    pub fn processes(&self) -> impl Iterator<Item = &ProcessEntry> {
        self.processes.values().flatten()
    }

    pub fn process(&self, id: ProcessId) -> Option<&ProcessEntry> {
        self.processes().find(|p| p.id() == id)
    }

    pub fn process_count(&self) -> usize {
        self.processes.values().map(Vec::len).sum()
    }

    /// Some input connector has no source left to write it, so the entity
    /// can never fire
    pub fn is_starved(&self) -> bool {
        self.inputs.values().any(|c| !c.has_sources())
    }

    /// Every input connector carries timestamp `tick`
    pub fn is_up_to_date(&self, tick: usize) -> bool {
        self.inputs.values().all(|c| c.is_current(tick))
    }

    /// Evaluate readiness for `tick` and fire if ready
    pub(crate) fn tick(&mut self, tick: usize) -> EntityTick {
        match self.clock.observe(tick) {
            TickPhase::Stale | TickPhase::AlreadyFired => EntityTick::Ignored,
            TickPhase::FireCheck => {
                if !self.is_up_to_date(tick) {
                    return EntityTick::Pending;
                }
                let firing = self.fire(tick);
                self.clock.mark_processed();
                EntityTick::Fired(firing)
            }
        }
    }

    fn fire(&mut self, tick: usize) -> Firing {
        let mut firing = Firing::default();
        for entry in self.processes.values_mut().flatten() {
            if let Err(error) =
                entry.compute(tick, &mut self.inputs, &mut self.outputs, &mut firing.deliveries)
            {
                firing.failures.push(ProcessFailure {
                    process: entry.id(),
                    process_name: entry.name().to_string(),
                    error,
                });
            }
        }
        firing
    }

    // ========================================================================
    // Graph maintenance (driven by Simulation)
    // ========================================================================

    pub(crate) fn input_mut(&mut self, unit: &str) -> Option<&mut InputConnector> {
        self.inputs.get_mut(unit)
    }

    pub(crate) fn output_mut(&mut self, unit: &str) -> Option<&mut OutputConnector> {
        self.outputs.get_mut(unit)
    }

    /// Input connector for `unit`, created if absent
    pub(crate) fn ensure_input(&mut self, unit: &UnitType, additive: bool) -> &mut InputConnector {
        let (id, name) = (self.id, self.name.clone());
        self.inputs
            .entry(unit.clone())
            .or_insert_with(|| InputConnector::new(NodeId::Entity(id), &name, unit.clone(), additive))
    }

    /// Output connector for `unit`, created if absent
    pub(crate) fn ensure_output(&mut self, unit: &UnitType) -> &mut OutputConnector {
        let (id, name) = (self.id, self.name.clone());
        self.outputs
            .entry(unit.clone())
            .or_insert_with(|| OutputConnector::new(id, &name, unit.clone()))
    }

    /// True if some attached process has a port bound to this connector
    pub(crate) fn port_bound(&self, direction: PortDirection, unit: &UnitType) -> bool {
        self.processes().any(|p| p.binds(direction, unit))
    }

    /// Drop the input connector for `unit` once its last source is gone, even
    /// if a port is bound to it. The entity then counts as a source and the
    /// bound process sees `NoProducer` instead of waiting forever.
    pub(crate) fn release_input(&mut self, unit: &UnitType) -> Option<InputConnector> {
        if self.inputs.get(unit).is_some_and(|c| !c.has_sources()) {
            self.inputs.shift_remove(unit)
        } else {
            None
        }
    }

    /// Drop the input connector for `unit` if it has no sources and no bound port
    pub(crate) fn prune_input(&mut self, unit: &UnitType) -> Option<InputConnector> {
        let idle = self
            .inputs
            .get(unit)
            .is_some_and(|c| !c.has_sources() && !self.port_bound(PortDirection::Input, unit));
        if idle {
            self.inputs.shift_remove(unit)
        } else {
            None
        }
    }

    /// Drop the output connector for `unit` if it has no endpoints and no bound port
    pub(crate) fn prune_output(&mut self, unit: &UnitType) -> Option<OutputConnector> {
        let idle = self.outputs.get(unit).is_some_and(|c| {
            c.endpoints().is_empty() && !self.port_bound(PortDirection::Output, unit)
        });
        if idle {
            self.outputs.shift_remove(unit)
        } else {
            None
        }
    }

    pub(crate) fn add_process(&mut self, entry: ProcessEntry) {
        self.processes.entry(entry.priority()).or_default().push(entry);
    }

    pub(crate) fn remove_process(&mut self, id: ProcessId) -> Option<ProcessEntry> {
        let mut removed = None;
        for group in self.processes.values_mut() {
            if let Some(index) = group.iter().position(|p| p.id() == id) {
                removed = Some(group.remove(index));
                break;
            }
        }
        self.processes.retain(|_, group| !group.is_empty());
        removed
    }

    pub(crate) fn process_mut(&mut self, id: ProcessId) -> Option<&mut ProcessEntry> {
        self.processes.values_mut().flatten().find(|p| p.id() == id)
    }

    pub(crate) fn processes_mut(&mut self) -> impl Iterator<Item = &mut ProcessEntry> {
        self.processes.values_mut().flatten()
    }

    pub(crate) fn outputs_mut(&mut self) -> impl Iterator<Item = &mut OutputConnector> {
        self.outputs.values_mut()
    }

    pub(crate) fn set_parent(&mut self, parent: Option<EntityId>) {
        self.parent = parent;
    }

    pub(crate) fn add_child(&mut self, child: EntityId) {
        if !self.children.contains(&child) {
            self.children.push(child);
        }
    }

    pub(crate) fn remove_child(&mut self, child: EntityId) {
        self.children.retain(|c| *c != child);
    }

    /// Clear tick state and connector contents, then reset every process
    pub(crate) fn reset_run(&mut self) {
        self.clock.reset();
        for connector in self.inputs.values_mut() {
            connector.reset();
        }
        for connector in self.outputs.values_mut() {
            connector.reset();
        }
        for entry in self.processes.values_mut().flatten() {
            entry.reset();
        }
    }
}
