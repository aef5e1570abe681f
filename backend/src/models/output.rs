//! Output sink
//!
//! A terminal node that sums the values on its input connectors each tick
//! and appends the sum to an append-only result series. Each producer
//! connected to the sink gets its own input connector, so the sink only
//! records once every producer has written for the tick.

use crate::core::{ConnectorId, NodeClock, NodeId, OutputId, TickPhase, UnitType};
use crate::models::connector::InputConnector;
use indexmap::IndexMap;

/// Terminal node collecting one value per fired tick
#[derive(Debug)]
pub struct Output {
    id: OutputId,
    name: String,
    unit: UnitType,
    inputs: IndexMap<ConnectorId, InputConnector>,
    clock: NodeClock,
    results: Vec<f64>,
    /// Tick at which each entry of `results` was recorded
    ticks: Vec<usize>,
}

impl Output {
    pub(crate) fn new(name: String, unit: UnitType) -> Self {
        Self {
            id: OutputId::new(),
            name,
            unit,
            inputs: IndexMap::new(),
            clock: NodeClock::new(),
            results: Vec::new(),
            ticks: Vec::new(),
        }
    }

    pub fn id(&self) -> OutputId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn unit(&self) -> &UnitType {
        &self.unit
    }

    pub fn results(&self) -> &[f64] {
        &self.results
    }

    pub fn ticks(&self) -> &[usize] {
        &self.ticks
    }

    /// Value recorded at `tick`, if the sink fired then
    pub fn value_at(&self, tick: usize) -> Option<f64> {
        self.ticks
            .iter()
            .position(|t| *t == tick)
            .map(|i| self.results[i])
    }

    pub fn clock(&self) -> &NodeClock {
        &self.clock
    }

    pub fn inputs(&self) -> impl Iterator<Item = &InputConnector> {
        self.inputs.values()
    }

    pub fn input(&self, id: ConnectorId) -> Option<&InputConnector> {
        self.inputs.get(&id)
    }

    /// Evaluate readiness for `tick`; record the summed inputs if ready.
    ///
    /// Returns true if the sink fired.
    pub(crate) fn tick(&mut self, tick: usize) -> bool {
        if self.clock.observe(tick) != TickPhase::FireCheck {
            return false;
        }
        if !self.inputs.values().all(|c| c.is_current(tick)) {
            return false;
        }

        let total: f64 = self.inputs.values().map(InputConnector::value).sum();
        self.results.push(total);
        self.ticks.push(tick);
        self.clock.mark_processed();
        true
    }

    pub(crate) fn add_input(&mut self) -> &mut InputConnector {
        let connector = InputConnector::new(
            NodeId::Output(self.id),
            &self.name,
            self.unit.clone(),
            false,
        );
        let id = connector.id();
        self.inputs.entry(id).or_insert(connector)
    }

    pub(crate) fn input_mut(&mut self, id: ConnectorId) -> Option<&mut InputConnector> {
        self.inputs.get_mut(&id)
    }

    pub(crate) fn remove_input(&mut self, id: ConnectorId) -> Option<InputConnector> {
        self.inputs.shift_remove(&id)
    }

    /// Input connector fed by `source`, if any
    pub(crate) fn input_from(&self, source: ConnectorId) -> Option<ConnectorId> {
        self.inputs
            .values()
            .find(|c| c.sources().iter().any(|l| l.connector == source))
            .map(InputConnector::id)
    }

    /// Clear results and tick state
    pub(crate) fn reset_run(&mut self) {
        self.clock.reset();
        self.results.clear();
        self.ticks.clear();
        for connector in self.inputs.values_mut() {
            connector.reset();
        }
    }
}
