//! Connectors: the typed, timestamped wires of the flow graph
//!
//! An [`OutputConnector`] belongs to one producing entity and fans a written
//! value out to its endpoints according to an [`Apportionment`] mode. An
//! [`InputConnector`] belongs to one consumer (entity or output sink) and
//! accumulates what its sources deliver, either overwriting or adding.
//!
//! # Critical Invariants
//!
//! 1. **Mutual links**: every endpoint of an output connector is an input
//!    connector that lists the output connector among its sources, and vice
//!    versa. Links are ids, maintained symmetrically by the simulation.
//! 2. **Conservation**: in `Equal` and `Weighted` mode the amounts delivered
//!    to all endpoints sum to the written value. In `Copy` mode every endpoint
//!    receives the full value.
//! 3. **Barrier**: an input connector fed by several sources is stamped with
//!    tick `t` only once every source has written at `t`.

use crate::core::{ConnectorId, EntityId, NodeId, UnitType};
use crate::error::KernelError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How an output connector splits a written value across its endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Apportionment {
    /// Every endpoint receives `v / n`
    #[default]
    Equal,
    /// Endpoint `i` receives `v * bias_i / Σbias`
    Weighted,
    /// Every endpoint receives `v`
    Copy,
}

impl FromStr for Apportionment {
    type Err = KernelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "equal" => Ok(Apportionment::Equal),
            "weighted" => Ok(Apportionment::Weighted),
            "copy" => Ok(Apportionment::Copy),
            other => Err(KernelError::UnsupportedApportionment(other.to_string())),
        }
    }
}

impl fmt::Display for Apportionment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Apportionment::Equal => f.write_str("equal"),
            Apportionment::Weighted => f.write_str("weighted"),
            Apportionment::Copy => f.write_str("copy"),
        }
    }
}

/// An `(InputConnector, bias)` pair attached to an output connector
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Endpoint {
    pub input: ConnectorId,
    pub bias: f64,
}

/// A value in flight from an output connector to one of its endpoints
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Delivery {
    pub source: ConnectorId,
    pub target: ConnectorId,
    pub amount: f64,
}

/// Producer side of a connection
#[derive(Debug, Clone)]
pub struct OutputConnector {
    id: ConnectorId,
    name: String,
    unit: UnitType,
    parent: EntityId,
    endpoints: Vec<Endpoint>,
    mode: Apportionment,
    /// Tick of the last write
    time: Option<usize>,
}

impl OutputConnector {
    pub(crate) fn new(parent: EntityId, parent_name: &str, unit: UnitType) -> Self {
        Self {
            id: ConnectorId::new(),
            name: format!("{}.{}.out", parent_name, unit),
            unit,
            parent,
            endpoints: Vec::new(),
            mode: Apportionment::Equal,
            time: None,
        }
    }

    pub fn id(&self) -> ConnectorId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn unit(&self) -> &UnitType {
        &self.unit
    }

    pub fn parent(&self) -> EntityId {
        self.parent
    }

    pub fn endpoints(&self) -> &[Endpoint] {
        &self.endpoints
    }

    pub fn biases(&self) -> Vec<f64> {
        self.endpoints.iter().map(|e| e.bias).collect()
    }

    pub fn mode(&self) -> Apportionment {
        self.mode
    }

    pub fn time(&self) -> Option<usize> {
        self.time
    }

    pub fn has_endpoint(&self, input: ConnectorId) -> bool {
        self.endpoints.iter().any(|e| e.input == input)
    }

    /// Split `value` across endpoints according to the current mode
    ///
    /// # Example
    /// ```
    /// use capability_flow_core_rs::{Apportionment, Simulation, SimulationConfig, ConnectOptions};
    ///
    /// let mut sim = Simulation::new(SimulationConfig::new("demo", 1, ["money"], Vec::<String>::new())).unwrap();
    /// let a = sim.create_entity("A", Vec::<String>::new(), None).unwrap();
    /// let b = sim.create_entity("B", Vec::<String>::new(), None).unwrap();
    /// let c = sim.create_entity("C", Vec::<String>::new(), None).unwrap();
    /// let (out, _) = sim.connect(a, b, "money", ConnectOptions::default()).unwrap();
    /// sim.connect(a, c, "money", ConnectOptions::default()).unwrap();
    ///
    /// let connector = sim.output_connector(out).unwrap();
    /// assert_eq!(connector.mode(), Apportionment::Equal);
    /// let shares: Vec<f64> = connector.shares(10.0).into_iter().map(|(_, v)| v).collect();
    /// assert_eq!(shares, vec![5.0, 5.0]);
    /// ```
    pub fn shares(&self, value: f64) -> Vec<(ConnectorId, f64)> {
        let n = self.endpoints.len();
        if n == 0 {
            return Vec::new();
        }

        match self.mode {
            Apportionment::Copy => self.endpoints.iter().map(|e| (e.input, value)).collect(),
            Apportionment::Equal => {
                let share = value / n as f64;
                self.endpoints.iter().map(|e| (e.input, share)).collect()
            }
            Apportionment::Weighted => {
                let total: f64 = self.endpoints.iter().map(|e| e.bias).sum();
                if total <= 0.0 {
                    // All-zero weights degrade to an equal split
                    let share = value / n as f64;
                    return self.endpoints.iter().map(|e| (e.input, share)).collect();
                }
                self.endpoints
                    .iter()
                    .map(|e| (e.input, value * e.bias / total))
                    .collect()
            }
        }
    }

    /// Stamp the connector with `tick` and compute the deliveries for `value`
    pub(crate) fn write(&mut self, value: f64, tick: usize) -> Vec<Delivery> {
        self.time = Some(tick);
        let source = self.id;
        self.shares(value)
            .into_iter()
            .map(|(target, amount)| Delivery {
                source,
                target,
                amount,
            })
            .collect()
    }

    /// Attach an endpoint. Returns false if it is already attached.
    pub(crate) fn add_endpoint(&mut self, input: ConnectorId) -> bool {
        if self.has_endpoint(input) {
            return false;
        }

        let n = self.endpoints.len() + 1;
        match self.mode {
            Apportionment::Weighted => {
                let keep = (n - 1) as f64 / n as f64;
                for endpoint in &mut self.endpoints {
                    endpoint.bias *= keep;
                }
                self.endpoints.push(Endpoint {
                    input,
                    bias: 1.0 / n as f64,
                });
            }
            Apportionment::Equal | Apportionment::Copy => {
                self.endpoints.push(Endpoint { input, bias: 0.0 });
                self.equalize();
            }
        }
        true
    }

    /// Detach an endpoint. Returns false if it was not attached.
    pub(crate) fn remove_endpoint(&mut self, input: ConnectorId) -> bool {
        let Some(index) = self.endpoints.iter().position(|e| e.input == input) else {
            return false;
        };

        let removed = self.endpoints.remove(index);
        match self.mode {
            Apportionment::Weighted => {
                let remaining: f64 = self.endpoints.iter().map(|e| e.bias).sum();
                let total = remaining + removed.bias;
                if remaining > 0.0 {
                    let scale = total / remaining;
                    for endpoint in &mut self.endpoints {
                        endpoint.bias *= scale;
                    }
                } else if !self.endpoints.is_empty() {
                    let share = total / self.endpoints.len() as f64;
                    for endpoint in &mut self.endpoints {
                        endpoint.bias = share;
                    }
                }
            }
            Apportionment::Equal | Apportionment::Copy => self.equalize(),
        }
        true
    }

    /// Replace every bias at once. Switches `Equal` connectors to `Weighted`.
    pub(crate) fn set_biases(&mut self, biases: &[f64]) -> Result<(), KernelError> {
        if biases.len() != self.endpoints.len() {
            return Err(KernelError::BiasArityMismatch {
                expected: self.endpoints.len(),
                actual: biases.len(),
            });
        }
        if let Some(bad) = biases.iter().find(|b| !b.is_finite() || **b < 0.0) {
            return Err(KernelError::InvalidBias(*bad));
        }

        for (endpoint, bias) in self.endpoints.iter_mut().zip(biases) {
            endpoint.bias = *bias;
        }
        if self.mode == Apportionment::Equal {
            self.mode = Apportionment::Weighted;
        }
        Ok(())
    }

    /// Set one endpoint's bias, redistributing the change across the others
    /// in proportion to their current biases.
    pub(crate) fn set_bias(&mut self, input: ConnectorId, bias: f64) -> Result<(), KernelError> {
        if !bias.is_finite() || bias < 0.0 {
            return Err(KernelError::InvalidBias(bias));
        }
        let index = self
            .endpoints
            .iter()
            .position(|e| e.input == input)
            .ok_or(KernelError::EndpointNotFound {
                connector: self.id,
                endpoint: input,
            })?;

        let delta = bias - self.endpoints[index].bias;
        self.endpoints[index].bias = bias;

        let others = self.endpoints.len() - 1;
        if others > 0 {
            let others_total: f64 = self
                .endpoints
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != index)
                .map(|(_, e)| e.bias)
                .sum();

            for (i, endpoint) in self.endpoints.iter_mut().enumerate() {
                if i == index {
                    continue;
                }
                let adjustment = if others_total > 0.0 {
                    delta * endpoint.bias / others_total
                } else {
                    delta / others as f64
                };
                endpoint.bias = (endpoint.bias - adjustment).max(0.0);
            }
        }

        if self.mode == Apportionment::Equal {
            self.mode = Apportionment::Weighted;
        }
        Ok(())
    }

    /// Change the apportionment mode. Switching to `Equal` rebalances biases.
    pub(crate) fn set_mode(&mut self, mode: Apportionment) {
        self.mode = mode;
        if mode == Apportionment::Equal {
            self.equalize();
        }
    }

    pub(crate) fn restore_biases(&mut self, mode: Apportionment, biases: &[f64]) {
        self.mode = mode;
        for (endpoint, bias) in self.endpoints.iter_mut().zip(biases) {
            endpoint.bias = *bias;
        }
    }

    pub(crate) fn reset(&mut self) {
        self.time = None;
    }

    fn equalize(&mut self) {
        let n = self.endpoints.len();
        if n == 0 {
            return;
        }
        let share = 1.0 / n as f64;
        for endpoint in &mut self.endpoints {
            endpoint.bias = share;
        }
    }
}

/// Link from an input connector back to one of its sources
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SourceLink {
    pub connector: ConnectorId,
    /// Tick at which this source last delivered
    pub last_write: Option<usize>,
}

/// Consumer side of a connection
#[derive(Debug, Clone)]
pub struct InputConnector {
    id: ConnectorId,
    name: String,
    unit: UnitType,
    parent: NodeId,
    sources: Vec<SourceLink>,
    additive: bool,
    value: f64,
    /// Tick at which every source had delivered
    time: Option<usize>,
}

impl InputConnector {
    pub(crate) fn new(parent: NodeId, parent_name: &str, unit: UnitType, additive: bool) -> Self {
        Self {
            id: ConnectorId::new(),
            name: format!("{}.{}.in", parent_name, unit),
            unit,
            parent,
            sources: Vec::new(),
            additive,
            value: 0.0,
            time: None,
        }
    }

    pub fn id(&self) -> ConnectorId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn unit(&self) -> &UnitType {
        &self.unit
    }

    pub fn parent(&self) -> NodeId {
        self.parent
    }

    pub fn sources(&self) -> &[SourceLink] {
        &self.sources
    }

    pub fn has_sources(&self) -> bool {
        !self.sources.is_empty()
    }

    pub fn is_additive(&self) -> bool {
        self.additive
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn time(&self) -> Option<usize> {
        self.time
    }

    /// True once every source has delivered at `tick`
    pub fn is_current(&self, tick: usize) -> bool {
        self.time == Some(tick)
    }

    /// Accept a delivery from `source`
    pub(crate) fn receive(&mut self, source: ConnectorId, amount: f64, tick: usize) {
        if self.additive {
            self.value += amount;
        } else {
            self.value = amount;
        }

        if let Some(link) = self.sources.iter_mut().find(|l| l.connector == source) {
            link.last_write = Some(tick);
        }
        if self.sources.iter().all(|l| l.last_write == Some(tick)) {
            self.time = Some(tick);
        }
    }

    /// Debit `amount` from the accumulated value
    pub(crate) fn consume(&mut self, amount: f64) {
        self.value -= amount;
    }

    pub(crate) fn set_additive(&mut self, additive: bool) {
        self.additive = additive;
    }

    pub(crate) fn add_source(&mut self, source: ConnectorId) -> bool {
        if self.sources.iter().any(|l| l.connector == source) {
            return false;
        }
        self.sources.push(SourceLink {
            connector: source,
            last_write: None,
        });
        true
    }

    pub(crate) fn remove_source(&mut self, source: ConnectorId) -> bool {
        let before = self.sources.len();
        self.sources.retain(|l| l.connector != source);
        self.sources.len() != before
    }

    pub(crate) fn reset(&mut self) {
        self.value = 0.0;
        self.time = None;
        for link in &mut self.sources {
            link.last_write = None;
        }
    }
}
