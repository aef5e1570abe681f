//! Process model
//!
//! A process is the unit of computation inside an entity. Each process type
//! declares named ports (bound at attach time to the owning entity's
//! connectors of a given unit type) and typed properties, and implements
//! [`Process::compute`], called once per tick when the entity fires.
//!
//! # Execution contract
//!
//! A well-behaved `compute`:
//! 1. reads required inputs with [`ProcessIo::available`] / [`ProcessIo::require`],
//! 2. on a shortfall writes zero to every output ([`ProcessIo::zero_outputs`])
//!    and returns [`ProcessError::InsufficientInput`],
//! 3. otherwise consumes exactly what it read and provides to every output.
//!
//! Downstream readiness depends on every output being stamped each tick, so
//! the kernel writes zero to any output port a failing process left unwritten.

use crate::core::{EntityId, ProcessId, UnitType};
use crate::models::connector::{Delivery, InputConnector, OutputConnector};
use crate::models::property::{PropertyDecl, PropertyError, PropertySet};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tracing::debug;

/// Tolerance when comparing an amount against what is available
const AMOUNT_EPSILON: f64 = 1e-9;

/// Errors raised from inside `compute`
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ProcessError {
    #[error("Insufficient input on port '{port}': available {available}, required {required}")]
    InsufficientInput {
        port: String,
        available: f64,
        required: f64,
    },

    #[error("Port '{0}' is not bound")]
    UnboundPort(String),

    #[error("Input port '{0}' has no producer")]
    NoProducer(String),

    #[error("Property '{name}' is invalid: {reason}")]
    InvalidProperty { name: String, reason: String },

    #[error("Property error: {0}")]
    Property(#[from] PropertyError),
}

/// Direction of a process port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortDirection {
    Input,
    Output,
}

/// A port declared by a process type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortDecl {
    pub name: &'static str,
    pub direction: PortDirection,
}

impl PortDecl {
    pub const fn input(name: &'static str) -> Self {
        Self {
            name,
            direction: PortDirection::Input,
        }
    }

    pub const fn output(name: &'static str) -> Self {
        Self {
            name,
            direction: PortDirection::Output,
        }
    }
}

/// A port bound to one of the owning entity's connectors
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortBinding {
    pub name: String,
    pub direction: PortDirection,
    pub unit: UnitType,
}

/// A computational unit owned by an entity
///
/// # Example
/// ```
/// use capability_flow_core_rs::models::process::{PortDecl, Process, ProcessError, ProcessIo};
///
/// /// Doubles whatever arrives
/// #[derive(Debug)]
/// struct Doubler;
///
/// impl Process for Doubler {
///     fn kind(&self) -> &str {
///         "doubler"
///     }
///
///     fn ports(&self) -> Vec<PortDecl> {
///         vec![PortDecl::input("in"), PortDecl::output("out")]
///     }
///
///     fn compute(&mut self, io: &mut ProcessIo<'_>) -> Result<(), ProcessError> {
///         let amount = io.available("in")?;
///         io.consume("in", amount)?;
///         io.provide("out", amount * 2.0)
///     }
/// }
/// ```
pub trait Process: fmt::Debug {
    /// Registry tag of this process type
    fn kind(&self) -> &str;

    /// Ports this process reads and writes
    fn ports(&self) -> Vec<PortDecl>;

    /// Properties with their defaults
    fn properties(&self) -> Vec<PropertyDecl> {
        Vec::new()
    }

    /// Re-initialize run-scoped state. Called once per run before any tick.
    fn reset(&mut self, _properties: &PropertySet) {}

    /// Run one tick
    fn compute(&mut self, io: &mut ProcessIo<'_>) -> Result<(), ProcessError>;
}

/// Kernel-side record of an attached process
#[derive(Debug)]
pub struct ProcessEntry {
    id: ProcessId,
    name: String,
    priority: i32,
    parent: EntityId,
    ports: Vec<PortBinding>,
    properties: PropertySet,
    process: Box<dyn Process>,
}

impl ProcessEntry {
    pub(crate) fn new(
        name: String,
        priority: i32,
        parent: EntityId,
        ports: Vec<PortBinding>,
        properties: PropertySet,
        process: Box<dyn Process>,
    ) -> Self {
        Self {
            id: ProcessId::new(),
            name,
            priority,
            parent,
            ports,
            properties,
            process,
        }
    }

    pub fn id(&self) -> ProcessId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &str {
        self.process.kind()
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn parent(&self) -> EntityId {
        self.parent
    }

    pub fn ports(&self) -> &[PortBinding] {
        &self.ports
    }

    pub fn port(&self, name: &str) -> Option<&PortBinding> {
        self.ports.iter().find(|p| p.name == name)
    }

    pub fn properties(&self) -> &PropertySet {
        &self.properties
    }

    pub(crate) fn properties_mut(&mut self) -> &mut PropertySet {
        &mut self.properties
    }

    pub(crate) fn binds(&self, direction: PortDirection, unit: &UnitType) -> bool {
        self.ports
            .iter()
            .any(|p| p.direction == direction && &p.unit == unit)
    }

    pub(crate) fn reset(&mut self) {
        self.process.reset(&self.properties);
    }

    /// Run `compute` against the owning entity's connectors
    pub(crate) fn compute(
        &mut self,
        tick: usize,
        inputs: &mut IndexMap<UnitType, InputConnector>,
        outputs: &mut IndexMap<UnitType, OutputConnector>,
        deliveries: &mut Vec<Delivery>,
    ) -> Result<(), ProcessError> {
        let mut io = ProcessIo {
            tick,
            ports: &self.ports,
            properties: &self.properties,
            inputs,
            outputs,
            deliveries,
            written: Vec::new(),
        };

        let result = self.process.compute(&mut io);
        if result.is_err() {
            io.zero_unwritten();
        }
        result
    }
}

/// View of the owning entity's connectors handed to `compute`
pub struct ProcessIo<'a> {
    tick: usize,
    ports: &'a [PortBinding],
    properties: &'a PropertySet,
    inputs: &'a mut IndexMap<UnitType, InputConnector>,
    outputs: &'a mut IndexMap<UnitType, OutputConnector>,
    deliveries: &'a mut Vec<Delivery>,
    /// Output ports written during this firing
    written: Vec<String>,
}

impl<'a> ProcessIo<'a> {
    /// Current tick
    pub fn tick(&self) -> usize {
        self.tick
    }

    pub fn properties(&self) -> &PropertySet {
        self.properties
    }

    pub fn real(&self, name: &str) -> Result<f64, ProcessError> {
        Ok(self.properties.real(name)?)
    }

    pub fn int(&self, name: &str) -> Result<i64, ProcessError> {
        Ok(self.properties.int(name)?)
    }

    pub fn flag(&self, name: &str) -> Result<bool, ProcessError> {
        Ok(self.properties.flag(name)?)
    }

    /// Amount currently accumulated on an input port
    ///
    /// A bound port whose connector lost its last source reports `NoProducer`.
    pub fn available(&self, port: &str) -> Result<f64, ProcessError> {
        let unit = self.unit_of(port, PortDirection::Input)?;
        self.inputs
            .get(unit)
            .map(InputConnector::value)
            .ok_or_else(|| ProcessError::NoProducer(port.to_string()))
    }

    /// Available amount, or `InsufficientInput` if it is below `required`
    pub fn require(&self, port: &str, required: f64) -> Result<f64, ProcessError> {
        let available = self.available(port)?;
        if available + AMOUNT_EPSILON < required {
            return Err(ProcessError::InsufficientInput {
                port: port.to_string(),
                available,
                required,
            });
        }
        Ok(available)
    }

    /// Debit `amount` from an input port
    pub fn consume(&mut self, port: &str, amount: f64) -> Result<(), ProcessError> {
        self.require(port, amount)?;
        let unit = self.unit_of(port, PortDirection::Input)?.clone();
        let connector = self
            .inputs
            .get_mut(&unit)
            .ok_or_else(|| ProcessError::NoProducer(port.to_string()))?;
        connector.consume(amount);
        Ok(())
    }

    /// Write `amount` to an output port, apportioning it across endpoints
    pub fn provide(&mut self, port: &str, amount: f64) -> Result<(), ProcessError> {
        let unit = self.unit_of(port, PortDirection::Output)?.clone();
        let connector = self
            .outputs
            .get_mut(&unit)
            .ok_or_else(|| ProcessError::UnboundPort(port.to_string()))?;

        self.deliveries.extend(connector.write(amount, self.tick));
        if !self.written.iter().any(|p| p == port) {
            self.written.push(port.to_string());
        }
        Ok(())
    }

    /// Write zero to every output port of this process
    pub fn zero_outputs(&mut self) {
        let ports: Vec<String> = self
            .ports
            .iter()
            .filter(|p| p.direction == PortDirection::Output)
            .map(|p| p.name.clone())
            .collect();
        self.zero_ports(ports);
    }

    fn zero_unwritten(&mut self) {
        let ports: Vec<String> = self
            .ports
            .iter()
            .filter(|p| p.direction == PortDirection::Output)
            .filter(|p| !self.written.contains(&p.name))
            .map(|p| p.name.clone())
            .collect();
        self.zero_ports(ports);
    }

    fn zero_ports(&mut self, ports: Vec<String>) {
        for port in ports {
            if let Err(e) = self.provide(&port, 0.0) {
                debug!(port = %port, error = %e, "output port not zeroed");
            }
        }
    }

    fn unit_of(&self, port: &str, direction: PortDirection) -> Result<&'a UnitType, ProcessError> {
        let ports: &'a [PortBinding] = self.ports;
        ports
            .iter()
            .find(|p| p.name == port && p.direction == direction)
            .map(|p| &p.unit)
            .ok_or_else(|| ProcessError::UnboundPort(port.to_string()))
    }
}
