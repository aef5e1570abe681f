//! Kernel error types
//!
//! Three failure classes exist:
//!
//! - **Structural reference errors** and **configuration errors** are returned
//!   synchronously by the mutation API as [`KernelError`]. A failing call
//!   leaves the graph untouched.
//! - **Constraint violations** happen inside a run. They never abort it; each
//!   one is recorded as a [`ConstraintViolation`] and can be inspected after
//!   the run through `Simulation::errors`.

use crate::core::{ConnectorId, EntityId, OutputId, ProcessId};
use crate::models::process::ProcessError;
use crate::models::property::PropertyError;
use serde::Serialize;
use thiserror::Error;

/// Errors raised by graph mutation, lookup and configuration
#[derive(Debug, Error, Clone, PartialEq)]
pub enum KernelError {
    #[error("Entity not found: {0}")]
    EntityNotFound(String),

    #[error("Process not found: {0}")]
    ProcessNotFound(String),

    #[error("Connector not found: {0}")]
    ConnectorNotFound(String),

    #[error("Output not found: {0}")]
    OutputNotFound(String),

    #[error("Unknown unit type: {0}")]
    UnknownUnitType(String),

    #[error("Unknown attribute: {0}")]
    UnknownAttribute(String),

    #[error("Unknown process kind: {0}")]
    UnknownProcessKind(String),

    #[error("Port '{port}' of process kind '{kind}' has no unit type binding")]
    MissingPortBinding { kind: String, port: String },

    #[error("Process kind '{kind}' has no port named '{port}'")]
    UnknownPort { kind: String, port: String },

    #[error("Property error: {0}")]
    Property(#[from] PropertyError),

    #[error("Expected {expected} biases, got {actual}")]
    BiasArityMismatch { expected: usize, actual: usize },

    #[error("Invalid bias {0}: biases must be finite and non-negative")]
    InvalidBias(f64),

    #[error("Connector {connector} has no endpoint {endpoint}")]
    EndpointNotFound {
        connector: ConnectorId,
        endpoint: ConnectorId,
    },

    #[error("Apportionment mode '{0}' is not supported")]
    UnsupportedApportionment(String),

    #[error("Entities are not connected for unit type {unit}")]
    NotConnected { unit: String },

    #[error("Connecting {from} -> {to} would create a cycle")]
    CycleDetected { from: EntityId, to: EntityId },

    #[error("Invalid config: {0}")]
    InvalidConfig(String),
}

impl KernelError {
    pub(crate) fn entity(id: EntityId) -> Self {
        KernelError::EntityNotFound(id.to_string())
    }

    pub(crate) fn process(id: ProcessId) -> Self {
        KernelError::ProcessNotFound(id.to_string())
    }

    pub(crate) fn connector(id: ConnectorId) -> Self {
        KernelError::ConnectorNotFound(id.to_string())
    }

    pub(crate) fn output(id: OutputId) -> Self {
        KernelError::OutputNotFound(id.to_string())
    }
}

/// A recoverable per-tick failure recorded during a run
///
/// Carries the process that failed, where it lives, and the cause. For the
/// common insufficient-input case, [`ConstraintViolation::shortfall`] exposes
/// the port, available amount and required amount.
#[derive(Debug, Error, Clone, PartialEq, Serialize)]
#[error("tick {tick}: process '{process_name}' on entity '{entity_name}': {cause}")]
pub struct ConstraintViolation {
    pub tick: usize,
    pub entity: EntityId,
    pub entity_name: String,
    pub process: ProcessId,
    pub process_name: String,
    #[serde(serialize_with = "serialize_display")]
    pub cause: ProcessError,
}

impl ConstraintViolation {
    /// `(port, available, required)` when the cause is an input shortfall
    pub fn shortfall(&self) -> Option<(&str, f64, f64)> {
        match &self.cause {
            ProcessError::InsufficientInput {
                port,
                available,
                required,
            } => Some((port.as_str(), *available, *required)),
            _ => None,
        }
    }

    pub fn is_insufficient_input(&self) -> bool {
        self.shortfall().is_some()
    }
}

fn serialize_display<S, T>(value: &T, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
    T: std::fmt::Display,
{
    serializer.collect_str(value)
}
