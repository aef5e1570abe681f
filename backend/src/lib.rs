//! Capability Flow Core - Rust Engine
//!
//! Deterministic, tick-stepped simulation of resource and budget flow across
//! a network of business capabilities.
//!
//! # Architecture
//!
//! - **core**: Identifiers, registries and per-node tick state
//! - **models**: Graph types (Entity, connectors, Process, Output sink, EventLog)
//! - **processes**: Process-kind registry and built-in kinds
//! - **events**: Scheduled parameter changes
//! - **simulation**: Mutation API, run loop, model loading and telemetry
//!
//! # Critical Invariants
//!
//! 1. A node fires at most once per tick, and only once every input is
//!    stamped with that tick
//! 2. Equal and weighted fan-out conserve the written value
//! 3. Runs are repeatable: the same graph run twice yields the same series
//! 4. Constraint violations are recorded, never raised

// Module declarations
pub mod core;
pub mod error;
pub mod events;
pub mod models;
pub mod processes;
pub mod simulation;

// Re-exports for convenience
pub use crate::core::{
    ConnectorId, EntityId, NodeClock, NodeId, OutputId, ProcessId, Registry, SimulationId,
    TickPhase, UnitType,
};
pub use error::{ConstraintViolation, KernelError};
pub use events::{EventSchedule, GraphEvent, ScheduledEvent};
pub use models::{
    connector::{Apportionment, InputConnector, OutputConnector},
    entity::Entity,
    event::{Event, EventLog},
    output::Output,
    process::{PortDecl, PortDirection, Process, ProcessEntry, ProcessError, ProcessIo},
    property::{PropertyDecl, PropertyError, PropertyKind, PropertySet, PropertyValue},
};
pub use processes::{ProcessRegistry, ProcessSpec};
pub use simulation::{
    ConnectOptions, ModelConfig, RunReport, Simulation, SimulationConfig, Telemetry,
    TelemetryRecord,
};

// FFI module (when feature enabled)
#[cfg(feature = "pyo3")]
pub mod ffi;

// PyO3 exports (when feature enabled)
#[cfg(feature = "pyo3")]
use pyo3::prelude::*;

#[cfg(feature = "pyo3")]
#[pymodule]
fn capability_flow_core_rs(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<ffi::simulation::PySimulation>()?;
    Ok(())
}
