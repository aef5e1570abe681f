//! Simulation - the flow graph and its run loop
//!
//! See `engine.rs` for the run loop and `graph.rs` for the mutation API.

pub mod builder;
pub mod config;
pub mod engine;
pub mod graph;
pub mod telemetry;

// Re-export main types for convenience
pub use config::{
    ApportionmentConfig, ConnectionConfig, EntityConfig, ModelConfig, OutputConfig, ProcessConfig,
    SimulationConfig,
};
pub use engine::{RunReport, Simulation};
pub use graph::ConnectOptions;
pub use telemetry::{MessageEntry, Telemetry, TelemetryRecord};
