//! Simulation and model configuration
//!
//! [`SimulationConfig`] carries what a simulation needs before any graph
//! exists: its name, how many ticks a full run covers, and the unit-type and
//! attribute registries. [`ModelConfig`] adds a declarative graph that
//! [`Simulation::from_model`](crate::Simulation::from_model) builds through
//! the public mutation API.
//!
//! # Example
//!
//! ```rust
//! use capability_flow_core_rs::ModelConfig;
//!
//! let model = ModelConfig::from_json(r#"{
//!     "simulation": {"name": "archive", "step_count": 12, "unit_types": ["money"]},
//!     "entities": [{"name": "Treasury"}, {"name": "Records"}],
//!     "connections": [{"from": "Treasury", "to": "Records", "unit": "money"}]
//! }"#).unwrap();
//!
//! assert_eq!(model.simulation.step_count, 12);
//! assert!(!model.connections[0].additive);
//! ```

use crate::error::KernelError;
use crate::events::types::ScheduledEvent;
use crate::processes::ProcessSpec;
use serde::{Deserialize, Serialize};

/// Complete simulation configuration
///
/// # Fields
///
/// * `name` - Human-readable simulation name
/// * `step_count` - Number of ticks a full run covers (ticks are 1-based)
/// * `unit_types` - Recognized unit types
/// * `attributes` - Recognized entity attribute tags
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub name: String,

    pub step_count: usize,

    #[serde(default)]
    pub unit_types: Vec<String>,

    #[serde(default)]
    pub attributes: Vec<String>,
}

impl SimulationConfig {
    pub fn new<U, A>(name: impl Into<String>, step_count: usize, unit_types: U, attributes: A) -> Self
    where
        U: IntoIterator,
        U::Item: Into<String>,
        A: IntoIterator,
        A::Item: Into<String>,
    {
        Self {
            name: name.into(),
            step_count,
            unit_types: unit_types.into_iter().map(Into::into).collect(),
            attributes: attributes.into_iter().map(Into::into).collect(),
        }
    }

    /// Check the scalar fields. Registry entries are checked when the
    /// registry is built.
    pub fn validate(&self) -> Result<(), KernelError> {
        if self.name.trim().is_empty() {
            return Err(KernelError::InvalidConfig(
                "simulation name must not be empty".to_string(),
            ));
        }
        if self.step_count == 0 {
            return Err(KernelError::InvalidConfig(
                "step_count must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// An entity in a model file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityConfig {
    pub name: String,

    #[serde(default)]
    pub attributes: Vec<String>,

    /// Administrative parent, which must be declared earlier
    #[serde(default)]
    pub parent: Option<String>,
}

/// An entity-to-entity connection in a model file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    pub from: String,
    pub to: String,
    pub unit: String,

    #[serde(default)]
    pub additive: bool,

    #[serde(default)]
    pub copy: bool,
}

/// Fan-out settings for one output connector, applied after all connections
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApportionmentConfig {
    pub entity: String,
    pub unit: String,

    /// "equal", "weighted" or "copy"
    #[serde(default)]
    pub mode: Option<String>,

    /// One bias per endpoint, in connection order
    #[serde(default)]
    pub biases: Option<Vec<f64>>,
}

/// A process attachment in a model file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessConfig {
    pub entity: String,

    #[serde(flatten)]
    pub spec: ProcessSpec,
}

/// An output sink in a model file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    pub name: String,
    pub unit: String,

    /// Entities whose output connector of `unit` feeds the sink
    #[serde(default)]
    pub producers: Vec<String>,
}

/// A complete declarative model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub simulation: SimulationConfig,

    #[serde(default)]
    pub entities: Vec<EntityConfig>,

    #[serde(default)]
    pub connections: Vec<ConnectionConfig>,

    #[serde(default)]
    pub apportionments: Vec<ApportionmentConfig>,

    #[serde(default)]
    pub processes: Vec<ProcessConfig>,

    #[serde(default)]
    pub outputs: Vec<OutputConfig>,

    #[serde(default)]
    pub events: Vec<ScheduledEvent>,
}

impl ModelConfig {
    /// Parse a model from JSON
    pub fn from_json(json: &str) -> Result<Self, KernelError> {
        serde_json::from_str(json)
            .map_err(|e| KernelError::InvalidConfig(format!("model parse failed: {}", e)))
    }

    pub fn to_json(&self) -> Result<String, KernelError> {
        serde_json::to_string_pretty(self)
            .map_err(|e| KernelError::InvalidConfig(format!("model serialization failed: {}", e)))
    }
}
