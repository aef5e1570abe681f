//! Process kinds
//!
//! Processes are attached by kind name. The [`ProcessRegistry`] maps each
//! kind to a factory producing a fresh instance; [`ProcessSpec`] carries the
//! per-attachment settings (name, priority, port unit bindings, property
//! overrides).
//!
//! Built-in kinds:
//! - `periodic_budget` - [`PeriodicBudget`]
//! - `constant` - [`Constant`]
//! - `converter` - [`Converter`]
//! - `relay` - [`Relay`]
//! - `buffer` - [`Buffer`]

pub mod buffer;
pub mod constant;
pub mod converter;
pub mod periodic;
pub mod relay;

pub use buffer::Buffer;
pub use constant::Constant;
pub use converter::Converter;
pub use periodic::PeriodicBudget;
pub use relay::Relay;

#[cfg(test)]
mod test_support;

use crate::error::KernelError;
use crate::models::process::Process;
use crate::models::property::PropertyValue;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Creates a fresh process instance of one kind
pub type ProcessFactory = fn() -> Box<dyn Process>;

/// How to attach a process to an entity
///
/// # Example
/// ```
/// use capability_flow_core_rs::ProcessSpec;
///
/// let spec = ProcessSpec::new("periodic_budget", "funding")
///     .with_port("out", "money")
///     .with_property("amount", 1200.0)
///     .with_property("period", 12i64);
///
/// assert_eq!(spec.ports["out"], "money");
/// assert_eq!(spec.priority, 0);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessSpec {
    /// Registered kind
    pub kind: String,

    /// Process name, used for lookups by name
    pub name: String,

    /// Lower fires first
    #[serde(default)]
    pub priority: i32,

    /// Port name -> unit type of the connector it binds to
    #[serde(default)]
    pub ports: BTreeMap<String, String>,

    /// Property overrides applied over the kind's defaults
    #[serde(default)]
    pub properties: BTreeMap<String, PropertyValue>,
}

impl ProcessSpec {
    pub fn new(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
            priority: 0,
            ports: BTreeMap::new(),
            properties: BTreeMap::new(),
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_port(mut self, port: impl Into<String>, unit: impl Into<String>) -> Self {
        self.ports.insert(port.into(), unit.into());
        self
    }

    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }
}

/// Closed set of attachable process kinds
#[derive(Debug, Clone, Default)]
pub struct ProcessRegistry {
    factories: IndexMap<String, ProcessFactory>,
}

impl ProcessRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the built-in kinds
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry
            .factories
            .insert(periodic::KIND.to_string(), || Box::new(PeriodicBudget::default()));
        registry
            .factories
            .insert(constant::KIND.to_string(), || Box::new(Constant));
        registry
            .factories
            .insert(converter::KIND.to_string(), || Box::new(Converter));
        registry
            .factories
            .insert(relay::KIND.to_string(), || Box::new(Relay));
        registry
            .factories
            .insert(buffer::KIND.to_string(), || Box::new(Buffer::default()));
        registry
    }

    /// Add a kind. Kind names are unique.
    pub fn register(&mut self, kind: &str, factory: ProcessFactory) -> Result<(), KernelError> {
        if kind.trim().is_empty() {
            return Err(KernelError::InvalidConfig(
                "process kind must not be blank".to_string(),
            ));
        }
        if self.factories.contains_key(kind) {
            return Err(KernelError::InvalidConfig(format!(
                "process kind '{}' already registered",
                kind
            )));
        }
        self.factories.insert(kind.to_string(), factory);
        Ok(())
    }

    /// Instantiate a registered kind
    pub fn create(&self, kind: &str) -> Result<Box<dyn Process>, KernelError> {
        self.factories
            .get(kind)
            .map(|factory| factory())
            .ok_or_else(|| KernelError::UnknownProcessKind(kind.to_string()))
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.factories.contains_key(kind)
    }

    /// Registered kinds in registration order
    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }
}
