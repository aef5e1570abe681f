//! Registries of recognized unit types and attribute tags
//!
//! A simulation only accepts connectors typed with a registered unit type and
//! entities tagged with registered attributes. Both checks happen when the
//! graph is mutated, never during a run.

use crate::error::KernelError;
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::collections::BTreeSet;
use std::fmt;

/// A typed quantity exchanged between entities (e.g. "money", "staff_hours").
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnitType(String);

impl UnitType {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for UnitType {
    fn from(s: &str) -> Self {
        UnitType(s.to_string())
    }
}

impl From<String> for UnitType {
    fn from(s: String) -> Self {
        UnitType(s)
    }
}

impl Borrow<str> for UnitType {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UnitType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Recognized unit types and attribute tags, in registration order.
///
/// # Example
/// ```
/// use capability_flow_core_rs::Registry;
///
/// let mut registry = Registry::new();
/// registry.register_unit_type("money").unwrap();
/// assert!(registry.unit_type("money").is_ok());
/// assert!(registry.unit_type("widgets").is_err());
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Registry {
    unit_types: IndexSet<UnitType>,
    attributes: IndexSet<String>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from lists of names, rejecting blanks and duplicates
    pub fn from_lists<U, A>(unit_types: U, attributes: A) -> Result<Self, KernelError>
    where
        U: IntoIterator,
        U::Item: AsRef<str>,
        A: IntoIterator,
        A::Item: AsRef<str>,
    {
        let mut registry = Self::new();
        for unit in unit_types {
            registry.register_unit_type(unit.as_ref())?;
        }
        for attribute in attributes {
            registry.register_attribute(attribute.as_ref())?;
        }
        Ok(registry)
    }

    pub fn register_unit_type(&mut self, name: &str) -> Result<UnitType, KernelError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(KernelError::InvalidConfig(
                "unit type names must not be empty".to_string(),
            ));
        }
        let unit = UnitType::from(name);
        if !self.unit_types.insert(unit.clone()) {
            return Err(KernelError::InvalidConfig(format!(
                "duplicate unit type: {}",
                name
            )));
        }
        Ok(unit)
    }

    pub fn register_attribute(&mut self, name: &str) -> Result<(), KernelError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(KernelError::InvalidConfig(
                "attribute names must not be empty".to_string(),
            ));
        }
        if !self.attributes.insert(name.to_string()) {
            return Err(KernelError::InvalidConfig(format!(
                "duplicate attribute: {}",
                name
            )));
        }
        Ok(())
    }

    /// Resolve a unit type name against the registry
    pub fn unit_type(&self, name: &str) -> Result<UnitType, KernelError> {
        self.unit_types
            .get(name)
            .cloned()
            .ok_or_else(|| KernelError::UnknownUnitType(name.to_string()))
    }

    /// Validate a set of attribute tags, returning them sorted and deduplicated
    pub fn check_attributes<I, S>(&self, attributes: I) -> Result<BTreeSet<String>, KernelError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut tags = BTreeSet::new();
        for attribute in attributes {
            let attribute = attribute.as_ref();
            if !self.attributes.contains(attribute) {
                return Err(KernelError::UnknownAttribute(attribute.to_string()));
            }
            tags.insert(attribute.to_string());
        }
        Ok(tags)
    }

    pub fn unit_types(&self) -> impl Iterator<Item = &UnitType> {
        self.unit_types.iter()
    }

    pub fn attributes(&self) -> impl Iterator<Item = &str> {
        self.attributes.iter().map(String::as_str)
    }
}
