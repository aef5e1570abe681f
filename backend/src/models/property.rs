//! Typed process properties
//!
//! A process declares its properties (name, type, default) when it is
//! attached. The kernel owns the values in a [`PropertySet`] so that callers
//! can change them between runs without knowing the concrete process type.
//!
//! Integer values are accepted for real properties; the reverse is a type
//! mismatch.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors raised when reading or writing a property
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PropertyError {
    #[error("Unknown property '{0}'")]
    NotFound(String),

    #[error("Property '{name}' expects {expected}, got {found}")]
    TypeMismatch {
        name: String,
        expected: PropertyKind,
        found: PropertyKind,
    },

    #[error("Property '{0}' is boolean and cannot be updated additively")]
    NotAdditive(String),
}

/// Type of a property value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyKind {
    Bool,
    Int,
    Real,
}

impl fmt::Display for PropertyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyKind::Bool => f.write_str("boolean"),
            PropertyKind::Int => f.write_str("integer"),
            PropertyKind::Real => f.write_str("real"),
        }
    }
}

/// A property value
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Bool(bool),
    Int(i64),
    Real(f64),
}

impl PropertyValue {
    pub fn kind(&self) -> PropertyKind {
        match self {
            PropertyValue::Bool(_) => PropertyKind::Bool,
            PropertyValue::Int(_) => PropertyKind::Int,
            PropertyValue::Real(_) => PropertyKind::Real,
        }
    }

    /// Numeric view; integers widen to reals
    pub fn as_real(&self) -> Option<f64> {
        match self {
            PropertyValue::Real(v) => Some(*v),
            PropertyValue::Int(v) => Some(*v as f64),
            PropertyValue::Bool(_) => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            PropertyValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropertyValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Convert `self` to `kind`, allowing only integer-to-real widening
    fn coerce(self, name: &str, kind: PropertyKind) -> Result<PropertyValue, PropertyError> {
        match (kind, self) {
            (PropertyKind::Real, PropertyValue::Int(v)) => Ok(PropertyValue::Real(v as f64)),
            (expected, value) if expected == value.kind() => Ok(value),
            (expected, value) => Err(PropertyError::TypeMismatch {
                name: name.to_string(),
                expected,
                found: value.kind(),
            }),
        }
    }
}

impl From<bool> for PropertyValue {
    fn from(v: bool) -> Self {
        PropertyValue::Bool(v)
    }
}

impl From<i64> for PropertyValue {
    fn from(v: i64) -> Self {
        PropertyValue::Int(v)
    }
}

impl From<f64> for PropertyValue {
    fn from(v: f64) -> Self {
        PropertyValue::Real(v)
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Bool(v) => write!(f, "{}", v),
            PropertyValue::Int(v) => write!(f, "{}", v),
            PropertyValue::Real(v) => write!(f, "{}", v),
        }
    }
}

/// A property declared by a process type
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyDecl {
    pub name: &'static str,
    pub default: PropertyValue,
}

impl PropertyDecl {
    pub const fn new(name: &'static str, default: PropertyValue) -> Self {
        Self { name, default }
    }

    pub const fn real(name: &'static str, default: f64) -> Self {
        Self::new(name, PropertyValue::Real(default))
    }

    pub const fn int(name: &'static str, default: i64) -> Self {
        Self::new(name, PropertyValue::Int(default))
    }

    pub const fn flag(name: &'static str, default: bool) -> Self {
        Self::new(name, PropertyValue::Bool(default))
    }
}

/// Current values of a process's properties, keyed by name
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PropertySet {
    values: IndexMap<String, PropertyValue>,
}

impl PropertySet {
    /// Initialize every declared property with its default
    pub fn from_decls(decls: &[PropertyDecl]) -> Self {
        Self {
            values: decls
                .iter()
                .map(|decl| (decl.name.to_string(), decl.default))
                .collect(),
        }
    }

    pub fn get(&self, name: &str) -> Result<PropertyValue, PropertyError> {
        self.values
            .get(name)
            .copied()
            .ok_or_else(|| PropertyError::NotFound(name.to_string()))
    }

    pub fn real(&self, name: &str) -> Result<f64, PropertyError> {
        let value = self.get(name)?;
        value.as_real().ok_or(PropertyError::TypeMismatch {
            name: name.to_string(),
            expected: PropertyKind::Real,
            found: value.kind(),
        })
    }

    pub fn int(&self, name: &str) -> Result<i64, PropertyError> {
        let value = self.get(name)?;
        value.as_int().ok_or(PropertyError::TypeMismatch {
            name: name.to_string(),
            expected: PropertyKind::Int,
            found: value.kind(),
        })
    }

    pub fn flag(&self, name: &str) -> Result<bool, PropertyError> {
        let value = self.get(name)?;
        value.as_bool().ok_or(PropertyError::TypeMismatch {
            name: name.to_string(),
            expected: PropertyKind::Bool,
            found: value.kind(),
        })
    }

    /// Set a property, or add to it when `additive` is true.
    ///
    /// Returns the stored value. Nothing changes on error.
    pub fn set(
        &mut self,
        name: &str,
        value: PropertyValue,
        additive: bool,
    ) -> Result<PropertyValue, PropertyError> {
        let current = self.get(name)?;
        let value = value.coerce(name, current.kind())?;

        let stored = if additive {
            match (current, value) {
                (PropertyValue::Int(a), PropertyValue::Int(b)) => PropertyValue::Int(a + b),
                (PropertyValue::Real(a), PropertyValue::Real(b)) => PropertyValue::Real(a + b),
                _ => return Err(PropertyError::NotAdditive(name.to_string())),
            }
        } else {
            value
        };

        self.values.insert(name.to_string(), stored);
        Ok(stored)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, PropertyValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
