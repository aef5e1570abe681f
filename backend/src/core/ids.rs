//! Identifiers for graph objects
//!
//! Every object in the kernel (entity, connector, process, output) carries a
//! process-wide-unique opaque id plus a human-readable name. Ids are the only
//! form of cross-reference between objects: connector endpoints, source links
//! and the administrative parent/child tree all store ids, never owning
//! pointers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Allocate a fresh, never-before-seen id
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Underlying UUID
            pub fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }
    };
}

define_id!(
    /// Identifies an entity (flow-graph node)
    EntityId
);

define_id!(
    /// Identifies an input or output connector
    ConnectorId
);

define_id!(
    /// Identifies a process attached to an entity
    ProcessId
);

define_id!(
    /// Identifies an output sink
    OutputId
);

define_id!(
    /// Identifies a simulation instance
    SimulationId
);

/// A flow node that can be ticked: either an entity or an output sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum NodeId {
    Entity(EntityId),
    Output(OutputId),
}

impl From<EntityId> for NodeId {
    fn from(id: EntityId) -> Self {
        NodeId::Entity(id)
    }
}

impl From<OutputId> for NodeId {
    fn from(id: OutputId) -> Self {
        NodeId::Output(id)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeId::Entity(id) => write!(f, "entity:{}", id),
            NodeId::Output(id) => write!(f, "output:{}", id),
        }
    }
}
