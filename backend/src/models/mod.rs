//! Domain models for the flow graph

pub mod connector;
pub mod entity;
pub mod event;
pub mod output;
pub mod process;
pub mod property;

// Re-exports
pub use connector::{Apportionment, Delivery, Endpoint, InputConnector, OutputConnector, SourceLink};
pub use entity::Entity;
pub use event::{Event, EventLog};
pub use output::Output;
pub use process::{PortBinding, PortDecl, PortDirection, Process, ProcessEntry, ProcessError, ProcessIo};
pub use property::{PropertyDecl, PropertyError, PropertyKind, PropertySet, PropertyValue};
