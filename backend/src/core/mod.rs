//! Core building blocks: identifiers, registries and tick state

pub mod clock;
pub mod ids;
pub mod registry;

pub use clock::{NodeClock, TickPhase};
pub use ids::{ConnectorId, EntityId, NodeId, OutputId, ProcessId, SimulationId};
pub use registry::{Registry, UnitType};
