//! Scheduled graph events

pub mod handler;
pub mod types;

pub use handler::ScheduledEventHandler;
pub use types::{EventSchedule, GraphEvent, ScheduledEvent};
