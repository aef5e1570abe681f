//! Run event log
//!
//! Captures the notable things that happen during a run so a caller can
//! audit it afterwards. The log is cleared at the start of every run and
//! backs the aggregate "messages" record of the telemetry snapshot.
//!
//! # Event Types
//!
//! - **RunStarted** / **RunCompleted**: run boundaries
//! - **ScheduledEventApplied** / **ScheduledEventFailed**: pre-tick graph events
//! - **ConstraintViolation**: a process could not meet a requirement
//! - **NodePending**: a node did not fire for a tick
//!
//! # Example
//!
//! ```rust
//! use capability_flow_core_rs::models::event::{Event, EventLog};
//!
//! let mut log = EventLog::new();
//! log.log(Event::NodePending { tick: 3, node: "Scanning".to_string() });
//!
//! assert_eq!(log.events_of_type("NodePending").len(), 1);
//! assert_eq!(log.events()[0].message(), "Scanning did not fire (inputs incomplete)");
//! ```

use serde::Serialize;

/// A notable occurrence during a run. Every event carries its tick.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Run began; `tick` is the first tick, `end_tick` the last
    RunStarted { tick: usize, end_tick: usize },

    /// A scheduled graph event was applied before the tick fired
    ScheduledEventApplied { tick: usize, description: String },

    /// A scheduled graph event could not be applied and was skipped
    ScheduledEventFailed {
        tick: usize,
        description: String,
        reason: String,
    },

    /// A process recorded a constraint violation
    ConstraintViolation {
        tick: usize,
        entity: String,
        process: String,
        reason: String,
    },

    /// A node was left waiting on inputs at the end of the tick
    NodePending { tick: usize, node: String },

    /// Run finished; `tick` is the last tick executed
    RunCompleted { tick: usize, violations: usize },
}

impl Event {
    /// Get the tick number when this event occurred
    pub fn tick(&self) -> usize {
        match self {
            Event::RunStarted { tick, .. } => *tick,
            Event::ScheduledEventApplied { tick, .. } => *tick,
            Event::ScheduledEventFailed { tick, .. } => *tick,
            Event::ConstraintViolation { tick, .. } => *tick,
            Event::NodePending { tick, .. } => *tick,
            Event::RunCompleted { tick, .. } => *tick,
        }
    }

    /// Get a short description of the event type
    pub fn event_type(&self) -> &'static str {
        match self {
            Event::RunStarted { .. } => "RunStarted",
            Event::ScheduledEventApplied { .. } => "ScheduledEventApplied",
            Event::ScheduledEventFailed { .. } => "ScheduledEventFailed",
            Event::ConstraintViolation { .. } => "ConstraintViolation",
            Event::NodePending { .. } => "NodePending",
            Event::RunCompleted { .. } => "RunCompleted",
        }
    }

    /// Human-readable one-line message
    pub fn message(&self) -> String {
        match self {
            Event::RunStarted { tick, end_tick } => {
                format!("run started: ticks {}..={}", tick, end_tick)
            }
            Event::ScheduledEventApplied { description, .. } => {
                format!("applied {}", description)
            }
            Event::ScheduledEventFailed {
                description,
                reason,
                ..
            } => format!("skipped {}: {}", description, reason),
            Event::ConstraintViolation {
                entity,
                process,
                reason,
                ..
            } => format!("{}/{}: {}", entity, process, reason),
            Event::NodePending { node, .. } => {
                format!("{} did not fire (inputs incomplete)", node)
            }
            Event::RunCompleted { violations, .. } => {
                format!("run completed with {} violation(s)", violations)
            }
        }
    }
}

/// Events of the current run, in logging order
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Vec<Event>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log(&mut self, event: Event) {
        self.events.push(event);
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Events whose [`Event::event_type`] is `event_type`
    pub fn events_of_type(&self, event_type: &str) -> Vec<&Event> {
        self.events
            .iter()
            .filter(|e| e.event_type() == event_type)
            .collect()
    }

    pub(crate) fn clear(&mut self) {
        self.events.clear();
    }
}
