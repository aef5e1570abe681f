//! Per-node tick state
//!
//! The simulation operates in discrete ticks. Every flow node (entity or
//! output sink) keeps a `NodeClock` recording the tick it last observed and
//! whether it has already fired for that tick. The clock never rewinds and
//! never lets a node fire twice for the same tick.

use serde::{Deserialize, Serialize};

/// What a node should do in response to `tick(t)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickPhase {
    /// `t` is older than the node's current time
    Stale,
    /// The node already fired for `t`
    AlreadyFired,
    /// The node has not fired for `t` and should check its inputs
    FireCheck,
}

/// Tick state shared by entities and outputs
///
/// # Example
/// ```
/// use capability_flow_core_rs::{NodeClock, TickPhase};
///
/// let mut clock = NodeClock::new();
/// assert_eq!(clock.observe(3), TickPhase::FireCheck);
/// clock.mark_processed();
/// assert_eq!(clock.observe(3), TickPhase::AlreadyFired);
/// assert_eq!(clock.observe(2), TickPhase::Stale);
/// assert_eq!(clock.observe(4), TickPhase::FireCheck);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeClock {
    /// Tick last observed (None before the first call of a run)
    current_time: Option<usize>,
    /// Whether the node fired at `current_time`
    processed: bool,
}

impl NodeClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Observe a `tick(t)` call, advancing time if `t` is newer
    pub fn observe(&mut self, tick: usize) -> TickPhase {
        match self.current_time {
            Some(current) if tick < current => TickPhase::Stale,
            Some(current) if tick == current => {
                if self.processed {
                    TickPhase::AlreadyFired
                } else {
                    TickPhase::FireCheck
                }
            }
            _ => {
                self.current_time = Some(tick);
                self.processed = false;
                TickPhase::FireCheck
            }
        }
    }

    pub fn mark_processed(&mut self) {
        self.processed = true;
    }

    pub fn current_time(&self) -> Option<usize> {
        self.current_time
    }

    pub fn processed(&self) -> bool {
        self.processed
    }

    /// True if the node observed `tick` but has not fired for it
    pub fn is_pending_at(&self, tick: usize) -> bool {
        self.current_time == Some(tick) && !self.processed
    }

    /// Forget all tick state (start of a run)
    pub fn reset(&mut self) {
        self.current_time = None;
        self.processed = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_observation_advances_time() {
        let mut clock = NodeClock::new();
        assert_eq!(clock.current_time(), None);
        assert_eq!(clock.observe(1), TickPhase::FireCheck);
        assert_eq!(clock.current_time(), Some(1));
        assert!(clock.is_pending_at(1));
    }

    #[test]
    fn test_advance_clears_processed() {
        let mut clock = NodeClock::new();
        clock.observe(1);
        clock.mark_processed();
        assert!(!clock.is_pending_at(1));

        clock.observe(5);
        assert!(!clock.processed());
        assert_eq!(clock.current_time(), Some(5));
    }

    #[test]
    fn test_reset_allows_rewind() {
        let mut clock = NodeClock::new();
        clock.observe(7);
        clock.mark_processed();
        clock.reset();
        assert_eq!(clock.observe(1), TickPhase::FireCheck);
    }
}
