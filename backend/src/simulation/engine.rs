//! Simulation engine
//!
//! Owns the flow graph and drives it through time.
//!
//! # Architecture
//!
//! ```text
//! run(start, end):
//! 1. Reset run-scoped state (clocks, connector values, sink series,
//!    errors, run messages) and call reset() on every process
//! 2. For each tick t in max(start, 1) ..= min(end, step_count):
//!    a. Apply scheduled events for t
//!    b. Seed the ready-queue with every source entity
//!    c. Pop a node, run its readiness check, fire it if ready
//!    d. Route the fired node's deliveries to downstream input connectors
//!       and enqueue their owners
//!    e. Report nodes left pending
//! 3. Restore parameters changed by scheduled events
//! ```
//!
//! # Critical Invariants
//!
//! 1. **Single firing**: a node fires at most once per tick (enforced by its
//!    `NodeClock`)
//! 2. **Barrier**: a node fires only once every input connector carries the
//!    current tick
//! 3. **Determinism**: entities, outputs and endpoints are kept in insertion
//!    order, so the same graph always fires in the same order
//! 4. **Runs always complete**: constraint violations are recorded, never
//!    propagated as errors
//!
//! # Example
//!
//! ```rust
//! use capability_flow_core_rs::{ConnectOptions, ProcessSpec, Simulation, SimulationConfig};
//!
//! let config = SimulationConfig::new("demo", 3, ["money"], Vec::<String>::new());
//! let mut sim = Simulation::new(config).unwrap();
//!
//! let treasury = sim.create_entity("Treasury", Vec::<String>::new(), None).unwrap();
//! sim.attach_process(
//!     treasury,
//!     ProcessSpec::new("constant", "grant")
//!         .with_port("out", "money")
//!         .with_property("amount", 10.0),
//! ).unwrap();
//!
//! let total = sim.create_output("Spent", "money").unwrap();
//! sim.connect_output(treasury, total).unwrap();
//!
//! let report = sim.run(None, None);
//! assert_eq!(report.ticks_run, 3);
//! assert_eq!(sim.output(total).unwrap().results(), &[10.0, 10.0, 10.0]);
//! ```

use crate::core::{
    ConnectorId, EntityId, NodeId, OutputId, ProcessId, Registry, SimulationId, UnitType,
};
use crate::error::{ConstraintViolation, KernelError};
use crate::events::handler::{Restore, ScheduledEventHandler};
use crate::models::connector::Delivery;
use crate::models::entity::{Entity, EntityTick, Firing};
use crate::models::event::{Event, EventLog};
use crate::models::output::Output;
use crate::processes::ProcessRegistry;
use crate::simulation::config::SimulationConfig;
use indexmap::IndexMap;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use tracing::{debug, info, warn};

/// Which side of a connection a connector sits on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ConnectorSide {
    Input,
    Output,
}

/// Where a connector lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ConnectorRef {
    pub(crate) owner: NodeId,
    pub(crate) unit: UnitType,
    pub(crate) side: ConnectorSide,
}

/// Summary of one `run` call
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    /// First tick executed
    pub first_tick: usize,

    /// Last tick executed (equal to `first_tick - 1` when nothing ran)
    pub last_tick: usize,

    pub ticks_run: usize,

    /// Constraint violations recorded
    pub violations: usize,

    /// Node-ticks that ended pending
    pub pending: usize,

    /// Scheduled events that failed and were skipped
    pub failed_events: usize,
}

impl RunReport {
    /// True if the run recorded no violations and no node stalled
    pub fn is_clean(&self) -> bool {
        self.violations == 0 && self.pending == 0 && self.failed_events == 0
    }
}

/// The flow graph and its run loop
#[derive(Debug)]
pub struct Simulation {
    pub(super) id: SimulationId,
    pub(super) name: String,
    pub(super) step_count: usize,
    pub(super) registry: Registry,
    pub(super) process_kinds: ProcessRegistry,
    pub(super) entities: IndexMap<EntityId, Entity>,
    pub(super) outputs: IndexMap<OutputId, Output>,
    /// Every live connector, by id
    pub(super) connectors: HashMap<ConnectorId, ConnectorRef>,
    /// Owning entity of every attached process
    pub(super) process_owners: HashMap<ProcessId, EntityId>,
    pub(super) schedule: ScheduledEventHandler,
    pub(super) errors: Vec<ConstraintViolation>,
    pub(super) event_log: EventLog,
}

impl Simulation {
    /// Create an empty simulation
    ///
    /// # Errors
    ///
    /// `InvalidConfig` for a blank name, a zero step count, or blank or
    /// duplicate registry entries.
    pub fn new(config: SimulationConfig) -> Result<Self, KernelError> {
        config.validate()?;
        let registry = Registry::from_lists(&config.unit_types, &config.attributes)?;

        Ok(Self {
            id: SimulationId::new(),
            name: config.name,
            step_count: config.step_count,
            registry,
            process_kinds: ProcessRegistry::with_builtins(),
            entities: IndexMap::new(),
            outputs: IndexMap::new(),
            connectors: HashMap::new(),
            process_owners: HashMap::new(),
            schedule: ScheduledEventHandler::default(),
            errors: Vec::new(),
            event_log: EventLog::new(),
        })
    }

    pub fn id(&self) -> SimulationId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn step_count(&self) -> usize {
        self.step_count
    }

    pub fn set_step_count(&mut self, step_count: usize) -> Result<(), KernelError> {
        if step_count == 0 {
            return Err(KernelError::InvalidConfig(
                "step_count must be positive".to_string(),
            ));
        }
        self.step_count = step_count;
        Ok(())
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn register_unit_type(&mut self, name: &str) -> Result<UnitType, KernelError> {
        self.registry.register_unit_type(name)
    }

    pub fn register_attribute(&mut self, name: &str) -> Result<(), KernelError> {
        self.registry.register_attribute(name)
    }

    pub fn process_kinds(&self) -> &ProcessRegistry {
        &self.process_kinds
    }

    /// Mutable access for registering custom process kinds
    pub fn process_kinds_mut(&mut self) -> &mut ProcessRegistry {
        &mut self.process_kinds
    }

    /// Constraint violations recorded by the most recent run
    pub fn errors(&self) -> &[ConstraintViolation] {
        &self.errors
    }

    /// Messages recorded by the most recent run
    pub fn event_log(&self) -> &EventLog {
        &self.event_log
    }

    /// Entities with no input connectors, in creation order
    pub fn sources(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.entities
            .values()
            .filter(|e| e.is_source())
            .map(Entity::id)
    }

    // ========================================================================
    // Run loop
    // ========================================================================

    /// Run ticks `max(start, 1) ..= min(end, step_count)`
    ///
    /// `None` bounds default to the full range. Every call starts from a
    /// clean run state, so running the same graph twice yields identical
    /// series.
    pub fn run(&mut self, start: Option<usize>, end: Option<usize>) -> RunReport {
        let first_tick = start.unwrap_or(1).max(1);
        let last_tick = end.unwrap_or(self.step_count).min(self.step_count);

        self.reset_run();
        self.event_log.log(Event::RunStarted {
            tick: first_tick,
            end_tick: last_tick,
        });
        info!(
            simulation = %self.name,
            first_tick,
            last_tick,
            entities = self.entities.len(),
            outputs = self.outputs.len(),
            "run started"
        );

        let mut report = RunReport {
            first_tick,
            last_tick: first_tick.saturating_sub(1),
            ticks_run: 0,
            violations: 0,
            pending: 0,
            failed_events: 0,
        };
        let mut restores = Vec::new();

        for tick in first_tick..=last_tick {
            report.failed_events += self.apply_scheduled_events(tick, &mut restores);
            report.pending += self.step(tick);
            report.ticks_run += 1;
            report.last_tick = tick;
        }

        // Undo in reverse so the oldest snapshot wins
        for restore in restores.into_iter().rev() {
            if let Err(e) = restore.apply(self) {
                warn!(error = %e, "could not restore parameter after run");
            }
        }

        report.violations = self.errors.len();
        self.event_log.log(Event::RunCompleted {
            tick: report.last_tick,
            violations: report.violations,
        });
        info!(
            simulation = %self.name,
            ticks = report.ticks_run,
            violations = report.violations,
            pending = report.pending,
            "run completed"
        );
        report
    }

    fn reset_run(&mut self) {
        self.errors.clear();
        self.event_log.clear();
        for entity in self.entities.values_mut() {
            entity.reset_run();
        }
        for output in self.outputs.values_mut() {
            output.reset_run();
        }
    }

    /// Apply the events scheduled for `tick`. Returns how many failed.
    fn apply_scheduled_events(&mut self, tick: usize, restores: &mut Vec<Restore>) -> usize {
        let events: Vec<_> = self
            .schedule
            .get_events_for_tick(tick)
            .into_iter()
            .cloned()
            .collect();

        let mut failed = 0;
        for event in events {
            let description = event.to_string();
            match event.apply(self) {
                Ok(restore) => {
                    debug!(tick, event = %description, "scheduled event applied");
                    restores.push(restore);
                    self.event_log
                        .log(Event::ScheduledEventApplied { tick, description });
                }
                Err(e) => {
                    warn!(tick, event = %description, error = %e, "scheduled event skipped");
                    failed += 1;
                    self.event_log.log(Event::ScheduledEventFailed {
                        tick,
                        description,
                        reason: e.to_string(),
                    });
                }
            }
        }
        failed
    }

    /// Propagate one tick from every source. Returns the number of nodes
    /// left pending.
    fn step(&mut self, tick: usize) -> usize {
        let mut queue: VecDeque<NodeId> = self.sources().map(NodeId::Entity).collect();

        while let Some(node) = queue.pop_front() {
            match node {
                NodeId::Entity(id) => {
                    let Some(entity) = self.entities.get_mut(&id) else {
                        continue;
                    };
                    if let EntityTick::Fired(firing) = entity.tick(tick) {
                        debug!(
                            tick,
                            entity = %entity.name(),
                            deliveries = firing.deliveries.len(),
                            "entity fired"
                        );
                        self.record_failures(tick, id, &firing);
                        for delivery in firing.deliveries {
                            if let Some(owner) = self.deliver(delivery, tick) {
                                queue.push_back(owner);
                            }
                        }
                    }
                }
                NodeId::Output(id) => {
                    if let Some(output) = self.outputs.get_mut(&id) {
                        if output.tick(tick) {
                            debug!(tick, output = %output.name(), value = ?output.results().last(), "output recorded");
                        }
                    }
                }
            }
        }

        self.report_pending(tick)
    }

    /// Write a delivery into its target input connector. Returns the
    /// connector's owner, which must now re-check readiness.
    fn deliver(&mut self, delivery: Delivery, tick: usize) -> Option<NodeId> {
        let target = self.connectors.get(&delivery.target)?;
        let connector = match target.owner {
            NodeId::Entity(id) => self
                .entities
                .get_mut(&id)?
                .input_mut(target.unit.as_str())?,
            NodeId::Output(id) => self.outputs.get_mut(&id)?.input_mut(delivery.target)?,
        };
        connector.receive(delivery.source, delivery.amount, tick);
        debug!(
            tick,
            connector = %connector.name(),
            amount = delivery.amount,
            value = connector.value(),
            "delivered"
        );
        Some(target.owner)
    }

    fn record_failures(&mut self, tick: usize, entity: EntityId, firing: &Firing) {
        if firing.failures.is_empty() {
            return;
        }
        let entity_name = self
            .entities
            .get(&entity)
            .map(|e| e.name().to_string())
            .unwrap_or_default();

        for failure in &firing.failures {
            warn!(
                tick,
                entity = %entity_name,
                process = %failure.process_name,
                error = %failure.error,
                "constraint violation"
            );
            self.event_log.log(Event::ConstraintViolation {
                tick,
                entity: entity_name.clone(),
                process: failure.process_name.clone(),
                reason: failure.error.to_string(),
            });
            self.errors.push(ConstraintViolation {
                tick,
                entity,
                entity_name: entity_name.clone(),
                process: failure.process,
                process_name: failure.process_name.clone(),
                cause: failure.error.clone(),
            });
        }
    }

    fn report_pending(&mut self, tick: usize) -> usize {
        let mut pending: Vec<String> = self
            .entities
            .values()
            .filter(|e| e.clock().is_pending_at(tick) || e.is_starved())
            .map(|e| e.name().to_string())
            .collect();
        pending.extend(
            self.outputs
                .values()
                .filter(|o| o.clock().is_pending_at(tick))
                .map(|o| o.name().to_string()),
        );

        for node in &pending {
            warn!(tick, node = %node, "node left pending");
            self.event_log.log(Event::NodePending {
                tick,
                node: node.clone(),
            });
        }
        pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processes::ProcessSpec;
    use crate::simulation::graph::ConnectOptions;

    fn sim(step_count: usize) -> Simulation {
        Simulation::new(SimulationConfig::new(
            "test",
            step_count,
            ["money"],
            Vec::<String>::new(),
        ))
        .unwrap()
    }

    fn constant(sim: &mut Simulation, name: &str, amount: f64) -> EntityId {
        let id = sim.create_entity(name, Vec::<String>::new(), None).unwrap();
        sim.attach_process(
            id,
            ProcessSpec::new("constant", "grant")
                .with_port("out", "money")
                .with_property("amount", amount),
        )
        .unwrap();
        id
    }

    #[test]
    fn test_run_range_is_clamped() {
        let mut sim = sim(5);
        let a = constant(&mut sim, "A", 1.0);
        let out = sim.create_output("Total", "money").unwrap();
        sim.connect_output(a, out).unwrap();

        let report = sim.run(Some(0), Some(99));
        assert_eq!((report.first_tick, report.last_tick), (1, 5));
        assert_eq!(sim.output(out).unwrap().ticks(), &[1, 2, 3, 4, 5]);

        let report = sim.run(Some(3), Some(4));
        assert_eq!(report.ticks_run, 2);
        assert_eq!(sim.output(out).unwrap().ticks(), &[3, 4]);
    }

    #[test]
    fn test_empty_range_runs_nothing() {
        let mut sim = sim(5);
        let report = sim.run(Some(4), Some(2));
        assert_eq!(report.ticks_run, 0);
        assert!(report.is_clean());
    }

    #[test]
    fn test_unwritten_output_leaves_downstream_idle() {
        let mut sim = sim(2);
        let a = sim.create_entity("A", Vec::<String>::new(), None).unwrap();
        let b = sim.create_entity("B", Vec::<String>::new(), None).unwrap();
        // A has an output connector but nothing writes it
        sim.connect(a, b, "money", ConnectOptions::default()).unwrap();

        let report = sim.run(None, None);
        assert_eq!(report.pending, 0, "B never observes the tick");
        assert!(sim.entity(b).unwrap().current_time().is_none());
    }

    #[test]
    fn test_partially_fed_input_reports_pending() {
        let mut sim = sim(2);
        let a = constant(&mut sim, "A", 1.0);
        let idle = sim.create_entity("Idle", Vec::<String>::new(), None).unwrap();
        let b = sim.create_entity("B", Vec::<String>::new(), None).unwrap();
        let additive = ConnectOptions {
            additive: true,
            ..ConnectOptions::default()
        };
        sim.connect(a, b, "money", additive).unwrap();
        sim.connect(idle, b, "money", additive).unwrap();

        let report = sim.run(None, None);
        assert_eq!(report.pending, 2);
        assert_eq!(sim.event_log().events_of_type("NodePending").len(), 2);
        assert!(sim.entity(b).unwrap().clock().is_pending_at(2));
    }

    #[test]
    fn test_run_messages_bracket_the_run() {
        let mut sim = sim(2);
        constant(&mut sim, "A", 1.0);
        sim.run(None, None);

        let events = sim.event_log().events();
        assert_eq!(events.first().map(Event::event_type), Some("RunStarted"));
        assert_eq!(events.last().map(Event::event_type), Some("RunCompleted"));
    }
}
