//! Tests for the run loop
//!
//! Tick range handling, repeatable runs, constraint violations, scheduled
//! events and telemetry.

use capability_flow_core_rs::{
    ConnectOptions, EntityId, Event, EventSchedule, GraphEvent, OutputId, ProcessSpec,
    PropertyValue, ScheduledEvent, Simulation, SimulationConfig, TelemetryRecord,
};

// ============================================================================
// Helpers
// ============================================================================

fn new_sim(step_count: usize) -> Simulation {
    Simulation::new(SimulationConfig::new(
        "run-loop",
        step_count,
        ["money", "staff_hours"],
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

fn converter(sim: &mut Simulation, name: &str, required: f64) -> EntityId {
    let id = sim.create_entity(name, Vec::<String>::new(), None).unwrap();
    sim.attach_process(
        id,
        ProcessSpec::new("converter", "convert")
            .with_port("in", "money")
            .with_port("out", "money")
            .with_property("required", required),
    )
    .unwrap();
    id
}

fn sink(sim: &mut Simulation, name: &str, from: EntityId) -> OutputId {
    let id = sim.create_output(name, "money").unwrap();
    sim.connect_output(from, id).unwrap();
    id
}

fn set_amount(tick: usize, delta: f64) -> ScheduledEvent {
    ScheduledEvent {
        event: GraphEvent::SetProperty {
            entity: "Treasury".to_string(),
            process: "grant".to_string(),
            property: "amount".to_string(),
            value: PropertyValue::Real(delta),
            additive: true,
        },
        schedule: EventSchedule::OneTime { tick },
    }
}

// ============================================================================
// Tick range
// ============================================================================

#[test]
fn test_range_is_clamped_to_step_count() {
    let mut sim = new_sim(5);
    let treasury = constant(&mut sim, "Treasury", 1.0);
    let total = sink(&mut sim, "Total", treasury);

    let report = sim.run(Some(0), Some(50));

    assert_eq!(report.first_tick, 1);
    assert_eq!(report.last_tick, 5);
    assert_eq!(report.ticks_run, 5);
    assert_eq!(sim.output(total).unwrap().ticks(), &[1, 2, 3, 4, 5]);
}

#[test]
fn test_partial_range() {
    let mut sim = new_sim(10);
    let treasury = constant(&mut sim, "Treasury", 1.0);
    let total = sink(&mut sim, "Total", treasury);

    let report = sim.run(Some(4), Some(6));

    assert_eq!(report.ticks_run, 3);
    assert_eq!(sim.output(total).unwrap().ticks(), &[4, 5, 6]);
}

#[test]
fn test_empty_range_runs_nothing() {
    let mut sim = new_sim(3);
    let treasury = constant(&mut sim, "Treasury", 1.0);
    let total = sink(&mut sim, "Total", treasury);

    let report = sim.run(Some(3), Some(2));

    assert_eq!(report.ticks_run, 0);
    assert!(sim.output(total).unwrap().results().is_empty());
}

#[test]
fn test_step_count_can_change_between_runs() {
    let mut sim = new_sim(2);
    let treasury = constant(&mut sim, "Treasury", 1.0);
    let total = sink(&mut sim, "Total", treasury);

    sim.set_step_count(4).unwrap();
    sim.run(None, None);
    assert_eq!(sim.output(total).unwrap().results().len(), 4);

    assert!(sim.set_step_count(0).is_err());
    assert_eq!(sim.step_count(), 4);
}

// ============================================================================
// Repeatability
// ============================================================================

/// Budget -> staffing converter -> buffer -> sink
fn archive_model(sim: &mut Simulation) -> OutputId {
    let treasury = sim.create_entity("Treasury", Vec::<String>::new(), None).unwrap();
    sim.attach_process(
        treasury,
        ProcessSpec::new("periodic_budget", "funding")
            .with_port("out", "money")
            .with_property("amount", 1200.0),
    )
    .unwrap();

    let staffing = sim.create_entity("Staffing", Vec::<String>::new(), None).unwrap();
    sim.attach_process(
        staffing,
        ProcessSpec::new("converter", "hire")
            .with_port("in", "money")
            .with_port("out", "staff_hours")
            .with_property("ratio", 0.5),
    )
    .unwrap();

    let backlog = sim.create_entity("Backlog", Vec::<String>::new(), None).unwrap();
    sim.attach_process(
        backlog,
        ProcessSpec::new("buffer", "queue")
            .with_port("in", "staff_hours")
            .with_port("out", "staff_hours")
            .with_property("throughput", 30.0),
    )
    .unwrap();

    sim.connect(treasury, staffing, "money", ConnectOptions::default())
        .unwrap();
    sim.connect(staffing, backlog, "staff_hours", ConnectOptions::default())
        .unwrap();

    let hours = sim.create_output("Hours", "staff_hours").unwrap();
    sim.connect_output(backlog, hours).unwrap();
    hours
}

#[test]
fn test_two_runs_produce_identical_telemetry() {
    let mut sim = new_sim(24);
    let hours = archive_model(&mut sim);

    sim.run(None, None);
    let first = sim.telemetry();
    let first_digest = first.digest().unwrap();

    sim.run(None, None);
    let second = sim.telemetry();

    assert_eq!(first_digest, second.digest().unwrap());
    assert_eq!(first.output("Hours"), second.output("Hours"));
    // 100 money/tick becomes 50 hours/tick, released 30 at a time
    assert_eq!(sim.output(hours).unwrap().value_at(1), Some(30.0));
}

#[test]
fn test_same_model_in_two_simulations_shares_digest() {
    let mut a = new_sim(12);
    let mut b = new_sim(12);
    archive_model(&mut a);
    archive_model(&mut b);

    a.run(None, None);
    b.run(None, None);

    assert_ne!(a.id(), b.id());
    assert_eq!(a.telemetry().digest().unwrap(), b.telemetry().digest().unwrap());
}

#[test]
fn test_periodic_budget_releases_evenly_and_refills() {
    let mut sim = new_sim(24);
    let treasury = sim.create_entity("Treasury", Vec::<String>::new(), None).unwrap();
    sim.attach_process(
        treasury,
        ProcessSpec::new("periodic_budget", "funding")
            .with_port("out", "money")
            .with_property("amount", 1200.0)
            .with_property("period", 12i64),
    )
    .unwrap();
    let spent = sink(&mut sim, "Spent", treasury);

    let report = sim.run(None, None);

    assert!(report.is_clean());
    let results = sim.output(spent).unwrap().results();
    assert_eq!(results.len(), 24);
    assert!(
        results.iter().all(|v| (v - 100.0).abs() < 1e-9),
        "pool refills at tick 13, got {:?}",
        results
    );
}

// ============================================================================
// Constraint violations
// ============================================================================

#[test]
fn test_shortfall_zeroes_downstream_and_records_violation() {
    let mut sim = new_sim(1);
    let treasury = constant(&mut sim, "Treasury", 50.0);
    let program = converter(&mut sim, "Program", 100.0);
    sim.connect(treasury, program, "money", ConnectOptions::default())
        .unwrap();
    let delivered = sink(&mut sim, "Delivered", program);

    let report = sim.run(None, None);

    // The run completes and downstream still fires, with zero
    assert_eq!(report.ticks_run, 1);
    assert_eq!(report.pending, 0);
    assert_eq!(sim.output(delivered).unwrap().results(), &[0.0]);

    assert_eq!(report.violations, 1);
    let errors = sim.errors();
    assert_eq!(errors.len(), 1, "exactly one violation per failing tick");
    assert_eq!(errors[0].tick, 1);
    assert_eq!(errors[0].entity_name, "Program");
    assert_eq!(errors[0].process_name, "convert");
    assert_eq!(errors[0].shortfall(), Some(("in", 50.0, 100.0)));
}

#[test]
fn test_violation_does_not_stop_later_processes() {
    let mut sim = new_sim(2);
    let treasury = constant(&mut sim, "Treasury", 10.0);
    let office = sim.create_entity("Office", Vec::<String>::new(), None).unwrap();
    sim.attach_process(
        office,
        ProcessSpec::new("converter", "lease")
            .with_port("in", "money")
            .with_port("out", "money")
            .with_property("required", 25.0),
    )
    .unwrap();
    sim.attach_process(
        office,
        ProcessSpec::new("constant", "volunteers")
            .with_priority(1)
            .with_port("out", "staff_hours")
            .with_property("amount", 8.0),
    )
    .unwrap();
    sim.connect(treasury, office, "money", ConnectOptions::default())
        .unwrap();
    let hours = sim.create_output("Hours", "staff_hours").unwrap();
    sim.connect_output(office, hours).unwrap();

    let report = sim.run(None, None);

    assert_eq!(report.violations, 2);
    assert_eq!(sim.output(hours).unwrap().results(), &[8.0, 8.0]);
}

#[test]
fn test_errors_reset_on_next_run() {
    let mut sim = new_sim(1);
    let treasury = constant(&mut sim, "Treasury", 50.0);
    let program = converter(&mut sim, "Program", 100.0);
    sim.connect(treasury, program, "money", ConnectOptions::default())
        .unwrap();

    sim.run(None, None);
    assert_eq!(sim.errors().len(), 1);

    let grant = sim.process_by_name("Treasury", "grant").unwrap().id();
    sim.set_property(grant, "amount", 100.0, false).unwrap();
    sim.run(None, None);
    assert!(sim.errors().is_empty());
}

#[test]
fn test_violations_are_logged_as_events() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("capability_flow_core_rs=debug")
        .with_test_writer()
        .try_init();

    let mut sim = new_sim(3);
    let treasury = constant(&mut sim, "Treasury", 50.0);
    let program = converter(&mut sim, "Program", 100.0);
    sim.connect(treasury, program, "money", ConnectOptions::default())
        .unwrap();

    sim.run(None, None);

    let violations = sim.event_log().events_of_type("ConstraintViolation");
    assert_eq!(violations.len(), 3);
    assert_eq!(
        violations.iter().map(|e| e.tick()).collect::<Vec<_>>(),
        vec![1, 2, 3]
    );
    assert!(violations[0].message().starts_with("Program/convert"));
}

// ============================================================================
// Scheduled events
// ============================================================================

#[test]
fn test_scheduled_property_change_applies_from_its_tick() {
    let mut sim = new_sim(4);
    let treasury = constant(&mut sim, "Treasury", 10.0);
    let total = sink(&mut sim, "Total", treasury);
    sim.schedule_event(set_amount(3, 5.0));

    let report = sim.run(None, None);

    assert!(report.is_clean());
    assert_eq!(sim.output(total).unwrap().results(), &[10.0, 10.0, 15.0, 15.0]);
    assert_eq!(sim.event_log().events_of_type("ScheduledEventApplied").len(), 1);
}

#[test]
fn test_scheduled_changes_are_restored_after_run() {
    let mut sim = new_sim(4);
    let treasury = constant(&mut sim, "Treasury", 10.0);
    let total = sink(&mut sim, "Total", treasury);
    sim.schedule_event(ScheduledEvent {
        event: GraphEvent::SetProperty {
            entity: "Treasury".to_string(),
            process: "grant".to_string(),
            property: "amount".to_string(),
            value: PropertyValue::Real(1.0),
            additive: true,
        },
        schedule: EventSchedule::Repeating {
            start_tick: 1,
            interval: 2,
        },
    });

    sim.run(None, None);
    let first: Vec<f64> = sim.output(total).unwrap().results().to_vec();
    assert_eq!(first, vec![11.0, 11.0, 12.0, 12.0]);

    let amount = sim
        .process_by_name("Treasury", "grant")
        .unwrap()
        .properties()
        .real("amount")
        .unwrap();
    assert_eq!(amount, 10.0, "property restored after the run");

    sim.run(None, None);
    assert_eq!(sim.output(total).unwrap().results(), first.as_slice());
}

#[test]
fn test_scheduled_bias_change_is_restored() {
    let mut sim = new_sim(2);
    let treasury = constant(&mut sim, "Treasury", 10.0);
    let records = sim.create_entity("Records", Vec::<String>::new(), None).unwrap();
    let scanning = sim.create_entity("Scanning", Vec::<String>::new(), None).unwrap();
    let (out, _) = sim
        .connect(treasury, records, "money", ConnectOptions::default())
        .unwrap();
    sim.connect(treasury, scanning, "money", ConnectOptions::default())
        .unwrap();
    sim.schedule_event(ScheduledEvent {
        event: GraphEvent::SetBias {
            from: "Treasury".to_string(),
            to: "Scanning".to_string(),
            unit: "money".to_string(),
            bias: 0.8,
        },
        schedule: EventSchedule::OneTime { tick: 2 },
    });

    sim.run(None, None);

    let scanning_input = sim.entity(scanning).unwrap().input("money").unwrap().value();
    assert!((scanning_input - 8.0).abs() < 1e-9);
    let connector = sim.output_connector(out).unwrap();
    assert_eq!(connector.biases(), vec![0.5, 0.5]);
    assert_eq!(connector.mode().to_string(), "equal");
}

#[test]
fn test_failed_event_is_recorded_and_skipped() {
    let mut sim = new_sim(3);
    let treasury = constant(&mut sim, "Treasury", 10.0);
    let total = sink(&mut sim, "Total", treasury);
    sim.schedule_event(ScheduledEvent {
        event: GraphEvent::SetApportionment {
            entity: "Treasury".to_string(),
            unit: "money".to_string(),
            mode: "absolute".to_string(),
        },
        schedule: EventSchedule::OneTime { tick: 2 },
    });
    sim.schedule_event(ScheduledEvent {
        event: GraphEvent::SetProperty {
            entity: "Nowhere".to_string(),
            process: "grant".to_string(),
            property: "amount".to_string(),
            value: PropertyValue::Real(1.0),
            additive: false,
        },
        schedule: EventSchedule::OneTime { tick: 2 },
    });

    let report = sim.run(None, None);

    assert_eq!(report.failed_events, 2);
    assert_eq!(report.violations, 0);
    assert_eq!(sim.output(total).unwrap().results(), &[10.0, 10.0, 10.0]);

    let failed = sim.event_log().events_of_type("ScheduledEventFailed");
    assert_eq!(failed.len(), 2);
    assert!(failed.iter().all(|e| e.tick() == 2));
    match failed[1] {
        Event::ScheduledEventFailed { reason, .. } => assert!(reason.contains("Nowhere")),
        other => panic!("unexpected event {:?}", other),
    }
}

// ============================================================================
// Telemetry
// ============================================================================

#[test]
fn test_telemetry_has_one_record_per_sink_plus_messages() {
    let mut sim = new_sim(2);
    let treasury = constant(&mut sim, "Treasury", 10.0);
    sink(&mut sim, "Total", treasury);
    sink(&mut sim, "Audit", treasury);

    sim.run(None, None);
    let telemetry = sim.telemetry();

    assert_eq!(telemetry.simulation, "run-loop");
    assert_eq!(telemetry.records.len(), 3);
    match telemetry.output("Audit") {
        Some(TelemetryRecord::Output { ticks, values, .. }) => {
            assert_eq!(ticks, &vec![1, 2]);
            assert_eq!(values, &vec![5.0, 5.0]);
        }
        other => panic!("expected an output record, got {:?}", other),
    }

    let kinds: Vec<&str> = telemetry.messages().iter().map(|m| m.kind.as_str()).collect();
    assert_eq!(kinds.first(), Some(&"RunStarted"));
    assert_eq!(kinds.last(), Some(&"RunCompleted"));

    let json = telemetry.to_json().unwrap();
    assert!(json.contains("\"record\":\"output\""));
}

#[test]
fn test_digest_changes_with_series() {
    let mut sim = new_sim(2);
    let treasury = constant(&mut sim, "Treasury", 10.0);
    sink(&mut sim, "Total", treasury);

    sim.run(None, None);
    let before = sim.telemetry().digest().unwrap();

    let grant = sim.process_by_name("Treasury", "grant").unwrap().id();
    sim.set_property(grant, "amount", 11.0, false).unwrap();
    sim.run(None, None);

    assert_ne!(before, sim.telemetry().digest().unwrap());
    assert_eq!(before.len(), 64);
}
