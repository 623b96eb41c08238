//! Integration tests for the monitoring engine.
//!
//! All tests run on a paused Tokio clock, so polling ticks, cascade
//! delays and cooldown windows advance deterministically whenever the
//! test sleeps.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use async_trait::async_trait;
use uuid::Uuid;

use plantwatch_core::alert::Severity;
use plantwatch_core::equipment::{EquipmentNode, NodeType};
use plantwatch_core::monitoring::config::MonitoringConfig;
use plantwatch_core::monitoring::thresholds::Metric;
use plantwatch_events::{AnomalyEvent, EventType};
use plantwatch_monitor::adapters::{AutoWorkOrderService, InMemoryHierarchy};
use plantwatch_monitor::clock::TokioClock;
use plantwatch_monitor::ports::HierarchyProvider;
use plantwatch_monitor::{MonitorError, MonitoringEngine};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const INTERVAL: Duration = Duration::from_secs(10);

struct Harness {
    engine: MonitoringEngine,
    hierarchy: Arc<InMemoryHierarchy>,
    work_orders: Arc<AutoWorkOrderService>,
}

fn harness_with(root: EquipmentNode, config: MonitoringConfig) -> Harness {
    let hierarchy = Arc::new(InMemoryHierarchy::new(root));
    let work_orders = Arc::new(AutoWorkOrderService::new(Arc::new(TokioClock::new())));
    let engine = MonitoringEngine::new(config, hierarchy.clone(), work_orders.clone())
        .expect("default config is valid");
    Harness {
        engine,
        hierarchy,
        work_orders,
    }
}

fn harness(root: EquipmentNode) -> Harness {
    harness_with(
        root,
        MonitoringConfig {
            check_interval: INTERVAL,
            ..MonitoringConfig::default()
        },
    )
}

/// Hierarchy provider whose fetches take `delay` to complete.
struct SlowHierarchy {
    inner: InMemoryHierarchy,
    delay: Duration,
}

#[async_trait]
impl HierarchyProvider for SlowHierarchy {
    async fn get_hierarchy(&self, site_id: &str) -> Result<EquipmentNode, MonitorError> {
        tokio::time::sleep(self.delay).await;
        self.inner.get_hierarchy(site_id).await
    }
}

fn slow_engine(root: EquipmentNode) -> MonitoringEngine {
    let hierarchy = Arc::new(SlowHierarchy {
        inner: InMemoryHierarchy::new(root),
        delay: Duration::from_secs(5),
    });
    let work_orders = Arc::new(AutoWorkOrderService::new(Arc::new(TokioClock::new())));
    MonitoringEngine::new(
        MonitoringConfig {
            check_interval: INTERVAL,
            ..MonitoringConfig::default()
        },
        hierarchy,
        work_orders,
    )
    .expect("default config is valid")
}

fn machine(id: &str, name: &str, temperature: f64) -> EquipmentNode {
    EquipmentNode::new(id, name, NodeType::Machine).with_property(
        "temperature",
        temperature,
        Some("°C"),
    )
}

fn plant(children: Vec<EquipmentNode>) -> EquipmentNode {
    let line = children.into_iter().fold(
        EquipmentNode::new("line-1", "Line 1", NodeType::Line),
        EquipmentNode::with_child,
    );
    EquipmentNode::new("plant-001", "Plant A", NodeType::Site).with_child(line)
}

fn types(events: &[AnomalyEvent]) -> Vec<EventType> {
    events.iter().map(|e| e.event_type).collect()
}

fn count(events: &[AnomalyEvent], event_type: EventType) -> usize {
    events.iter().filter(|e| e.event_type == event_type).count()
}

fn cascade_events(h: &Harness, cascade_id: Uuid) -> Vec<AnomalyEvent> {
    h.engine.event_bus().history_for_cascade(cascade_id)
}

fn assert_strictly_increasing(events: &[AnomalyEvent]) {
    assert!(
        events.windows(2).all(|w| w[0].timestamp < w[1].timestamp),
        "timestamps must strictly increase: {:?}",
        events.iter().map(|e| e.timestamp).collect::<Vec<_>>()
    );
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn start_is_idempotent_and_announces_once() {
    let h = harness(plant(vec![machine("m1", "Machine 1", 70.0)]));

    assert!(!h.engine.is_active());
    h.engine.start_monitoring();
    h.engine.start_monitoring();
    assert!(h.engine.is_active());

    let history = h.engine.event_history();
    assert_eq!(types(&history), vec![EventType::Alert]);
    assert_eq!(history[0].severity, Severity::Info);
    assert!(history[0].cascade_id.is_none());
}

#[tokio::test(start_paused = true)]
async fn stop_announces_and_goes_idle() {
    let h = harness(plant(vec![machine("m1", "Machine 1", 70.0)]));

    h.engine.stop_monitoring();
    assert!(h.engine.event_history().is_empty(), "stopping an idle engine is a no-op");

    h.engine.start_monitoring();
    h.engine.stop_monitoring();

    assert!(!h.engine.is_active());
    let history = h.engine.event_history();
    assert_eq!(types(&history), vec![EventType::Alert, EventType::Alert]);
    assert!(history[1].message.contains("stopped"));
}

#[tokio::test(start_paused = true)]
async fn disabled_config_never_starts() {
    let h = harness_with(
        plant(vec![machine("m1", "Machine 1", 99.0)]),
        MonitoringConfig {
            enabled: false,
            ..MonitoringConfig::default()
        },
    );

    h.engine.start_monitoring();
    tokio::time::sleep(INTERVAL * 3).await;

    assert!(!h.engine.is_active());
    assert!(h.engine.event_history().is_empty());
    assert_eq!(h.hierarchy.fetch_count(), 0);
}

#[test]
fn invalid_config_is_rejected() {
    let config = MonitoringConfig {
        check_interval: Duration::ZERO,
        ..MonitoringConfig::default()
    };
    let result = MonitoringEngine::new(
        config,
        Arc::new(InMemoryHierarchy::new(plant(vec![]))),
        Arc::new(AutoWorkOrderService::new(Arc::new(TokioClock::new()))),
    );
    assert_matches!(result, Err(MonitorError::Config(_)));
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn repeated_ticks_are_debounced() {
    let h = harness(plant(vec![machine("m1", "Machine 1", 88.0)]));
    h.engine.start_monitoring();

    // Ticks at 10s, 20s and 30s all see the same hot machine.
    tokio::time::sleep(Duration::from_secs(35)).await;

    assert!(h.hierarchy.fetch_count() >= 3);
    assert_eq!(count(&h.engine.event_history(), EventType::AnomalyDetected), 1);
}

#[tokio::test(start_paused = true)]
async fn stopped_line_with_low_oee_stays_silent() {
    let line = EquipmentNode::new("line-2", "Line 2", NodeType::Line)
        .with_property("oee", 0.40, None)
        .with_property("status", "stopped", None);
    let root = EquipmentNode::new("plant-001", "Plant A", NodeType::Site).with_child(line);
    let h = harness(root);

    h.engine.start_monitoring();
    tokio::time::sleep(INTERVAL + Duration::from_millis(100)).await;

    assert_eq!(h.hierarchy.fetch_count(), 1);
    assert_eq!(types(&h.engine.event_history()), vec![EventType::Alert]);
}

#[tokio::test(start_paused = true)]
async fn fetch_failure_skips_tick_and_loop_continues() {
    let h = harness(plant(vec![machine("m1", "Machine 1", 88.0)]));
    h.hierarchy.fail_next(1);
    h.engine.start_monitoring();

    tokio::time::sleep(INTERVAL + Duration::from_millis(500)).await;
    assert_eq!(h.hierarchy.fetch_count(), 1);
    assert!(h.engine.is_active());
    assert_eq!(count(&h.engine.event_history(), EventType::AnomalyDetected), 0);

    tokio::time::sleep(INTERVAL).await;
    assert_eq!(h.hierarchy.fetch_count(), 2);
    assert_eq!(count(&h.engine.event_history(), EventType::AnomalyDetected), 1);
}

#[tokio::test(start_paused = true)]
async fn scheduler_sees_replaced_tree_and_builds_location() {
    let h = harness(plant(vec![machine("m1", "Machine 1", 70.0)]));
    h.engine.start_monitoring();

    tokio::time::sleep(INTERVAL + Duration::from_millis(100)).await;
    assert_eq!(count(&h.engine.event_history(), EventType::AnomalyDetected), 0);

    let slow = EquipmentNode::new("conv-1", "Conveyor 1", NodeType::Machine)
        .with_property("speed", 20.0, Some("units/min"));
    h.hierarchy.replace(plant(vec![slow]));
    tokio::time::sleep(INTERVAL).await;

    let history = h.engine.event_history();
    let detected: Vec<_> = history
        .iter()
        .filter(|e| e.event_type == EventType::AnomalyDetected)
        .collect();
    assert_eq!(detected.len(), 1);
    assert_eq!(detected[0].severity, Severity::Info);
    assert_eq!(detected[0].equipment, "Conveyor 1");
    assert_eq!(detected[0].location, "Plant A > Line 1 > Conveyor 1");

    // Speed-low has no follow-up stages.
    tokio::time::sleep(Duration::from_secs(6)).await;
    assert_eq!(h.engine.active_cascades(), 0);
    assert_eq!(
        cascade_events(&h, detected[0].cascade_id.unwrap()).len(),
        1
    );
}

// ---------------------------------------------------------------------------
// Evaluation and cooldown
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn boundary_temperature_does_not_trigger() {
    let h = harness(plant(vec![]));

    assert!(h
        .engine
        .evaluate_hierarchy(&plant(vec![machine("m1", "Machine 1", 85.0)]))
        .is_empty());
    assert_eq!(
        h.engine
            .evaluate_hierarchy(&plant(vec![machine("m2", "Machine 2", 85.01)]))
            .len(),
        1
    );
}

#[tokio::test(start_paused = true)]
async fn second_evaluation_within_window_is_suppressed() {
    let h = harness(plant(vec![]));
    let tree = plant(vec![machine("m1", "Machine 1", 88.0)]);

    assert_eq!(h.engine.evaluate_hierarchy(&tree).len(), 1);
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert!(h.engine.evaluate_hierarchy(&tree).is_empty());

    assert_eq!(count(&h.engine.event_history(), EventType::AnomalyDetected), 1);
}

#[tokio::test(start_paused = true)]
async fn cooldown_expires_after_sixty_seconds() {
    let h = harness(plant(vec![]));
    let tree = plant(vec![machine("m1", "Machine 1", 88.0)]);

    let first = h.engine.evaluate_hierarchy(&tree);
    tokio::time::sleep(Duration::from_secs(61)).await;
    let second = h.engine.evaluate_hierarchy(&tree);

    assert_eq!(first.len(), 1);
    assert_eq!(second.len(), 1);
    assert_ne!(first[0], second[0]);
    assert_eq!(count(&h.engine.event_history(), EventType::AnomalyDetected), 2);
}

#[tokio::test(start_paused = true)]
async fn stop_clears_cooldowns() {
    let h = harness(plant(vec![]));
    let tree = plant(vec![machine("m1", "Machine 1", 88.0)]);

    h.engine.start_monitoring();
    assert_eq!(h.engine.evaluate_hierarchy(&tree).len(), 1);
    h.engine.stop_monitoring();

    assert_eq!(h.engine.evaluate_hierarchy(&tree).len(), 1);
}

// ---------------------------------------------------------------------------
// Cascades
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn escalating_temperature_cascade_runs_in_order() {
    let h = harness(plant(vec![]));
    let ids = h
        .engine
        .evaluate_hierarchy(&plant(vec![machine("m1", "Machine 1", 92.0)]));
    assert_eq!(ids.len(), 1);

    tokio::time::sleep(Duration::from_secs(6)).await;

    let events = cascade_events(&h, ids[0]);
    assert_eq!(
        types(&events),
        vec![
            EventType::AnomalyDetected,
            EventType::AgentTriggered,
            EventType::MaintenanceScheduled,
            EventType::LineStopped,
        ]
    );
    assert_strictly_increasing(&events);
    assert_eq!(events[0].severity, Severity::Critical);
    assert_eq!(events[3].severity, Severity::Critical);

    let agent = events[1].details.as_ref().unwrap();
    assert_eq!(agent.agent.as_deref(), Some("Maintenance Planner"));

    let order = events[2].details.as_ref().unwrap();
    assert_eq!(order.work_order_id.as_deref(), Some("WO-AUTO-0001"));
    assert_eq!(order.priority.as_deref(), Some("urgent"));
    assert!(order.due_date.is_some());
    assert_eq!(h.engine.active_cascades(), 0);
}

#[tokio::test(start_paused = true)]
async fn mild_overheat_does_not_stop_the_line() {
    let h = harness(plant(vec![]));
    let ids = h
        .engine
        .evaluate_hierarchy(&plant(vec![machine("m1", "Machine 1", 87.0)]));

    tokio::time::sleep(Duration::from_secs(30)).await;

    let events = cascade_events(&h, ids[0]);
    assert_eq!(
        types(&events),
        vec![
            EventType::AnomalyDetected,
            EventType::AgentTriggered,
            EventType::MaintenanceScheduled,
        ]
    );
    assert_eq!(count(&h.engine.event_history(), EventType::LineStopped), 0);
}

#[tokio::test(start_paused = true)]
async fn low_temperature_only_detects() {
    let h = harness(plant(vec![]));
    let ids = h
        .engine
        .evaluate_hierarchy(&plant(vec![machine("m1", "Machine 1", 5.0)]));

    tokio::time::sleep(Duration::from_secs(10)).await;

    let events = cascade_events(&h, ids[0]);
    assert_eq!(types(&events), vec![EventType::AnomalyDetected]);
    assert_eq!(events[0].severity, Severity::Warning);
    assert!(h.work_orders.requests().is_empty());
}

#[tokio::test(start_paused = true)]
async fn concurrent_cascades_do_not_mix_details() {
    let h = harness(plant(vec![]));
    let ids = h.engine.evaluate_hierarchy(&plant(vec![
        machine("m-a", "Machine A", 92.0),
        machine("m-b", "Machine B", 87.0),
    ]));
    assert_eq!(ids.len(), 2);

    tokio::time::sleep(Duration::from_secs(6)).await;

    let a = cascade_events(&h, ids[0]);
    let b = cascade_events(&h, ids[1]);
    assert_eq!(a.len(), 4);
    assert_eq!(b.len(), 3);

    for (events, name, value) in [(&a, "Machine A", 92.0), (&b, "Machine B", 87.0)] {
        assert_strictly_increasing(events);
        for event in events.iter() {
            assert_eq!(event.equipment, name);
            assert_eq!(event.details.as_ref().unwrap().value, Some(value));
        }
    }

    let a_order = a[2].details.as_ref().unwrap().work_order_id.clone();
    let b_order = b[2].details.as_ref().unwrap().work_order_id.clone();
    assert_ne!(a_order, b_order);

    let machines: Vec<_> = h
        .work_orders
        .requests()
        .into_iter()
        .map(|r| r.machine_id)
        .collect();
    assert_eq!(machines.len(), 2);
    assert!(machines.contains(&"m-a".to_string()));
    assert!(machines.contains(&"m-b".to_string()));
}

#[tokio::test(start_paused = true)]
async fn work_order_failure_emits_degraded_alert_and_still_escalates() {
    let h = harness(plant(vec![]));
    h.work_orders.set_failing(true);

    let ids = h
        .engine
        .evaluate_hierarchy(&plant(vec![machine("m1", "Machine 1", 95.0)]));
    tokio::time::sleep(Duration::from_secs(6)).await;

    let events = cascade_events(&h, ids[0]);
    assert_eq!(
        types(&events),
        vec![
            EventType::AnomalyDetected,
            EventType::AgentTriggered,
            EventType::Alert,
            EventType::LineStopped,
        ]
    );
    assert_eq!(events[2].severity, Severity::Warning);
    assert_eq!(
        events[2].details.as_ref().unwrap().action.as_deref(),
        Some("work_order_failed")
    );
}

#[tokio::test(start_paused = true)]
async fn stop_cancels_in_flight_cascades_by_default() {
    let h = harness(plant(vec![]));
    h.engine.start_monitoring();
    let ids = h
        .engine
        .evaluate_hierarchy(&plant(vec![machine("m1", "Machine 1", 92.0)]));

    tokio::time::sleep(Duration::from_secs(2)).await;
    h.engine.stop_monitoring();
    tokio::time::sleep(Duration::from_secs(10)).await;

    assert_eq!(
        types(&cascade_events(&h, ids[0])),
        vec![EventType::AnomalyDetected, EventType::AgentTriggered]
    );
    assert_eq!(h.engine.active_cascades(), 0);
    assert!(h.work_orders.requests().is_empty());
}

#[tokio::test(start_paused = true)]
async fn stop_during_fetch_evaluates_nothing() {
    let hot = plant(vec![machine("m1", "Machine 1", 92.0)]);
    let engine = slow_engine(hot.clone());
    engine.start_monitoring();

    // Tick at 10s; the fetch is still running at 11s.
    tokio::time::sleep(Duration::from_secs(11)).await;
    engine.stop_monitoring();
    tokio::time::sleep(Duration::from_secs(30)).await;

    let history = engine.event_history();
    assert_eq!(types(&history), vec![EventType::Alert, EventType::Alert]);
    assert!(history[1].message.contains("stopped"));
    assert_eq!(engine.active_cascades(), 0);

    // The abandoned poll left no cooldown behind.
    assert_eq!(engine.evaluate_hierarchy(&hot).len(), 1);
}

#[tokio::test(start_paused = true)]
async fn shutdown_during_fetch_returns_without_evaluating() {
    let engine = slow_engine(plant(vec![machine("m1", "Machine 1", 92.0)]));
    engine.start_monitoring();

    tokio::time::sleep(Duration::from_secs(11)).await;
    engine.shutdown().await;
    tokio::time::sleep(Duration::from_secs(30)).await;

    assert!(!engine.is_active());
    assert_eq!(
        types(&engine.event_history()),
        vec![EventType::Alert, EventType::Alert]
    );
}

#[tokio::test(start_paused = true)]
async fn slow_fetch_still_evaluates_while_running() {
    let engine = slow_engine(plant(vec![machine("m1", "Machine 1", 92.0)]));
    engine.start_monitoring();

    tokio::time::sleep(Duration::from_secs(16)).await;

    assert!(engine.is_active());
    assert_eq!(count(&engine.event_history(), EventType::AnomalyDetected), 1);
}

#[tokio::test(start_paused = true)]
async fn cascades_outlive_stop_when_cancellation_is_disabled() {
    let h = harness_with(
        plant(vec![]),
        MonitoringConfig {
            cancel_cascades_on_stop: false,
            ..MonitoringConfig::default()
        },
    );
    h.engine.start_monitoring();
    let ids = h
        .engine
        .evaluate_hierarchy(&plant(vec![machine("m1", "Machine 1", 92.0)]));

    tokio::time::sleep(Duration::from_secs(2)).await;
    h.engine.stop_monitoring();
    assert!(!h.engine.is_active());
    tokio::time::sleep(Duration::from_secs(10)).await;

    assert_eq!(cascade_events(&h, ids[0]).len(), 4);
}

#[tokio::test(start_paused = true)]
async fn shutdown_cancels_and_waits_for_cascades() {
    let h = harness(plant(vec![]));
    h.engine.start_monitoring();
    let ids = h
        .engine
        .evaluate_hierarchy(&plant(vec![machine("m1", "Machine 1", 92.0)]));
    assert_eq!(h.engine.active_cascades(), 1);

    h.engine.shutdown().await;

    assert!(!h.engine.is_active());
    assert_eq!(h.engine.active_cascades(), 0);
    let before = h.engine.event_history().len();
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(h.engine.event_history().len(), before);
    assert_eq!(cascade_events(&h, ids[0]).len(), 1);
}

// ---------------------------------------------------------------------------
// Simulation and subscribers
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn simulated_anomalies_drive_their_cascades() {
    let h = harness(plant(vec![]));

    let temp = h.engine.simulate_anomaly(Metric::Temperature);
    let speed = h.engine.simulate_anomaly(Metric::Speed);
    let oee = h.engine.simulate_anomaly(Metric::Oee);
    tokio::time::sleep(Duration::from_secs(6)).await;

    assert_eq!(
        types(&cascade_events(&h, temp[0])).last(),
        Some(&EventType::LineStopped)
    );

    let speed_events = cascade_events(&h, speed[0]);
    assert_eq!(
        types(&speed_events),
        vec![
            EventType::AnomalyDetected,
            EventType::AgentTriggered,
            EventType::ActionPlanned,
        ]
    );
    assert_eq!(
        speed_events[1].details.as_ref().unwrap().agent.as_deref(),
        Some("OEE Analyst")
    );

    let oee_events = cascade_events(&h, oee[0]);
    assert_eq!(oee_events[0].severity, Severity::Warning);
    assert_eq!(
        oee_events[1].details.as_ref().unwrap().agent.as_deref(),
        Some("Downtime Detective")
    );
    assert_eq!(oee_events.last().unwrap().event_type, EventType::ActionPlanned);
}

#[tokio::test(start_paused = true)]
async fn oee_simulation_with_zero_target_launches_nothing() {
    let mut config = MonitoringConfig::default();
    config.thresholds.oee_min = 0.0;
    let h = harness_with(plant(vec![]), config);

    assert!(h.engine.simulate_anomaly(Metric::Oee).is_empty());
    assert!(h.engine.event_history().is_empty());
}

#[tokio::test(start_paused = true)]
async fn oee_simulation_stays_below_a_low_target() {
    let mut config = MonitoringConfig::default();
    config.thresholds.oee_min = 0.05;
    let h = harness_with(plant(vec![]), config);

    let ids = h.engine.simulate_anomaly(Metric::Oee);
    assert_eq!(ids.len(), 1);
    let detected = &cascade_events(&h, ids[0])[0];
    let value = detected.details.as_ref().unwrap().value.unwrap();
    assert!(value < 0.05);
}

#[tokio::test(start_paused = true)]
async fn simulation_respects_cooldown() {
    let h = harness(plant(vec![]));
    assert_eq!(h.engine.simulate_anomaly(Metric::Speed).len(), 1);
    assert!(h.engine.simulate_anomaly(Metric::Speed).is_empty());
}

#[tokio::test(start_paused = true)]
async fn subscribers_see_every_stage_despite_a_panicking_peer() {
    let h = harness(plant(vec![]));
    let seen = Arc::new(AtomicUsize::new(0));

    let _bad = h.engine.subscribe(|_| panic!("broken dashboard widget"));
    let counter = Arc::clone(&seen);
    let _good = h.engine.subscribe(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    h.engine
        .evaluate_hierarchy(&plant(vec![machine("m1", "Machine 1", 92.0)]));
    tokio::time::sleep(Duration::from_secs(6)).await;

    assert_eq!(seen.load(Ordering::SeqCst), 4);
}

#[tokio::test(start_paused = true)]
async fn channel_subscribers_receive_cascade_events() {
    let h = harness(plant(vec![]));
    let mut rx = h.engine.subscribe_channel();

    h.engine.simulate_anomaly(Metric::Temperature);
    let first = rx.recv().await.expect("detection event");
    assert_eq!(first.event_type, EventType::AnomalyDetected);

    let second = rx.recv().await.expect("agent event");
    assert_eq!(second.event_type, EventType::AgentTriggered);
    assert_eq!(second.cascade_id, first.cascade_id);
}
