//! The monitoring engine facade.
//!
//! [`MonitoringEngine`] owns the cooldown registry, the event bus, the
//! polling loop and every in-flight cascade. It is constructed explicitly
//! with its collaborators and clock; there is no global instance.
//!
//! Lifecycle: `Idle -> Running -> Idle`, driven by
//! [`start_monitoring`](MonitoringEngine::start_monitoring) and
//! [`stop_monitoring`](MonitoringEngine::stop_monitoring).
//! [`shutdown`](MonitoringEngine::shutdown) stops the engine and waits for
//! every cascade task to finish.
//!
//! Methods that may launch work (`start_monitoring`, `simulate_anomaly`,
//! `evaluate_hierarchy`) must be called from within a Tokio runtime.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use uuid::Uuid;

use plantwatch_core::alert::Severity;
use plantwatch_core::equipment::{EquipmentNode, NodeType};
use plantwatch_core::monitoring::config::MonitoringConfig;
use plantwatch_core::monitoring::cooldown::{CooldownKey, CooldownRegistry};
use plantwatch_core::monitoring::thresholds::{self, Metric};
use plantwatch_events::{AnomalyEvent, EventBus, EventType, Subscription};

use crate::cascade::{Cascade, CascadeContext};
use crate::clock::{Clock, TokioClock};
use crate::error::MonitorError;
use crate::ports::{HierarchyProvider, WorkOrderClient};
use crate::scheduler::{self, collect_observations, Observation};

/// Equipment name used on engine lifecycle alerts.
const ENGINE_EQUIPMENT: &str = "Autonomous Monitor";

/// Location used on engine lifecycle alerts.
const ENGINE_LOCATION: &str = "System";

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Handle to the running polling loop.
struct RunningScheduler {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// State shared between the facade and the polling task.
pub(crate) struct EngineInner {
    pub(crate) config: MonitoringConfig,
    pub(crate) hierarchy: Arc<dyn HierarchyProvider>,
    cascade_ctx: CascadeContext,
    cooldowns: Mutex<CooldownRegistry>,
    /// Parent token of every in-flight cascade. Replaced after each cancel.
    cascade_cancel: Mutex<CancellationToken>,
    cascade_tasks: TaskTracker,
    scheduler: Mutex<Option<RunningScheduler>>,
}

impl EngineInner {
    fn bus(&self) -> &EventBus {
        &self.cascade_ctx.bus
    }

    fn clock(&self) -> &dyn Clock {
        self.cascade_ctx.clock.as_ref()
    }

    fn publish_lifecycle(&self, message: &str) {
        self.bus().publish(AnomalyEvent::new(
            EventType::Alert,
            Severity::Info,
            self.clock().now(),
            ENGINE_EQUIPMENT,
            ENGINE_LOCATION,
            message,
        ));
    }

    /// Evaluate every node of `root`, launching a cascade per new anomaly.
    pub(crate) fn evaluate_hierarchy(&self, root: &EquipmentNode) -> Vec<Uuid> {
        collect_observations(root)
            .iter()
            .flat_map(|obs| self.evaluate_observation(obs))
            .collect()
    }

    fn evaluate_observation(&self, obs: &Observation) -> Vec<Uuid> {
        let verdicts = thresholds::evaluate(&obs.readings, &self.config.thresholds);
        if verdicts.is_empty() {
            return Vec::new();
        }

        let now = self.clock().instant().into_std();
        let mut launched = Vec::with_capacity(verdicts.len());

        for verdict in verdicts {
            let key = CooldownKey::for_verdict(&verdict, &obs.source.equipment_id);
            if !lock(&self.cooldowns).try_acquire(key, now) {
                tracing::debug!(
                    equipment_id = %obs.source.equipment_id,
                    anomaly = %verdict.anomaly_type(),
                    "Anomaly suppressed by cooldown",
                );
                continue;
            }

            let cascade = Cascade::detect(obs.source.clone(), verdict, self.cascade_ctx.clone());
            launched.push(cascade.id());

            if cascade.plan().has_followups() {
                let cancel = lock(&self.cascade_cancel).child_token();
                self.cascade_tasks.spawn(cascade.run(cancel));
            }
        }

        launched
    }

    fn cancel_cascades(&self) {
        let mut token = lock(&self.cascade_cancel);
        token.cancel();
        *token = CancellationToken::new();
    }
}

/// Autonomous monitoring and response engine.
///
/// Cheap to clone; clones share the same engine.
#[derive(Clone)]
pub struct MonitoringEngine {
    inner: Arc<EngineInner>,
}

impl std::fmt::Debug for MonitoringEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MonitoringEngine").finish_non_exhaustive()
    }
}

impl MonitoringEngine {
    /// Create an idle engine using the Tokio-backed clock.
    pub fn new(
        config: MonitoringConfig,
        hierarchy: Arc<dyn HierarchyProvider>,
        work_orders: Arc<dyn WorkOrderClient>,
    ) -> Result<Self, MonitorError> {
        Self::with_clock(config, hierarchy, work_orders, Arc::new(TokioClock::new()))
    }

    /// Create an idle engine with an explicit clock.
    pub fn with_clock(
        config: MonitoringConfig,
        hierarchy: Arc<dyn HierarchyProvider>,
        work_orders: Arc<dyn WorkOrderClient>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, MonitorError> {
        config.validate()?;

        let inner = EngineInner {
            config,
            hierarchy,
            cascade_ctx: CascadeContext {
                bus: Arc::new(EventBus::default()),
                work_orders,
                clock,
            },
            cooldowns: Mutex::new(CooldownRegistry::new()),
            cascade_cancel: Mutex::new(CancellationToken::new()),
            cascade_tasks: TaskTracker::new(),
            scheduler: Mutex::new(None),
        };

        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    pub fn config(&self) -> &MonitoringConfig {
        &self.inner.config
    }

    /// Start the polling loop. No-op if already running or disabled.
    pub fn start_monitoring(&self) {
        if !self.inner.config.enabled {
            tracing::warn!("Monitoring is disabled by configuration, not starting");
            return;
        }

        {
            let mut slot = lock(&self.inner.scheduler);
            if slot.is_some() {
                tracing::debug!("Monitoring already running");
                return;
            }

            let cancel = CancellationToken::new();
            let handle = tokio::spawn(scheduler::run(Arc::clone(&self.inner), cancel.clone()));
            *slot = Some(RunningScheduler { cancel, handle });
        }

        // Listeners may call back into the engine, so publish unlocked.
        tracing::info!(
            site_id = %self.inner.config.site_id,
            interval_ms = self.inner.config.check_interval.as_millis() as u64,
            "Starting autonomous monitoring",
        );
        self.inner.publish_lifecycle("Autonomous monitoring started");
    }

    /// Stop the polling loop and clear all cooldowns. No-op if idle.
    ///
    /// In-flight cascades are cancelled when
    /// [`MonitoringConfig::cancel_cascades_on_stop`] is set; otherwise their
    /// remaining stages still fire after the engine reports inactive.
    pub fn stop_monitoring(&self) {
        let _ = self.stop_scheduler();
    }

    fn stop_scheduler(&self) -> Option<JoinHandle<()>> {
        let running = lock(&self.inner.scheduler).take()?;
        running.cancel.cancel();

        lock(&self.inner.cooldowns).clear();
        if self.inner.config.cancel_cascades_on_stop {
            self.inner.cancel_cascades();
        }

        tracing::info!("Stopping autonomous monitoring");
        self.inner.publish_lifecycle("Autonomous monitoring stopped");
        Some(running.handle)
    }

    pub fn is_active(&self) -> bool {
        lock(&self.inner.scheduler).is_some()
    }

    /// Stop monitoring, cancel every in-flight cascade and wait for all
    /// engine tasks to finish.
    pub async fn shutdown(&self) {
        if let Some(handle) = self.stop_scheduler() {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Monitoring loop task failed");
            }
        }
        self.inner.cancel_cascades();
        self.inner.cascade_tasks.close();
        self.inner.cascade_tasks.wait().await;
        tracing::info!("Monitoring engine shut down");
    }

    /// Register a synchronous listener for every published event.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&AnomalyEvent) + Send + Sync + 'static,
    {
        self.inner.bus().subscribe(listener)
    }

    /// Receive published events through a broadcast channel.
    pub fn subscribe_channel(&self) -> tokio::sync::broadcast::Receiver<AnomalyEvent> {
        self.inner.bus().subscribe_channel()
    }

    /// Retained events, oldest first.
    pub fn event_history(&self) -> Vec<AnomalyEvent> {
        self.inner.bus().history()
    }

    pub fn event_bus(&self) -> Arc<EventBus> {
        Arc::clone(&self.inner.cascade_ctx.bus)
    }

    /// Number of cascades whose follow-up stages are still pending.
    pub fn active_cascades(&self) -> usize {
        self.inner.cascade_tasks.len()
    }

    /// Evaluate a hierarchy snapshot immediately, outside the polling loop.
    ///
    /// Returns the ids of the cascades that were launched.
    pub fn evaluate_hierarchy(&self, root: &EquipmentNode) -> Vec<Uuid> {
        self.inner.evaluate_hierarchy(root)
    }

    /// Inject a synthetic out-of-range reading for `metric`.
    ///
    /// The synthetic node goes through the normal evaluation path, cooldown
    /// included, so a repeat call within the window launches nothing.
    ///
    /// An OEE target of zero has no reading below it, so simulating OEE
    /// then launches nothing either.
    pub fn simulate_anomaly(&self, metric: Metric) -> Vec<Uuid> {
        let t = &self.inner.config.thresholds;
        if metric == Metric::Oee && t.oee_min <= 0.0 {
            tracing::warn!("OEE target is zero, no reading can fall below it");
            return Vec::new();
        }
        let machine = match metric {
            Metric::Temperature => {
                EquipmentNode::new("SIM-TEMP-01", "Injection Molder 3", NodeType::Machine)
                    .with_property("temperature", t.temperature.max + 7.0, Some("°C"))
            }
            Metric::Speed => EquipmentNode::new("SIM-SPEED-01", "Conveyor 2", NodeType::Machine)
                .with_property("speed", t.speed.max + 15.0, Some("units/min")),
            Metric::Oee => {
                EquipmentNode::new("SIM-OEE-01", "Packaging Line 1", NodeType::Line)
                    .with_property("oee", (t.oee_min - 0.13).max(0.0), None)
                    .with_property("status", "running", None)
            }
        };

        tracing::info!(metric = %metric, equipment_id = %machine.id, "Simulating anomaly");
        let root =
            EquipmentNode::new("SIM", "Simulation", NodeType::Site).with_child(machine);
        self.inner.evaluate_hierarchy(&root)
    }
}
