//! In-memory collaborator implementations.
//!
//! Used by the `plantwatch-monitor` daemon when no external services are
//! wired in, and by tests to script hierarchy changes and failures.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use async_trait::async_trait;

use plantwatch_core::alert::Severity;
use plantwatch_core::equipment::{EquipmentNode, NodeType};
use plantwatch_core::monitoring::thresholds::Metric;

use crate::clock::Clock;
use crate::error::MonitorError;
use crate::ports::{HierarchyProvider, Priority, WorkOrder, WorkOrderClient, WorkOrderRequest};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// InMemoryHierarchy
// ---------------------------------------------------------------------------

/// Serves a replaceable equipment tree for any site id.
pub struct InMemoryHierarchy {
    root: RwLock<EquipmentNode>,
    failures_remaining: AtomicU32,
    fetches: AtomicU64,
}

impl InMemoryHierarchy {
    pub fn new(root: EquipmentNode) -> Self {
        Self {
            root: RwLock::new(root),
            failures_remaining: AtomicU32::new(0),
            fetches: AtomicU64::new(0),
        }
    }

    /// Swap in a new tree; the next fetch returns it.
    pub fn replace(&self, root: EquipmentNode) {
        *self.root.write().unwrap_or_else(PoisonError::into_inner) = root;
    }

    /// Make the next `count` fetches fail.
    pub fn fail_next(&self, count: u32) {
        self.failures_remaining.store(count, Ordering::SeqCst);
    }

    /// Number of fetch attempts so far, failed ones included.
    pub fn fetch_count(&self) -> u64 {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HierarchyProvider for InMemoryHierarchy {
    async fn get_hierarchy(&self, site_id: &str) -> Result<EquipmentNode, MonitorError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);

        let failing = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(MonitorError::HierarchyUnavailable {
                site_id: site_id.to_string(),
                reason: "provider temporarily unavailable".into(),
            });
        }

        Ok(self
            .root
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }
}

// ---------------------------------------------------------------------------
// AutoWorkOrderService
// ---------------------------------------------------------------------------

/// Files work orders locally with sequential `WO-AUTO-nnnn` ids.
///
/// Priority follows the anomaly severity; due date is the estimated
/// duration plus a lead time that shrinks with priority.
pub struct AutoWorkOrderService {
    clock: Arc<dyn Clock>,
    next_id: AtomicU64,
    failing: AtomicBool,
    requests: Mutex<Vec<WorkOrderRequest>>,
}

impl AutoWorkOrderService {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            next_id: AtomicU64::new(1),
            failing: AtomicBool::new(false),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// While set, every request is rejected.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Every request received so far, in arrival order.
    pub fn requests(&self) -> Vec<WorkOrderRequest> {
        lock(&self.requests).clone()
    }
}

fn priority_for(severity: Severity) -> Priority {
    match severity {
        Severity::Critical => Priority::Urgent,
        Severity::Warning => Priority::High,
        Severity::Info => Priority::Medium,
    }
}

fn lead_time_hours(priority: Priority) -> i64 {
    match priority {
        Priority::Urgent => 4,
        Priority::High => 24,
        Priority::Medium => 72,
        Priority::Low => 168,
    }
}

fn plan_for(metric: Metric) -> (f64, Vec<String>, &'static str) {
    match metric {
        Metric::Temperature => (
            4.0,
            vec!["Cooling fan assembly".into(), "Thermal sensor".into()],
            "Maintenance Team A",
        ),
        Metric::Speed => (2.0, vec!["Drive belt".into()], "Process Engineering"),
        Metric::Oee => (3.0, Vec::new(), "Production Supervisor"),
    }
}

#[async_trait]
impl WorkOrderClient for AutoWorkOrderService {
    async fn create_autonomous_work_order(
        &self,
        request: &WorkOrderRequest,
    ) -> Result<WorkOrder, MonitorError> {
        lock(&self.requests).push(request.clone());

        if self.failing.load(Ordering::SeqCst) {
            return Err(MonitorError::WorkOrderFailed(format!(
                "work order service rejected request for {}",
                request.machine_id
            )));
        }

        let seq = self.next_id.fetch_add(1, Ordering::SeqCst);
        let priority = priority_for(request.severity);
        let (hours, parts, assignee) = plan_for(request.metric);
        let due_date = self.clock.now()
            + chrono::Duration::hours(lead_time_hours(priority))
            + chrono::Duration::minutes((hours * 60.0) as i64);

        Ok(WorkOrder {
            id: format!("WO-AUTO-{seq:04}"),
            priority,
            estimated_duration_hours: hours,
            parts,
            due_date: Some(due_date),
            assigned_to: Some(assignee.to_string()),
        })
    }
}

// ---------------------------------------------------------------------------
// Sample plant
// ---------------------------------------------------------------------------

/// A small plant used by the daemon when no tree is supplied.
///
/// Press 2 runs hot, and Line 2 is stopped with a low OEE, which must not
/// alarm.
pub fn demo_plant() -> EquipmentNode {
    EquipmentNode::new("plant-001", "Riverside Plant", NodeType::Site)
        .with_child(
            EquipmentNode::new("area-stamping", "Stamping", NodeType::Area).with_child(
                EquipmentNode::new("line-1", "Line 1", NodeType::Line)
                    .with_property("oee", 81.5, Some("%"))
                    .with_property("status", "running", None)
                    .with_child(
                        EquipmentNode::new("press-1", "Press 1", NodeType::Machine)
                            .with_property("temperature", 68.0, Some("°C"))
                            .with_property("speed", 96.0, Some("units/min")),
                    )
                    .with_child(
                        EquipmentNode::new("press-2", "Press 2", NodeType::Machine)
                            .with_property("temperature", 88.5, Some("°C"))
                            .with_property("speed", 101.0, Some("units/min")),
                    ),
            ),
        )
        .with_child(
            EquipmentNode::new("area-assembly", "Assembly", NodeType::Area).with_child(
                EquipmentNode::new("line-2", "Line 2", NodeType::Line)
                    .with_property("oee", 0.12, None)
                    .with_property("status", "stopped", None),
            ),
        )
}
