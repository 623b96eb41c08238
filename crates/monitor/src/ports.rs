//! Collaborator contracts consumed by the engine.
//!
//! The equipment hierarchy and the work-order service live outside this
//! crate. The engine only sees these traits; [`crate::adapters`] provides
//! in-memory implementations for the daemon and for tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use plantwatch_core::alert::Severity;
use plantwatch_core::equipment::EquipmentNode;
use plantwatch_core::monitoring::thresholds::Metric;
use plantwatch_core::types::{EquipmentId, Timestamp};

use crate::error::MonitorError;

/// Source of the equipment hierarchy (digital twin).
#[async_trait]
pub trait HierarchyProvider: Send + Sync {
    /// Fetch the current root node for `site_id`.
    ///
    /// May fail transiently; the scheduler logs the error and skips the tick.
    async fn get_hierarchy(&self, site_id: &str) -> Result<EquipmentNode, MonitorError>;
}

/// Service that files corrective work orders.
#[async_trait]
pub trait WorkOrderClient: Send + Sync {
    async fn create_autonomous_work_order(
        &self,
        request: &WorkOrderRequest,
    ) -> Result<WorkOrder, MonitorError>;
}

/// Anomaly context sent to the work-order service.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkOrderRequest {
    pub machine_id: EquipmentId,
    pub machine_name: String,
    /// E.g. `temperature_high`.
    pub anomaly_type: String,
    pub metric: Metric,
    pub value: f64,
    pub threshold: f64,
    pub confidence: f64,
    pub severity: Severity,
}

/// Work-order priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
    Urgent,
}

impl Priority {
    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Urgent => "urgent",
        }
    }
}

/// A work order returned by the service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkOrder {
    pub id: String,
    pub priority: Priority,
    pub estimated_duration_hours: f64,
    #[serde(default)]
    pub parts: Vec<String>,
    #[serde(default)]
    pub due_date: Option<Timestamp>,
    #[serde(default)]
    pub assigned_to: Option<String>,
}
