//! The monitoring event envelope.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use plantwatch_core::alert::Severity;
use plantwatch_core::types::Timestamp;

/// Kind of a monitoring event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    AnomalyDetected,
    AgentTriggered,
    ActionPlanned,
    MaintenanceScheduled,
    LineStopped,
    Alert,
}

impl EventType {
    pub fn as_str(self) -> &'static str {
        match self {
            EventType::AnomalyDetected => "anomaly_detected",
            EventType::AgentTriggered => "agent_triggered",
            EventType::ActionPlanned => "action_planned",
            EventType::MaintenanceScheduled => "maintenance_scheduled",
            EventType::LineStopped => "line_stopped",
            EventType::Alert => "alert",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured payload attached to cascade events.
///
/// Every field is optional; stages fill in what they know.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metric: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub work_order_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_duration_hours: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<Timestamp>,
}

/// A single published monitoring event.
///
/// Constructed via [`AnomalyEvent::new`] and enriched with
/// [`in_cascade`](AnomalyEvent::in_cascade) and
/// [`with_details`](AnomalyEvent::with_details).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyEvent {
    /// Time-ordered unique id (UUIDv7).
    pub id: Uuid,
    /// The cascade this event belongs to. `None` for engine lifecycle alerts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cascade_id: Option<Uuid>,
    pub timestamp: Timestamp,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub severity: Severity,
    /// Name of the source node.
    pub equipment: String,
    /// Hierarchical path of the source node.
    pub location: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<EventDetails>,
}

impl AnomalyEvent {
    pub fn new(
        event_type: EventType,
        severity: Severity,
        timestamp: Timestamp,
        equipment: impl Into<String>,
        location: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            cascade_id: None,
            timestamp,
            event_type,
            severity,
            equipment: equipment.into(),
            location: location.into(),
            message: message.into(),
            details: None,
        }
    }

    /// Tag the event with its cascade.
    pub fn in_cascade(mut self, cascade_id: Uuid) -> Self {
        self.cascade_id = Some(cascade_id);
        self
    }

    pub fn with_details(mut self, details: EventDetails) -> Self {
        self.details = Some(details);
        self
    }
}
