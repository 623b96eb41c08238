//! Staged response cascade for a single detected anomaly.
//!
//! A [`Cascade`] is a small state machine:
//!
//! ```text
//! Detected -> AgentTriggered -> WorkOrdered -> Escalated | Done
//! ```
//!
//! Which stages a cascade visits is fixed by its [`CascadePlan`], derived
//! from the verdict. Every stage is scheduled at a fixed offset from the
//! detection instant and publishes exactly one event, except escalation,
//! which publishes only when the reading is far enough past the limit.
//! Cascades are independent: each runs as its own task and never waits on
//! another.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use plantwatch_core::alert::Severity;
use plantwatch_core::monitoring::thresholds::{Direction, Metric, Verdict};
use plantwatch_core::types::EquipmentId;
use plantwatch_events::{AnomalyEvent, EventBus, EventDetails, EventType};

use crate::clock::Clock;
use crate::ports::{WorkOrder, WorkOrderClient, WorkOrderRequest};

/// Delay between detection and the agent-trigger stage.
pub const AGENT_TRIGGER_DELAY: Duration = Duration::from_millis(1500);

/// Delay between detection and the work-order stage.
pub const WORK_ORDER_DELAY: Duration = Duration::from_millis(3500);

/// Delay between detection and the escalation stage.
pub const ESCALATION_DELAY: Duration = Duration::from_millis(5500);

/// Minimum spacing between two stages of one cascade. Applies when a slow
/// collaborator pushes a stage past the next stage's offset.
pub const MIN_STAGE_GAP: Duration = Duration::from_millis(1);

/// How far past the temperature limit a reading must be to stop the line.
pub const ESCALATION_MARGIN: f64 = 5.0;

/// Position of a cascade in its state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CascadeStage {
    Detected,
    AgentTriggered,
    WorkOrdered,
    Escalated,
    Done,
}

/// Specialist agent assigned to analyze a metric.
pub fn agent_for(metric: Metric) -> &'static str {
    match metric {
        Metric::Temperature => "Maintenance Planner",
        Metric::Speed => "OEE Analyst",
        Metric::Oee => "Downtime Detective",
    }
}

/// The stages a verdict earns beyond detection.
#[derive(Debug, Clone, PartialEq)]
pub struct CascadePlan {
    /// Agent named in the agent-trigger stage.
    pub agent: Option<&'static str>,
    /// Event published by the work-order stage.
    pub work_order_event: Option<EventType>,
    /// Whether the escalation check runs.
    pub escalation: bool,
}

impl CascadePlan {
    pub fn for_verdict(verdict: &Verdict) -> Self {
        match (verdict.metric, verdict.direction) {
            (Metric::Temperature, Direction::High) => Self {
                agent: Some(agent_for(Metric::Temperature)),
                work_order_event: Some(EventType::MaintenanceScheduled),
                escalation: true,
            },
            (Metric::Speed, Direction::High) | (Metric::Oee, Direction::Low) => Self {
                agent: Some(agent_for(verdict.metric)),
                work_order_event: Some(EventType::ActionPlanned),
                escalation: false,
            },
            _ => Self {
                agent: None,
                work_order_event: None,
                escalation: false,
            },
        }
    }

    /// Follow-up stages with their offsets from detection, in order.
    pub fn schedule(&self) -> Vec<(CascadeStage, Duration)> {
        let mut stages = Vec::with_capacity(3);
        if self.agent.is_some() {
            stages.push((CascadeStage::AgentTriggered, AGENT_TRIGGER_DELAY));
        }
        if self.work_order_event.is_some() {
            stages.push((CascadeStage::WorkOrdered, WORK_ORDER_DELAY));
        }
        if self.escalation {
            stages.push((CascadeStage::Escalated, ESCALATION_DELAY));
        }
        stages
    }

    pub fn has_followups(&self) -> bool {
        self.agent.is_some() || self.work_order_event.is_some() || self.escalation
    }
}

/// The node an anomaly was observed on.
#[derive(Debug, Clone, PartialEq)]
pub struct AnomalySource {
    pub equipment_id: EquipmentId,
    pub equipment_name: String,
    pub location: String,
}

/// Shared collaborators handed to every cascade.
#[derive(Clone)]
pub struct CascadeContext {
    pub bus: Arc<EventBus>,
    pub work_orders: Arc<dyn WorkOrderClient>,
    pub clock: Arc<dyn Clock>,
}

/// One in-flight response to one anomaly.
pub struct Cascade {
    id: Uuid,
    source: AnomalySource,
    verdict: Verdict,
    plan: CascadePlan,
    stage: CascadeStage,
    detected_at: Instant,
    ctx: CascadeContext,
}

impl Cascade {
    /// Start a cascade: publishes the detection event immediately.
    pub fn detect(source: AnomalySource, verdict: Verdict, ctx: CascadeContext) -> Self {
        let plan = CascadePlan::for_verdict(&verdict);
        let cascade = Self {
            id: Uuid::now_v7(),
            source,
            verdict,
            plan,
            stage: CascadeStage::Detected,
            detected_at: ctx.clock.instant(),
            ctx,
        };

        tracing::info!(
            cascade_id = %cascade.id,
            equipment_id = %cascade.source.equipment_id,
            anomaly = %cascade.verdict.anomaly_type(),
            value = cascade.verdict.value,
            threshold = cascade.verdict.threshold,
            "Anomaly detected",
        );

        let event = cascade
            .event(
                EventType::AnomalyDetected,
                cascade.verdict.severity(),
                detection_message(&cascade.source, &cascade.verdict),
            )
            .with_details(cascade.base_details());
        cascade.ctx.bus.publish(event);
        cascade
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn stage(&self) -> CascadeStage {
        self.stage
    }

    pub fn plan(&self) -> &CascadePlan {
        &self.plan
    }

    /// Drive the remaining stages to completion.
    ///
    /// Each stage fires at its offset from detection, or [`MIN_STAGE_GAP`]
    /// after the previous stage finished if that is later, so stage
    /// timestamps strictly increase.
    ///
    /// Returns the final stage: `Done`, `Escalated`, or the stage reached
    /// before `cancel` fired.
    pub async fn run(mut self, cancel: CancellationToken) -> CascadeStage {
        let mut last_emit = self.detected_at;
        for (stage, offset) in self.plan.schedule() {
            let deadline = (self.detected_at + offset).max(last_emit + MIN_STAGE_GAP);
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!(
                        cascade_id = %self.id,
                        stage = ?self.stage,
                        "Cascade cancelled",
                    );
                    return self.stage;
                }
                _ = tokio::time::sleep_until(deadline) => {}
            }

            match stage {
                CascadeStage::AgentTriggered => self.trigger_agent(),
                CascadeStage::WorkOrdered => self.create_work_order().await,
                CascadeStage::Escalated => self.escalate(),
                CascadeStage::Detected | CascadeStage::Done => {}
            }
            last_emit = self.ctx.clock.instant();
        }

        if self.stage != CascadeStage::Escalated {
            self.advance(CascadeStage::Done);
        }
        self.stage
    }

    fn advance(&mut self, next: CascadeStage) {
        tracing::debug!(
            cascade_id = %self.id,
            from = ?self.stage,
            to = ?next,
            "Cascade stage transition",
        );
        self.stage = next;
    }

    fn trigger_agent(&mut self) {
        let Some(agent) = self.plan.agent else {
            return;
        };

        let message = format!(
            "{agent} agent triggered to analyze {} anomaly on {}",
            self.verdict.metric, self.source.equipment_name
        );
        let details = EventDetails {
            agent: Some(agent.to_string()),
            action: Some("analysis_started".into()),
            ..self.base_details()
        };
        self.publish(EventType::AgentTriggered, Severity::Info, message, details);
        self.advance(CascadeStage::AgentTriggered);
    }

    async fn create_work_order(&mut self) {
        let Some(event_type) = self.plan.work_order_event else {
            return;
        };

        let request = WorkOrderRequest {
            machine_id: self.source.equipment_id.clone(),
            machine_name: self.source.equipment_name.clone(),
            anomaly_type: self.verdict.anomaly_type(),
            metric: self.verdict.metric,
            value: self.verdict.value,
            threshold: self.verdict.threshold,
            confidence: self.verdict.confidence,
            severity: self.verdict.severity(),
        };

        match self
            .ctx
            .work_orders
            .create_autonomous_work_order(&request)
            .await
        {
            Ok(order) => {
                tracing::info!(
                    cascade_id = %self.id,
                    work_order_id = %order.id,
                    priority = order.priority.as_str(),
                    "Work order created",
                );
                let message = work_order_message(event_type, &self.source, &order);
                let details = EventDetails {
                    agent: self.plan.agent.map(str::to_string),
                    action: Some(work_order_action(event_type).into()),
                    work_order_id: Some(order.id),
                    priority: Some(order.priority.as_str().into()),
                    estimated_duration_hours: Some(order.estimated_duration_hours),
                    due_date: order.due_date,
                    ..self.base_details()
                };
                self.publish(event_type, Severity::Info, message, details);
            }
            Err(e) => {
                tracing::error!(
                    cascade_id = %self.id,
                    equipment_id = %self.source.equipment_id,
                    error = %e,
                    "Work order creation failed",
                );
                let message = format!(
                    "Work order creation failed for {}: {e}. Manual follow-up required",
                    self.source.equipment_name
                );
                let details = EventDetails {
                    action: Some("work_order_failed".into()),
                    ..self.base_details()
                };
                self.publish(EventType::Alert, Severity::Warning, message, details);
            }
        }
        self.advance(CascadeStage::WorkOrdered);
    }

    fn escalate(&mut self) {
        let limit = self.verdict.threshold + ESCALATION_MARGIN;
        if self.verdict.value <= limit {
            tracing::debug!(
                cascade_id = %self.id,
                value = self.verdict.value,
                limit,
                "Below shutdown limit, no escalation",
            );
            return;
        }

        let message = format!(
            "Safety shutdown: {} stopped, {} {:.1}{} exceeds safe limit {:.1}{}",
            self.source.equipment_name,
            self.verdict.metric,
            self.verdict.value,
            self.verdict.metric.unit(),
            limit,
            self.verdict.metric.unit(),
        );
        let details = EventDetails {
            action: Some("emergency_stop".into()),
            threshold: Some(limit),
            ..self.base_details()
        };
        tracing::warn!(
            cascade_id = %self.id,
            equipment_id = %self.source.equipment_id,
            "Line stopped by safety escalation",
        );
        self.publish(EventType::LineStopped, Severity::Critical, message, details);
        self.advance(CascadeStage::Escalated);
    }

    fn event(&self, event_type: EventType, severity: Severity, message: String) -> AnomalyEvent {
        AnomalyEvent::new(
            event_type,
            severity,
            self.ctx.clock.now(),
            self.source.equipment_name.clone(),
            self.source.location.clone(),
            message,
        )
        .in_cascade(self.id)
    }

    fn publish(
        &self,
        event_type: EventType,
        severity: Severity,
        message: String,
        details: EventDetails,
    ) {
        let event = self.event(event_type, severity, message).with_details(details);
        self.ctx.bus.publish(event);
    }

    fn base_details(&self) -> EventDetails {
        EventDetails {
            metric: Some(self.verdict.metric.as_str().to_string()),
            value: Some(self.verdict.value),
            threshold: Some(self.verdict.threshold),
            confidence: Some(self.verdict.confidence),
            ..EventDetails::default()
        }
    }
}

fn detection_message(source: &AnomalySource, verdict: &Verdict) -> String {
    match (verdict.metric, verdict.direction) {
        (Metric::Oee, _) => format!(
            "OEE below target on {}: {:.1}% (target {:.1}%)",
            source.equipment_name,
            verdict.value * 100.0,
            verdict.threshold * 100.0,
        ),
        (metric, direction) => {
            let side = match direction {
                Direction::High => "above maximum",
                Direction::Low => "below minimum",
            };
            format!(
                "{} {side} on {}: {:.1}{unit} (limit {:.1}{unit})",
                capitalize(metric.as_str()),
                source.equipment_name,
                verdict.value,
                verdict.threshold,
                unit = metric.unit(),
            )
        }
    }
}

fn work_order_action(event_type: EventType) -> &'static str {
    match event_type {
        EventType::MaintenanceScheduled => "maintenance_scheduled",
        _ => "corrective_action_planned",
    }
}

fn work_order_message(event_type: EventType, source: &AnomalySource, order: &WorkOrder) -> String {
    let what = match event_type {
        EventType::MaintenanceScheduled => "Preventive maintenance scheduled",
        _ => "Corrective action planned",
    };
    format!(
        "{what} for {}: work order {} ({} priority, est. {:.1}h)",
        source.equipment_name,
        order.id,
        order.priority.as_str(),
        order.estimated_duration_hours,
    )
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
