//! Threshold evaluation for equipment readings.
//!
//! Pure logic. The caller extracts [`NodeReadings`] from the hierarchy and
//! decides what to do with the returned verdicts (cooldown check, cascade).
//!
//! Bounds are strict: a reading equal to `min` or `max` is not anomalous.

use serde::{Deserialize, Serialize};

use crate::alert::Severity;
use crate::equipment::NodeReadings;
use crate::metric_names::{METRIC_OEE, METRIC_SPEED, METRIC_TEMPERATURE};
use crate::monitoring::config::{Bounds, Thresholds};

/// A monitored metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    Temperature,
    Speed,
    Oee,
}

impl Metric {
    /// Property key / display name of the metric.
    pub fn as_str(self) -> &'static str {
        match self {
            Metric::Temperature => METRIC_TEMPERATURE,
            Metric::Speed => METRIC_SPEED,
            Metric::Oee => METRIC_OEE,
        }
    }

    pub fn unit(self) -> &'static str {
        match self {
            Metric::Temperature => "°C",
            Metric::Speed => "units/min",
            Metric::Oee => "",
        }
    }
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which side of the operating range a reading fell on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    High,
    Low,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::High => "high",
            Direction::Low => "low",
        }
    }
}

/// An anomalous reading.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Verdict {
    pub metric: Metric,
    pub direction: Direction,
    /// Observed value. OEE values are reported as a ratio.
    pub value: f64,
    /// The bound that was crossed.
    pub threshold: f64,
    /// Fixed display confidence for this (metric, direction) pair.
    pub confidence: f64,
}

impl Verdict {
    fn new(metric: Metric, direction: Direction, value: f64, threshold: f64) -> Self {
        Self {
            metric,
            direction,
            value,
            threshold,
            confidence: confidence_for(metric, direction),
        }
    }

    /// Severity of the detection event raised for this verdict.
    pub fn severity(&self) -> Severity {
        match (self.metric, self.direction) {
            (Metric::Temperature, Direction::High) => Severity::Critical,
            (Metric::Temperature, Direction::Low) => Severity::Warning,
            (Metric::Speed, Direction::High) => Severity::Warning,
            (Metric::Speed, Direction::Low) => Severity::Info,
            (Metric::Oee, _) => Severity::Warning,
        }
    }

    /// Anomaly label such as `temperature_high`.
    pub fn anomaly_type(&self) -> String {
        format!("{}_{}", self.metric.as_str(), self.direction.as_str())
    }
}

/// Display confidence per (metric, direction). Not derived from data.
pub fn confidence_for(metric: Metric, direction: Direction) -> f64 {
    match (metric, direction) {
        (Metric::Temperature, Direction::High) => 0.94,
        (Metric::Temperature, Direction::Low) => 0.87,
        (Metric::Speed, Direction::High) => 0.89,
        (Metric::Speed, Direction::Low) => 0.82,
        (Metric::Oee, _) => 0.91,
    }
}

fn check_bounds(metric: Metric, value: f64, bounds: &Bounds) -> Option<Verdict> {
    if value > bounds.max {
        Some(Verdict::new(metric, Direction::High, value, bounds.max))
    } else if value < bounds.min {
        Some(Verdict::new(metric, Direction::Low, value, bounds.min))
    } else {
        None
    }
}

pub fn evaluate_temperature(value: f64, bounds: &Bounds) -> Option<Verdict> {
    check_bounds(Metric::Temperature, value, bounds)
}

pub fn evaluate_speed(value: f64, bounds: &Bounds) -> Option<Verdict> {
    check_bounds(Metric::Speed, value, bounds)
}

/// Convert a percentage OEE (anything above 1) into a ratio.
pub fn normalize_oee(value: f64) -> f64 {
    if value > 1.0 {
        value / 100.0
    } else {
        value
    }
}

/// OEE only alarms on the low side, and never for a stopped line.
pub fn evaluate_oee(value: f64, min: f64, stopped: bool) -> Option<Verdict> {
    if stopped {
        return None;
    }
    let normalized = normalize_oee(value);
    (normalized < min).then(|| Verdict::new(Metric::Oee, Direction::Low, normalized, min))
}

/// Evaluate every monitored reading of one node.
///
/// Verdicts are returned in a fixed order: temperature, speed, OEE.
pub fn evaluate(readings: &NodeReadings, thresholds: &Thresholds) -> Vec<Verdict> {
    let mut verdicts = Vec::new();

    if let Some(v) = readings
        .temperature
        .and_then(|t| evaluate_temperature(t, &thresholds.temperature))
    {
        verdicts.push(v);
    }

    if let Some(v) = readings
        .speed
        .and_then(|s| evaluate_speed(s, &thresholds.speed))
    {
        verdicts.push(v);
    }

    if let Some(v) = readings
        .oee
        .and_then(|o| evaluate_oee(o, thresholds.oee_min, readings.is_stopped()))
    {
        verdicts.push(v);
    }

    verdicts
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
