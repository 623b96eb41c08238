//! Monitoring configuration.
//!
//! A [`MonitoringConfig`] is built once when the engine is created and is
//! never mutated afterwards. Defaults are compiled in; the daemon may
//! override them through environment variables (see [`MonitoringConfig::from_env`]).

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::threshold_validation::{validate_bounds, validate_unit_range};

/// Default polling interval.
pub const DEFAULT_CHECK_INTERVAL_MS: u64 = 10_000;

/// Default site whose hierarchy is polled.
pub const DEFAULT_SITE_ID: &str = "plant-001";

/// Inclusive operating range for a two-sided metric.
///
/// Readings equal to `min` or `max` are in range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min: f64,
    pub max: f64,
}

impl Bounds {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }
}

/// Per-metric threshold bounds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    /// Degrees Celsius.
    pub temperature: Bounds,
    /// Units per minute.
    pub speed: Bounds,
    /// Minimum acceptable OEE as a ratio in `[0, 1]`.
    pub oee_min: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            temperature: Bounds::new(20.0, 85.0),
            speed: Bounds::new(50.0, 120.0),
            oee_min: 0.75,
        }
    }
}

impl Thresholds {
    pub fn validate(&self) -> Result<(), CoreError> {
        validate_bounds(self.temperature.min, self.temperature.max, "temperature")?;
        validate_bounds(self.speed.min, self.speed.max, "speed")?;
        validate_unit_range(self.oee_min, "oee_min")
    }
}

/// Engine configuration, immutable after construction.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitoringConfig {
    /// When `false`, starting the engine is a logged no-op.
    pub enabled: bool,
    /// Delay between hierarchy polls.
    pub check_interval: Duration,
    /// Site passed to the hierarchy provider on every tick.
    pub site_id: String,
    pub thresholds: Thresholds,
    /// Whether stopping the engine also cancels cascade stages still in
    /// flight.
    pub cancel_cascades_on_stop: bool,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            check_interval: Duration::from_millis(DEFAULT_CHECK_INTERVAL_MS),
            site_id: DEFAULT_SITE_ID.to_string(),
            thresholds: Thresholds::default(),
            cancel_cascades_on_stop: true,
        }
    }
}

impl MonitoringConfig {
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.check_interval.is_zero() {
            return Err(CoreError::Validation(
                "check interval must be greater than zero".into(),
            ));
        }
        if self.site_id.trim().is_empty() {
            return Err(CoreError::Validation("site id must not be empty".into()));
        }
        self.thresholds.validate()
    }

    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                           | Default     |
    /// |-----------------------------------|-------------|
    /// | `MONITOR_ENABLED`                 | `true`      |
    /// | `MONITOR_CHECK_INTERVAL_MS`       | `10000`     |
    /// | `MONITOR_SITE_ID`                 | `plant-001` |
    /// | `MONITOR_TEMP_MIN`                | `20`        |
    /// | `MONITOR_TEMP_MAX`                | `85`        |
    /// | `MONITOR_SPEED_MIN`               | `50`        |
    /// | `MONITOR_SPEED_MAX`               | `120`       |
    /// | `MONITOR_OEE_MIN`                 | `0.75`      |
    /// | `MONITOR_CANCEL_CASCADES_ON_STOP` | `true`      |
    pub fn from_env() -> Result<Self, CoreError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) but reads values through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, CoreError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let enabled = parse_or(&lookup, "MONITOR_ENABLED", defaults.enabled)?;
        let interval_ms = parse_or(
            &lookup,
            "MONITOR_CHECK_INTERVAL_MS",
            DEFAULT_CHECK_INTERVAL_MS,
        )?;
        let site_id = lookup("MONITOR_SITE_ID").unwrap_or(defaults.site_id);

        let t = defaults.thresholds;
        let thresholds = Thresholds {
            temperature: Bounds::new(
                parse_or(&lookup, "MONITOR_TEMP_MIN", t.temperature.min)?,
                parse_or(&lookup, "MONITOR_TEMP_MAX", t.temperature.max)?,
            ),
            speed: Bounds::new(
                parse_or(&lookup, "MONITOR_SPEED_MIN", t.speed.min)?,
                parse_or(&lookup, "MONITOR_SPEED_MAX", t.speed.max)?,
            ),
            oee_min: parse_or(&lookup, "MONITOR_OEE_MIN", t.oee_min)?,
        };

        let cancel_cascades_on_stop = parse_or(
            &lookup,
            "MONITOR_CANCEL_CASCADES_ON_STOP",
            defaults.cancel_cascades_on_stop,
        )?;

        let config = Self {
            enabled,
            check_interval: Duration::from_millis(interval_ms),
            site_id,
            thresholds,
            cancel_cascades_on_stop,
        };
        config.validate()?;
        Ok(config)
    }
}

fn parse_or<T, F>(lookup: &F, key: &str, default: T) -> Result<T, CoreError>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| CoreError::Validation(format!("{key} has an invalid value: {raw:?}"))),
        None => Ok(default),
    }
}
