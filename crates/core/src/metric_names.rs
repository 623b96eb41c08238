//! Well-known equipment property keys read by the monitoring engine.
//!
//! The hierarchy provider exposes readings as free-form `{key, value, unit}`
//! properties; only these keys are interpreted.

/// Process temperature in degrees Celsius.
pub const METRIC_TEMPERATURE: &str = "temperature";

/// Line or spindle speed in units per minute.
pub const METRIC_SPEED: &str = "speed";

/// Overall Equipment Effectiveness, either a ratio in `[0, 1]` or a percentage.
pub const METRIC_OEE: &str = "oee";

/// Operating status text (`running`, `stopped`, ...).
pub const PROPERTY_STATUS: &str = "status";
