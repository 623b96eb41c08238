//! Shared threshold validation helpers.
//!
//! Provides reusable range-checking functions used when building
//! [`MonitoringConfig`](crate::monitoring::config::MonitoringConfig).

use crate::error::CoreError;

/// Validate that a value falls within `[0.0, 1.0]`.
///
/// Returns a `CoreError::Validation` naming the field if out of range.
pub fn validate_unit_range(value: f64, name: &str) -> Result<(), CoreError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(CoreError::Validation(format!(
            "{name} must be between 0.0 and 1.0, got {value}"
        )));
    }
    Ok(())
}

/// Validate that `min` is strictly below `max` and both are finite.
pub fn validate_bounds(min: f64, max: f64, name: &str) -> Result<(), CoreError> {
    if !min.is_finite() || !max.is_finite() {
        return Err(CoreError::Validation(format!(
            "{name} bounds must be finite, got {min}..{max}"
        )));
    }
    if min >= max {
        return Err(CoreError::Validation(format!(
            "{name} minimum ({min}) must be below maximum ({max})"
        )));
    }
    Ok(())
}
