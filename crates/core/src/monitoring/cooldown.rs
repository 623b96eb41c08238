//! Per-signal alert cooldown tracking.
//!
//! A signal is identified by (metric, direction, equipment) so that a
//! machine running hot and the same machine later running cold are
//! debounced independently.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::monitoring::thresholds::{Direction, Metric, Verdict};
use crate::types::EquipmentId;

/// Minimum interval between repeated cascades for the same signal.
pub const COOLDOWN_WINDOW: Duration = Duration::from_secs(60);

/// Composite key for cooldown tracking.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CooldownKey {
    pub metric: Metric,
    pub direction: Direction,
    pub equipment_id: EquipmentId,
}

impl CooldownKey {
    pub fn new(metric: Metric, direction: Direction, equipment_id: impl Into<String>) -> Self {
        Self {
            metric,
            direction,
            equipment_id: equipment_id.into(),
        }
    }

    pub fn for_verdict(verdict: &Verdict, equipment_id: &str) -> Self {
        Self::new(verdict.metric, verdict.direction, equipment_id)
    }
}

/// Tracks the last trigger time per signal.
#[derive(Debug)]
pub struct CooldownRegistry {
    window: Duration,
    last_trigger: HashMap<CooldownKey, Instant>,
}

impl Default for CooldownRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl CooldownRegistry {
    /// Create an empty registry using [`COOLDOWN_WINDOW`].
    pub fn new() -> Self {
        Self::with_window(COOLDOWN_WINDOW)
    }

    pub fn with_window(window: Duration) -> Self {
        Self {
            window,
            last_trigger: HashMap::new(),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// `true` if the key fired less than one window before `now`.
    pub fn is_on_cooldown(&self, key: &CooldownKey, now: Instant) -> bool {
        self.last_trigger
            .get(key)
            .is_some_and(|last| now.saturating_duration_since(*last) < self.window)
    }

    /// Record `now` as the key's last trigger.
    pub fn set_cooldown(&mut self, key: CooldownKey, now: Instant) {
        self.last_trigger.insert(key, now);
    }

    /// Check the key and, if it is not cooling down, record the trigger.
    ///
    /// Returns `true` if the caller should proceed.
    pub fn try_acquire(&mut self, key: CooldownKey, now: Instant) -> bool {
        if self.is_on_cooldown(&key, now) {
            return false;
        }
        self.set_cooldown(key, now);
        true
    }

    /// Drop every entry.
    pub fn clear(&mut self) {
        self.last_trigger.clear();
    }

    pub fn len(&self) -> usize {
        self.last_trigger.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_trigger.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
