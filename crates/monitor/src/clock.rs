//! Time source for the engine.
//!
//! Every delay in the engine (polling ticks, cascade stages) is a
//! `tokio::time` sleep, and every timestamp and cooldown reading goes
//! through a [`Clock`]. [`TokioClock`] anchors wall-clock time to the
//! Tokio timer, so a paused test runtime advances event timestamps and
//! cooldown windows together with the virtual sleeps.

use std::time::Duration;

use chrono::Utc;
use tokio::time::Instant;

use plantwatch_core::types::Timestamp;

pub trait Clock: Send + Sync {
    /// Current wall-clock time, used for event timestamps.
    fn now(&self) -> Timestamp;

    /// Current monotonic time on the Tokio timer.
    fn instant(&self) -> Instant;
}

/// Wall clock derived from the Tokio timer.
#[derive(Debug, Clone)]
pub struct TokioClock {
    origin_wall: Timestamp,
    origin: Instant,
}

impl TokioClock {
    pub fn new() -> Self {
        Self::starting_at(Utc::now())
    }

    /// Clock whose `now()` reads `origin_wall` at the moment of creation.
    pub fn starting_at(origin_wall: Timestamp) -> Self {
        Self {
            origin_wall,
            origin: Instant::now(),
        }
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TokioClock {
    fn now(&self) -> Timestamp {
        let elapsed: Duration = self.origin.elapsed();
        let delta = chrono::Duration::from_std(elapsed).unwrap_or_else(|_| chrono::Duration::zero());
        self.origin_wall + delta
    }

    fn instant(&self) -> Instant {
        Instant::now()
    }
}
