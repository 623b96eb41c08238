//! Equipment monitoring domain logic.
//!
//! Contains the monitoring configuration, the threshold evaluation rules
//! and the per-signal cooldown registry. All logic in this module is pure
//! (no clock reads, no I/O): callers pass the current instant in.

pub mod config;
pub mod cooldown;
pub mod thresholds;
