//! Plantwatch domain core.
//!
//! Pure logic shared by the event bus and the monitoring engine: the
//! equipment tree schema, monitoring configuration, the threshold
//! evaluator and the cooldown registry. Nothing in this crate performs
//! I/O or spawns tasks, so every rule here can be tested in isolation.

pub mod alert;
pub mod equipment;
pub mod error;
pub mod metric_names;
pub mod monitoring;
pub mod threshold_validation;
pub mod types;
