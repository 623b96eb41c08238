//! `plantwatch-monitor` library crate.
//!
//! The autonomous monitoring and response engine: polls the equipment
//! hierarchy, classifies readings against thresholds, debounces repeat
//! signals and drives a staged response cascade per anomaly, publishing
//! every stage on the [`EventBus`](plantwatch_events::EventBus).
//!
//! The binary entrypoint lives in `main.rs`.

pub mod adapters;
pub mod cascade;
pub mod clock;
pub mod engine;
pub mod error;
pub mod ports;
pub mod scheduler;

pub use engine::MonitoringEngine;
pub use error::MonitorError;
