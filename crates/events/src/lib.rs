//! Plantwatch monitoring event bus.
//!
//! - [`AnomalyEvent`]: the event envelope published for every cascade
//!   stage and every engine lifecycle change.
//! - [`EventBus`]: in-process publish/subscribe hub with a bounded
//!   history, synchronous listeners and a `tokio::sync::broadcast`
//!   channel for async consumers.

pub mod bus;
pub mod event;

pub use bus::{EventBus, Subscription, HISTORY_CAPACITY};
pub use event::{AnomalyEvent, EventDetails, EventType};
