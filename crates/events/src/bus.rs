//! In-process event bus with bounded history.
//!
//! [`EventBus`] is the publish/subscribe hub for [`AnomalyEvent`]s. It is
//! designed to be shared via `Arc<EventBus>` between the monitoring engine
//! and its consumers.
//!
//! Publishing appends to a fixed-capacity history (oldest evicted first),
//! then calls every registered listener synchronously in registration
//! order, then forwards the event to broadcast-channel subscribers. A
//! panicking listener is logged and skipped; later listeners still run.

use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::sync::broadcast;
use uuid::Uuid;

use crate::event::AnomalyEvent;

/// Number of events retained in history.
pub const HISTORY_CAPACITY: usize = 100;

/// Buffer capacity for the broadcast channel.
const CHANNEL_CAPACITY: usize = 256;

type Listener = Arc<dyn Fn(&AnomalyEvent) + Send + Sync>;

type ListenerRegistry = Mutex<Vec<(u64, Listener)>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// Subscription
// ---------------------------------------------------------------------------

/// Handle returned by [`EventBus::subscribe`].
///
/// Dropping the handle keeps the listener registered; call
/// [`unsubscribe`](Subscription::unsubscribe) to remove it.
#[derive(Debug)]
#[must_use = "keep the subscription to be able to unsubscribe"]
pub struct Subscription {
    id: u64,
    registry: Weak<ListenerRegistry>,
}

impl Subscription {
    /// Remove the listener. Returns `false` if it was already gone.
    pub fn unsubscribe(self) -> bool {
        let Some(registry) = self.registry.upgrade() else {
            return false;
        };
        let mut listeners = lock(&registry);
        let before = listeners.len();
        listeners.retain(|(id, _)| *id != self.id);
        listeners.len() != before
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// In-process fan-out event bus with a bounded history.
///
/// # Usage
///
/// ```rust
/// use chrono::Utc;
/// use plantwatch_core::alert::Severity;
/// use plantwatch_events::{AnomalyEvent, EventBus, EventType};
///
/// let bus = EventBus::default();
/// let sub = bus.subscribe(|event| println!("{}", event.message));
///
/// bus.publish(AnomalyEvent::new(
///     EventType::Alert,
///     Severity::Info,
///     Utc::now(),
///     "Autonomous Monitor",
///     "System",
///     "Monitoring started",
/// ));
/// assert_eq!(bus.history().len(), 1);
/// sub.unsubscribe();
/// ```
pub struct EventBus {
    capacity: usize,
    history: Mutex<VecDeque<AnomalyEvent>>,
    listeners: Arc<ListenerRegistry>,
    next_listener_id: AtomicU64,
    sender: broadcast::Sender<AnomalyEvent>,
}

impl EventBus {
    /// Create a bus retaining at most `capacity` events.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            capacity,
            history: Mutex::new(VecDeque::with_capacity(capacity)),
            listeners: Arc::new(Mutex::new(Vec::new())),
            next_listener_id: AtomicU64::new(1),
            sender,
        }
    }

    /// Register a synchronous listener.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&AnomalyEvent) + Send + Sync + 'static,
    {
        let id = self.next_listener_id.fetch_add(1, Ordering::Relaxed);
        lock(&self.listeners).push((id, Arc::new(listener)));
        Subscription {
            id,
            registry: Arc::downgrade(&self.listeners),
        }
    }

    /// Subscribe through a broadcast channel.
    ///
    /// Slow receivers observe `RecvError::Lagged` once the channel buffer
    /// overflows; the history is unaffected.
    pub fn subscribe_channel(&self) -> broadcast::Receiver<AnomalyEvent> {
        self.sender.subscribe()
    }

    /// Record the event and deliver it to every subscriber.
    pub fn publish(&self, event: AnomalyEvent) {
        {
            let mut history = lock(&self.history);
            history.push_back(event.clone());
            while history.len() > self.capacity {
                history.pop_front();
            }
        }

        // Snapshot so listeners may (un)subscribe while being called.
        let listeners: Vec<(u64, Listener)> = lock(&self.listeners).clone();
        for (id, listener) in listeners {
            if catch_unwind(AssertUnwindSafe(|| listener(&event))).is_err() {
                tracing::error!(
                    listener_id = id,
                    event_id = %event.id,
                    event_type = %event.event_type,
                    "Event listener panicked",
                );
            }
        }

        // Ignore the SendError; it only means there are zero receivers.
        let _ = self.sender.send(event);
    }

    /// Copy of the retained events, oldest first.
    pub fn history(&self) -> Vec<AnomalyEvent> {
        lock(&self.history).iter().cloned().collect()
    }

    /// Retained events belonging to one cascade, oldest first.
    pub fn history_for_cascade(&self, cascade_id: Uuid) -> Vec<AnomalyEvent> {
        lock(&self.history)
            .iter()
            .filter(|e| e.cascade_id == Some(cascade_id))
            .cloned()
            .collect()
    }

    pub fn listener_count(&self) -> usize {
        lock(&self.listeners).len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(HISTORY_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
