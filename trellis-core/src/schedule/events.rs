//! Scheduler notifications.
//!
//! Hosts subscribe to the events a scheduler emits: batch boundaries, the
//! end of a render cycle and the switch to idle.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use super::stats::RenderStats;

/// Something observable happened inside the scheduler.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SchedulerEvent {
    BatchStart { name: String },
    BatchStop { name: String },

    /// A render cycle finished.
    RenderDone(RenderStats),

    /// Async rendering had nothing to do and froze itself. Any new request
    /// wakes it again.
    RenderIdle,

    /// The paint order was re-sorted.
    Sorted,
}

/// Unique identifier for an event subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

impl SubscriberId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

type Listener = Box<dyn FnMut(&SchedulerEvent)>;

struct Subscriber {
    id: SubscriberId,
    notify: Listener,
}

/// Listeners of one scheduler, called in subscription order.
#[derive(Default)]
pub struct EventBus {
    subscribers: Vec<Subscriber>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&mut self, notify: F) -> SubscriberId
    where
        F: FnMut(&SchedulerEvent) + 'static,
    {
        let id = SubscriberId::next();
        self.subscribers.push(Subscriber {
            id,
            notify: Box::new(notify),
        });
        id
    }

    /// Returns whether the subscription existed.
    pub fn unsubscribe(&mut self, id: SubscriberId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|s| s.id != id);
        self.subscribers.len() != before
    }

    pub fn emit(&mut self, event: &SchedulerEvent) {
        for subscriber in &mut self.subscribers {
            (subscriber.notify)(event);
        }
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }

    pub fn clear(&mut self) {
        self.subscribers.clear();
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}
