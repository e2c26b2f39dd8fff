//! Per-track publish/subscribe for lifecycle notifications.
//!
//! Handlers take no arguments and run synchronously on the emitting thread, in
//! registration order. The handler list is copied before dispatch, so a handler may
//! subscribe, unsubscribe or call back into the track without deadlocking.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use audio_track_types::TrackEvent;

pub type EventHandler = Arc<dyn Fn() + Send + Sync>;

/// Token returned by [`EventBus::on`], used to unsubscribe.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Default)]
pub struct EventBus {
    handlers: Mutex<HashMap<TrackEvent, Vec<(SubscriptionId, EventHandler)>>>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `event`.
    pub fn on<F>(&self, event: TrackEvent, handler: F) -> SubscriptionId
    where
        F: Fn() + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(event)
            .or_default()
            .push((id, Arc::new(handler)));
        id
    }

    /// Remove a handler. Returns `false` if it was not registered for `event`.
    pub fn off(&self, event: TrackEvent, id: SubscriptionId) -> bool {
        let mut handlers = self.handlers.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(list) = handlers.get_mut(&event) else {
            return false;
        };
        let before = list.len();
        list.retain(|(sub, _)| *sub != id);
        before != list.len()
    }

    /// Invoke every handler registered for `event`.
    pub fn emit(&self, event: TrackEvent) {
        let snapshot: Vec<EventHandler> = {
            let handlers = self.handlers.lock().unwrap_or_else(PoisonError::into_inner);
            match handlers.get(&event) {
                Some(list) => list.iter().map(|(_, h)| h.clone()).collect(),
                None => Vec::new(),
            }
        };
        tracing::trace!(event = %event, handlers = snapshot.len(), "emit");
        for handler in snapshot {
            handler();
        }
    }

    pub fn handler_count(&self, event: TrackEvent) -> usize {
        self.handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&event)
            .map_or(0, Vec::len)
    }
}
