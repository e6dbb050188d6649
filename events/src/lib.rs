//! Event source infrastructure for the push multiplexer.
//!
//! This crate provides the named-listener event source that the SSE bridge
//! subscribes to. It has no dependencies on the `sse` crate, so producers
//! (request handlers, background jobs) can emit events without knowing who
//! is listening.
//!
//! # Architecture
//!
//! - **EventSource**: Trait for anything supporting named-listener add/remove
//! - **Subscription**: Owned handle returned by `subscribe` and consumed by
//!   `unsubscribe`. Removal is by listener id, never by closure identity.
//! - **EventEmitter**: In-memory `EventSource` backed by a `DashMap`
//!
//! Payloads are carried as `serde_json::Value` so emitters and listeners do
//! not need to share concrete types.

use dashmap::DashMap;
use log::*;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Unique identifier for an installed listener (server-generated)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(Uuid);

impl ListenerId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ListenerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Trait for reacting to emitted events.
/// Listeners run on the emitting thread and must not block; anything slow
/// belongs behind a channel.
pub trait EventListener: Send + Sync {
    fn on_event(&self, payload: &Value);
}

impl<F> EventListener for F
where
    F: Fn(&Value) + Send + Sync,
{
    fn on_event(&self, payload: &Value) {
        self(payload)
    }
}

/// Proof that a listener is installed for `event`.
///
/// Deliberately not `Clone`: a subscription can be released exactly once,
/// by handing it back to the source that issued it.
#[derive(Debug, PartialEq, Eq)]
#[must_use = "dropping a Subscription leaves the listener installed"]
pub struct Subscription {
    event: String,
    id: ListenerId,
}

impl Subscription {
    pub fn event(&self) -> &str {
        &self.event
    }

    pub fn id(&self) -> ListenerId {
        self.id
    }
}

/// A source of named events supporting listener add/remove.
pub trait EventSource: Send + Sync {
    /// Install `listener` for `event`, returning the handle needed to remove it.
    fn subscribe(&self, event: &str, listener: Arc<dyn EventListener>) -> Subscription;

    /// Remove exactly the listener `subscription` refers to.
    /// Returns false if it was already gone.
    fn unsubscribe(&self, subscription: Subscription) -> bool;

    /// Number of listeners currently installed for `event`.
    fn listener_count(&self, event: &str) -> usize;
}

/// In-memory event source. Cloning shares the same listener table.
#[derive(Clone, Default)]
pub struct EventEmitter {
    listeners: Arc<DashMap<String, Vec<(ListenerId, Arc<dyn EventListener>)>>>,
}

impl EventEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Invoke every listener installed for `event` with `payload`.
    /// Returns how many listeners were called.
    ///
    /// The listener list is snapshotted first so listeners may subscribe or
    /// unsubscribe while being called.
    pub fn emit(&self, event: &str, payload: &Value) -> usize {
        let snapshot: Vec<Arc<dyn EventListener>> = match self.listeners.get(event) {
            Some(entry) => entry.iter().map(|(_, l)| Arc::clone(l)).collect(),
            None => {
                trace!("No listeners for event {event}");
                return 0;
            }
        };

        for listener in snapshot.iter() {
            listener.on_event(payload);
        }

        snapshot.len()
    }
}

impl EventSource for EventEmitter {
    fn subscribe(&self, event: &str, listener: Arc<dyn EventListener>) -> Subscription {
        let id = ListenerId::new();
        self.listeners
            .entry(event.to_string())
            .or_default()
            .push((id, listener));

        debug!("Installed listener {id} for event {event}");

        Subscription {
            event: event.to_string(),
            id,
        }
    }

    fn unsubscribe(&self, subscription: Subscription) -> bool {
        let Subscription { event, id } = subscription;

        let removed = match self.listeners.get_mut(&event) {
            Some(mut entry) => {
                let before = entry.len();
                entry.retain(|(listener_id, _)| *listener_id != id);
                let removed = entry.len() != before;

                // Clean up empty event entries
                if entry.is_empty() {
                    drop(entry); // Release lock before removal
                    self.listeners.remove_if(&event, |_, listeners| listeners.is_empty());
                }
                removed
            }
            None => false,
        };

        if removed {
            debug!("Removed listener {id} for event {event}");
        } else {
            warn!("Listener {id} for event {event} was already removed");
        }
        removed
    }

    fn listener_count(&self, event: &str) -> usize {
        self.listeners.get(event).map_or(0, |entry| entry.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_listener(counter: &Arc<AtomicUsize>) -> Arc<dyn EventListener> {
        let counter = Arc::clone(counter);
        Arc::new(move |_: &Value| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_emit_reaches_only_listeners_for_that_event() {
        let emitter = EventEmitter::new();
        let progress = Arc::new(AtomicUsize::new(0));
        let debug = Arc::new(AtomicUsize::new(0));

        let _a = emitter.subscribe("progress", counting_listener(&progress));
        let _b = emitter.subscribe("debug", counting_listener(&debug));

        assert_eq!(emitter.emit("progress", &json!({"pct": 50})), 1);
        assert_eq!(progress.load(Ordering::SeqCst), 1);
        assert_eq!(debug.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_emit_without_listeners_is_a_no_op() {
        let emitter = EventEmitter::new();
        assert_eq!(emitter.emit("nobody", &Value::Null), 0);
    }

    #[test]
    fn test_unsubscribe_removes_exactly_the_installed_listener() {
        let emitter = EventEmitter::new();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        let sub_first = emitter.subscribe("progress", counting_listener(&first));
        let _sub_second = emitter.subscribe("progress", counting_listener(&second));
        assert_eq!(emitter.listener_count("progress"), 2);

        assert!(emitter.unsubscribe(sub_first));
        assert_eq!(emitter.listener_count("progress"), 1);

        emitter.emit("progress", &Value::Null);
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_same_closure_installed_twice_is_removed_once_per_handle() {
        let emitter = EventEmitter::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let listener = counting_listener(&counter);

        let a = emitter.subscribe("tick", Arc::clone(&listener));
        let b = emitter.subscribe("tick", listener);
        assert_ne!(a.id(), b.id());

        assert!(emitter.unsubscribe(a));
        assert_eq!(emitter.listener_count("tick"), 1);
        assert!(emitter.unsubscribe(b));
        assert_eq!(emitter.listener_count("tick"), 0);
    }

    #[test]
    fn test_listener_may_unsubscribe_during_emit() {
        let emitter = EventEmitter::new();
        let slot: Arc<std::sync::Mutex<Option<Subscription>>> = Arc::default();

        let inner_emitter = emitter.clone();
        let inner_slot = Arc::clone(&slot);
        let sub = emitter.subscribe(
            "once",
            Arc::new(move |_: &Value| {
                if let Some(sub) = inner_slot.lock().unwrap().take() {
                    inner_emitter.unsubscribe(sub);
                }
            }),
        );
        *slot.lock().unwrap() = Some(sub);

        assert_eq!(emitter.emit("once", &Value::Null), 1);
        assert_eq!(emitter.listener_count("once"), 0);
        assert_eq!(emitter.emit("once", &Value::Null), 0);
    }
}
