//! Event Emitter
//!
//! Listener registry keyed by event name, modeled on the familiar
//! `on` / `emit` / `removeAllListeners` / `eventNames` shape.
//!
//! # Locking
//!
//! ```text
//!   receivers: RwLock<HashMap<String, Arc<ReceiverList>>>
//!                                          │
//!                               RwLock<Vec<Arc<Receiver>>>
//! ```
//!
//! The outer lock is held only to look up or replace a list handle; the
//! inner lock only to append or snapshot listeners. Listeners are invoked
//! with no lock held, so a listener may register, emit or remove listeners
//! on the same emitter. A listener removed mid-emission still receives the
//! emission already in progress.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::value::EventValue;

/// A listener callback
pub type Listener = Arc<dyn Fn(&EventValue) + Send + Sync>;

/// Identifies a registered listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw numeric value
    #[must_use]
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

/// A callback that receives events fired for one name
struct Receiver {
    id: ListenerId,
    callback: Listener,
}

impl Receiver {
    fn notify(&self, value: &EventValue) {
        (self.callback)(value);
    }
}

/// Ordered receivers for one event name
#[derive(Default)]
struct ReceiverList {
    receivers: RwLock<Vec<Arc<Receiver>>>,
}

impl ReceiverList {
    fn push(&self, receiver: Receiver) {
        self.receivers.write().push(Arc::new(receiver));
    }

    fn snapshot(&self) -> Vec<Arc<Receiver>> {
        self.receivers.read().clone()
    }

    fn len(&self) -> usize {
        self.receivers.read().len()
    }

    fn emit(&self, value: &EventValue) {
        for receiver in self.snapshot() {
            receiver.notify(value);
        }
    }
}

/// Thread-safe registry of event listeners
#[derive(Default)]
pub struct EventEmitter {
    receivers: RwLock<HashMap<String, Arc<ReceiverList>>>,
}

impl EventEmitter {
    /// Create an emitter with no listeners
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a listener for `event`
    pub fn on<F>(&self, event: impl Into<String>, callback: F) -> ListenerId
    where
        F: Fn(&EventValue) + Send + Sync + 'static,
    {
        self.add_listener(event, Arc::new(callback))
    }

    /// Append an already shared listener for `event`
    pub fn add_listener(&self, event: impl Into<String>, callback: Listener) -> ListenerId {
        let event = event.into();
        let id = ListenerId::next();

        let list = {
            let mut map = self.receivers.write();
            Arc::clone(map.entry(event.clone()).or_default())
        };
        list.push(Receiver { id, callback });

        tracing::trace!(event = %event, listener = %id, "listener registered");
        id
    }

    /// Invoke every listener of `event`, in registration order
    ///
    /// Returns `false` when no listener was ever registered for `event`
    /// (or its listeners were removed).
    pub fn emit(&self, event: &str, value: &EventValue) -> bool {
        let list = {
            let map = self.receivers.read();
            match map.get(event) {
                Some(list) => Arc::clone(list),
                None => return false,
            }
        };

        list.emit(value);
        true
    }

    /// Remove every listener registered for `event`
    pub fn remove_all_listeners_for_event(&self, event: &str) {
        if self.receivers.write().remove(event).is_some() {
            tracing::debug!(event = %event, "listeners removed");
        }
    }

    /// Remove every listener of every event
    pub fn remove_all_listeners(&self) {
        self.receivers.write().clear();
        tracing::debug!("all listeners removed");
    }

    /// Names of all events that currently have an entry, sorted
    #[must_use]
    pub fn event_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.receivers.read().keys().cloned().collect();
        names.sort_unstable();
        names
    }

    /// Number of listeners registered for `event`
    #[must_use]
    pub fn listener_count(&self, event: &str) -> usize {
        self.receivers.read().get(event).map_or(0, |list| list.len())
    }

    /// Listener ids registered for `event`, in invocation order
    #[must_use]
    pub fn listeners(&self, event: &str) -> Vec<ListenerId> {
        self.receivers
            .read()
            .get(event)
            .map(|list| list.snapshot().iter().map(|r| r.id).collect())
            .unwrap_or_default()
    }
}

impl fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventEmitter")
            .field("events", &self.event_names())
            .finish()
    }
}
