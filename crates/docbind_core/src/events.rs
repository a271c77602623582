//! Lifecycle events.
//!
//! Every save and every query-like operation reports the collection it
//! touched and how long the store round-trip took. This is the only
//! telemetry surface of the mapper.
//!
//! # Usage
//!
//! ```rust,ignore
//! use docbind_core::{EventKind, Connection};
//!
//! connection.events().on(EventKind::Insert, |event| {
//!     println!("{} took {:?}", event.collection, event.runtime);
//! });
//!
//! // Or consume events from a channel
//! let receiver = connection.events().subscribe();
//! ```

use parking_lot::RwLock;
use std::collections::VecDeque;
use std::fmt;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::time::Duration;

use crate::config::DEFAULT_EVENT_HISTORY;

/// Kind of lifecycle event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A new document was inserted by `save`.
    Insert,
    /// An existing document was replaced by `save`.
    Update,
    /// A read, count, update or bulk operation completed.
    Query,
}

impl EventKind {
    /// Event name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Insert => "insert",
            EventKind::Update => "update",
            EventKind::Query => "query",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single lifecycle event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleEvent {
    /// What happened.
    pub kind: EventKind,
    /// Logical collection name.
    pub collection: String,
    /// Wall-clock duration of the operation.
    pub runtime: Duration,
}

impl LifecycleEvent {
    /// Creates an event.
    pub fn new(kind: EventKind, collection: impl Into<String>, runtime: Duration) -> Self {
        Self {
            kind,
            collection: collection.into(),
            runtime,
        }
    }

    /// Duration in whole milliseconds.
    pub fn runtime_millis(&self) -> u128 {
        self.runtime.as_millis()
    }
}

type Handler = Arc<dyn Fn(&LifecycleEvent) + Send + Sync>;

/// Distributes lifecycle events to handlers and subscribers.
///
/// The bus:
/// - Calls handlers registered for the event's kind
/// - Sends every event to each live channel subscriber
/// - Keeps a bounded history for polling
/// - Is thread-safe
pub struct EventBus {
    /// Handlers keyed by event kind.
    handlers: RwLock<Vec<(EventKind, Handler)>>,
    /// Channel subscribers.
    subscribers: RwLock<Vec<Sender<LifecycleEvent>>>,
    /// Recent events, oldest first.
    history: RwLock<VecDeque<LifecycleEvent>>,
    /// Maximum history size.
    max_history: usize,
}

impl EventBus {
    /// Creates a bus with the default history limit.
    pub fn new() -> Self {
        Self::with_max_history(DEFAULT_EVENT_HISTORY)
    }

    /// Creates a bus with a specific history limit.
    pub fn with_max_history(max_history: usize) -> Self {
        Self {
            handlers: RwLock::new(Vec::new()),
            subscribers: RwLock::new(Vec::new()),
            history: RwLock::new(VecDeque::new()),
            max_history,
        }
    }

    /// Registers a handler for one kind of event.
    pub fn on<F>(&self, kind: EventKind, handler: F)
    where
        F: Fn(&LifecycleEvent) + Send + Sync + 'static,
    {
        self.handlers.write().push((kind, Arc::new(handler)));
    }

    /// Subscribes to every future event.
    ///
    /// The receiver should be drained regularly; disconnected receivers are
    /// dropped on the next emit.
    pub fn subscribe(&self) -> Receiver<LifecycleEvent> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.write().push(tx);
        rx
    }

    /// Emits an event.
    pub fn emit(&self, event: LifecycleEvent) {
        if self.max_history > 0 {
            let mut history = self.history.write();
            history.push_back(event.clone());
            while history.len() > self.max_history {
                history.pop_front();
            }
        }

        // Handlers run outside the lock so they may register more handlers.
        let handlers: Vec<Handler> = self
            .handlers
            .read()
            .iter()
            .filter(|(kind, _)| *kind == event.kind)
            .map(|(_, handler)| Arc::clone(handler))
            .collect();
        for handler in handlers {
            handler(&event);
        }

        let mut subscribers = self.subscribers.write();
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Recent events, oldest first.
    pub fn history(&self) -> Vec<LifecycleEvent> {
        self.history.read().iter().cloned().collect()
    }

    /// Recent events of one kind, oldest first.
    pub fn history_of(&self, kind: EventKind) -> Vec<LifecycleEvent> {
        self.history
            .read()
            .iter()
            .filter(|e| e.kind == kind)
            .cloned()
            .collect()
    }

    /// Number of events in history.
    pub fn history_len(&self) -> usize {
        self.history.read().len()
    }

    /// Drops all recorded history.
    pub fn clear_history(&self) {
        self.history.write().clear();
    }

    /// Number of live channel subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("handlers", &self.handlers.read().len())
            .field("subscribers", &self.subscriber_count())
            .field("history", &self.history_len())
            .field("max_history", &self.max_history)
            .finish()
    }
}
