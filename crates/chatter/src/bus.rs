// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-process event bus between the socket/session layer and UI consumers.
//!
//! Two ways to listen:
//! - [`EventBus::on`] registers a synchronous handler for one [`EventKind`].
//!   Handlers run on the emitting task, in registration order. The returned
//!   [`Subscription`] unsubscribes when dropped.
//! - [`EventBus::subscribe`] hands out a broadcast receiver of every event
//!   for async consumers.
//!
//! Nothing is buffered for late subscribers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::model::{Message, TypingNotification, User};
use crate::socket::ConnectionState;

/// Events published on the bus.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    /// A chat message arrived over the socket.
    Message(Message),
    /// A peer started or stopped typing.
    Typing(TypingNotification),
    /// The socket connection changed state.
    Connection { state: ConnectionState, close_code: Option<u16> },
    /// The authenticated session changed.
    Session(SessionEvent),
}

impl ChatEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Message(_) => EventKind::Message,
            Self::Typing(_) => EventKind::Typing,
            Self::Connection { .. } => EventKind::Connection,
            Self::Session(_) => EventKind::Session,
        }
    }
}

/// Authentication lifecycle events.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    LoggedIn(Box<User>),
    LoggedOut,
    /// Credentials are gone (refresh failed or missing); the user has to log in again.
    LoginRequired { reason: String },
}

/// Event names handlers register against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Message,
    Typing,
    Connection,
    Session,
}

type Handler = Arc<dyn Fn(&ChatEvent) + Send + Sync>;

struct HandlerEntry {
    id: u64,
    kind: EventKind,
    handler: Handler,
}

struct BusInner {
    handlers: Mutex<Vec<HandlerEntry>>,
    next_id: AtomicU64,
    event_tx: broadcast::Sender<ChatEvent>,
}

impl BusInner {
    fn remove(&self, id: u64) -> bool {
        let mut handlers = self.handlers.lock();
        let before = handlers.len();
        handlers.retain(|e| e.id != id);
        handlers.len() != before
    }
}

/// Cloneable handle to a shared bus.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl EventBus {
    pub fn new() -> Self {
        let (event_tx, _) = broadcast::channel(256);
        Self {
            inner: Arc::new(BusInner {
                handlers: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(1),
                event_tx,
            }),
        }
    }

    /// Register `handler` for events of `kind`.
    pub fn on<F>(&self, kind: EventKind, handler: F) -> Subscription
    where
        F: Fn(&ChatEvent) + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.handlers.lock().push(HandlerEntry { id, kind, handler: Arc::new(handler) });
        Subscription { id, kind, bus: Arc::downgrade(&self.inner) }
    }

    /// Remove a handler. Equivalent to dropping the subscription.
    pub fn off(&self, subscription: Subscription) {
        drop(subscription);
    }

    /// Deliver `event` to every handler of its kind, then to broadcast
    /// subscribers. Returns the number of handlers invoked.
    ///
    /// Handlers are snapshotted before the first one runs, so a handler may
    /// register or drop subscriptions without deadlocking.
    pub fn emit(&self, event: ChatEvent) -> usize {
        let kind = event.kind();
        let handlers: Vec<Handler> = self
            .inner
            .handlers
            .lock()
            .iter()
            .filter(|e| e.kind == kind)
            .map(|e| Arc::clone(&e.handler))
            .collect();

        for handler in &handlers {
            handler(&event);
        }

        // No receivers is fine.
        let _ = self.inner.event_tx.send(event);
        handlers.len()
    }

    /// Subscribe to every event emitted from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<ChatEvent> {
        self.inner.event_tx.subscribe()
    }

    /// Number of registered handlers for `kind`.
    pub fn handler_count(&self, kind: EventKind) -> usize {
        self.inner.handlers.lock().iter().filter(|e| e.kind == kind).count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus").field("handlers", &self.inner.handlers.lock().len()).finish()
    }
}

/// Live registration of a bus handler. Dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes its handler"]
pub struct Subscription {
    id: u64,
    kind: EventKind,
    bus: Weak<BusInner>,
}

impl Subscription {
    pub fn kind(&self) -> EventKind {
        self.kind
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.remove(self.id);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).field("kind", &self.kind).finish()
    }
}

#[cfg(test)]
#[path = "bus_tests.rs"]
mod tests;
