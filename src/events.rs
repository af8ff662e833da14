//! Typed publish/subscribe for registry and plugin lifecycle events
//!
//! Handlers are invoked synchronously by [`EventBus::publish`], in two phases:
//! every [`Phase::Normal`] subscriber in subscription order, then every
//! [`Phase::Cleanup`] subscriber. Cleanup subscribers therefore run after all
//! other consumers of the same event.
//!
//! No lock is held while handlers run, so a handler may subscribe, publish or
//! call back into the database directory.

use crate::database::{Database, ModelClass};
use crate::plugin::{Owner, PluginId};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use thiserror::Error;

// =============================================================================
// Events
// =============================================================================

#[derive(Clone)]
pub enum Event {
    /// A database was stored in the directory
    DatabaseRegistered {
        database: Arc<Database>,
        owner: Owner,
    },
    /// A model class was bound to a database
    ModelRegistered {
        database: Arc<Database>,
        model: ModelClass,
        owner: Owner,
    },
    /// A plugin finished activating
    PluginActivated { plugin: PluginId },
    /// A plugin finished deactivating
    PluginDeactivated { plugin: PluginId },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    DatabaseRegistered,
    ModelRegistered,
    PluginActivated,
    PluginDeactivated,
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::DatabaseRegistered { .. } => EventKind::DatabaseRegistered,
            Event::ModelRegistered { .. } => EventKind::ModelRegistered,
            Event::PluginActivated { .. } => EventKind::PluginActivated,
            Event::PluginDeactivated { .. } => EventKind::PluginDeactivated,
        }
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::DatabaseRegistered { database, owner } => f
                .debug_struct("DatabaseRegistered")
                .field("database", &database.name())
                .field("owner", owner)
                .finish(),
            Event::ModelRegistered {
                database,
                model,
                owner,
            } => f
                .debug_struct("ModelRegistered")
                .field("database", &database.name())
                .field("model", &model.name())
                .field("owner", owner)
                .finish(),
            Event::PluginActivated { plugin } => f
                .debug_struct("PluginActivated")
                .field("plugin", plugin)
                .finish(),
            Event::PluginDeactivated { plugin } => f
                .debug_struct("PluginDeactivated")
                .field("plugin", plugin)
                .finish(),
        }
    }
}

/// Delivery phase of a subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Normal,
    Cleanup,
}

// =============================================================================
// Bus
// =============================================================================

type Handler = Arc<dyn Fn(&Event) + Send + Sync>;

struct Subscriber {
    id: u64,
    receiver: String,
    kind: EventKind,
    phase: Phase,
    handler: Handler,
}

#[derive(Default)]
struct BusInner {
    next_id: AtomicU64,
    subscribers: Mutex<Vec<Subscriber>>,
}

/// Cloneable handle to one event bus
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe `handler` to events of `kind`
    ///
    /// `receiver` names the subscription and must be unique on this bus. The
    /// subscription lasts until the returned [`Subscription`] is dropped or
    /// revoked.
    pub fn subscribe<F>(
        &self,
        receiver: &str,
        kind: EventKind,
        phase: Phase,
        handler: F,
    ) -> Result<Subscription, EventError>
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let mut subscribers = self.inner.subscribers.lock();
        if subscribers.iter().any(|s| s.receiver == receiver) {
            return Err(EventError::ReceiverExists(receiver.to_string()));
        }

        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        subscribers.push(Subscriber {
            id,
            receiver: receiver.to_string(),
            kind,
            phase,
            handler: Arc::new(handler),
        });

        Ok(Subscription {
            id,
            receiver: receiver.to_string(),
            bus: Arc::downgrade(&self.inner),
        })
    }

    /// Deliver `event` to every matching subscriber
    pub fn publish(&self, event: &Event) {
        let kind = event.kind();
        let mut handlers: Vec<(Phase, Handler)> = self
            .inner
            .subscribers
            .lock()
            .iter()
            .filter(|s| s.kind == kind)
            .map(|s| (s.phase, s.handler.clone()))
            .collect();

        // stable: subscription order is kept within a phase
        handlers.sort_by_key(|(phase, _)| matches!(phase, Phase::Cleanup));

        for (_, handler) in handlers {
            handler(event);
        }
    }

    /// Names of all live subscriptions, in subscription order
    pub fn receivers(&self) -> Vec<String> {
        self.inner
            .subscribers
            .lock()
            .iter()
            .map(|s| s.receiver.clone())
            .collect()
    }

    pub fn is_subscribed(&self, receiver: &str) -> bool {
        self.inner
            .subscribers
            .lock()
            .iter()
            .any(|s| s.receiver == receiver)
    }
}

/// A live subscription; revoked when dropped
pub struct Subscription {
    id: u64,
    receiver: String,
    bus: Weak<BusInner>,
}

impl Subscription {
    pub fn receiver(&self) -> &str {
        &self.receiver
    }

    pub fn is_active(&self) -> bool {
        self.bus
            .upgrade()
            .is_some_and(|bus| bus.subscribers.lock().iter().any(|s| s.id == self.id))
    }

    /// Revoke the subscription now
    pub fn unsubscribe(self) {
        drop(self);
    }

    fn revoke(&self) {
        if let Some(bus) = self.bus.upgrade() {
            // the handler may own the last references to its captures;
            // drop it after releasing the lock
            let removed: Vec<Subscriber> = {
                let mut subscribers = bus.subscribers.lock();
                let (removed, kept) = std::mem::take(&mut *subscribers)
                    .into_iter()
                    .partition(|s| s.id == self.id);
                *subscribers = kept;
                removed
            };
            drop(removed);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.revoke();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("receiver", &self.receiver)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EventError {
    #[error("Receiver {0} is already subscribed")]
    ReceiverExists(String),
}

// =============================================================================
// Tests
// =============================================================================
