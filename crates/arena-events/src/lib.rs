//! In-process event bus.
//!
//! The lifecycle and queue actors announce what happened through an
//! [`EventPublisher`]; whoever cares (spectator broadcast, reward
//! accounting, tests) subscribes handlers on the [`EventBus`] without the
//! publishers knowing about them.
//!
//! Delivery is fire-and-forget. Each [`publish`](EventBus::publish) call
//! snapshots the handler list and hands it to one spawned task, which runs
//! the handlers in registration order. Separate publishes may interleave.

mod event;

pub use event::{EventData, EventKind};

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// A subscribed callback.
///
/// Handlers run on a tokio task; anything slow should spawn its own work.
pub type EventHandler = Arc<dyn Fn(&EventData) + Send + Sync>;

/// The seam publishers depend on.
///
/// Keeping this a trait lets the delivery mechanism change (worker pool,
/// external pub/sub) without touching the actors.
pub trait EventPublisher: Send + Sync + 'static {
    /// Announces an event. Must not block the caller.
    fn publish(&self, kind: EventKind, data: EventData);
}

/// Handler registry keyed by [`EventKind`].
#[derive(Default)]
pub struct EventBus {
    handlers: RwLock<HashMap<EventKind, Vec<EventHandler>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a handler for `kind`. Handlers live as long as the bus.
    pub fn subscribe<F>(&self, kind: EventKind, handler: F)
    where
        F: Fn(&EventData) + Send + Sync + 'static,
    {
        let mut handlers = self
            .handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        handlers.entry(kind).or_default().push(Arc::new(handler));
        tracing::debug!(%kind, count = handlers[&kind].len(), "event handler subscribed");
    }

    /// Number of handlers registered for `kind`.
    pub fn handler_count(&self, kind: EventKind) -> usize {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&kind)
            .map_or(0, Vec::len)
    }

    fn snapshot(&self, kind: EventKind) -> Vec<EventHandler> {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&kind)
            .cloned()
            .unwrap_or_default()
    }
}

impl EventPublisher for EventBus {
    fn publish(&self, kind: EventKind, data: EventData) {
        let handlers = self.snapshot(kind);
        if handlers.is_empty() {
            tracing::trace!(%kind, "no handlers for event");
            return;
        }

        let deliver = move || {
            for handler in &handlers {
                handler(&data);
            }
        };

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move { deliver() });
            }
            Err(_) => {
                tracing::warn!(%kind, "no async runtime, delivering event inline");
                deliver();
            }
        }
    }
}

impl<P: EventPublisher + ?Sized> EventPublisher for Arc<P> {
    fn publish(&self, kind: EventKind, data: EventData) {
        (**self).publish(kind, data);
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let handlers = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let counts: HashMap<_, _> = handlers.iter().map(|(k, v)| (*k, v.len())).collect();
        f.debug_struct("EventBus").field("handlers", &counts).finish()
    }
}
