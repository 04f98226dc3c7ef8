//! Handler registry and subscription guards.

use fieldline_core::BusEvent;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, Weak};
use tracing::error;

/// Callback invoked for every delivered event.
pub type EventHandler = Arc<dyn Fn(&BusEvent) + Send + Sync>;

/// Handlers registered on one context, kept in registration order.
#[derive(Default)]
pub(crate) struct HandlerRegistry {
    next_id: AtomicU64,
    handlers: RwLock<Vec<(u64, EventHandler)>>,
}

impl HandlerRegistry {
    pub(crate) fn insert(&self, handler: EventHandler) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, handler));
        id
    }

    pub(crate) fn remove(&self, id: u64) -> bool {
        let mut handlers = self
            .handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = handlers.len();
        handlers.retain(|(handler_id, _)| *handler_id != id);
        handlers.len() != before
    }

    pub(crate) fn contains(&self, id: u64) -> bool {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|(handler_id, _)| *handler_id == id)
    }

    pub(crate) fn len(&self) -> usize {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Invoke every handler in registration order.
    ///
    /// Handlers are copied out first so a handler may unsubscribe itself or
    /// others. A panicking handler is logged and skipped.
    pub(crate) fn dispatch(&self, event: &BusEvent) -> usize {
        let snapshot: Vec<EventHandler> = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, handler)| Arc::clone(handler))
            .collect();

        let mut delivered = 0;
        for handler in snapshot {
            match catch_unwind(AssertUnwindSafe(|| handler(event))) {
                Ok(()) => delivered += 1,
                Err(_) => {
                    error!(
                        event_type = %event.event_type,
                        event_id = %event.id,
                        "Bus handler panicked"
                    );
                }
            }
        }
        delivered
    }
}

/// Registration of one handler on a bus context.
///
/// The handler stays registered for both delivery paths until
/// [`Subscription::unsubscribe`] is called or the guard is dropped.
#[must_use = "dropping a Subscription unsubscribes its handler"]
pub struct Subscription {
    id: u64,
    registry: Weak<HandlerRegistry>,
}

impl Subscription {
    pub(crate) fn new(id: u64, registry: &Arc<HandlerRegistry>) -> Self {
        Self {
            id,
            registry: Arc::downgrade(registry),
        }
    }

    /// Whether the handler is still registered.
    pub fn is_active(&self) -> bool {
        self.registry
            .upgrade()
            .is_some_and(|registry| registry.contains(self.id))
    }

    /// Remove the handler. No further events reach it from either path.
    pub fn unsubscribe(self) {
        // Drop does the work.
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(self.id);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}
