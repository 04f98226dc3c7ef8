//! Cross-context event bus.
//!
//! Each [`CrossTabBus`] is one browsing context attached to a shared
//! [`SignalTransport`]. Publishing does two things:
//!
//! - sends the encoded event over the transport, where every *other*
//!   context's listener decodes and dispatches it
//! - dispatches it synchronously to this context's own handlers
//!
//! A context ignores transport frames it sent itself, so same-context
//! handlers see each event exactly once.

use crate::hub::{Signal, SignalLagged, SignalStream, SignalTransport};
use crate::subscription::{EventHandler, HandlerRegistry, Subscription};
use fieldline_core::{BusConfig, BusError, BusEvent, BusEventType, ContextId};
use serde_json::{Map, Value};
use std::sync::{Arc, Mutex, PoisonError};
use futures_util::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

/// State shared between a bus handle and its listener task.
struct BusInner {
    context_id: ContextId,
    signal_key: String,
    transport: Arc<dyn SignalTransport>,
    registry: Arc<HandlerRegistry>,
}

impl BusInner {
    /// Handle one frame observed on the transport.
    fn receive(&self, signal: Signal) {
        if signal.origin == self.context_id {
            // Already dispatched in-process at publish time.
            return;
        }
        if signal.key != self.signal_key {
            trace!(context_id = %self.context_id, key = %signal.key, "Ignoring signal for other key");
            return;
        }

        match BusEvent::from_json(&signal.payload) {
            Ok(event) => {
                let delivered = self.registry.dispatch(&event);
                debug!(
                    context_id = %self.context_id,
                    origin = %signal.origin,
                    event_type = %event.event_type,
                    event_id = %event.id,
                    handlers = delivered,
                    "Delivered cross-context event"
                );
            }
            Err(e) => {
                warn!(
                    context_id = %self.context_id,
                    origin = %signal.origin,
                    error = %e,
                    "Dropping malformed bus signal"
                );
            }
        }
    }
}

/// One browsing context on the cross-context bus.
pub struct CrossTabBus {
    inner: Arc<BusInner>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl CrossTabBus {
    /// Attach a new context to `transport`.
    ///
    /// The transport receiver is created before this returns, so every
    /// frame sent afterwards by another context is observed. Must be called
    /// from within a tokio runtime.
    pub fn attach(transport: Arc<dyn SignalTransport>, config: &BusConfig) -> Self {
        let signals = transport.subscribe();
        let inner = Arc::new(BusInner {
            context_id: ContextId::new(),
            signal_key: config.signal_key.clone(),
            transport,
            registry: Arc::new(HandlerRegistry::default()),
        });

        let listener = tokio::spawn(listen(Arc::clone(&inner), signals));
        info!(context_id = %inner.context_id, key = %inner.signal_key, "Bus context attached");

        Self {
            inner,
            listener: Mutex::new(Some(listener)),
        }
    }

    pub fn context_id(&self) -> ContextId {
        self.inner.context_id
    }

    /// Publish an event to every context, this one included.
    ///
    /// Returns the published event. Other contexts receive it
    /// asynchronously; handlers on this context have already run when this
    /// returns.
    pub fn publish(
        &self,
        event_type: impl Into<BusEventType>,
        data: Map<String, Value>,
    ) -> Result<BusEvent, BusError> {
        let event = BusEvent::new(event_type, data);
        let payload = event.to_json()?;

        let receivers = self.inner.transport.send(Signal {
            origin: self.inner.context_id,
            key: self.inner.signal_key.clone(),
            payload,
        });
        let delivered = self.inner.registry.dispatch(&event);

        debug!(
            context_id = %self.inner.context_id,
            event_type = %event.event_type,
            event_id = %event.id,
            receivers,
            local_handlers = delivered,
            "Published bus event"
        );
        Ok(event)
    }

    /// Register `handler` for events from every context.
    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&BusEvent) + Send + Sync + 'static,
    {
        let handler: EventHandler = Arc::new(handler);
        let id = self.inner.registry.insert(handler);
        Subscription::new(id, &self.inner.registry)
    }

    /// Register `handler` for events of one type only.
    pub fn subscribe_to<F>(&self, event_type: impl Into<BusEventType>, handler: F) -> Subscription
    where
        F: Fn(&BusEvent) + Send + Sync + 'static,
    {
        let event_type = event_type.into();
        self.subscribe(move |event| {
            if event.event_type == event_type {
                handler(event);
            }
        })
    }

    /// Number of handlers registered on this context.
    pub fn handler_count(&self) -> usize {
        self.inner.registry.len()
    }

    /// Whether the transport listener is still running.
    pub fn is_listening(&self) -> bool {
        self.listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Stop receiving events from other contexts.
    ///
    /// Publishing and same-context delivery keep working.
    pub fn close(&self) {
        let handle = self
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            handle.abort();
            info!(context_id = %self.inner.context_id, "Bus context detached");
        }
    }
}

impl Drop for CrossTabBus {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for CrossTabBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrossTabBus")
            .field("context_id", &self.inner.context_id)
            .field("signal_key", &self.inner.signal_key)
            .field("handlers", &self.handler_count())
            .finish()
    }
}

/// Forward transport frames to the context until the transport closes.
async fn listen(inner: Arc<BusInner>, mut signals: SignalStream) {
    while let Some(frame) = signals.next().await {
        match frame {
            Ok(signal) => inner.receive(signal),
            Err(SignalLagged { skipped }) => {
                warn!(
                    context_id = %inner.context_id,
                    skipped,
                    "Bus listener lagged, signals dropped"
                );
            }
        }
    }
    debug!(context_id = %inner.context_id, "Signal transport closed");
}
