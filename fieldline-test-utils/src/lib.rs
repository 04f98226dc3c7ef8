//! Fieldline Test Utilities
//!
//! Shared test infrastructure for the Fieldline workspace:
//! - Proptest generators for bus events and validation kinds
//! - Event recorders that turn bus handlers into awaitable channels
//! - Operation logs for checking scheduler ordering and pacing
//! - Fixtures for common scenarios

pub use fieldline_core::{
    event_data, BusConfig, BusEvent, BusEventType, OperationError, SchedulerConfig,
    ValidationOptions,
};
pub use fieldline_events::{CrossTabBus, LocalSignalHub, Subscription};

use proptest::prelude::*;
use serde_json::{json, Map, Value};
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

// ============================================================================
// FIXTURES
// ============================================================================

/// Event data correlating an event with `user_id`.
pub fn user_data(user_id: &str) -> Map<String, Value> {
    event_data(json!({ "userId": user_id }))
}

/// A hub plus `count` contexts attached to it.
pub fn attached_contexts(count: usize) -> (Arc<LocalSignalHub>, Vec<CrossTabBus>) {
    let hub = Arc::new(LocalSignalHub::new(64));
    let contexts = (0..count)
        .map(|_| CrossTabBus::attach(hub.clone(), &BusConfig::default()))
        .collect();
    (hub, contexts)
}

/// Scheduler configuration with the default interval and pacing.
///
/// Tests run it under paused tokio time, so the real values cost nothing.
pub fn test_scheduler_config() -> SchedulerConfig {
    SchedulerConfig::default()
}

// ============================================================================
// EVENT RECORDER
// ============================================================================

/// Collects every event delivered to one subscription.
pub struct EventRecorder {
    rx: mpsc::UnboundedReceiver<BusEvent>,
    subscription: Subscription,
}

impl EventRecorder {
    /// Subscribe a recording handler on `bus`.
    pub fn subscribe(bus: &CrossTabBus) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let subscription = bus.subscribe(move |event| {
            let _ = tx.send(event.clone());
        });
        Self { rx, subscription }
    }

    /// Wait up to `timeout` for the next event.
    pub async fn next_within(&mut self, timeout: Duration) -> Option<BusEvent> {
        tokio::time::timeout(timeout, self.rx.recv())
            .await
            .ok()
            .flatten()
    }

    /// Wait up to one second for the next event.
    pub async fn next(&mut self) -> Option<BusEvent> {
        self.next_within(Duration::from_secs(1)).await
    }

    /// Events already delivered and not yet read.
    pub fn drain(&mut self) -> Vec<BusEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            events.push(event);
        }
        events
    }

    /// Stop recording; the underlying handler is removed.
    pub fn unsubscribe(self) -> mpsc::UnboundedReceiver<BusEvent> {
        self.subscription.unsubscribe();
        self.rx
    }

    pub fn is_active(&self) -> bool {
        self.subscription.is_active()
    }
}

// ============================================================================
// OPERATION LOG
// ============================================================================

/// One run of a logged operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperationSpan {
    pub label: &'static str,
    pub started: Instant,
    pub finished: Instant,
}

/// Records when logged operations start and finish.
#[derive(Debug, Clone, Default)]
pub struct OperationLog {
    spans: Arc<Mutex<Vec<OperationSpan>>>,
}

impl OperationLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an operation that sleeps `work`, logs its span and returns
    /// `outcome`.
    pub fn operation(
        &self,
        label: &'static str,
        work: Duration,
        outcome: Result<Value, &'static str>,
    ) -> impl FnOnce() -> std::pin::Pin<Box<dyn Future<Output = Result<Value, OperationError>> + Send>>
           + Send
           + 'static {
        let spans = Arc::clone(&self.spans);
        move || {
            Box::pin(async move {
                let started = Instant::now();
                tokio::time::sleep(work).await;
                let finished = Instant::now();
                spans
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(OperationSpan {
                        label,
                        started,
                        finished,
                    });
                outcome.map_err(OperationError::from)
            })
        }
    }

    /// Spans in completion order.
    pub fn spans(&self) -> Vec<OperationSpan> {
        self.spans
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Labels in completion order.
    pub fn labels(&self) -> Vec<&'static str> {
        self.spans().iter().map(|span| span.label).collect()
    }

    /// How many times `label` ran.
    pub fn count(&self, label: &str) -> usize {
        self.spans().iter().filter(|span| span.label == label).count()
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

/// Strategy for event types, weighted towards the named ones.
pub fn event_type_strategy() -> impl Strategy<Value = BusEventType> {
    prop_oneof![
        Just(BusEventType::PermissionsUpdated),
        Just(BusEventType::ClientMappingUpdated),
        Just(BusEventType::UserStatusUpdated),
        "[a-z]{3,12}(-[a-z]{3,12}){0,2}".prop_map(BusEventType::from),
    ]
}

/// Strategy for scalar JSON values.
pub fn scalar_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::from),
        any::<i64>().prop_map(Value::from),
        "[ -~]{0,24}".prop_map(Value::from),
    ]
}

/// Strategy for event data, optionally carrying a `userId`.
pub fn event_data_strategy() -> impl Strategy<Value = Map<String, Value>> {
    (
        prop::option::of("u[0-9]{1,6}"),
        prop::collection::btree_map("[a-zA-Z]{1,10}", scalar_strategy(), 0..5),
    )
        .prop_map(|(user_id, fields)| {
            let mut data: Map<String, Value> = fields.into_iter().collect();
            if let Some(user_id) = user_id {
                data.insert("userId".to_string(), Value::from(user_id));
            }
            data
        })
}

/// Strategy for complete events with fresh ids and timestamps.
pub fn bus_event_strategy() -> impl Strategy<Value = BusEvent> {
    (event_type_strategy(), event_data_strategy())
        .prop_map(|(event_type, data)| BusEvent::new(event_type, data))
}

/// Strategy for validation kinds.
pub fn kind_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("client-assignment".to_string()),
        Just("permissions".to_string()),
        "[a-z]{3,10}(-[a-z]{3,10})?".prop_map(|s| s),
    ]
}
