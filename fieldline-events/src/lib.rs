//! Fieldline Events - Cross-Context Event Bus
//!
//! Broadcasts typed [`BusEvent`]s to every context sharing a signal
//! transport, plus synchronous delivery inside the publishing context.
//!
//! # Architecture
//!
//! ```text
//!   context A                 transport                 context B
//!   publish() ──── Signal ──► LocalSignalHub ──► listener ──► handlers
//!      │
//!      └──► handlers (in-process, registration order)
//! ```
//!
//! # Guarantees
//!
//! - At-most-once delivery per (event, handler)
//! - Registration order for same-context handlers
//! - No ordering across contexts, no replay for late subscribers
//! - Malformed frames are logged and dropped

mod bus;
mod hub;
mod subscription;

pub use bus::CrossTabBus;
pub use hub::{LocalSignalHub, Signal, SignalLagged, SignalStream, SignalTransport};
pub use subscription::{EventHandler, Subscription};

// Re-export core types for convenience
pub use fieldline_core::{event_data, BusConfig, BusError, BusEvent, BusEventType, ContextId};
