//! Fieldline Core - Shared Types
//!
//! Pure data structures used by the scheduler and event crates:
//! bus events and their type vocabulary, context identifiers, validation
//! options, error types and configuration. This crate holds no runtime
//! behavior beyond constructors and (de)serialization.

pub mod config;
pub mod constants;
pub mod error;
pub mod event;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

pub use config::{BusConfig, SchedulerConfig, TelemetryConfig};
pub use error::{
    BusError, FieldlineError, FieldlineResult, OperationError, ScheduleError,
    SharedOperationError,
};
pub use event::{event_data, generate_event_id, BusEvent, BusEventType};

// ============================================================================
// IDENTITY TYPES
// ============================================================================

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Milliseconds since the Unix epoch, the unit carried on the wire.
pub type EpochMillis = i64;

/// Current time in milliseconds since the Unix epoch.
pub fn now_millis() -> EpochMillis {
    Utc::now().timestamp_millis()
}

/// Identifier of one browsing context attached to a signal transport.
///
/// Uses UUIDv7 so identifiers sort by attach time in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContextId(Uuid);

impl ContextId {
    /// Generate a fresh context identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for ContextId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ============================================================================
// VALIDATION OPTIONS
// ============================================================================

/// Per-request options for queueing a validation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ValidationOptions {
    /// Run the operation even when a recent record exists for the kind.
    pub force: bool,
}

impl ValidationOptions {
    /// Options that bypass the minimum-interval suppression.
    pub fn forced() -> Self {
        Self { force: true }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_ids_are_unique_and_ordered() {
        let a = ContextId::new();
        let b = ContextId::new();
        assert_ne!(a, b);
        assert!(a < b);
    }

    #[test]
    fn test_context_id_serializes_as_plain_uuid() {
        let id = ContextId::new();
        let json = serde_json::to_string(&id).expect("serialize context id");
        assert_eq!(json, format!("\"{}\"", id.as_uuid()));
    }

    #[test]
    fn test_validation_options_default_is_not_forced() {
        assert!(!ValidationOptions::default().force);
        assert!(ValidationOptions::forced().force);
    }
}
