//! Error types for Fieldline operations

use std::sync::Arc;
use thiserror::Error;

/// Error returned by a validation operation supplied by the caller.
pub type OperationError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Operation error shared between every caller waiting on the same task.
pub type SharedOperationError = Arc<dyn std::error::Error + Send + Sync + 'static>;

/// Validation scheduler errors.
///
/// Cloneable so one settled task can hand the same outcome to every
/// coalesced waiter.
#[derive(Debug, Clone, Error)]
pub enum ScheduleError {
    #[error("Validation kind must not be empty")]
    EmptyKind,

    #[error("Validation {kind} failed: {source}")]
    Operation {
        kind: String,
        #[source]
        source: SharedOperationError,
    },

    #[error("Validation {kind} panicked")]
    Panicked { kind: String },

    #[error("Validation {kind} failed recently and is suppressed: {last_error}")]
    Suppressed { kind: String, last_error: String },

    #[error("Validation {kind} was dropped before it settled")]
    Abandoned { kind: String },
}

impl ScheduleError {
    /// The validation kind this error belongs to, if any.
    pub fn kind(&self) -> Option<&str> {
        match self {
            ScheduleError::EmptyKind => None,
            ScheduleError::Operation { kind, .. }
            | ScheduleError::Panicked { kind }
            | ScheduleError::Suppressed { kind, .. }
            | ScheduleError::Abandoned { kind } => Some(kind.as_str()),
        }
    }

    /// Whether the request was refused because the kind failed recently
    /// and has no successful result to serve.
    pub fn is_suppressed(&self) -> bool {
        matches!(self, ScheduleError::Suppressed { .. })
    }

    /// The error produced by the operation itself, when it failed.
    pub fn operation_error(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        match self {
            ScheduleError::Operation { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

/// Cross-context bus errors.
#[derive(Debug, Error)]
pub enum BusError {
    #[error("Failed to encode bus event: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("Failed to decode bus signal payload: {0}")]
    Decode(#[source] serde_json::Error),
}

/// Master error type for Fieldline services.
#[derive(Debug, Error)]
pub enum FieldlineError {
    #[error(transparent)]
    Schedule(#[from] ScheduleError),

    #[error(transparent)]
    Bus(#[from] BusError),

    #[error("Telemetry initialization failed: {reason}")]
    Telemetry { reason: String },
}

/// Result type for Fieldline operations.
pub type FieldlineResult<T> = Result<T, FieldlineError>;
