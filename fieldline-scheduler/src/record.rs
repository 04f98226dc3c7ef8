//! Per-kind validation records.

use chrono::Utc;
use fieldline_core::Timestamp;
use serde_json::Value;
use std::time::Duration;
use tokio::time::Instant;

/// Outcome history of one validation kind.
///
/// Created when the first task of a kind settles and updated on every
/// settlement after that, successful or not.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationRecord {
    /// Last successful result. A failure never clears it.
    pub result: Option<Value>,
    /// Monotonic completion time of the last run, success or failure.
    pub last_run_at: Instant,
    /// Wall-clock completion time of the last run.
    pub completed_at: Timestamp,
    /// Message of the last failure; cleared by the next success.
    pub last_error: Option<String>,
}

impl ValidationRecord {
    pub(crate) fn succeeded(result: Value) -> Self {
        Self {
            result: Some(result),
            last_run_at: Instant::now(),
            completed_at: Utc::now(),
            last_error: None,
        }
    }

    pub(crate) fn failed(previous: Option<Self>, error: String) -> Self {
        Self {
            result: previous.and_then(|record| record.result),
            last_run_at: Instant::now(),
            completed_at: Utc::now(),
            last_error: Some(error),
        }
    }

    /// Time since the last run completed.
    pub fn age(&self) -> Duration {
        self.last_run_at.elapsed()
    }

    /// Whether the last run completed less than `max_age` ago.
    pub fn is_within(&self, max_age: Duration) -> bool {
        self.age() < max_age
    }

    /// Whether the most recent run failed.
    pub fn last_run_failed(&self) -> bool {
        self.last_error.is_some()
    }
}
