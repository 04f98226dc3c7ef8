//! Configuration types
//!
//! Every struct has a `Default` built from [`crate::constants`] and a
//! `from_env()` that overrides individual fields from `FIELDLINE_*`
//! environment variables. Unparseable values fall back to the default.

use crate::constants::{
    DEFAULT_BUS_CHANNEL_CAPACITY, DEFAULT_BUS_SIGNAL_KEY, DEFAULT_LOG_FILTER,
    DEFAULT_VALIDATION_MIN_INTERVAL_MS, DEFAULT_VALIDATION_PACING_MS,
};
use std::time::Duration;

// ============================================================================
// SCHEDULER CONFIGURATION
// ============================================================================

/// Configuration for the validation scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// How long a completed run of a kind suppresses further non-forced runs
    /// (default: 5 minutes)
    pub min_interval: Duration,

    /// Pause after each settled task before the next one starts
    /// (default: 1 second)
    pub pacing: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_millis(DEFAULT_VALIDATION_MIN_INTERVAL_MS),
            pacing: Duration::from_millis(DEFAULT_VALIDATION_PACING_MS),
        }
    }
}

impl SchedulerConfig {
    /// Create SchedulerConfig from environment variables.
    ///
    /// # Environment Variables
    /// - `FIELDLINE_VALIDATION_MIN_INTERVAL_MS`: Dedup window (default: 300000)
    /// - `FIELDLINE_VALIDATION_PACING_MS`: Inter-task pause (default: 1000)
    pub fn from_env() -> Self {
        let min_interval = Duration::from_millis(
            std::env::var("FIELDLINE_VALIDATION_MIN_INTERVAL_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_VALIDATION_MIN_INTERVAL_MS),
        );

        let pacing = Duration::from_millis(
            std::env::var("FIELDLINE_VALIDATION_PACING_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_VALIDATION_PACING_MS),
        );

        Self {
            min_interval,
            pacing,
        }
    }

    /// Shorter windows for local development.
    pub fn development() -> Self {
        Self {
            min_interval: Duration::from_secs(30),
            pacing: Duration::from_millis(100),
        }
    }
}

// ============================================================================
// BUS CONFIGURATION
// ============================================================================

/// Configuration for the cross-context bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusConfig {
    /// Signals buffered per listener before it starts lagging (default: 256)
    pub channel_capacity: usize,

    /// Key bus events travel under on the transport. Contexts only accept
    /// signals carrying this key.
    pub signal_key: String,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_BUS_CHANNEL_CAPACITY,
            signal_key: DEFAULT_BUS_SIGNAL_KEY.to_string(),
        }
    }
}

impl BusConfig {
    /// Create BusConfig from environment variables.
    ///
    /// # Environment Variables
    /// - `FIELDLINE_BUS_CAPACITY`: Listener buffer size (default: 256)
    /// - `FIELDLINE_BUS_SIGNAL_KEY`: Transport key (default: "fieldline-cross-tab-event")
    pub fn from_env() -> Self {
        let channel_capacity = std::env::var("FIELDLINE_BUS_CAPACITY")
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .filter(|capacity| *capacity > 0)
            .unwrap_or(DEFAULT_BUS_CHANNEL_CAPACITY);

        let signal_key = std::env::var("FIELDLINE_BUS_SIGNAL_KEY")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_BUS_SIGNAL_KEY.to_string());

        Self {
            channel_capacity,
            signal_key,
        }
    }
}

// ============================================================================
// TELEMETRY CONFIGURATION
// ============================================================================

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    /// `tracing_subscriber::EnvFilter` directive (default: "info")
    pub filter: String,

    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            filter: DEFAULT_LOG_FILTER.to_string(),
            json: false,
        }
    }
}

impl TelemetryConfig {
    /// Create TelemetryConfig from environment variables.
    ///
    /// # Environment Variables
    /// - `FIELDLINE_LOG`: Filter directive (default: "info")
    /// - `FIELDLINE_LOG_JSON`: "true" or "1" for JSON output (default: false)
    pub fn from_env() -> Self {
        let filter = std::env::var("FIELDLINE_LOG")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());

        let json = std::env::var("FIELDLINE_LOG_JSON")
            .map(|s| s == "true" || s == "1")
            .unwrap_or(false);

        Self { filter, json }
    }
}
