//! Constants for Fieldline
//!
//! Default values for the scheduler, the cross-context bus and logging.
//! Configuration structs fall back to these when the environment is silent.

// ============================================================================
// VALIDATION SCHEDULER
// ============================================================================

/// Minimum time between two non-forced runs of the same kind (5 minutes)
pub const DEFAULT_VALIDATION_MIN_INTERVAL_MS: u64 = 300_000;

/// Pause inserted after each settled task before the next one starts
pub const DEFAULT_VALIDATION_PACING_MS: u64 = 1_000;

/// Validation kind checking that the signed-in user is mapped to a client
pub const KIND_CLIENT_ASSIGNMENT: &str = "client-assignment";

/// Validation kind refreshing the signed-in user's permissions
pub const KIND_PERMISSIONS: &str = "permissions";

// ============================================================================
// CROSS-CONTEXT BUS
// ============================================================================

/// Buffered signals per subscriber before slow listeners start lagging
pub const DEFAULT_BUS_CHANNEL_CAPACITY: usize = 256;

/// Key under which bus events travel on the signal transport
pub const DEFAULT_BUS_SIGNAL_KEY: &str = "fieldline-cross-tab-event";

/// Length of the random suffix appended to event ids
pub const EVENT_ID_SUFFIX_LEN: usize = 9;

/// Payload fields that correlate an event with an entity, in lookup order
pub const SUBJECT_ID_FIELDS: [&str; 2] = ["userId", "subjectId"];

// ============================================================================
// TELEMETRY
// ============================================================================

/// Default tracing filter directive
pub const DEFAULT_LOG_FILTER: &str = "info";
