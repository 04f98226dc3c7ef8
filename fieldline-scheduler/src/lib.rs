//! Fieldline Scheduler - Background Validation Queue
//!
//! Components:
//!
//! - [`ValidationScheduler`]: de-duplicating, rate-limited FIFO of named
//!   validation operations with a per-kind result record
//! - [`Debouncer`]: quiet-period trigger used to collapse bursts of edits
//!   into one validation
//!
//! # Usage
//!
//! ```ignore
//! use fieldline_scheduler::{ValidationScheduler, ValidationOptions};
//!
//! let scheduler = ValidationScheduler::new(SchedulerConfig::from_env());
//!
//! let permissions = scheduler
//!     .queue_validation("permissions", || fetch_permissions(user_id), ValidationOptions::default())
//!     .await?;
//! ```

pub mod debounce;
pub mod metrics;
pub mod record;
pub mod scheduler;

pub use debounce::Debouncer;
pub use metrics::{SchedulerMetrics, SchedulerMetricsSnapshot};
pub use record::ValidationRecord;
pub use scheduler::ValidationScheduler;

// Re-export core types for convenience
pub use fieldline_core::{OperationError, ScheduleError, SchedulerConfig, ValidationOptions};
