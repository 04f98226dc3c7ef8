//! Scheduler counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for validation scheduling activity since startup (or the last
/// reset).
#[derive(Debug, Default)]
pub struct SchedulerMetrics {
    /// Tasks appended to the queue
    pub tasks_enqueued: AtomicU64,

    /// Tasks whose operation resolved
    pub tasks_succeeded: AtomicU64,

    /// Tasks whose operation returned an error
    pub tasks_failed: AtomicU64,

    /// Tasks whose operation panicked
    pub tasks_panicked: AtomicU64,

    /// Requests answered from a recent record without running anything
    pub cache_hits: AtomicU64,

    /// Requests that joined an already queued or running task
    pub coalesced: AtomicU64,

    /// Requests refused because the recent record only holds a failure
    pub suppressed: AtomicU64,
}

impl SchedulerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current snapshot of all counters.
    pub fn snapshot(&self) -> SchedulerMetricsSnapshot {
        SchedulerMetricsSnapshot {
            tasks_enqueued: self.tasks_enqueued.load(Ordering::Relaxed),
            tasks_succeeded: self.tasks_succeeded.load(Ordering::Relaxed),
            tasks_failed: self.tasks_failed.load(Ordering::Relaxed),
            tasks_panicked: self.tasks_panicked.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            coalesced: self.coalesced.load(Ordering::Relaxed),
            suppressed: self.suppressed.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn reset(&self) {
        for counter in [
            &self.tasks_enqueued,
            &self.tasks_succeeded,
            &self.tasks_failed,
            &self.tasks_panicked,
            &self.cache_hits,
            &self.coalesced,
            &self.suppressed,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

/// Snapshot of scheduler counters at a point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerMetricsSnapshot {
    pub tasks_enqueued: u64,
    pub tasks_succeeded: u64,
    pub tasks_failed: u64,
    pub tasks_panicked: u64,
    pub cache_hits: u64,
    pub coalesced: u64,
    pub suppressed: u64,
}

impl SchedulerMetricsSnapshot {
    /// Tasks that have settled one way or another.
    pub fn tasks_settled(&self) -> u64 {
        self.tasks_succeeded + self.tasks_failed + self.tasks_panicked
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_and_reset() {
        let metrics = SchedulerMetrics::new();
        SchedulerMetrics::incr(&metrics.tasks_enqueued);
        SchedulerMetrics::incr(&metrics.tasks_succeeded);
        SchedulerMetrics::incr(&metrics.tasks_failed);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.tasks_enqueued, 1);
        assert_eq!(snapshot.tasks_settled(), 2);

        metrics.reset();
        assert_eq!(metrics.snapshot(), SchedulerMetricsSnapshot::default());
    }
}
