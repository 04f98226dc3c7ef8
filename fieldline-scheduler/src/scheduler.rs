//! Validation scheduler.
//!
//! Runs named validation operations one at a time, in request order, with a
//! fixed pause between them, and remembers the outcome of each kind so that
//! repeated requests inside the minimum interval are answered from the
//! record instead of hitting the backend again.
//!
//! ```text
//!  queue_validation("permissions")
//!        │
//!        ├─ recent record? ──────────────► cached result
//!        ├─ same kind already queued? ───► wait on that task
//!        └─ enqueue ─► [A][B][C] ─► drain: run A, pause, run B, pause, ...
//! ```

use crate::metrics::{SchedulerMetrics, SchedulerMetricsSnapshot};
use crate::record::ValidationRecord;
use chrono::Utc;
use fieldline_core::{
    OperationError, ScheduleError, SchedulerConfig, SharedOperationError, Timestamp,
    ValidationOptions,
};
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

type BoxedOperation = Box<dyn FnOnce() -> BoxFuture<'static, Result<Value, OperationError>> + Send>;

type Outcome = Result<Value, ScheduleError>;

// ============================================================================
// STATE
// ============================================================================

/// A queued validation waiting for its turn.
struct ValidationTask {
    id: u64,
    kind: String,
    operation: BoxedOperation,
    enqueued_at: Timestamp,
    forced: bool,
}

#[derive(Default)]
struct SchedulerState {
    records: HashMap<String, ValidationRecord>,
    queue: VecDeque<ValidationTask>,
    /// Callers waiting on each unsettled task.
    waiters: HashMap<u64, Vec<oneshot::Sender<Outcome>>>,
    /// Latest unsettled task per kind; non-forced requests join it.
    pending_by_kind: HashMap<String, u64>,
    next_task_id: u64,
    draining: bool,
}

struct SchedulerInner {
    config: SchedulerConfig,
    state: Mutex<SchedulerState>,
    metrics: SchedulerMetrics,
}

impl SchedulerInner {
    fn lock_state(&self) -> MutexGuard<'_, SchedulerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// What a request turned into once the state lock was released.
enum Admission {
    Ready(Outcome),
    Waiting(oneshot::Receiver<Outcome>),
}

// ============================================================================
// SCHEDULER
// ============================================================================

/// Serializing, de-duplicating queue of validation operations.
///
/// Cheap to clone; clones share the queue and the records. Construct one
/// per application and pass it to whoever needs it.
#[derive(Clone)]
pub struct ValidationScheduler {
    inner: Arc<SchedulerInner>,
}

impl ValidationScheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        info!(
            min_interval_ms = config.min_interval.as_millis() as u64,
            pacing_ms = config.pacing.as_millis() as u64,
            "Validation scheduler created"
        );
        Self {
            inner: Arc::new(SchedulerInner {
                config,
                state: Mutex::new(SchedulerState::default()),
                metrics: SchedulerMetrics::new(),
            }),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.inner.config
    }

    /// Request a validation of `kind`.
    ///
    /// Resolves from the record when the kind completed less than
    /// `min_interval` ago and `options.force` is not set. Otherwise the
    /// operation runs once it reaches the front of the queue, and this
    /// resolves with its value or its error. A non-forced request for a
    /// kind that is already queued or running waits for that task instead
    /// of queueing another.
    ///
    /// Must be awaited inside a tokio runtime. Dropping the returned future
    /// does not remove the task from the queue.
    ///
    /// A kind that failed less than `min_interval` ago and never succeeded
    /// has no result to serve. Such a request does not resolve to an empty
    /// value: it fails with [`ScheduleError::Suppressed`] without running.
    /// Callers that treat "nothing cached" as a normal outcome should match
    /// on [`ScheduleError::is_suppressed`], or pass
    /// [`ValidationOptions::forced`] to retry immediately.
    ///
    /// # Errors
    ///
    /// - [`ScheduleError::EmptyKind`] for an empty `kind`
    /// - [`ScheduleError::Operation`] carrying the operation's own error
    /// - [`ScheduleError::Panicked`] if the operation panicked
    /// - [`ScheduleError::Suppressed`] if the kind failed less than
    ///   `min_interval` ago and has no earlier successful result
    /// - [`ScheduleError::Abandoned`] if the runtime running the queue shut
    ///   down before the operation settled
    pub async fn queue_validation<F, Fut, E>(
        &self,
        kind: impl Into<String>,
        operation: F,
        options: ValidationOptions,
    ) -> Result<Value, ScheduleError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<Value, E>> + Send + 'static,
        E: Into<OperationError> + 'static,
    {
        let kind = kind.into();
        if kind.is_empty() {
            return Err(ScheduleError::EmptyKind);
        }

        let operation: BoxedOperation = Box::new(move || {
            async move { operation().await.map_err(Into::<OperationError>::into) }.boxed()
        });

        match self.admit(kind.clone(), operation, options) {
            Admission::Ready(outcome) => outcome,
            Admission::Waiting(rx) => rx
                .await
                .unwrap_or_else(|_| Err(ScheduleError::Abandoned { kind })),
        }
    }

    /// Decide how to serve a request. Never awaits.
    fn admit(
        &self,
        kind: String,
        operation: BoxedOperation,
        options: ValidationOptions,
    ) -> Admission {
        let metrics = &self.inner.metrics;
        let mut state = self.inner.lock_state();

        if !options.force {
            if let Some(record) = state.records.get(&kind) {
                if record.is_within(self.inner.config.min_interval) {
                    if let Some(result) = &record.result {
                        SchedulerMetrics::incr(&metrics.cache_hits);
                        debug!(
                            kind = %kind,
                            age_ms = record.age().as_millis() as u64,
                            "Validation served from record"
                        );
                        return Admission::Ready(Ok(result.clone()));
                    }

                    SchedulerMetrics::incr(&metrics.suppressed);
                    let last_error = record
                        .last_error
                        .clone()
                        .unwrap_or_else(|| "unknown error".to_string());
                    warn!(
                        kind = %kind,
                        last_error = %last_error,
                        "Validation suppressed after recent failure"
                    );
                    return Admission::Ready(Err(ScheduleError::Suppressed { kind, last_error }));
                }
            }

            if let Some(task_id) = state.pending_by_kind.get(&kind).copied() {
                if let Some(waiters) = state.waiters.get_mut(&task_id) {
                    let (tx, rx) = oneshot::channel();
                    waiters.push(tx);
                    SchedulerMetrics::incr(&metrics.coalesced);
                    debug!(kind = %kind, task_id, "Validation joined pending task");
                    return Admission::Waiting(rx);
                }
            }
        }

        let task_id = state.next_task_id;
        state.next_task_id += 1;

        let (tx, rx) = oneshot::channel();
        state.waiters.insert(task_id, vec![tx]);
        state.pending_by_kind.insert(kind.clone(), task_id);
        state.queue.push_back(ValidationTask {
            id: task_id,
            kind: kind.clone(),
            operation,
            enqueued_at: Utc::now(),
            forced: options.force,
        });
        SchedulerMetrics::incr(&metrics.tasks_enqueued);
        debug!(
            kind = %kind,
            task_id,
            forced = options.force,
            queue_len = state.queue.len(),
            "Validation enqueued"
        );

        if !state.draining {
            state.draining = true;
            tokio::spawn(drain(Arc::clone(&self.inner)));
        }

        Admission::Waiting(rx)
    }

    /// Last successful result for `kind`, regardless of age.
    pub fn get_cached_result(&self, kind: &str) -> Option<Value> {
        self.inner
            .lock_state()
            .records
            .get(kind)
            .and_then(|record| record.result.clone())
    }

    /// Full record for `kind`, if it ever settled.
    pub fn record(&self, kind: &str) -> Option<ValidationRecord> {
        self.inner.lock_state().records.get(kind).cloned()
    }

    /// Whether `kind` completed less than `min_interval` ago.
    pub fn is_validation_recent(&self, kind: &str) -> bool {
        self.is_validation_recent_within(kind, self.inner.config.min_interval)
    }

    /// Whether `kind` completed less than `max_age` ago.
    pub fn is_validation_recent_within(&self, kind: &str, max_age: Duration) -> bool {
        self.inner
            .lock_state()
            .records
            .get(kind)
            .is_some_and(|record| record.is_within(max_age))
    }

    /// Forget the record of one kind, or of every kind with `None`.
    ///
    /// Queued and running tasks are unaffected and will write a fresh record
    /// when they settle.
    pub fn clear_cache(&self, kind: Option<&str>) {
        let mut state = self.inner.lock_state();
        match kind {
            Some(kind) => {
                state.records.remove(kind);
                debug!(kind = %kind, "Validation record cleared");
            }
            None => {
                state.records.clear();
                debug!("All validation records cleared");
            }
        }
    }

    /// Forget every record and zero the counters.
    pub fn reset(&self) {
        self.clear_cache(None);
        self.inner.metrics.reset();
    }

    /// Tasks waiting to run, not counting the one running now.
    pub fn pending_len(&self) -> usize {
        self.inner.lock_state().queue.len()
    }

    /// Whether a drain task is currently working through the queue.
    pub fn is_draining(&self) -> bool {
        self.inner.lock_state().draining
    }

    pub fn metrics(&self) -> SchedulerMetricsSnapshot {
        self.inner.metrics.snapshot()
    }
}

impl std::fmt::Debug for ValidationScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValidationScheduler")
            .field("config", &self.inner.config)
            .field("pending", &self.pending_len())
            .finish()
    }
}

// ============================================================================
// DRAIN TASK
// ============================================================================

/// Releases the drain slot if the drain task is dropped before the queue
/// empties, as happens when its runtime shuts down.
///
/// Every unsettled task, running or queued, is abandoned: its waiters
/// resolve to [`ScheduleError::Abandoned`] and the next request starts a
/// fresh drain task.
struct DrainGuard {
    inner: Arc<SchedulerInner>,
    in_flight: Option<(u64, String)>,
    finished: bool,
}

impl Drop for DrainGuard {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let queued: Vec<ValidationTask> = {
            let mut state = self.inner.lock_state();
            state.draining = false;

            let queued: Vec<ValidationTask> = state.queue.drain(..).collect();
            let abandoned = self
                .in_flight
                .take()
                .into_iter()
                .chain(queued.iter().map(|task| (task.id, task.kind.clone())));
            for (task_id, kind) in abandoned {
                let waiters = state.waiters.remove(&task_id).map_or(0, |waiters| waiters.len());
                if state.pending_by_kind.get(&kind) == Some(&task_id) {
                    state.pending_by_kind.remove(&kind);
                }
                warn!(kind = %kind, task_id, waiters, "Validation abandoned before it settled");
            }
            queued
        };
        // Caller-supplied operations are dropped outside the lock.
        drop(queued);
    }
}

/// Run queued tasks one at a time until the queue is empty.
///
/// Every settled task is followed by the pacing pause, so a task queued
/// while the pause runs starts no earlier than `pacing` after the previous
/// one settled.
async fn drain(inner: Arc<SchedulerInner>) {
    let mut guard = DrainGuard {
        inner: Arc::clone(&inner),
        in_flight: None,
        finished: false,
    };

    loop {
        let task = {
            let mut state = inner.lock_state();
            match state.queue.pop_front() {
                Some(task) => task,
                None => {
                    state.draining = false;
                    guard.finished = true;
                    return;
                }
            }
        };

        guard.in_flight = Some((task.id, task.kind.clone()));
        run_task(&inner, task).await;
        guard.in_flight = None;
        tokio::time::sleep(inner.config.pacing).await;
    }
}

async fn run_task(inner: &SchedulerInner, task: ValidationTask) {
    let ValidationTask {
        id,
        kind,
        operation,
        enqueued_at,
        forced,
    } = task;

    debug!(
        kind = %kind,
        task_id = id,
        forced,
        waited_ms = (Utc::now() - enqueued_at).num_milliseconds(),
        "Running validation"
    );

    let outcome = match AssertUnwindSafe(operation()).catch_unwind().await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => {
            let source: SharedOperationError = Arc::from(err);
            warn!(kind = %kind, task_id = id, error = %source, "Validation failed");
            Err(ScheduleError::Operation {
                kind: kind.clone(),
                source,
            })
        }
        Err(_) => {
            error!(kind = %kind, task_id = id, "Validation panicked");
            Err(ScheduleError::Panicked { kind: kind.clone() })
        }
    };

    settle(inner, id, kind, outcome);
}

/// Record the outcome and hand it to every waiter of the task.
fn settle(inner: &SchedulerInner, task_id: u64, kind: String, outcome: Outcome) {
    let metrics = &inner.metrics;
    let waiters = {
        let mut state = inner.lock_state();
        let previous = state.records.remove(&kind);
        let record = match &outcome {
            Ok(value) => {
                SchedulerMetrics::incr(&metrics.tasks_succeeded);
                ValidationRecord::succeeded(value.clone())
            }
            Err(err) => {
                let message = match err {
                    ScheduleError::Operation { source, .. } => source.to_string(),
                    other => other.to_string(),
                };
                match err {
                    ScheduleError::Panicked { .. } => {
                        SchedulerMetrics::incr(&metrics.tasks_panicked)
                    }
                    _ => SchedulerMetrics::incr(&metrics.tasks_failed),
                }
                ValidationRecord::failed(previous, message)
            }
        };
        state.records.insert(kind.clone(), record);

        if state.pending_by_kind.get(&kind) == Some(&task_id) {
            state.pending_by_kind.remove(&kind);
        }
        state.waiters.remove(&task_id).unwrap_or_default()
    };

    debug!(
        kind = %kind,
        task_id,
        ok = outcome.is_ok(),
        waiters = waiters.len(),
        "Validation settled"
    );
    for waiter in waiters {
        // A waiter that went away no longer cares about the outcome.
        let _ = waiter.send(outcome.clone());
    }
}
