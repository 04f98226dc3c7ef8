//! Quiet-period debouncing.
//!
//! A [`Debouncer`] runs only the most recent of a burst of triggers, once
//! no new trigger has arrived for `delay`. Form validators use it to turn a
//! stream of keystrokes into a single queued validation.
//!
//! Once a trigger's delay has elapsed its future runs to completion; later
//! triggers only replace runs that have not started yet.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::trace;

#[derive(Default)]
struct DebounceState {
    generation: u64,
    /// A trigger is waiting out its delay.
    pending: bool,
    handle: Option<JoinHandle<()>>,
}

/// Runs the last of a burst of triggers after a quiet period.
pub struct Debouncer {
    delay: Duration,
    state: Arc<Mutex<DebounceState>>,
}

fn lock(state: &Mutex<DebounceState>) -> MutexGuard<'_, DebounceState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            state: Arc::new(Mutex::new(DebounceState::default())),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Schedule `future` to run after `delay`, replacing any run that is
    /// still waiting. Must be called from within a tokio runtime.
    pub fn trigger<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut state = lock(&self.state);
        state.generation += 1;
        let generation = state.generation;

        if state.pending {
            // Still sleeping: it has not claimed its run, so aborting is safe.
            if let Some(previous) = state.handle.take() {
                previous.abort();
            }
        }
        state.pending = true;

        let shared = Arc::clone(&self.state);
        let delay = self.delay;
        state.handle = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            {
                let mut state = lock(&shared);
                if state.generation != generation {
                    return;
                }
                state.pending = false;
            }
            trace!(generation, "Debounced trigger fired");
            future.await;
        }));
    }

    /// Drop the waiting run, if any. Returns whether one was waiting.
    pub fn cancel(&self) -> bool {
        let mut state = lock(&self.state);
        if !state.pending {
            return false;
        }
        state.generation += 1;
        state.pending = false;
        if let Some(handle) = state.handle.take() {
            handle.abort();
        }
        true
    }

    /// Whether a trigger is still waiting out its delay.
    pub fn is_pending(&self) -> bool {
        lock(&self.state).pending
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl std::fmt::Debug for Debouncer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Debouncer")
            .field("delay", &self.delay)
            .field("pending", &self.is_pending())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const DELAY: Duration = Duration::from_millis(300);

    fn record(log: &Arc<Mutex<Vec<usize>>>, n: usize) -> impl Future<Output = ()> + Send + 'static {
        let log = Arc::clone(log);
        async move {
            log.lock().expect("log lock").push(n);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_only_last_trigger_runs() {
        let debouncer = Debouncer::new(DELAY);
        let log = Arc::new(Mutex::new(Vec::new()));

        for n in 0..5 {
            debouncer.trigger(record(&log, n));
            tokio::time::sleep(DELAY / 2).await;
        }
        assert!(debouncer.is_pending());

        tokio::time::sleep(DELAY * 2).await;
        assert_eq!(*log.lock().expect("log lock"), vec![4]);
        assert!(!debouncer.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_spaced_triggers_all_run() {
        let debouncer = Debouncer::new(DELAY);
        let log = Arc::new(Mutex::new(Vec::new()));

        debouncer.trigger(record(&log, 1));
        tokio::time::sleep(DELAY * 2).await;
        debouncer.trigger(record(&log, 2));
        tokio::time::sleep(DELAY * 2).await;

        assert_eq!(*log.lock().expect("log lock"), vec![1, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_drops_waiting_run() {
        let debouncer = Debouncer::new(DELAY);
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&runs);
        debouncer.trigger(async move {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(debouncer.cancel());
        assert!(!debouncer.cancel());
        tokio::time::sleep(DELAY * 2).await;
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_started_run_is_not_cut_short() {
        let debouncer = Debouncer::new(DELAY);
        let log = Arc::new(Mutex::new(Vec::new()));

        let slow_log = Arc::clone(&log);
        debouncer.trigger(async move {
            tokio::time::sleep(DELAY * 4).await;
            slow_log.lock().expect("log lock").push(1);
        });
        // Let the first run pass its delay and start.
        tokio::time::sleep(DELAY + DELAY / 2).await;
        debouncer.trigger(record(&log, 2));

        tokio::time::sleep(DELAY * 8).await;
        let mut seen = log.lock().expect("log lock").clone();
        seen.sort_unstable();
        assert_eq!(seen, vec![1, 2]);
    }
}
