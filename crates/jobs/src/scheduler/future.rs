//! Completion handles for submitted batches.

use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

struct CompletionState {
    done: Mutex<bool>,
    ready: Condvar,
}

/// A handle that resolves when everything submitted up to a point has
/// finished.
///
/// Clones share one underlying state: batches submitted while earlier
/// work is still draining extend the same handle rather than creating a
/// new one, so every holder waits for the union of their submissions.
#[derive(Clone)]
pub struct BatchCompletion {
    state: Arc<CompletionState>,
}

impl BatchCompletion {
    pub(crate) fn new() -> Self {
        Self {
            state: Arc::new(CompletionState {
                done: Mutex::new(false),
                ready: Condvar::new(),
            }),
        }
    }

    /// A handle that is already resolved, for empty submissions against
    /// an idle scheduler.
    pub(crate) fn finished() -> Self {
        Self {
            state: Arc::new(CompletionState {
                done: Mutex::new(true),
                ready: Condvar::new(),
            }),
        }
    }

    pub(crate) fn complete(&self) {
        let mut done = self.state.done.lock().unwrap();
        *done = true;
        self.state.ready.notify_all();
    }

    pub fn is_finished(&self) -> bool {
        *self.state.done.lock().unwrap()
    }

    /// Block until the batch has drained.
    pub fn wait(&self) {
        let mut done = self.state.done.lock().unwrap();
        while !*done {
            done = self.state.ready.wait(done).unwrap();
        }
    }

    /// Block until the batch has drained or `timeout` elapses. Returns
    /// whether the batch finished in time.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        // A timeout too large to express as a deadline can never expire.
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            self.wait();
            return true;
        };
        let mut done = self.state.done.lock().unwrap();
        while !*done {
            let Some(remaining) = deadline.checked_duration_since(Instant::now()) else {
                return false;
            };
            let (guard, result) = self.state.ready.wait_timeout(done, remaining).unwrap();
            done = guard;
            if result.timed_out() && !*done {
                return false;
            }
        }
        true
    }
}
