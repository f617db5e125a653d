//! The scheduler core: counted dispatch, dependency fan-out, drain
//! signaling.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};

use tracing::{debug, error, info, trace, warn};

#[cfg(feature = "trace")]
use spindle_core::JobId;
use spindle_core::SpindleError;
#[cfg(feature = "trace")]
use spindle_trace::TraceRegistry;

use crate::pool::{PoolConfig, RayonPool, WorkerPool};
use crate::task::{Task, TaskKind};

use super::future::BatchCompletion;

// ── Scheduler ────────────────────────────────────────────────────────

/// Dependency-aware batch scheduler over a worker pool.
///
/// Tasks go in as batches; each task starts once its dependencies have
/// completed, and the handle returned by [`Scheduler::submit_batch`]
/// resolves when everything submitted so far has drained.
///
/// # Example
///
/// ```ignore
/// let scheduler = Scheduler::builder().max_workers(4).build()?;
///
/// let load = Task::graph(|| fetch_assets());
/// let build = Task::graph(|| build_index());
/// build.depends_on(&load);
///
/// scheduler.submit_batch(vec![load, build]).wait();
/// ```
pub struct Scheduler {
    pub(super) inner: Arc<Inner>,
}

impl Scheduler {
    /// A scheduler over a rayon pool sized from the environment.
    pub fn new() -> Result<Self, SpindleError> {
        Self::builder().build()
    }

    pub fn builder() -> SchedulerBuilder {
        SchedulerBuilder::new()
    }

    /// Submit a batch of tasks, dependency edges already in place.
    ///
    /// Every task counts toward the returned handle, which resolves when
    /// all work submitted up to now has completed. Dependencies may sit
    /// in the same batch as their dependers or in an earlier one -- a
    /// task whose dependencies have already drained starts with its own
    /// batch. A task must not be submitted twice.
    pub fn submit_batch(&self, tasks: Vec<Arc<Task>>) -> BatchCompletion {
        self.inner.submit_batch(tasks)
    }

    /// Tasks submitted but not yet completed. Advisory: the count moves
    /// under the scheduler's feet while workers drain.
    pub fn in_flight_count(&self) -> usize {
        self.inner.in_flight.load(Ordering::Relaxed)
    }

    pub fn max_worker_count(&self) -> usize {
        self.inner.pool.max_workers()
    }

    /// Block until no submitted task remains in flight.
    pub fn wait_idle(&self) {
        self.inner.wait_idle();
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        // Workers hold their own Arc to the core, but their jobs came
        // from callers that may be going away; drain before letting go.
        self.inner.wait_idle();
    }
}

// ── Inner ────────────────────────────────────────────────────────────

pub(super) struct Inner {
    pool: Arc<dyn WorkerPool>,
    in_flight: AtomicUsize,
    // Completion handle for the current drain, if one is running. The
    // lock also serializes submission against completion reports; the
    // in-flight atomic only moves while it is held.
    pending: Mutex<Option<BatchCompletion>>,
    idle: Condvar,
    #[cfg(feature = "trace")]
    trace: Option<Arc<TraceRegistry>>,
}

impl Inner {
    fn submit_batch(self: &Arc<Self>, tasks: Vec<Arc<Task>>) -> BatchCompletion {
        let mut pending = self.pending.lock().unwrap();

        if tasks.is_empty() {
            // Nothing new to wait for: hand back the handle for work
            // already draining, or one that is already resolved.
            return match &*pending {
                Some(current) => current.clone(),
                None => BatchCompletion::finished(),
            };
        }

        #[cfg(feature = "trace")]
        let submit_started = self.trace.as_deref().map(TraceRegistry::now_nanos);

        let completion = pending.get_or_insert_with(BatchCompletion::new).clone();

        // One batched addition. Fan-out only dispatches tasks a batch
        // has already counted, so it never touches the count again.
        self.in_flight.fetch_add(tasks.len(), Ordering::Relaxed);
        debug!(tasks = tasks.len(), "Submitting batch");

        for task in &tasks {
            task.mark_submitted();
            if task.is_ready() && task.try_reserve() {
                self.dispatch(Arc::clone(task));
            }
        }

        #[cfg(feature = "trace")]
        if let (Some(trace), Some(started)) = (self.trace.as_deref(), submit_started) {
            trace.record_submission(JobId::next(), started, trace.now_nanos());
        }

        completion
    }

    fn dispatch(self: &Arc<Self>, task: Arc<Task>) {
        trace!(job = %task.id(), "Dispatching '{}'", task.name());
        let inner = Arc::clone(self);
        self.pool.spawn(Box::new(move || inner.run_task(task)));
    }

    fn run_task(self: &Arc<Self>, task: Arc<Task>) {
        #[cfg(feature = "trace")]
        let started = self.trace.as_deref().map(TraceRegistry::now_nanos);

        if let Err(payload) = catch_unwind(AssertUnwindSafe(|| task.run())) {
            let reason = payload
                .downcast_ref::<&str>()
                .map(|s| (*s).to_owned())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "non-string panic payload".to_owned());
            error!(job = %task.id(), "Job '{}' panicked: {}", task.name(), reason);
        }

        #[cfg(feature = "trace")]
        if let (Some(trace), Some(started)) = (self.trace.as_deref(), started) {
            trace.record_job(task.id(), started, trace.now_nanos());
        }

        self.task_finished(&task);
    }

    /// Process one completion report: count down, unlock dependers, and
    /// signal the drain when the last task lands.
    pub(super) fn task_finished(self: &Arc<Self>, task: &Arc<Task>) {
        let mut pending = self.pending.lock().unwrap();

        if !task.is_reserved() {
            warn!(job = %task.id(), "Ignoring completion for a task that was never dispatched");
            return;
        }
        if !task.mark_completed() {
            warn!(job = %task.id(), "Ignoring second completion report");
            return;
        }

        self.release_one();

        if let TaskKind::Graph(graph) = task.kind() {
            graph.for_each_depender(|depender| {
                // A depender that is not in any batch yet only has its
                // count settled here; it was never added to in-flight,
                // and it starts when its own batch submits it.
                if depender.decrement_dependency() == 0
                    && depender.is_submitted()
                    && depender.try_reserve()
                {
                    self.dispatch(Arc::clone(depender));
                }
            });
        }

        if self.in_flight.load(Ordering::Relaxed) == 0 {
            if let Some(handle) = pending.take() {
                handle.complete();
            }
            self.idle.notify_all();
        }
    }

    // Caller holds the pending lock.
    fn release_one(&self) {
        if self
            .in_flight
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1))
            .is_err()
        {
            debug_assert!(false, "in-flight count underflow");
            warn!("Completion reported with nothing in flight");
        }
    }

    fn wait_idle(&self) {
        let mut pending = self.pending.lock().unwrap();
        while self.in_flight.load(Ordering::Relaxed) != 0 {
            pending = self.idle.wait(pending).unwrap();
        }
    }
}

// ── SchedulerBuilder ─────────────────────────────────────────────────

/// Builder for [`Scheduler`], starting from environment configuration.
pub struct SchedulerBuilder {
    config: PoolConfig,
    pool: Option<Arc<dyn WorkerPool>>,
    #[cfg(feature = "trace")]
    trace: Option<Arc<TraceRegistry>>,
}

impl SchedulerBuilder {
    pub fn new() -> Self {
        Self {
            config: PoolConfig::from_env(),
            pool: None,
            #[cfg(feature = "trace")]
            trace: None,
        }
    }

    pub fn config(mut self, config: PoolConfig) -> Self {
        self.config = config;
        self
    }

    /// Worker count for the default pool; 0 means available parallelism.
    pub fn max_workers(mut self, max_workers: usize) -> Self {
        self.config.max_threads = max_workers;
        self
    }

    /// Run on the given pool instead of building a rayon one.
    pub fn pool(mut self, pool: Arc<dyn WorkerPool>) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Record job runs and submission windows into `trace`.
    #[cfg(feature = "trace")]
    pub fn trace(mut self, trace: Arc<TraceRegistry>) -> Self {
        self.trace = Some(trace);
        self
    }

    pub fn build(self) -> Result<Scheduler, SpindleError> {
        let pool = match self.pool {
            Some(pool) => pool,
            None => {
                let pool: Arc<dyn WorkerPool> = Arc::new(RayonPool::new(&self.config)?);
                pool
            }
        };
        info!("Scheduler ready with {} workers", pool.max_workers());
        Ok(Scheduler {
            inner: Arc::new(Inner {
                pool,
                in_flight: AtomicUsize::new(0),
                pending: Mutex::new(None),
                idle: Condvar::new(),
                #[cfg(feature = "trace")]
                trace: self.trace,
            }),
        })
    }
}

impl Default for SchedulerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
