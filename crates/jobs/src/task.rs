//! Work items and the dependency graph they form.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tracing::warn;

use spindle_core::JobId;

// ── Job ──────────────────────────────────────────────────────────────

/// A unit of work the scheduler can hand to the pool.
///
/// Implemented by any `Fn() + Send + Sync` closure; implement it by hand
/// when a job wants a name in logs and traces.
pub trait Job: Send + Sync {
    /// Human-readable name for logging.
    fn name(&self) -> &str {
        "job"
    }

    /// Execute the work. Called exactly once, on a pool worker thread.
    fn run(&self);
}

impl<F> Job for F
where
    F: Fn() + Send + Sync,
{
    fn run(&self) {
        self()
    }
}

// ── Task ─────────────────────────────────────────────────────────────

/// Dependency bookkeeping carried by graph tasks.
pub struct GraphState {
    /// Direct dependencies not yet completed.
    remaining: AtomicUsize,
    /// Tasks waiting on this one, in edge insertion order.
    dependers: Mutex<Vec<Arc<Task>>>,
}

impl GraphState {
    /// Visit every depender while holding the list lock.
    pub(crate) fn for_each_depender(&self, mut visit: impl FnMut(&Arc<Task>)) {
        for depender in self.dependers.lock().unwrap().iter() {
            visit(depender);
        }
    }
}

/// Discriminates tasks that participate in dependency tracking.
pub enum TaskKind {
    /// Always ready; no dependency bookkeeping.
    Independent,
    /// Ready once every direct dependency has completed.
    Graph(GraphState),
}

/// A schedulable work item.
///
/// Tasks are shared via [`Arc`] between the batch builder, the scheduler,
/// and the depender lists that keep not-yet-ready tasks alive. A task is
/// single-use: once it has gone out in a batch it must not appear in a
/// later one. Dependency edges must form a DAG and be fully built before
/// the batch is submitted; the batch builder is responsible for both.
pub struct Task {
    id: JobId,
    job: Box<dyn Job>,
    kind: TaskKind,
    // The flags flip false -> true under the scheduler's lock; the
    // atomics are interior-mutability cells, not a lock-free protocol.
    submitted: AtomicBool,
    reserved: AtomicBool,
    completed: AtomicBool,
}

impl Task {
    /// A task with no dependency bookkeeping.
    pub fn independent(job: impl Job + 'static) -> Arc<Self> {
        Self::with_kind(job, TaskKind::Independent)
    }

    /// A task that can take part in dependency edges.
    pub fn graph(job: impl Job + 'static) -> Arc<Self> {
        Self::with_kind(
            job,
            TaskKind::Graph(GraphState {
                remaining: AtomicUsize::new(0),
                dependers: Mutex::new(Vec::new()),
            }),
        )
    }

    fn with_kind(job: impl Job + 'static, kind: TaskKind) -> Arc<Self> {
        Arc::new(Self {
            id: JobId::next(),
            job: Box::new(job),
            kind,
            submitted: AtomicBool::new(false),
            reserved: AtomicBool::new(false),
            completed: AtomicBool::new(false),
        })
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn name(&self) -> &str {
        self.job.name()
    }

    pub fn kind(&self) -> &TaskKind {
        &self.kind
    }

    /// Record that `self` must not start until `dependency` has completed.
    ///
    /// Both endpoints must be graph tasks; an edge touching an independent
    /// task is reported and ignored, since completion fan-out only walks
    /// graph tasks and such an edge could never unlock anything.
    pub fn depends_on(self: &Arc<Self>, dependency: &Arc<Task>) {
        let (TaskKind::Graph(mine), TaskKind::Graph(theirs)) = (&self.kind, &dependency.kind)
        else {
            warn!(
                task = %self.id,
                dependency = %dependency.id,
                "Dependency edges require graph tasks on both ends; edge ignored"
            );
            return;
        };
        theirs.dependers.lock().unwrap().push(Arc::clone(self));
        mine.remaining.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn run(&self) {
        self.job.run()
    }

    /// Ready to hand to the pool: independent tasks always, graph tasks
    /// once every direct dependency has completed.
    pub(crate) fn is_ready(&self) -> bool {
        match &self.kind {
            TaskKind::Independent => true,
            TaskKind::Graph(graph) => graph.remaining.load(Ordering::Relaxed) == 0,
        }
    }

    /// Record that the task has been counted into a batch. Completion
    /// fan-out only starts dependers this flag is set on; anything else
    /// waits for its own batch.
    pub(crate) fn mark_submitted(&self) {
        self.submitted.store(true, Ordering::Relaxed);
    }

    pub(crate) fn is_submitted(&self) -> bool {
        self.submitted.load(Ordering::Relaxed)
    }

    /// Claim the task for submission. Returns `true` exactly once.
    pub(crate) fn try_reserve(&self) -> bool {
        self.reserved
            .compare_exchange(false, true, Ordering::Relaxed, Ordering::Relaxed)
            .is_ok()
    }

    pub(crate) fn is_reserved(&self) -> bool {
        self.reserved.load(Ordering::Relaxed)
    }

    /// Record the completion report. Returns `false` if already reported.
    pub(crate) fn mark_completed(&self) -> bool {
        self.completed
            .compare_exchange(false, true, Ordering::Relaxed, Ordering::Relaxed)
            .is_ok()
    }

    /// Decrement the outstanding dependency count, returning the new value.
    ///
    /// Counts never go below zero: a decrement against an exhausted count
    /// (or an independent task) can only come from a misdelivered
    /// completion, so it is reported and left as zero. Callers guard
    /// dispatch with [`Task::try_reserve`], which makes that answer
    /// harmless.
    pub(crate) fn decrement_dependency(&self) -> usize {
        match &self.kind {
            TaskKind::Graph(graph) => {
                match graph
                    .remaining
                    .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1))
                {
                    Ok(previous) => previous - 1,
                    Err(_) => {
                        warn!(task = %self.id, "Dependency decrement on exhausted count");
                        0
                    }
                }
            }
            TaskKind::Independent => {
                warn!(task = %self.id, "Dependency decrement on independent task");
                0
            }
        }
    }

    /// Direct dependencies still outstanding (0 for independent tasks).
    #[cfg(test)]
    pub(crate) fn outstanding_dependencies(&self) -> usize {
        match &self.kind {
            TaskKind::Independent => 0,
            TaskKind::Graph(graph) => graph.remaining.load(Ordering::Relaxed),
        }
    }
}
