//! Worker pool abstraction and the rayon-backed default.

use rayon::{ThreadPool, ThreadPoolBuilder};
use serde::{Deserialize, Serialize};
use tracing::error;

use spindle_core::config::env_parse;
use spindle_core::SpindleError;

// ── Configuration ────────────────────────────────────────────────────

fn default_max_threads() -> usize {
    0
}

/// Pool sizing, loadable from the environment or a serialized config.
///
/// `max_threads == 0` means "use the machine's available parallelism".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    #[serde(default = "default_max_threads")]
    pub max_threads: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_threads: default_max_threads(),
        }
    }
}

impl PoolConfig {
    pub fn from_env() -> Self {
        Self {
            max_threads: env_parse("SPINDLE_MAX_THREADS", default_max_threads()),
        }
    }

    /// The worker count a pool built from this config will actually use.
    pub fn resolved_max_threads(&self) -> usize {
        if self.max_threads == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
        } else {
            self.max_threads
        }
    }
}

// ── WorkerPool ───────────────────────────────────────────────────────

/// Executes scheduler work on background threads.
///
/// `spawn` must enqueue and return without running `work` on the calling
/// thread: the scheduler dispatches while holding its own lock, and an
/// inline run would re-enter it.
pub trait WorkerPool: Send + Sync {
    fn spawn(&self, work: Box<dyn FnOnce() + Send + 'static>);

    /// Number of threads executing spawned work.
    fn max_workers(&self) -> usize;
}

/// The default pool, a fixed-size rayon thread pool.
pub struct RayonPool {
    pool: ThreadPool,
    workers: usize,
}

impl RayonPool {
    pub fn new(config: &PoolConfig) -> Result<Self, SpindleError> {
        let workers = config.resolved_max_threads();
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|index| format!("spindle-worker-{index}"))
            // Detached spawns abort the process on panic unless a handler
            // is installed; run_task catches job panics before they get
            // here, so this only sees bugs in the dispatch path itself.
            .panic_handler(|_| error!("Worker panicked outside job execution"))
            .build()
            .map_err(|e| SpindleError::Pool(e.to_string()))?;
        Ok(Self { pool, workers })
    }
}

impl WorkerPool for RayonPool {
    fn spawn(&self, work: Box<dyn FnOnce() + Send + 'static>) {
        self.pool.spawn(work);
    }

    fn max_workers(&self) -> usize {
        self.workers
    }
}
