pub mod pool;
pub mod scheduler;
pub mod task;

pub use pool::{PoolConfig, RayonPool, WorkerPool};
pub use scheduler::{BatchCompletion, Scheduler, SchedulerBuilder};
pub use task::{Job, Task, TaskKind};

#[cfg(feature = "trace")]
pub use spindle_trace::TraceRegistry;
