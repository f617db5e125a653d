//! Batch scheduling -- dependency-ordered dispatch over a worker pool.
//!
//! `pooler` holds the scheduler core and its builder; `future` holds the
//! completion handle callers wait on. Tests drive the core against an
//! in-process recording pool.

mod future;
mod pooler;
#[cfg(test)]
mod tests;

pub use self::future::BatchCompletion;
pub use self::pooler::{Scheduler, SchedulerBuilder};
