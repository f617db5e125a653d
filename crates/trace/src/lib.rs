pub mod record;
pub mod registry;
mod sink;

pub use record::{FrameHeader, FrameKind, JobRunRecord};
pub use registry::TraceRegistry;
