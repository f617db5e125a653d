//! Process-wide registry of per-thread statistics buffers.
//!
//! Worker threads append [`JobRunRecord`]s to a buffer that belongs to the
//! calling thread alone; the registry's shared lock is taken once per thread
//! lifetime (buffer registration) and once per frame flush, never per record.
//! The submission thread gets a single shared buffer under that same lock,
//! since there is exactly one submitter.

use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use spindle_core::config::env_opt;
use spindle_core::JobId;

use crate::record::{FrameHeader, FrameKind, JobRunRecord};
use crate::sink::TraceSink;

/// Thread ordinal stamped on submission-thread records.
const SUBMISSION_ORDINAL: u64 = 0;

static NEXT_REGISTRY_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    // Cached per-registry buffer handles. Entries outlive their registry;
    // ids are never reused, so a dead registry's entry is inert.
    static LOCAL_BUFFERS: RefCell<Vec<(u64, Arc<WorkerBuffer>)>> = RefCell::new(Vec::new());
}

struct WorkerBuffer {
    ordinal: u64,
    records: Mutex<Vec<JobRunRecord>>,
}

struct Registered {
    workers: Vec<Arc<WorkerBuffer>>,
    submission: Vec<JobRunRecord>,
    sink: TraceSink,
}

/// Collects per-job run statistics and flushes them to a binary trace file
/// once per frame.
///
/// One registry serves any number of worker threads. Recording is
/// best-effort end to end: a registry whose trace file cannot be opened
/// keeps accepting records and discards them at flush time.
pub struct TraceRegistry {
    id: u64,
    epoch: Instant,
    next_ordinal: AtomicU64,
    frame: AtomicU32,
    state: Mutex<Registered>,
}

impl TraceRegistry {
    /// Registry writing to `SPINDLE_TRACE_DIR` (current directory if unset).
    pub fn new() -> Self {
        let dir = env_opt("SPINDLE_TRACE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));
        Self::with_output_dir(dir)
    }

    /// Registry writing its trace file into `dir`.
    pub fn with_output_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            id: NEXT_REGISTRY_ID.fetch_add(1, Ordering::Relaxed),
            epoch: Instant::now(),
            next_ordinal: AtomicU64::new(SUBMISSION_ORDINAL + 1),
            frame: AtomicU32::new(0),
            state: Mutex::new(Registered {
                workers: Vec::new(),
                submission: Vec::new(),
                sink: TraceSink::new(dir.into()),
            }),
        }
    }

    /// Nanoseconds elapsed since this registry was created. All record
    /// timestamps share this epoch.
    pub fn now_nanos(&self) -> u64 {
        self.epoch.elapsed().as_nanos() as u64
    }

    /// Record one job execution on the calling worker thread.
    ///
    /// The first record from a thread registers its buffer under the shared
    /// lock; every later record only touches the thread's own buffer.
    pub fn record_job(&self, job_id: JobId, start_ns: u64, end_ns: u64) {
        let buffer = self.local_buffer();
        let record = JobRunRecord {
            job_id: job_id.as_u64(),
            thread_ordinal: buffer.ordinal,
            start_ns,
            end_ns,
        };
        buffer.records.lock().unwrap().push(record);
    }

    /// Record one batch-submission window from the submission thread.
    pub fn record_submission(&self, job_id: JobId, start_ns: u64, end_ns: u64) {
        let record = JobRunRecord {
            job_id: job_id.as_u64(),
            thread_ordinal: SUBMISSION_ORDINAL,
            start_ns,
            end_ns,
        };
        self.state.lock().unwrap().submission.push(record);
    }

    /// Flush every buffer as one frame, returning the frame id.
    ///
    /// Each registered worker buffer yields a header block (even when it
    /// holds no records this frame); the submission buffer yields a block
    /// only when non-empty. Buffers are cleared as they flush. Every call
    /// consumes a frame id, whether or not anything was buffered.
    pub fn flush_frame(&self) -> u32 {
        let frame_id = self.frame.fetch_add(1, Ordering::Relaxed);
        let mut state = self.state.lock().unwrap();
        let Registered {
            workers,
            submission,
            sink,
        } = &mut *state;

        for buffer in workers.iter() {
            let mut records = buffer.records.lock().unwrap();
            let header = FrameHeader {
                frame_id,
                record_count: records.len() as u32,
                kind: FrameKind::Regular,
            };
            sink.write_block(&header, &records);
            records.clear();
        }

        if !submission.is_empty() {
            let header = FrameHeader {
                frame_id,
                record_count: submission.len() as u32,
                kind: FrameKind::Submission,
            };
            sink.write_block(&header, submission);
            submission.clear();
        }

        sink.flush();
        frame_id
    }

    /// Number of worker threads that have recorded into this registry.
    pub fn registered_threads(&self) -> usize {
        self.state.lock().unwrap().workers.len()
    }

    /// Path of the trace file, once the first flush has opened it.
    pub fn trace_path(&self) -> Option<PathBuf> {
        self.state
            .lock()
            .unwrap()
            .sink
            .path()
            .map(Path::to_path_buf)
    }

    fn local_buffer(&self) -> Arc<WorkerBuffer> {
        LOCAL_BUFFERS.with(|cache| {
            let mut cache = cache.borrow_mut();
            if let Some((_, buffer)) = cache.iter().find(|(id, _)| *id == self.id) {
                return Arc::clone(buffer);
            }
            let buffer = Arc::new(WorkerBuffer {
                ordinal: self.next_ordinal.fetch_add(1, Ordering::Relaxed),
                records: Mutex::new(Vec::new()),
            });
            self.state.lock().unwrap().workers.push(Arc::clone(&buffer));
            cache.push((self.id, Arc::clone(&buffer)));
            buffer
        })
    }
}

impl Default for TraceRegistry {
    fn default() -> Self {
        Self::new()
    }
}
