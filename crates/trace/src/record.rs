//! Fixed-size binary records making up the trace file.
//!
//! The on-disk layout is little-endian and delimiter-free: each frame block
//! is one [`FrameHeader`] followed by `record_count` packed [`JobRunRecord`]s.

/// Which buffer a frame block was flushed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum FrameKind {
    /// Records captured on worker threads.
    Regular = 0,
    /// Records captured on the batch-submission thread.
    Submission = 1,
}

impl FrameKind {
    fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(FrameKind::Regular),
            1 => Some(FrameKind::Submission),
            _ => None,
        }
    }
}

/// Header preceding each block of records in the trace file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub frame_id: u32,
    pub record_count: u32,
    pub kind: FrameKind,
}

impl FrameHeader {
    pub const ENCODED_LEN: usize = 12;

    pub fn to_bytes(&self) -> [u8; Self::ENCODED_LEN] {
        let mut buf = [0u8; Self::ENCODED_LEN];
        buf[0..4].copy_from_slice(&self.frame_id.to_le_bytes());
        buf[4..8].copy_from_slice(&self.record_count.to_le_bytes());
        buf[8..12].copy_from_slice(&(self.kind as u32).to_le_bytes());
        buf
    }

    /// Decode a header; `None` when the kind discriminant is unknown.
    pub fn from_bytes(bytes: [u8; Self::ENCODED_LEN]) -> Option<Self> {
        Some(Self {
            frame_id: read_u32(&bytes, 0),
            record_count: read_u32(&bytes, 4),
            kind: FrameKind::from_u32(read_u32(&bytes, 8))?,
        })
    }
}

/// One job execution, as captured at the end of its `run()`.
///
/// Timestamps are nanoseconds relative to the owning registry's epoch.
/// The thread ordinal is 0 for the submission thread and counts up from 1
/// for worker threads, in registration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobRunRecord {
    pub job_id: u64,
    pub thread_ordinal: u64,
    pub start_ns: u64,
    pub end_ns: u64,
}

impl JobRunRecord {
    pub const ENCODED_LEN: usize = 32;

    pub fn duration_ns(&self) -> u64 {
        self.end_ns.saturating_sub(self.start_ns)
    }

    pub fn to_bytes(&self) -> [u8; Self::ENCODED_LEN] {
        let mut buf = [0u8; Self::ENCODED_LEN];
        buf[0..8].copy_from_slice(&self.job_id.to_le_bytes());
        buf[8..16].copy_from_slice(&self.thread_ordinal.to_le_bytes());
        buf[16..24].copy_from_slice(&self.start_ns.to_le_bytes());
        buf[24..32].copy_from_slice(&self.end_ns.to_le_bytes());
        buf
    }

    pub fn from_bytes(bytes: [u8; Self::ENCODED_LEN]) -> Self {
        Self {
            job_id: read_u64(&bytes, 0),
            thread_ordinal: read_u64(&bytes, 8),
            start_ns: read_u64(&bytes, 16),
            end_ns: read_u64(&bytes, 24),
        }
    }
}

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    let mut word = [0u8; 4];
    word.copy_from_slice(&bytes[at..at + 4]);
    u32::from_le_bytes(word)
}

fn read_u64(bytes: &[u8], at: usize) -> u64 {
    let mut word = [0u8; 8];
    word.copy_from_slice(&bytes[at..at + 8]);
    u64::from_le_bytes(word)
}
