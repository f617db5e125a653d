//! Lazily-opened binary sink behind the trace registry.

use std::env;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::error;

use spindle_core::SpindleError;

use crate::record::{FrameHeader, JobRunRecord};

/// Write end of the trace file.
///
/// The file is created on the first flush and stays open until the registry
/// is dropped. If it cannot be created, or a write fails, the sink degrades
/// to a no-op for the rest of the run; losing trace data never propagates
/// as an error to callers.
pub(crate) struct TraceSink {
    dir: PathBuf,
    state: SinkState,
}

enum SinkState {
    Pending,
    Open(PathBuf, BufWriter<File>),
    Failed,
}

impl TraceSink {
    pub(crate) fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            state: SinkState::Pending,
        }
    }

    /// Path of the open trace file, if one exists.
    pub(crate) fn path(&self) -> Option<&Path> {
        match &self.state {
            SinkState::Open(path, _) => Some(path),
            _ => None,
        }
    }

    /// Append one frame header and its records.
    pub(crate) fn write_block(&mut self, header: &FrameHeader, records: &[JobRunRecord]) {
        let Some(writer) = self.writer() else { return };
        if let Err(err) = write_block_to(writer, header, records) {
            error!("Trace write failed, disabling capture: {}", err);
            self.state = SinkState::Failed;
        }
    }

    pub(crate) fn flush(&mut self) {
        if let SinkState::Open(_, writer) = &mut self.state {
            if let Err(err) = writer.flush() {
                error!("Trace flush failed, disabling capture: {}", err);
                self.state = SinkState::Failed;
            }
        }
    }

    fn writer(&mut self) -> Option<&mut BufWriter<File>> {
        if matches!(self.state, SinkState::Pending) {
            self.state = match open_trace_file(&self.dir) {
                Ok((path, writer)) => SinkState::Open(path, writer),
                Err(err) => {
                    error!(
                        "Could not open trace file in {}: {}",
                        self.dir.display(),
                        err
                    );
                    SinkState::Failed
                }
            };
        }
        match &mut self.state {
            SinkState::Open(_, writer) => Some(writer),
            _ => None,
        }
    }
}

fn write_block_to(
    writer: &mut BufWriter<File>,
    header: &FrameHeader,
    records: &[JobRunRecord],
) -> Result<(), SpindleError> {
    writer.write_all(&header.to_bytes())?;
    for record in records {
        writer.write_all(&record.to_bytes())?;
    }
    Ok(())
}

fn open_trace_file(dir: &Path) -> Result<(PathBuf, BufWriter<File>), SpindleError> {
    let path = dir.join(trace_file_name());
    let file = File::create(&path)?;
    Ok((path, BufWriter::new(file)))
}

/// `trace_<app>_<timestamp>_<os>_<arch>.trace`
fn trace_file_name() -> String {
    let app = env::current_exe()
        .ok()
        .and_then(|exe| exe.file_stem().map(|stem| stem.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "spindle".to_string());
    format!(
        "trace_{}_{}_{}_{}.trace",
        app,
        Utc::now().format("%Y%m%d_%H%M%S"),
        env::consts::OS,
        env::consts::ARCH
    )
}
