//! Append-only stream writer.

use super::header::{StreamHeader, StreamKind};
use crate::error::{LeakTraceError, Result};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Destination of a trace stream.
///
/// Implemented for [`File`]; other sinks let a host route a stream
/// elsewhere (a pipe, an in-memory buffer).
pub trait StreamSink: Write + Send {
    /// Force written data to durable storage.
    fn sync(&mut self) -> io::Result<()> {
        Ok(())
    }

    /// Release whatever exclusive hold the stream has on its destination.
    fn release(&mut self) {}
}

impl StreamSink for File {
    fn sync(&mut self) -> io::Result<()> {
        self.sync_data()
    }

    fn release(&mut self) {
        let _ = FileExt::unlock(&*self);
    }
}

/// Writer for one trace output stream.
///
/// A file stream is exclusively locked for the writer's lifetime. Every
/// stream starts with a [`StreamHeader`]. After creation nothing fails
/// loudly: [`append`] and [`flush`] report success as a `bool`, count
/// failures, and log the first one. Tracing must never stall or crash the
/// host it observes.
///
/// [`append`]: StreamWriter::append
/// [`flush`]: StreamWriter::flush
pub struct StreamWriter<S: StreamSink = File> {
    /// Open sink, `None` once closed.
    sink: Option<BufWriter<S>>,
    /// Path of the file, or a label for non-file sinks.
    path: PathBuf,
    /// What the stream holds.
    kind: StreamKind,
    /// Record bytes accepted so far (header excluded).
    bytes_written: u64,
    /// Records accepted so far.
    records_written: u64,
    /// Failed appends and flushes.
    write_failures: u64,
}

impl StreamWriter {
    /// Create (or truncate) the stream at `path` and write its header.
    ///
    /// The lock is taken before truncating, so a file held by a live tracer
    /// is never clobbered.
    pub fn create(path: impl Into<PathBuf>, kind: StreamKind, buffer_size: usize) -> Result<Self> {
        let path = path.into();

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| LeakTraceError::stream_open(&path, &e))?;

        file.try_lock_exclusive()
            .map_err(|e| LeakTraceError::stream_locked(&path, &e))?;

        file.set_len(0)
            .map_err(|e| LeakTraceError::stream_write(&path, &e))?;

        Self::with_sink(file, path, kind, buffer_size)
    }
}

impl<S: StreamSink> StreamWriter<S> {
    /// Start a stream on an already-open sink and write its header.
    ///
    /// `path` only labels the stream in logs and errors.
    pub fn with_sink(
        sink: S,
        path: impl Into<PathBuf>,
        kind: StreamKind,
        buffer_size: usize,
    ) -> Result<Self> {
        let path = path.into();

        let mut sink = BufWriter::with_capacity(buffer_size, sink);
        sink.write_all(&StreamHeader::new(kind).to_bytes())
            .map_err(|e| LeakTraceError::stream_write(&path, &e))?;

        Ok(Self {
            sink: Some(sink),
            path,
            kind,
            bytes_written: 0,
            records_written: 0,
            write_failures: 0,
        })
    }

    /// Append one encoded record.
    ///
    /// Returns `false` if the stream is closed or the write failed.
    pub fn append(&mut self, bytes: &[u8]) -> bool {
        let Some(sink) = self.sink.as_mut() else {
            return false;
        };

        match sink.write_all(bytes) {
            Ok(()) => {
                self.bytes_written += bytes.len() as u64;
                self.records_written += 1;
                true
            }
            Err(e) => {
                self.note_failure(&e);
                false
            }
        }
    }

    /// Push buffered bytes to the sink.
    pub fn flush(&mut self) -> bool {
        let Some(sink) = self.sink.as_mut() else {
            return false;
        };

        match sink.flush() {
            Ok(()) => true,
            Err(e) => {
                self.note_failure(&e);
                false
            }
        }
    }

    /// Flush and close the stream, optionally syncing it to disk.
    ///
    /// Closing twice is a no-op.
    pub fn close(&mut self, sync: bool) {
        let Some(mut sink) = self.sink.take() else {
            return;
        };

        if let Err(e) = sink.flush() {
            self.note_failure(&e);
        }
        if sync {
            if let Err(e) = sink.get_mut().sync() {
                self.note_failure(&e);
            }
        }
        sink.get_mut().release();
    }

    fn note_failure(&mut self, err: &io::Error) {
        self.write_failures += 1;
        if self.write_failures == 1 {
            tracing::warn!(
                path = %self.path.display(),
                stream = ?self.kind,
                error = %err,
                "Trace stream write failed, further failures are only counted"
            );
        }
    }

    /// Check whether the stream has been closed.
    pub fn is_closed(&self) -> bool {
        self.sink.is_none()
    }

    /// Get the file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get the stream kind.
    pub fn kind(&self) -> StreamKind {
        self.kind
    }

    /// Record bytes accepted so far.
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Records accepted so far.
    pub fn records_written(&self) -> u64 {
        self.records_written
    }

    /// Failed appends and flushes so far.
    pub fn write_failures(&self) -> u64 {
        self.write_failures
    }
}

impl<S: StreamSink> Drop for StreamWriter<S> {
    fn drop(&mut self) {
        self.close(false);
    }
}

/// In-memory sink whose writes can be switched to fail.
#[cfg(test)]
#[derive(Clone, Default)]
pub(crate) struct SwitchableSink {
    failing: std::sync::Arc<std::sync::atomic::AtomicBool>,
    bytes: std::sync::Arc<parking_lot::Mutex<Vec<u8>>>,
}

#[cfg(test)]
impl SwitchableSink {
    pub(crate) fn set_failing(&self, failing: bool) {
        self.failing
            .store(failing, std::sync::atomic::Ordering::SeqCst);
    }

    pub(crate) fn written_len(&self) -> usize {
        self.bytes.lock().len()
    }

    fn check(&self) -> io::Result<()> {
        if self.failing.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(io::Error::other("no space left on device"));
        }
        Ok(())
    }
}

#[cfg(test)]
impl Write for SwitchableSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.check()?;
        self.bytes.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.check()
    }
}

#[cfg(test)]
impl StreamSink for SwitchableSink {}
