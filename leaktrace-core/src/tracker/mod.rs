//! Object event tracker.
//!
//! [`LeakTracer`] receives lifecycle notifications from the host runtime and
//! turns them into records on two streams:
//!
//! ```text
//!  allocator ─┐
//!  GC mover  ─┤                      ┌──────────────┐     ┌───────────────┐
//!  GC phases ─┼──> LeakTracer ──────>│ ObjectEvent  │────>│ <name>.events │
//!  accesses  ─┤     (state)          └──────────────┘     └───────────────┘
//!  app start ─┘        │             ┌──────────────┐     ┌────────────────┐
//!  linker ────────────>└────────────>│ Recorder     │────>│ <name>.classes │
//!                                    └──────────────┘     └────────────────┘
//! ```
//!
//! Every notification is infallible from the caller's point of view: it runs
//! synchronously on the calling thread, appends at most one buffered record,
//! and swallows I/O failures (they show up in [`TracerStats`]).
//!
//! # Threading
//!
//! All mutable state sits behind one mutex, so records from different threads
//! never interleave mid-record. Records from one thread appear in call order.
//! A thread that re-enters the tracer while inside it (for example because
//! the tracer's own bookkeeping allocated through an instrumented allocator)
//! has that notification dropped and counted.
//!
//! # Example
//!
//! ```ignore
//! use leaktrace_core::prelude::*;
//!
//! let tracer = LeakTracer::open("com.example.app", TracerConfig::default())?;
//!
//! tracer.new_object(ObjectAddr::new(0x1000), 64);
//! tracer.gc_started(true);
//! tracer.move_object(ObjectAddr::new(0x1000), ObjectAddr::new(0x2000));
//! tracer.gc_finished();
//!
//! let stats = tracer.close();
//! assert_eq!(stats.events_written, 4);
//! ```

mod guard;
mod metadata;
mod state;
mod stats;

pub use state::GcPhase;
pub use stats::TracerStats;

use crate::config::TracerConfig;
use crate::error::{LeakTraceError, Result};
use crate::host::{ManagedClass, ManagedMethod};
use crate::stream::{MAX_EVENT_SIZE, ObjectEvent, StreamKind, StreamSink, StreamWriter};
use crate::types::ObjectAddr;
use guard::ReentrancyGuard;
use metadata::MetadataRecorder;
use parking_lot::Mutex;
use state::ObjectState;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// State guarded by the tracer lock.
struct TracerInner<S: StreamSink> {
    /// Object-event stream.
    events: StreamWriter<S>,
    /// Class/method metadata stream.
    metadata: StreamWriter<S>,
    /// Pending class/method records.
    recorder: MetadataRecorder,
    /// Live objects, access set and GC phase.
    state: ObjectState,
}

impl<S: StreamSink> TracerInner<S> {
    fn emit(&mut self, event: ObjectEvent) {
        let mut buf = [0u8; MAX_EVENT_SIZE];
        let len = event.encode(&mut buf);
        self.events.append(&buf[..len]);
    }

    fn dump_metadata(&mut self) -> usize {
        self.recorder.dump(&mut self.metadata)
    }
}

/// Heap-object lifecycle tracer for one process.
///
/// Streams go to files unless the tracer is started on other sinks with
/// [`LeakTracer::with_writers`].
pub struct LeakTracer<S: StreamSink = File> {
    process_name: String,
    config: TracerConfig,
    events_path: PathBuf,
    metadata_path: PathBuf,
    /// Cleared on close; checked before taking the lock.
    tracking: AtomicBool,
    /// Notifications ignored because of `tracking` or re-entrancy.
    dropped: AtomicU64,
    inner: Mutex<TracerInner<S>>,
}

impl LeakTracer {
    /// Open both output streams for `process_name` and start tracking.
    ///
    /// Fails if the configuration is invalid, the directory or either file
    /// cannot be created, or another tracer holds the files. The returned
    /// error carries the OS error code where there is one.
    pub fn open(process_name: &str, config: TracerConfig) -> Result<Self> {
        config.validate()?;

        let events_path = config.events_path(process_name)?;
        let metadata_path = config.metadata_path(process_name)?;

        std::fs::create_dir_all(&config.directory)
            .map_err(|e| LeakTraceError::directory_create(&config.directory, &e))?;

        let events = StreamWriter::create(&events_path, StreamKind::Events, config.buffer_size)?;
        let metadata =
            StreamWriter::create(&metadata_path, StreamKind::Metadata, config.buffer_size)?;

        Self::with_writers(process_name, config, events, metadata)
    }
}

impl<S: StreamSink> LeakTracer<S> {
    /// Start tracking on two already-open streams.
    ///
    /// The configuration's directory is not used; its buffering, access and
    /// metadata settings are.
    pub fn with_writers(
        process_name: &str,
        config: TracerConfig,
        events: StreamWriter<S>,
        metadata: StreamWriter<S>,
    ) -> Result<Self> {
        config.validate()?;

        let events_path = events.path().to_path_buf();
        let metadata_path = metadata.path().to_path_buf();

        tracing::info!(
            process = %process_name,
            events = %events_path.display(),
            metadata = %metadata_path.display(),
            "Leak tracer started"
        );

        Ok(Self {
            process_name: process_name.to_string(),
            events_path,
            metadata_path,
            tracking: AtomicBool::new(true),
            dropped: AtomicU64::new(0),
            inner: Mutex::new(TracerInner {
                events,
                metadata,
                recorder: MetadataRecorder::default(),
                state: ObjectState::new(config.access_set_limit),
            }),
            config,
        })
    }

    /// Run `f` on the locked state, unless the tracer is inactive or this
    /// thread is already inside it.
    #[inline]
    fn record(&self, f: impl FnOnce(&mut TracerInner<S>)) {
        if !self.tracking.load(Ordering::Acquire) {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return;
        }
        let Some(_guard) = ReentrancyGuard::enter() else {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return;
        };

        let mut inner = self.inner.lock();
        if inner.events.is_closed() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return;
        }
        f(&mut inner);
    }

    // =========================================================================
    // Object events
    // =========================================================================

    /// An object of `size` bytes was allocated at `addr`.
    pub fn new_object(&self, addr: ObjectAddr, size: u64) {
        let addr = addr.untagged();
        self.record(|inner| {
            if !inner.state.allocate(addr) {
                tracing::debug!(%addr, "Allocation at an address that is already live");
            }
            inner.emit(ObjectEvent::Allocated { addr, size });
        });
    }

    /// The object at `addr` was reclaimed.
    ///
    /// Deaths of objects the tracer never saw allocated (for example ones
    /// allocated before tracing started) are recorded all the same.
    pub fn dead_object(&self, addr: ObjectAddr) {
        let addr = addr.untagged();
        self.record(|inner| {
            if !inner.state.kill(addr) {
                tracing::debug!(%addr, "Death of an untracked object");
            }
            inner.emit(ObjectEvent::Died { addr });
        });
    }

    /// The object at `from` was moved to `to`.
    ///
    /// Afterwards `to` is live and `from` is not.
    pub fn move_object(&self, from: ObjectAddr, to: ObjectAddr) {
        let from = from.untagged();
        let to = to.untagged();
        self.record(|inner| {
            if !inner.state.relocate(from, to) {
                tracing::debug!(%from, %to, "Move of an untracked object");
            }
            inner.emit(ObjectEvent::Moved { from, to });
        });
    }

    /// The object at `addr` was accessed.
    ///
    /// Only the first access per GC epoch is recorded.
    pub fn access_object(&self, addr: ObjectAddr) {
        let addr = addr.untagged();
        self.record(|inner| {
            if inner.state.first_access(addr) {
                inner.emit(ObjectEvent::Accessed { addr });
            }
        });
    }

    // =========================================================================
    // Phase markers
    // =========================================================================

    /// A GC cycle started. Compacting cycles may be followed by moves.
    pub fn gc_started(&self, is_compacting: bool) {
        self.record(|inner| {
            inner.state.gc_started(is_compacting);
            inner.emit(ObjectEvent::GcStart {
                compacting: is_compacting,
            });
        });
    }

    /// The current GC cycle finished.
    pub fn gc_finished(&self) {
        self.record(|inner| {
            if !inner.state.gc().in_progress {
                tracing::debug!("GC finished without a matching start");
            }
            inner.state.gc_finished();
            inner.emit(ObjectEvent::GcEnd);
        });
    }

    /// The foreground app started.
    pub fn app_started(&self) {
        self.record(|inner| inner.emit(ObjectEvent::AppStart));
    }

    /// The foreground app finished.
    pub fn app_finished(&self) {
        self.record(|inner| inner.emit(ObjectEvent::AppEnd));
    }

    // =========================================================================
    // Class and method identity
    // =========================================================================

    /// A class was resolved. Recorded the first time its address is seen.
    pub fn new_class<C: ManagedClass + ?Sized>(&self, class: &C) {
        self.record(|inner| {
            if inner.recorder.record_class(class) {
                self.dump_metadata_if_due(inner);
            }
        });
    }

    /// A method of `class_name` was linked. Recorded on every call.
    pub fn new_method_linked<M: ManagedMethod + ?Sized>(&self, class_name: &str, method: &M) {
        self.record(|inner| {
            inner.recorder.record_method(class_name, method);
            self.dump_metadata_if_due(inner);
        });
    }

    fn dump_metadata_if_due(&self, inner: &mut TracerInner<S>) {
        if let Some(threshold) = self.config.metadata_flush_threshold {
            if inner.recorder.pending() >= threshold {
                inner.dump_metadata();
            }
        }
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Write pending metadata and push buffered bytes of both streams to the OS.
    pub fn flush(&self) {
        let Some(_guard) = ReentrancyGuard::enter() else {
            return;
        };
        let mut inner = self.inner.lock();
        if inner.events.is_closed() {
            return;
        }
        inner.dump_metadata();
        inner.events.flush();
        inner.metadata.flush();
    }

    /// Stop tracking, write pending metadata and close both streams.
    ///
    /// Safe to call more than once; later calls only return the statistics.
    pub fn close(&self) -> TracerStats {
        self.tracking.store(false, Ordering::Release);

        let _guard = ReentrancyGuard::enter();
        let mut inner = self.inner.lock();

        if !inner.events.is_closed() {
            inner.dump_metadata();
            inner.events.close(self.config.sync_on_close);
            inner.metadata.close(self.config.sync_on_close);

            let stats = self.stats_locked(&inner);
            tracing::info!(
                process = %self.process_name,
                events = stats.events_written,
                dropped = stats.events_dropped,
                write_failures = stats.write_failures,
                live_objects = stats.live_objects,
                gc_count = stats.gc_count,
                "Leak tracer closed"
            );
            return stats;
        }

        self.stats_locked(&inner)
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    /// Whether notifications are currently recorded.
    pub fn is_tracking(&self) -> bool {
        self.tracking.load(Ordering::Acquire)
    }

    /// Whether the tracer currently considers `addr` live.
    pub fn is_live(&self, addr: ObjectAddr) -> bool {
        self.inner.lock().state.is_live(addr.untagged())
    }

    /// Current GC phase.
    pub fn gc_phase(&self) -> GcPhase {
        self.inner.lock().state.gc()
    }

    /// Snapshot of the tracer's counters.
    pub fn stats(&self) -> TracerStats {
        let inner = self.inner.lock();
        self.stats_locked(&inner)
    }

    fn stats_locked(&self, inner: &TracerInner<S>) -> TracerStats {
        let gc = inner.state.gc();
        TracerStats {
            events_written: inner.events.records_written(),
            events_dropped: self.dropped.load(Ordering::Relaxed),
            write_failures: inner.events.write_failures() + inner.metadata.write_failures(),
            bytes_written: inner.events.bytes_written(),
            metadata_written: inner.metadata.records_written(),
            live_objects: inner.state.live_count(),
            classes: inner.recorder.class_count(),
            methods: inner.recorder.method_count(),
            gc_count: gc.completed,
            gc_in_progress: gc.in_progress,
        }
    }

    /// Name of the traced process.
    pub fn process_name(&self) -> &str {
        &self.process_name
    }

    /// Configuration the tracer was opened with.
    pub fn config(&self) -> &TracerConfig {
        &self.config
    }

    /// Path of the object-event stream.
    pub fn events_path(&self) -> &Path {
        &self.events_path
    }

    /// Path of the metadata stream.
    pub fn metadata_path(&self) -> &Path {
        &self.metadata_path
    }
}

impl<S: StreamSink> Drop for LeakTracer<S> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<S: StreamSink> std::fmt::Debug for LeakTracer<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LeakTracer")
            .field("process_name", &self.process_name)
            .field("events_path", &self.events_path)
            .field("tracking", &self.is_tracking())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{ClassInfo, CodeRange, MethodInfo};
    use crate::stream::{EventReader, HEADER_SIZE, MetadataKind, MetadataReader, SwitchableSink};
    use tempfile::{TempDir, tempdir};

    fn open_tracer(name: &str) -> (TempDir, LeakTracer) {
        let dir = tempdir().unwrap();
        let config = TracerConfig::default()
            .with_directory(dir.path())
            .with_sync_on_close(false);
        let tracer = LeakTracer::open(name, config).unwrap();
        (dir, tracer)
    }

    fn events_of(tracer: &LeakTracer) -> Vec<ObjectEvent> {
        tracer.close();
        EventReader::open(tracer.events_path())
            .unwrap()
            .read_all()
            .unwrap()
    }

    fn addr(raw: u64) -> ObjectAddr {
        ObjectAddr::new(raw)
    }

    #[test]
    fn open_creates_both_streams() {
        let (dir, tracer) = open_tracer("app1");
        assert!(tracer.is_tracking());
        assert_eq!(tracer.events_path(), dir.path().join("app1.events"));
        assert_eq!(tracer.metadata_path(), dir.path().join("app1.classes"));
        assert!(tracer.events_path().exists());
        assert!(tracer.metadata_path().exists());
    }

    #[test]
    fn open_creates_missing_directory() {
        let dir = tempdir().unwrap();
        let config = TracerConfig::default().with_directory(dir.path().join("a").join("b"));
        let tracer = LeakTracer::open("app1", config).unwrap();
        assert!(tracer.events_path().exists());
    }

    #[test]
    fn open_rejects_invalid_config() {
        let dir = tempdir().unwrap();
        let config = TracerConfig::default()
            .with_directory(dir.path())
            .with_buffer_size(0);
        let err = LeakTracer::open("app1", config).unwrap_err();
        assert_eq!(err.code(), "E301");
    }

    #[test]
    fn dead_object_without_allocation_is_recorded() {
        let (_dir, tracer) = open_tracer("app1");
        tracer.dead_object(addr(0x40));

        assert_eq!(events_of(&tracer), vec![ObjectEvent::Died { addr: addr(0x40) }]);
    }

    #[test]
    fn move_rekeys_live_set() {
        let (_dir, tracer) = open_tracer("app1");
        tracer.new_object(addr(0x1000), 16);
        tracer.move_object(addr(0x1000), addr(0x2000));

        assert!(tracer.is_live(addr(0x2000)));
        assert!(!tracer.is_live(addr(0x1000)));

        // Unknown source still ends up live at the destination.
        tracer.move_object(addr(0x3000), addr(0x4000));
        assert!(tracer.is_live(addr(0x4000)));
        assert!(!tracer.is_live(addr(0x3000)));
    }

    #[test]
    fn move_then_access_does_not_mention_old_address() {
        let (_dir, tracer) = open_tracer("app1");
        tracer.new_object(addr(0x1000), 16);
        tracer.move_object(addr(0x1000), addr(0x2000));
        tracer.access_object(addr(0x2000));

        let events = events_of(&tracer);
        let after_move = &events[2..];
        assert_eq!(after_move, &[ObjectEvent::Accessed { addr: addr(0x2000) }]);
        assert!(!after_move.iter().any(|e| e.concerns(addr(0x1000))));
    }

    #[test]
    fn repeated_access_within_epoch_is_recorded_once() {
        let (_dir, tracer) = open_tracer("app1");
        tracer.new_object(addr(0x1000), 16);
        tracer.access_object(addr(0x1000));
        tracer.access_object(addr(0x1000));
        tracer.gc_started(false);
        tracer.access_object(addr(0x1000));
        tracer.access_object(addr(0x1000));
        tracer.gc_finished();
        tracer.access_object(addr(0x1000));

        let accesses = events_of(&tracer)
            .into_iter()
            .filter(|e| matches!(e, ObjectEvent::Accessed { .. }))
            .count();
        assert_eq!(accesses, 3);
    }

    #[test]
    fn tagged_addresses_name_the_same_object() {
        let (_dir, tracer) = open_tracer("app1");
        tracer.new_object(addr(0x1000), 16);
        tracer.access_object(addr(0x1001));
        tracer.access_object(addr(0x1000));

        assert_eq!(
            events_of(&tracer),
            vec![
                ObjectEvent::Allocated {
                    addr: addr(0x1000),
                    size: 16
                },
                ObjectEvent::Accessed { addr: addr(0x1000) },
            ]
        );
    }

    #[test]
    fn gc_phase_tracks_cycles() {
        let (_dir, tracer) = open_tracer("app1");
        tracer.gc_started(true);
        assert_eq!(
            tracer.gc_phase(),
            GcPhase {
                completed: 0,
                in_progress: true,
                compacting: true
            }
        );
        tracer.gc_finished();
        tracer.gc_started(false);
        tracer.gc_finished();

        let stats = tracer.stats();
        assert_eq!(stats.gc_count, 2);
        assert!(!stats.gc_in_progress);
    }

    #[test]
    fn app_markers_are_recorded() {
        let (_dir, tracer) = open_tracer("app1");
        tracer.app_started();
        tracer.app_finished();
        assert_eq!(
            events_of(&tracer),
            vec![ObjectEvent::AppStart, ObjectEvent::AppEnd]
        );
    }

    #[test]
    fn classes_once_methods_always() {
        let (_dir, tracer) = open_tracer("app1");
        let class = ClassInfo::new(addr(0x7000), 5, "Lcom/example/Foo;");
        let method = MethodInfo::new("bar", CodeRange::new(0x200, 48));

        tracer.new_class(&class);
        tracer.new_class(&class);
        tracer.new_method_linked("Lcom/example/Foo;", &method);
        tracer.new_method_linked("Lcom/example/Foo;", &method);

        let stats = tracer.close();
        assert_eq!(stats.classes, 1);
        assert_eq!(stats.methods, 2);
        assert_eq!(stats.metadata_written, 3);

        let records = MetadataReader::open(tracer.metadata_path())
            .unwrap()
            .read_all()
            .unwrap();
        let kinds: Vec<_> = records.iter().map(|r| r.kind).collect();
        assert_eq!(
            kinds,
            vec![MetadataKind::Class, MetadataKind::Method, MetadataKind::Method]
        );
        assert_eq!(records[1].name, "Lcom/example/Foo;.bar");
    }

    #[test]
    fn metadata_is_buffered_until_close() {
        let (_dir, tracer) = open_tracer("app1");
        tracer.new_class(&ClassInfo::new(addr(0x7000), 5, "LFoo;"));
        assert_eq!(tracer.stats().metadata_written, 0);

        tracer.flush();
        assert_eq!(tracer.stats().metadata_written, 1);
    }

    #[test]
    fn metadata_flush_threshold_dumps_eagerly() {
        let dir = tempdir().unwrap();
        let config = TracerConfig::default()
            .with_directory(dir.path())
            .with_metadata_flush_threshold(2);
        let tracer = LeakTracer::open("app1", config).unwrap();

        let method = MethodInfo::new("run", CodeRange::new(0, 4));
        tracer.new_method_linked("LFoo;", &method);
        assert_eq!(tracer.stats().metadata_written, 0);
        tracer.new_method_linked("LFoo;", &method);
        assert_eq!(tracer.stats().metadata_written, 2);
    }

    #[test]
    fn notifications_after_close_are_dropped() {
        let (_dir, tracer) = open_tracer("app1");
        tracer.new_object(addr(0x1000), 8);
        let closed = tracer.close();
        assert!(!tracer.is_tracking());

        tracer.dead_object(addr(0x1000));
        tracer.gc_started(false);

        let stats = tracer.close();
        assert_eq!(stats.events_written, closed.events_written);
        assert_eq!(stats.events_dropped, 2);
    }

    #[test]
    fn reentrant_notification_is_dropped() {
        let (_dir, tracer) = open_tracer("app1");

        {
            let _inside = ReentrancyGuard::enter().unwrap();
            tracer.new_object(addr(0x1000), 8);
        }
        tracer.new_object(addr(0x2000), 8);

        let stats = tracer.stats();
        assert_eq!(stats.events_dropped, 1);
        assert_eq!(stats.events_written, 1);
        assert!(!tracer.is_live(addr(0x1000)));
    }

    #[test]
    fn concurrent_threads_produce_whole_records() {
        let (_dir, tracer) = open_tracer("app1");

        std::thread::scope(|s| {
            for t in 0..4u64 {
                let tracer = &tracer;
                s.spawn(move || {
                    for i in 0..250u64 {
                        let a = addr(0x10_0000 * (t + 1) + i * 8);
                        tracer.new_object(a, 32);
                        tracer.dead_object(a);
                    }
                });
            }
        });

        let events = events_of(&tracer);
        assert_eq!(events.len(), 2000);
        assert_eq!(tracer.stats().live_objects, 0);
    }

    #[test]
    fn stats_count_bytes() {
        let (_dir, tracer) = open_tracer("app1");
        tracer.new_object(addr(0x1000), 8);
        tracer.gc_started(true);
        tracer.gc_finished();

        let stats = tracer.close();
        assert_eq!(stats.events_written, 3);
        assert_eq!(stats.bytes_written, 17 + 2 + 1);
        assert_eq!(stats.write_failures, 0);
    }

    #[test]
    fn write_failures_do_not_reach_the_caller() {
        let events = SwitchableSink::default();
        let metadata = SwitchableSink::default();
        let tracer = LeakTracer::with_writers(
            "app1",
            TracerConfig::default(),
            StreamWriter::with_sink(events.clone(), "app1.events", StreamKind::Events, 1).unwrap(),
            StreamWriter::with_sink(metadata, "app1.classes", StreamKind::Metadata, 1).unwrap(),
        )
        .unwrap();

        tracer.new_object(addr(0x1000), 16);
        events.set_failing(true);
        tracer.access_object(addr(0x1000));
        tracer.gc_started(false);
        tracer.gc_finished();

        // Bookkeeping follows the host even when the stream cannot.
        assert!(tracer.is_tracking());
        assert!(tracer.is_live(addr(0x1000)));
        assert_eq!(tracer.gc_phase().completed, 1);

        let stats = tracer.stats();
        assert_eq!(stats.events_written, 1);
        assert_eq!(stats.write_failures, 3);
        assert_eq!(stats.events_dropped, 0);

        events.set_failing(false);
        tracer.dead_object(addr(0x1000));

        let stats = tracer.close();
        assert_eq!(stats.events_written, 2);
        assert_eq!(stats.write_failures, 3);
        assert_eq!(events.written_len(), HEADER_SIZE + 17 + 9);
    }
}
