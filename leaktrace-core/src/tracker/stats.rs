//! Tracer statistics.

use serde::Serialize;

/// Snapshot of a tracer's counters, for monitoring and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TracerStats {
    /// Object events accepted by the event stream.
    pub events_written: u64,
    /// Notifications ignored because the tracer was inactive or re-entered.
    pub events_dropped: u64,
    /// Failed writes and flushes across both streams.
    pub write_failures: u64,
    /// Record bytes accepted by the event stream.
    pub bytes_written: u64,
    /// Metadata records accepted by the metadata stream.
    pub metadata_written: u64,
    /// Addresses currently considered live.
    pub live_objects: usize,
    /// Distinct classes seen.
    pub classes: usize,
    /// Method linkages seen.
    pub methods: u64,
    /// Completed GC cycles.
    pub gc_count: u64,
    /// Whether a GC cycle is in progress.
    pub gc_in_progress: bool,
}
