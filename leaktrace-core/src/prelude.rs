//! Prelude for convenient imports.
//!
//! This module re-exports the most commonly used types and traits.
//!
//! # Example
//!
//! ```ignore
//! use leaktrace_core::prelude::*;
//! ```

// Core types
pub use crate::types::{ACCESS_BIT, ObjectAddr, clear_access_bit, clear_access_bit_addr};

// Error handling
pub use crate::error::{LeakTraceError, Result};

// Configuration
pub use crate::config::TracerConfig;

// Host seam
pub use crate::host::{ClassInfo, CodeRange, ManagedClass, ManagedMethod, MethodInfo};

// Tracker
pub use crate::registry;
pub use crate::tracker::{GcPhase, LeakTracer, TracerStats};

// Streams
pub use crate::stream::{
    EventKind, EventReader, MetadataKind, MetadataReader, MetadataRecord, ObjectEvent,
    StreamSink, StreamWriter,
};
