//! Leak Trace Core Library
//!
//! This crate records the lifecycle of managed heap objects for offline leak
//! analysis: allocation, death, relocation by a moving collector, first
//! access per GC epoch, GC and app phase boundaries, plus the identity of
//! every class and method the host resolves.
//!
//! # Overview
//!
//! A host runtime (interpreter, VM, custom allocator) calls into a
//! [`LeakTracer`] from its allocation, collection and linking paths. The
//! tracer appends compact binary records to two files per process:
//!
//! - `<name>.events`: the object-event stream
//! - `<name>.classes`: class and method identity records
//!
//! Both are read back with [`EventReader`] and [`MetadataReader`].
//!
//! # Key Components
//!
//! - **Tracker**: per-object state, access deduplication and GC phases
//! - **Stream**: on-disk record formats, writers and readers
//! - **Registry**: the optional process-wide tracer slot
//! - **Types**: object addresses and the access tag bit
//!
//! # Example
//!
//! ```ignore
//! use leaktrace_core::prelude::*;
//!
//! let config = TracerConfig::default().with_directory("/data/traces");
//! let tracer = LeakTracer::open("com.example.app", config)?;
//!
//! tracer.new_object(ObjectAddr::new(0x1000), 64);
//! tracer.access_object(ObjectAddr::new(0x1000));
//! tracer.dead_object(ObjectAddr::new(0x1000));
//! tracer.close();
//!
//! for event in EventReader::open(tracer.events_path())? {
//!     println!("{}", event?);
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod host;
pub mod prelude;
pub mod registry;
pub mod stream;
pub mod tracker;
pub mod types;

// Re-export key types at crate root for convenience
pub use config::TracerConfig;
pub use error::{LeakTraceError, Result};
pub use host::{ClassInfo, CodeRange, ManagedClass, ManagedMethod, MethodInfo};
pub use stream::{EventReader, MetadataReader, MetadataRecord, ObjectEvent};
pub use tracker::{GcPhase, LeakTracer, TracerStats};
pub use types::{ObjectAddr, clear_access_bit};
