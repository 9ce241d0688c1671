//! Trace output streams.
//!
//! Every tracer writes two append-only files:
//!
//! - **Event stream** (`<name>.events`): object lifecycle events. Records are
//!   fixed-size per kind and start with a one-byte kind tag, so appending one
//!   is a single buffered write with no allocation.
//! - **Metadata stream** (`<name>.classes`): class and method identity
//!   records. Names make these variable-length, so each record carries its
//!   length and a CRC32.
//!
//! Both files start with a 32-byte [`StreamHeader`].
//!
//! # Event Record Format
//!
//! ```text
//! ┌───────┬──────────────────────────────┐
//! │ Kind  │ Payload (fixed per kind)     │
//! │ (1 B) │ (0, 1, 8 or 16 B)            │
//! └───────┴──────────────────────────────┘
//! ```
//!
//! | Kind      | Tag  | Payload            |
//! |-----------|------|--------------------|
//! | Allocated | 0x01 | addr u64, size u64 |
//! | Died      | 0x02 | addr u64           |
//! | Moved     | 0x03 | from u64, to u64   |
//! | Accessed  | 0x04 | addr u64           |
//! | GcStart   | 0x05 | compacting u8      |
//! | GcEnd     | 0x06 | -                  |
//! | AppStart  | 0x07 | -                  |
//! | AppEnd    | 0x08 | -                  |
//!
//! All integers are little-endian.

mod event;
mod header;
mod metadata;
mod reader;
mod writer;

pub use event::{EventKind, MAX_EVENT_SIZE, ObjectEvent};
pub use header::{HEADER_SIZE, STREAM_MAGIC, STREAM_VERSION, StreamHeader, StreamKind};
pub use metadata::{
    MAX_METADATA_NAME_LEN, MAX_METADATA_RECORD_SIZE, MIN_METADATA_RECORD_SIZE, MetadataKind,
    MetadataRecord,
};
pub use reader::{EventReader, MetadataReader};
pub use writer::{StreamSink, StreamWriter};

#[cfg(test)]
pub(crate) use writer::SwitchableSink;
