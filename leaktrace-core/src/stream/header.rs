//! Stream file header.

use byteorder::{ByteOrder, LittleEndian, ReadBytesExt};
use std::io;

/// Magic number for leaktrace stream files ("LKTRACE\0" little-endian).
pub const STREAM_MAGIC: u64 = u64::from_le_bytes(*b"LKTRACE\0");

/// Current stream format version.
pub const STREAM_VERSION: u32 = 1;

/// Fixed size of the stream header in bytes.
pub const HEADER_SIZE: usize = 32;

/// Which of the two output streams a file holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum StreamKind {
    /// Object lifecycle events.
    Events = 1,
    /// Class and method identity records.
    Metadata = 2,
}

impl TryFrom<u32> for StreamKind {
    type Error = &'static str;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Events),
            2 => Ok(Self::Metadata),
            _ => Err("Unknown stream kind"),
        }
    }
}

/// Stream file header.
///
/// ```text
/// ┌─────────┬─────────┬───────┬────────────┬───────┬───────┐
/// │ Magic   │ Version │ Kind  │ Created at │ PID   │ Flags │
/// │ (8 B)   │ (4 B)   │ (4 B) │ (8 B)      │ (4 B) │ (4 B) │
/// └─────────┴─────────┴───────┴────────────┴───────┴───────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamHeader {
    /// Magic number for file identification.
    pub magic: u64,
    /// Stream format version.
    pub version: u32,
    /// Stream kind.
    pub kind: StreamKind,
    /// Creation timestamp (Unix epoch seconds).
    pub created_at: u64,
    /// Id of the process that wrote the stream.
    pub pid: u32,
    /// Flags (reserved for future use).
    pub flags: u32,
}

impl StreamHeader {
    /// Create a header for a new stream written by this process.
    pub fn new(kind: StreamKind) -> Self {
        let created_at = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);

        Self {
            magic: STREAM_MAGIC,
            version: STREAM_VERSION,
            kind,
            created_at,
            pid: std::process::id(),
            flags: 0,
        }
    }

    /// Validate the header against the stream kind the caller expects.
    pub fn validate(&self, expected: StreamKind) -> Result<(), &'static str> {
        if self.magic != STREAM_MAGIC {
            return Err("Invalid magic number");
        }
        if self.version != STREAM_VERSION {
            return Err("Unsupported stream version");
        }
        if self.kind != expected {
            return Err("Unexpected stream kind");
        }
        Ok(())
    }

    /// Serialize the header.
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        LittleEndian::write_u64(&mut buf[0..8], self.magic);
        LittleEndian::write_u32(&mut buf[8..12], self.version);
        LittleEndian::write_u32(&mut buf[12..16], self.kind as u32);
        LittleEndian::write_u64(&mut buf[16..24], self.created_at);
        LittleEndian::write_u32(&mut buf[24..28], self.pid);
        LittleEndian::write_u32(&mut buf[28..32], self.flags);
        buf
    }

    /// Read a header from a byte slice.
    pub fn from_bytes(bytes: &[u8]) -> io::Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "Buffer too small for header",
            ));
        }

        let mut cursor = io::Cursor::new(bytes);

        let magic = cursor.read_u64::<LittleEndian>()?;
        let version = cursor.read_u32::<LittleEndian>()?;
        let kind = StreamKind::try_from(cursor.read_u32::<LittleEndian>()?)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        let created_at = cursor.read_u64::<LittleEndian>()?;
        let pid = cursor.read_u32::<LittleEndian>()?;
        let flags = cursor.read_u32::<LittleEndian>()?;

        Ok(Self {
            magic,
            version,
            kind,
            created_at,
            pid,
            flags,
        })
    }
}
