//! Object event records and their binary encoding.

use crate::types::ObjectAddr;
use byteorder::{ByteOrder, LittleEndian};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Size of the largest encoded event (tag + two 8-byte words).
pub const MAX_EVENT_SIZE: usize = 1 + 8 + 8;

/// Kind tag of an object event.
///
/// The tag is the first byte of every record and fixes the payload length,
/// which lets a reader skip over records and resynchronize after garbage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum EventKind {
    /// An object was allocated.
    Allocated = 0x01,
    /// An object was reclaimed.
    Died = 0x02,
    /// An object was relocated by the GC.
    Moved = 0x03,
    /// An object was accessed.
    Accessed = 0x04,
    /// A GC cycle started.
    GcStart = 0x05,
    /// A GC cycle finished.
    GcEnd = 0x06,
    /// The foreground app started.
    AppStart = 0x07,
    /// The foreground app finished.
    AppEnd = 0x08,
}

impl EventKind {
    /// Length of the payload following the tag byte.
    #[must_use]
    pub const fn payload_len(self) -> usize {
        match self {
            Self::Allocated | Self::Moved => 16,
            Self::Died | Self::Accessed => 8,
            Self::GcStart => 1,
            Self::GcEnd | Self::AppStart | Self::AppEnd => 0,
        }
    }

    /// Total encoded length including the tag byte.
    #[must_use]
    pub const fn record_len(self) -> usize {
        1 + self.payload_len()
    }
}

impl TryFrom<u8> for EventKind {
    type Error = &'static str;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(Self::Allocated),
            0x02 => Ok(Self::Died),
            0x03 => Ok(Self::Moved),
            0x04 => Ok(Self::Accessed),
            0x05 => Ok(Self::GcStart),
            0x06 => Ok(Self::GcEnd),
            0x07 => Ok(Self::AppStart),
            0x08 => Ok(Self::AppEnd),
            _ => Err("Unknown event kind"),
        }
    }
}

/// One observed lifecycle transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ObjectEvent {
    /// An object of `size` bytes was allocated at `addr`.
    Allocated {
        /// Address of the new object.
        addr: ObjectAddr,
        /// Size in bytes.
        size: u64,
    },
    /// The object at `addr` was reclaimed.
    Died {
        /// Address of the dead object.
        addr: ObjectAddr,
    },
    /// The object at `from` now lives at `to`.
    Moved {
        /// Old address.
        from: ObjectAddr,
        /// New address.
        to: ObjectAddr,
    },
    /// The object at `addr` was accessed.
    Accessed {
        /// Address of the accessed object.
        addr: ObjectAddr,
    },
    /// A GC cycle started; `compacting` cycles may emit `Moved` events.
    GcStart {
        /// Whether live objects may be relocated during this cycle.
        compacting: bool,
    },
    /// The current GC cycle finished.
    GcEnd,
    /// The foreground app started.
    AppStart,
    /// The foreground app finished.
    AppEnd,
}

impl ObjectEvent {
    /// Get the kind tag of this event.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::Allocated { .. } => EventKind::Allocated,
            Self::Died { .. } => EventKind::Died,
            Self::Moved { .. } => EventKind::Moved,
            Self::Accessed { .. } => EventKind::Accessed,
            Self::GcStart { .. } => EventKind::GcStart,
            Self::GcEnd => EventKind::GcEnd,
            Self::AppStart => EventKind::AppStart,
            Self::AppEnd => EventKind::AppEnd,
        }
    }

    /// Check whether this event names `addr` as the object it is about.
    ///
    /// For `Moved` both the old and the new address count.
    #[must_use]
    pub fn concerns(&self, addr: ObjectAddr) -> bool {
        match *self {
            Self::Allocated { addr: a, .. } | Self::Died { addr: a } | Self::Accessed { addr: a } => {
                a == addr
            }
            Self::Moved { from, to } => from == addr || to == addr,
            _ => false,
        }
    }

    /// Encode into `buf`, returning the number of bytes used.
    ///
    /// Encoding never allocates, so it is safe to call from inside an
    /// allocation hook.
    pub fn encode(&self, buf: &mut [u8; MAX_EVENT_SIZE]) -> usize {
        buf[0] = self.kind() as u8;
        match *self {
            Self::Allocated { addr, size } => {
                LittleEndian::write_u64(&mut buf[1..9], addr.as_u64());
                LittleEndian::write_u64(&mut buf[9..17], size);
            }
            Self::Died { addr } | Self::Accessed { addr } => {
                LittleEndian::write_u64(&mut buf[1..9], addr.as_u64());
            }
            Self::Moved { from, to } => {
                LittleEndian::write_u64(&mut buf[1..9], from.as_u64());
                LittleEndian::write_u64(&mut buf[9..17], to.as_u64());
            }
            Self::GcStart { compacting } => {
                buf[1] = u8::from(compacting);
            }
            Self::GcEnd | Self::AppStart | Self::AppEnd => {}
        }
        self.kind().record_len()
    }

    /// Serialize the event to an owned buffer.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = [0u8; MAX_EVENT_SIZE];
        let len = self.encode(&mut buf);
        buf[..len].to_vec()
    }

    /// Decode the payload of a record whose tag has already been read.
    ///
    /// `payload` must be exactly `kind.payload_len()` bytes long.
    pub fn decode(kind: EventKind, payload: &[u8]) -> Result<Self, &'static str> {
        if payload.len() != kind.payload_len() {
            return Err("Payload length does not match event kind");
        }

        let word = |at: usize| ObjectAddr::new(LittleEndian::read_u64(&payload[at..at + 8]));

        Ok(match kind {
            EventKind::Allocated => Self::Allocated {
                addr: word(0),
                size: LittleEndian::read_u64(&payload[8..16]),
            },
            EventKind::Died => Self::Died { addr: word(0) },
            EventKind::Moved => Self::Moved {
                from: word(0),
                to: word(8),
            },
            EventKind::Accessed => Self::Accessed { addr: word(0) },
            EventKind::GcStart => match payload[0] {
                0 => Self::GcStart { compacting: false },
                1 => Self::GcStart { compacting: true },
                _ => return Err("Invalid compacting flag"),
            },
            EventKind::GcEnd => Self::GcEnd,
            EventKind::AppStart => Self::AppStart,
            EventKind::AppEnd => Self::AppEnd,
        })
    }

    /// Decode one record from the start of `bytes`.
    ///
    /// Returns the event and the number of bytes consumed.
    pub fn from_bytes(bytes: &[u8]) -> Result<(Self, usize), &'static str> {
        let (&tag, rest) = bytes.split_first().ok_or("Empty record")?;
        let kind = EventKind::try_from(tag)?;
        let payload = rest
            .get(..kind.payload_len())
            .ok_or("Record truncated")?;
        Ok((Self::decode(kind, payload)?, kind.record_len()))
    }
}

impl fmt::Display for ObjectEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Allocated { addr, size } => write!(f, "Allocated({addr}, {size})"),
            Self::Died { addr } => write!(f, "Died({addr})"),
            Self::Moved { from, to } => write!(f, "Moved({from} -> {to})"),
            Self::Accessed { addr } => write!(f, "Accessed({addr})"),
            Self::GcStart { compacting } => write!(f, "GcStart({compacting})"),
            Self::GcEnd => f.write_str("GcEnd"),
            Self::AppStart => f.write_str("AppStart"),
            Self::AppEnd => f.write_str("AppEnd"),
        }
    }
}
