//! Opaque object identity.

use super::tag::clear_access_bit_addr;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Address of a managed object, used purely as an identifier.
///
/// The tracer never dereferences an `ObjectAddr`; it only compares, hashes
/// and records it. Conversion from a real reference happens at the host
/// boundary through [`ObjectAddr::from_ptr`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
#[repr(transparent)]
pub struct ObjectAddr(u64);

impl ObjectAddr {
    /// The null address.
    pub const NULL: Self = Self(0);

    /// Create an address from its raw value.
    #[must_use]
    pub const fn new(addr: u64) -> Self {
        Self(addr)
    }

    /// Create an address from a host reference, dropping any access tag.
    #[must_use]
    pub fn from_ptr<T: ?Sized>(ptr: *const T) -> Self {
        Self(clear_access_bit_addr(ptr.addr()) as u64)
    }

    /// Get the raw address value.
    #[must_use]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }

    /// The 32-bit identifier of this address.
    ///
    /// Hosts with compressed references keep the managed heap in the low
    /// 4 GiB, so the low 32 bits identify an object uniquely there.
    ///
    /// Elsewhere two addresses 4 GiB apart share an id. The tracker keys its
    /// access-deduplication set on this id, so such objects suppress each
    /// other's first access within an epoch, and allocating or killing one
    /// clears the other's access mark.
    #[must_use]
    pub const fn id32(&self) -> u32 {
        self.0 as u32
    }

    /// The same address with the access tag removed.
    #[must_use]
    pub const fn untagged(&self) -> Self {
        Self(clear_access_bit_addr(self.0 as usize) as u64)
    }

    /// Check if this is the null address.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for ObjectAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

impl From<u64> for ObjectAddr {
    fn from(addr: u64) -> Self {
        Self(addr)
    }
}

impl From<usize> for ObjectAddr {
    fn from(addr: usize) -> Self {
        Self(addr as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::tag::ACCESS_BIT;

    #[test]
    fn display_is_hex() {
        assert_eq!(ObjectAddr::new(0x1000).to_string(), "0x00001000");
    }

    #[test]
    fn from_ptr_strips_tag() {
        let value = 7u32;
        let ptr: *const u32 = &value;
        let tagged = ptr.map_addr(|a| a | ACCESS_BIT);

        assert_eq!(ObjectAddr::from_ptr(tagged), ObjectAddr::from_ptr(ptr));
        assert_eq!(ObjectAddr::from_ptr(ptr).as_u64(), ptr.addr() as u64);
    }

    #[test]
    fn id32_uses_low_bits() {
        let addr = ObjectAddr::new(0x0000_0001_1234_5678);
        assert_eq!(addr.id32(), 0x1234_5678);
        assert!(ObjectAddr::NULL.is_null());
    }

    #[test]
    fn untagged_clears_access_bit() {
        assert_eq!(ObjectAddr::new(0x1001).untagged(), ObjectAddr::new(0x1000));
        assert_eq!(ObjectAddr::new(0x1000).untagged(), ObjectAddr::new(0x1000));
    }
}
