//! Access-bit tagging of raw object references.
//!
//! While the host inspects an object it may set [`ACCESS_BIT`] in the
//! reference itself instead of storing the mark anywhere else. Any code path
//! that can receive such a tagged reference must pass it through
//! [`clear_access_bit`] before dereferencing it. Type checks on the host's
//! fast paths (for example an "is assignable from" cast check) are the typical
//! callers.
//!
//! Managed objects are at least 8-byte aligned, so bit 0 of a real object
//! address is always clear and free to carry the mark.

/// The reserved bit in an object reference that marks it as being inspected.
pub const ACCESS_BIT: usize = 0x1;

/// Clear the access bit of a raw address.
#[inline]
#[must_use]
pub const fn clear_access_bit_addr(addr: usize) -> usize {
    addr & !ACCESS_BIT
}

/// Set the access bit of a raw address.
#[inline]
#[must_use]
pub const fn set_access_bit_addr(addr: usize) -> usize {
    addr | ACCESS_BIT
}

/// Check whether a raw address carries the access bit.
#[inline]
#[must_use]
pub const fn has_access_bit_addr(addr: usize) -> bool {
    addr & ACCESS_BIT != 0
}

/// Return `ptr` with the access bit cleared.
///
/// The result is bit-equal to `ptr` except for [`ACCESS_BIT`]; an untagged
/// pointer is returned unchanged. Provenance is preserved.
#[inline]
#[must_use]
pub fn clear_access_bit<T: ?Sized>(ptr: *mut T) -> *mut T {
    ptr.map_addr(clear_access_bit_addr)
}

/// Return `ptr` with the access bit set.
#[inline]
#[must_use]
pub fn set_access_bit<T: ?Sized>(ptr: *mut T) -> *mut T {
    ptr.map_addr(set_access_bit_addr)
}

/// Check whether `ptr` carries the access bit.
#[inline]
#[must_use]
pub fn has_access_bit<T: ?Sized>(ptr: *const T) -> bool {
    has_access_bit_addr(ptr.addr())
}
