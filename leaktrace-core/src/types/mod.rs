//! Core types for leaktrace.
//!
//! - `ObjectAddr`: opaque identifier of a managed object
//! - `tag`: the access-bit convention for raw object references

mod addr;
pub mod tag;

pub use addr::ObjectAddr;
pub use tag::{ACCESS_BIT, clear_access_bit, clear_access_bit_addr};
