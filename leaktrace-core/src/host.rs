//! The host runtime's view of classes and methods.
//!
//! The tracer knows nothing about the runtime's class or method layout. Host
//! types implement these traits so the tracker can pull out the identity it
//! records; [`ClassInfo`] and [`MethodInfo`] are plain implementations for
//! hosts that already have the values at hand.

use crate::types::ObjectAddr;
use std::borrow::Cow;

/// A resolved class of the managed runtime.
pub trait ManagedClass {
    /// Address of the class object; classes are deduplicated by it.
    fn address(&self) -> ObjectAddr;

    /// Index of the class in its defining file's type table.
    fn type_index(&self) -> u32;

    /// Type descriptor, e.g. `Ljava/lang/String;`.
    fn descriptor(&self) -> Cow<'_, str>;
}

/// A linked method of the managed runtime.
pub trait ManagedMethod {
    /// Method name without the declaring class.
    fn name(&self) -> Cow<'_, str>;

    /// Range of the method's compiled code.
    fn code_range(&self) -> CodeRange;
}

/// Location of a method's code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CodeRange {
    /// Offset of the first instruction.
    pub offset: u32,
    /// Size of the code in bytes.
    pub size: u32,
}

impl CodeRange {
    /// Create a code range.
    pub const fn new(offset: u32, size: u32) -> Self {
        Self { offset, size }
    }
}

/// Class identity supplied directly by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassInfo {
    /// Address of the class object.
    pub address: ObjectAddr,
    /// Type index.
    pub type_index: u32,
    /// Type descriptor.
    pub descriptor: String,
}

impl ClassInfo {
    /// Create class info.
    pub fn new(address: ObjectAddr, type_index: u32, descriptor: impl Into<String>) -> Self {
        Self {
            address,
            type_index,
            descriptor: descriptor.into(),
        }
    }
}

impl ManagedClass for ClassInfo {
    fn address(&self) -> ObjectAddr {
        self.address
    }

    fn type_index(&self) -> u32 {
        self.type_index
    }

    fn descriptor(&self) -> Cow<'_, str> {
        Cow::Borrowed(&self.descriptor)
    }
}

/// Method identity supplied directly by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodInfo {
    /// Method name.
    pub name: String,
    /// Code range.
    pub code: CodeRange,
}

impl MethodInfo {
    /// Create method info.
    pub fn new(name: impl Into<String>, code: CodeRange) -> Self {
        Self {
            name: name.into(),
            code,
        }
    }
}

impl ManagedMethod for MethodInfo {
    fn name(&self) -> Cow<'_, str> {
        Cow::Borrowed(&self.name)
    }

    fn code_range(&self) -> CodeRange {
        self.code
    }
}
