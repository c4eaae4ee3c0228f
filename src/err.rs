//! Error types for the `probetable` crate

use std::alloc::LayoutError;

/// Errors applicable to constructing and mutating a table
#[derive(Clone, Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The allocator could not provide the requested storage block.
    ///
    /// Raised by construction, or by the grow-resize inside an insert.
    /// In both cases the prior state of the table, if any, is left
    /// completely untouched.
    #[error("failed to allocate {0} bytes of table storage")]
    Alloc(usize),

    /// An equal key already occupies a slot.
    ///
    /// This is a normal outcome of insert rather than a fault: the table
    /// never silently overwrites, and the stored value is left intact.
    /// Callers choose their own update-or-reject policy.
    #[error("key is already present in the table")]
    AlreadyPresent,

    /// The requested slot count is zero or not a power of two.
    ///
    /// Slot counts must be powers of two so the probe sequence can wrap
    /// with a mask instead of a division.
    #[error("slot count must be a nonzero power of two")]
    SlotCount,

    /// The record or storage layout overflows the address space.
    #[error("table storage layout is not representable")]
    Layout(#[from] LayoutError),
}
