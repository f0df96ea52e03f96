//! # Error Types
//!
//! Error handling for navigation and decoding.
//!
//! We use `thiserror` to automatically generate `Error` trait implementations
//! and nice error messages.
//!
//! Every failure here is local and recoverable: it is returned at the point
//! where it happens, leaves no engine state behind, and is never retried
//! internally.

use thiserror::Error;

use crate::types::Address;

/// A memory read failed
///
/// Produced by [`MemoryReader`](crate::memory::MemoryReader) implementations
/// when a range is unmapped or the snapshot is no longer available, and
/// propagated unchanged through navigation and materialization.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Failed to read {length} bytes at {address}: {reason}")]
pub struct ReadError
{
    /// Start of the requested range
    pub address: Address,
    /// Number of bytes requested
    pub length: usize,
    /// Why the read failed
    pub reason: String,
}

impl ReadError
{
    pub fn new(address: Address, length: usize, reason: impl Into<String>) -> Self
    {
        Self {
            address,
            length,
            reason: reason.into(),
        }
    }

    /// The range is not backed by the snapshot
    pub fn unmapped(address: Address, length: usize) -> Self
    {
        Self::new(address, length, "address range is not mapped in the snapshot")
    }
}

/// Main error type for heap navigation and materialization
///
/// ## Error Categories
///
/// 1. **Lookup errors**: FieldNotFound, NotAnArray, UnknownType
/// 2. **Decode errors**: TypeMismatch, UnsupportedCast
/// 3. **Path errors**: InvalidPath, NullReference
/// 4. **Memory errors**: Read
#[derive(Error, Debug)]
pub enum HeapError
{
    /// The field name does not resolve on the type
    ///
    /// Raised after both the literal name and the synthesized backing-field
    /// name (`<Name>k__BackingField`) have been tried.
    #[error("Field not found: {field} on {type_name}")]
    FieldNotFound
    {
        /// Runtime type that was searched
        type_name: String,
        /// Name the caller asked for
        field: String,
    },

    /// An array operation was applied to a non-array type
    #[error("{0} is not an array")]
    NotAnArray(String),

    /// The requested target type does not match the runtime type
    ///
    /// Guards against decoding an object as the wrong local type.
    #[error("Type mismatch: expected {expected}, found {actual}")]
    TypeMismatch
    {
        /// Name of the requested local type
        expected: String,
        /// Runtime type name, translated to the local naming convention
        actual: String,
    },

    /// The target type cannot be reconstructed from the runtime value
    ///
    /// Examples:
    /// - A struct holding an array or a reference (not blittable)
    /// - An array requested as a plain struct
    #[error("Cannot convert {type_name}: {reason}")]
    UnsupportedCast
    {
        /// Type that was requested
        type_name: String,
        /// Details about the incompatibility
        reason: String,
    },

    /// A type id or name could not be resolved by the metadata source
    #[error("Unknown type: {0}")]
    UnknownType(String),

    /// A navigation path expression could not be parsed
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// A navigation path stepped through an absent (null) value
    #[error("Null reference at {0}")]
    NullReference(String),

    /// Memory read error, propagated verbatim from the reader
    #[error(transparent)]
    Read(#[from] ReadError),
}

/// Convenience type alias for `Result<T, HeapError>`
///
/// ```rust
/// use heapnav_core::error::HeapResult;
/// fn foo() -> HeapResult<()>
/// {
///     Ok(())
/// }
/// ```
pub type HeapResult<T> = std::result::Result<T, HeapError>;
