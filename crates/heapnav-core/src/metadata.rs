//! # Metadata Collaborators
//!
//! Interfaces the engine consumes to learn what it is looking at.
//!
//! - [`TypeMetadataProvider`] describes the *runtime* side: which type sits at
//!   an address, how arrays and strings are laid out, how big headers are.
//!   Its type names use the angle-bracket grammar (`List<System.Int32>`).
//! - [`LocalTypeCatalog`] describes the *local* side: the shapes a caller
//!   wants values materialized into. Its names use the backtick grammar
//!   (``List`1[[System.Int32]]``).
//!
//! The engine trusts both. Conflicting or stale answers are not detected.

use std::sync::Arc;

use crate::error::HeapResult;
use crate::types::{Address, FieldDescriptor, TypeDescriptor, TypeId};

/// Runtime type information for a snapshot
///
/// ## Lifecycle
///
/// A provider is created alongside the snapshot it describes and outlives
/// every [`Heap`](crate::proxy::Heap) borrowing it. Descriptors it hands out
/// stay valid for the snapshot's lifetime.
pub trait TypeMetadataProvider
{
    /// The concrete runtime type of the object whose header is at `address`
    ///
    /// ## Errors
    ///
    /// - `Read`: the header could not be read
    /// - `UnknownType`: the header names a type the provider does not know
    fn type_at(&self, address: Address) -> HeapResult<Arc<TypeDescriptor>>;

    /// Resolve a type id found in a field or array descriptor
    ///
    /// ## Errors
    ///
    /// - `UnknownType`: the id is not part of this snapshot's metadata
    fn type_by_id(&self, id: TypeId) -> HeapResult<Arc<TypeDescriptor>>;

    /// Fields of `ty`, in declaration order
    ///
    /// The default returns the fields carried by the descriptor.
    fn fields_of<'t>(&self, ty: &'t TypeDescriptor) -> &'t [FieldDescriptor]
    {
        &ty.fields
    }

    /// Runtime element count of the array whose header is at `address`
    fn array_length(&self, address: Address, ty: &TypeDescriptor) -> HeapResult<u64>;

    /// Address of element `index` of the array whose header is at `address`
    ///
    /// For reference elements this is the slot holding the reference; for
    /// scalars and structs it is the element payload. The index is not
    /// bounds-checked.
    fn element_address(&self, address: Address, ty: &TypeDescriptor, index: u64) -> HeapResult<Address>;

    /// Size of the header preceding a reference object's payload
    fn header_size(&self) -> u64;

    /// Decode the string object whose header is at `address`
    fn string_at(&self, address: Address) -> HeapResult<String>;
}

/// Local type shapes that values can be materialized into
pub trait LocalTypeCatalog
{
    /// Describe the local type registered under `name` (backtick grammar)
    fn describe(&self, name: &str) -> Option<Arc<TypeDescriptor>>;

    /// Resolve a type id referenced from a local descriptor's fields or element type
    fn resolve(&self, id: TypeId) -> Option<Arc<TypeDescriptor>>;
}
