//! # Heap Images
//!
//! A self-contained, in-memory heap snapshot.
//!
//! A [`HeapImage`] is one contiguous byte buffer mapped at [`IMAGE_BASE`],
//! plus the table of types its objects use. It serves all three collaborator
//! interfaces at once:
//!
//! - [`MemoryReader`] over its bytes
//! - [`TypeMetadataProvider`], reading type ids out of object headers
//! - [`LocalTypeCatalog`], exposing its own types under bracket-form names
//!
//! Images are put together with [`HeapImageBuilder`]; [`demo`] builds the
//! fixture heap used by the command line tool and the tests.
//!
//! ## Object shapes
//!
//! See [`ObjectLayout`]. Reference slots and array elements of reference
//! type are pointer-sized; primitives use their natural width; structs are
//! stored inline.

pub mod demo;

mod builder;
mod table;

use std::sync::Arc;

use tracing::trace;
use widestring::U16String;

pub use self::builder::HeapImageBuilder;
pub use self::table::TypeTable;
use crate::config::ObjectLayout;
use crate::error::{HeapError, HeapResult, ReadError};
use crate::memory::MemoryReader;
use crate::metadata::{LocalTypeCatalog, TypeMetadataProvider};
use crate::types::{Address, TypeDescriptor, TypeId, TypeKind};

/// Address of the first byte of every image
pub const IMAGE_BASE: Address = Address::new(0x1000_0000);

/// Width of `ty` when stored in a field or array slot
pub(crate) fn slot_size(layout: &ObjectLayout, ty: &TypeDescriptor) -> u64
{
    match ty.kind {
        TypeKind::Primitive(kind) => kind.size(),
        TypeKind::ValueType => ty.size,
        TypeKind::ReferenceType | TypeKind::Array | TypeKind::String => layout.pointer_size,
    }
}

fn to_usize(value: u64) -> Option<usize>
{
    usize::try_from(value).ok()
}

/// An immutable heap snapshot held in memory
#[derive(Debug, Clone)]
pub struct HeapImage
{
    layout: ObjectLayout,
    bytes: Vec<u8>,
    types: TypeTable,
    objects: Vec<Address>,
}

impl HeapImage
{
    pub fn layout(&self) -> ObjectLayout
    {
        self.layout
    }

    pub fn types(&self) -> &TypeTable
    {
        &self.types
    }

    /// Every allocated object, in allocation order
    pub fn object_addresses(&self) -> impl Iterator<Item = Address> + '_
    {
        self.objects.iter().copied()
    }

    pub fn object_count(&self) -> usize
    {
        self.objects.len()
    }

    /// Total bytes in use
    pub fn size(&self) -> usize
    {
        self.bytes.len()
    }

    fn read_uint(&self, address: Address, width: u64) -> Result<u64, ReadError>
    {
        let length = to_usize(width).unwrap_or(usize::MAX);
        let bytes = self.read_bytes(address, length)?;
        let mut raw = [0u8; 8];
        let width = bytes.len().min(8);
        raw[..width].copy_from_slice(&bytes[..width]);
        Ok(u64::from_le_bytes(raw))
    }

    fn element_type(&self, array: &TypeDescriptor) -> HeapResult<Arc<TypeDescriptor>>
    {
        let id = array
            .element_type
            .ok_or_else(|| HeapError::NotAnArray(array.name.clone()))?;
        self.type_by_id(id)
    }
}

impl MemoryReader for HeapImage
{
    fn read_bytes(&self, address: Address, length: usize) -> Result<Vec<u8>, ReadError>
    {
        let range = address
            .offset_from(IMAGE_BASE)
            .and_then(to_usize)
            .and_then(|start| Some(start..start.checked_add(length)?));
        match range.and_then(|range| self.bytes.get(range)) {
            Some(bytes) => Ok(bytes.to_vec()),
            None => Err(ReadError::unmapped(address, length)),
        }
    }

    fn pointer_size(&self) -> usize
    {
        to_usize(self.layout.pointer_size).unwrap_or(8)
    }
}

impl TypeMetadataProvider for HeapImage
{
    fn type_at(&self, address: Address) -> HeapResult<Arc<TypeDescriptor>>
    {
        let raw = self.read_uint(address, self.layout.header_size)?;
        let id = u32::try_from(raw)
            .map(TypeId)
            .map_err(|_| HeapError::UnknownType(format!("type id {raw} in header at {address}")))?;
        self.type_by_id(id)
    }

    fn type_by_id(&self, id: TypeId) -> HeapResult<Arc<TypeDescriptor>>
    {
        self.types
            .get(id)
            .cloned()
            .ok_or_else(|| HeapError::UnknownType(format!("type id {id}")))
    }

    fn array_length(&self, address: Address, _ty: &TypeDescriptor) -> HeapResult<u64>
    {
        Ok(self.read_uint(address + self.layout.header_size, self.layout.array_length_size)?)
    }

    fn element_address(&self, address: Address, ty: &TypeDescriptor, index: u64) -> HeapResult<Address>
    {
        let element = self.element_type(ty)?;
        let stride = slot_size(&self.layout, &element);
        let start = self.layout.header_size + self.layout.array_length_size;
        index
            .checked_mul(stride)
            .and_then(|offset| offset.checked_add(start))
            .and_then(|offset| address.checked_add(offset))
            .ok_or_else(|| ReadError::new(address, 0, format!("element {index} lies outside the address space")).into())
    }

    fn header_size(&self) -> u64
    {
        self.layout.header_size
    }

    fn string_at(&self, address: Address) -> HeapResult<String>
    {
        let payload = address + self.layout.header_size;
        let units = self.read_uint(payload, self.layout.string_length_size)?;
        let length = to_usize(units.saturating_mul(2)).unwrap_or(usize::MAX);
        let bytes = self.read_bytes(payload + self.layout.string_length_size, length)?;
        let units: Vec<u16> = bytes
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        trace!(%address, units = units.len(), "decoding string");
        Ok(U16String::from_vec(units).to_string_lossy())
    }
}

impl LocalTypeCatalog for HeapImage
{
    fn describe(&self, name: &str) -> Option<Arc<TypeDescriptor>>
    {
        self.types.describe(name)
    }

    fn resolve(&self, id: TypeId) -> Option<Arc<TypeDescriptor>>
    {
        self.types.resolve(id)
    }
}
