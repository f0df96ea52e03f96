//! # Heap Image Builder
//!
//! Lays out types and objects into a [`HeapImage`].
//!
//! Types are defined first, then objects are allocated and filled in through
//! path expressions:
//!
//! ```rust
//! use heapnav_core::image::HeapImageBuilder;
//! use heapnav_core::types::PrimitiveKind;
//! use heapnav_core::value::Scalar;
//!
//! let mut builder = HeapImageBuilder::default();
//! let int = builder.primitive(PrimitiveKind::I32);
//! let point = builder.define_struct("Fixtures.Point", &[("X", int), ("Y", int)])?;
//! let shape = builder.define_class("Fixtures.Shape", &[("Origin", point)])?;
//!
//! let object = builder.alloc_object(shape)?;
//! builder.set_scalar(object, "Origin.Y", Scalar::I32(4))?;
//! let image = builder.build();
//! assert_eq!(image.object_count(), 1);
//! # Ok::<(), heapnav_core::error::HeapError>(())
//! ```
//!
//! Field offsets follow natural alignment: each field is aligned to its own
//! width (pointer width for references, the widest member for structs).

use std::collections::HashMap;

use tracing::debug;
use widestring::U16String;

use super::{slot_size, HeapImage, TypeTable, IMAGE_BASE};
use crate::config::ObjectLayout;
use crate::error::{HeapError, HeapResult, ReadError};
use crate::path::{format_path, parse_path, PathSegment};
use crate::types::{Address, FieldDescriptor, PrimitiveKind, TypeDescriptor, TypeId, TypeKind};
use crate::value::Scalar;

/// Where a path step currently stands
#[derive(Clone, Copy)]
enum Cursor
{
    /// Header of an allocated object
    Object(Address),
    /// A field or element slot and its declared type
    Slot(Address, TypeId),
}

/// Incremental builder for [`HeapImage`]s
#[derive(Debug, Clone)]
pub struct HeapImageBuilder
{
    layout: ObjectLayout,
    types: Vec<TypeDescriptor>,
    names: HashMap<String, TypeId>,
    bytes: Vec<u8>,
    objects: Vec<Address>,
}

impl Default for HeapImageBuilder
{
    fn default() -> Self
    {
        Self::new(ObjectLayout::default())
    }
}

impl HeapImageBuilder
{
    pub fn new(layout: ObjectLayout) -> Self
    {
        Self {
            layout,
            types: Vec::new(),
            names: HashMap::new(),
            bytes: Vec::new(),
            objects: Vec::new(),
        }
    }

    pub fn layout(&self) -> ObjectLayout
    {
        self.layout
    }

    /// Id of the type registered under the runtime name `name`
    pub fn type_id(&self, name: &str) -> Option<TypeId>
    {
        self.names.get(name).copied()
    }

    /// The primitive type for `kind`, registering it on first use
    pub fn primitive(&mut self, kind: PrimitiveKind) -> TypeId
    {
        self.intern(kind.type_name(), |id| TypeDescriptor::primitive(id, kind))
    }

    /// The primitive type under its runtime name (`System.Int32`, ...)
    ///
    /// ## Errors
    ///
    /// `UnknownType` if `name` is not a primitive type name.
    pub fn primitive_named(&mut self, name: &str) -> HeapResult<TypeId>
    {
        let kind = PrimitiveKind::from_type_name(name)
            .ok_or_else(|| HeapError::UnknownType(format!("{name} is not a primitive type")))?;
        Ok(self.primitive(kind))
    }

    /// The string type, registering it on first use
    pub fn string_type(&mut self) -> TypeId
    {
        self.intern("System.String", TypeDescriptor::string)
    }

    /// The array type `element[]`, registering it on first use
    ///
    /// ## Errors
    ///
    /// `UnknownType` if `element` was never registered.
    pub fn array_of(&mut self, element: TypeId) -> HeapResult<TypeId>
    {
        let name = format!("{}[]", self.descriptor(element)?.name);
        Ok(self.intern(&name, |id| TypeDescriptor::array(id, name.clone(), element)))
    }

    /// Register a class name with no fields yet
    ///
    /// Lets classes refer to themselves (or to each other) before their
    /// fields are laid out with [`define_fields`](Self::define_fields).
    ///
    /// ## Errors
    ///
    /// `UnsupportedCast` if the name is already taken.
    pub fn declare_class(&mut self, name: &str) -> HeapResult<TypeId>
    {
        self.ensure_free(name)?;
        Ok(self.intern(name, |id| TypeDescriptor::class(id, name, 0, Vec::new())))
    }

    /// Lay out the fields of a declared class
    ///
    /// ## Errors
    ///
    /// - `UnknownType`: `class` or a field type was never registered
    /// - `UnsupportedCast`: `class` is not a class
    pub fn define_fields(&mut self, class: TypeId, fields: &[(&str, TypeId)]) -> HeapResult<()>
    {
        let (fields, size) = self.lay_out(fields)?;
        let ty = self.descriptor_mut(class)?;
        if ty.kind != TypeKind::ReferenceType {
            return Err(HeapError::UnsupportedCast {
                type_name: ty.name.clone(),
                reason: "only classes take fields after declaration".to_string(),
            });
        }
        ty.fields = fields;
        ty.size = size;
        debug!(class = %ty.name, size, "class laid out");
        Ok(())
    }

    /// Declare and lay out a class in one step
    pub fn define_class(&mut self, name: &str, fields: &[(&str, TypeId)]) -> HeapResult<TypeId>
    {
        let id = self.declare_class(name)?;
        self.define_fields(id, fields)?;
        Ok(id)
    }

    /// Lay out a struct
    ///
    /// Field types must already exist, so a struct can never contain itself.
    pub fn define_struct(&mut self, name: &str, fields: &[(&str, TypeId)]) -> HeapResult<TypeId>
    {
        self.ensure_free(name)?;
        let (fields, size) = self.lay_out(fields)?;
        Ok(self.intern(name, |id| TypeDescriptor::value_type(id, name, size, fields)))
    }

    /// Allocate a zeroed object of a class, or a boxed struct or primitive
    ///
    /// ## Errors
    ///
    /// `UnsupportedCast` for strings and arrays, which have their own allocators.
    pub fn alloc_object(&mut self, ty: TypeId) -> HeapResult<Address>
    {
        let descriptor = self.descriptor(ty)?;
        match descriptor.kind {
            TypeKind::ReferenceType | TypeKind::ValueType | TypeKind::Primitive(_) => {
                let size = descriptor.size;
                Ok(self.allocate(ty, size))
            }
            TypeKind::Array | TypeKind::String => Err(HeapError::UnsupportedCast {
                type_name: descriptor.name.clone(),
                reason: "variable-length objects need alloc_array or alloc_string".to_string(),
            }),
        }
    }

    /// Allocate a string object holding `text` as UTF-16
    pub fn alloc_string(&mut self, text: &str) -> Address
    {
        let ty = self.string_type();
        let units = U16String::from_str(text).into_vec();
        let count = units.len() as u64;
        let address = self.allocate(ty, self.layout.string_length_size + count * 2);

        let payload = address + self.layout.header_size;
        self.write_uint(payload, count, self.layout.string_length_size);
        let encoded: Vec<u8> = units.iter().flat_map(|unit| unit.to_le_bytes()).collect();
        self.write_unchecked(payload + self.layout.string_length_size, &encoded);
        address
    }

    /// Allocate a zeroed array of `length` elements
    ///
    /// ## Errors
    ///
    /// `NotAnArray` if `array` is not an array type.
    pub fn alloc_array(&mut self, array: TypeId, length: u64) -> HeapResult<Address>
    {
        let descriptor = self.descriptor(array)?;
        let element = descriptor
            .element_type
            .ok_or_else(|| HeapError::NotAnArray(descriptor.name.clone()))?;
        let stride = slot_size(&self.layout, self.descriptor(element)?);
        let address = self.allocate(array, self.layout.array_length_size.saturating_add(length.saturating_mul(stride)));
        self.write_uint(address + self.layout.header_size, length, self.layout.array_length_size);
        Ok(address)
    }

    /// Store a primitive at `path` inside `object` (`Value`, `Inner.Value`, `[3]`)
    ///
    /// ## Errors
    ///
    /// - `TypeMismatch`: the slot's type is not the scalar's primitive
    /// - any path resolution error
    pub fn set_scalar(&mut self, object: Address, path: &str, scalar: Scalar) -> HeapResult<()>
    {
        let (location, ty) = self.locate(object, path)?;
        let descriptor = self.descriptor(ty)?;
        if descriptor.kind != TypeKind::Primitive(scalar.kind()) {
            return Err(HeapError::TypeMismatch {
                expected: descriptor.name.clone(),
                actual: scalar.kind().type_name().to_string(),
            });
        }
        self.write(location, &scalar.to_le_bytes())
    }

    /// Store a reference to `target` (or null) at `path` inside `object`
    ///
    /// ## Errors
    ///
    /// - `TypeMismatch`: the slot does not hold references
    /// - any path resolution error
    pub fn set_reference(&mut self, object: Address, path: &str, target: Address) -> HeapResult<()>
    {
        let (location, ty) = self.locate(object, path)?;
        let descriptor = self.descriptor(ty)?;
        if !descriptor.kind.is_reference() {
            return Err(HeapError::TypeMismatch {
                expected: descriptor.name.clone(),
                actual: "a reference".to_string(),
            });
        }
        let width = self.layout.pointer_size;
        if !self.write_uint(location, target.value(), width) {
            return Err(ReadError::unmapped(location, usize::try_from(width).unwrap_or(usize::MAX)).into());
        }
        Ok(())
    }

    /// Allocate a string and store a reference to it at `path`
    pub fn set_text(&mut self, object: Address, path: &str, text: &str) -> HeapResult<Address>
    {
        let string = self.alloc_string(text);
        self.set_reference(object, path, string)?;
        Ok(string)
    }

    pub fn build(self) -> HeapImage
    {
        debug!(
            types = self.types.len(),
            objects = self.objects.len(),
            bytes = self.bytes.len(),
            "heap image built"
        );
        HeapImage {
            layout: self.layout,
            bytes: self.bytes,
            types: TypeTable::new(self.types),
            objects: self.objects,
        }
    }

    fn intern(&mut self, name: &str, make: impl FnOnce(TypeId) -> TypeDescriptor) -> TypeId
    {
        if let Some(id) = self.names.get(name) {
            return *id;
        }
        let id = TypeId(u32::try_from(self.types.len()).unwrap_or(u32::MAX));
        self.types.push(make(id));
        self.names.insert(name.to_string(), id);
        id
    }

    fn ensure_free(&self, name: &str) -> HeapResult<()>
    {
        if self.names.contains_key(name) {
            return Err(HeapError::UnsupportedCast {
                type_name: name.to_string(),
                reason: "a type with this name is already registered".to_string(),
            });
        }
        Ok(())
    }

    fn descriptor(&self, id: TypeId) -> HeapResult<&TypeDescriptor>
    {
        usize::try_from(id.raw())
            .ok()
            .and_then(|index| self.types.get(index))
            .ok_or_else(|| HeapError::UnknownType(format!("type id {id}")))
    }

    fn descriptor_mut(&mut self, id: TypeId) -> HeapResult<&mut TypeDescriptor>
    {
        usize::try_from(id.raw())
            .ok()
            .and_then(|index| self.types.get_mut(index))
            .ok_or_else(|| HeapError::UnknownType(format!("type id {id}")))
    }

    fn alignment(&self, ty: &TypeDescriptor) -> u64
    {
        match ty.kind {
            TypeKind::Primitive(kind) => kind.size(),
            TypeKind::ReferenceType | TypeKind::Array | TypeKind::String => self.layout.pointer_size,
            TypeKind::ValueType => ty
                .fields
                .iter()
                .filter_map(|field| self.descriptor(field.type_id).ok())
                .map(|field| self.alignment(field))
                .max()
                .unwrap_or(1),
        }
    }

    fn lay_out(&self, fields: &[(&str, TypeId)]) -> HeapResult<(Vec<FieldDescriptor>, u64)>
    {
        let mut offset = 0u64;
        let mut widest = 1u64;
        let mut laid_out = Vec::with_capacity(fields.len());
        for (name, id) in fields {
            let ty = self.descriptor(*id)?;
            let align = self.alignment(ty).max(1);
            offset = offset.next_multiple_of(align);
            laid_out.push(FieldDescriptor::of_type(*name, offset, ty));
            offset += slot_size(&self.layout, ty);
            widest = widest.max(align);
        }
        Ok((laid_out, offset.next_multiple_of(widest)))
    }

    fn allocate(&mut self, ty: TypeId, payload: u64) -> Address
    {
        let align = usize::try_from(self.layout.pointer_size).unwrap_or(8);
        let start = self.bytes.len().next_multiple_of(align);
        let total = usize::try_from(self.layout.header_size + payload).unwrap_or(0);
        self.bytes.resize(start + total, 0);

        let address = IMAGE_BASE + start as u64;
        self.write_uint(address, u64::from(ty.raw()), self.layout.header_size);
        self.objects.push(address);
        address
    }

    fn range(&self, address: Address, length: usize) -> Option<std::ops::Range<usize>>
    {
        let start = usize::try_from(address.offset_from(IMAGE_BASE)?).ok()?;
        let end = start.checked_add(length)?;
        (end <= self.bytes.len()).then_some(start..end)
    }

    fn write(&mut self, address: Address, data: &[u8]) -> HeapResult<()>
    {
        let range = self
            .range(address, data.len())
            .ok_or_else(|| ReadError::unmapped(address, data.len()))?;
        self.bytes[range].copy_from_slice(data);
        Ok(())
    }

    /// Write into a range this builder allocated itself.
    fn write_unchecked(&mut self, address: Address, data: &[u8])
    {
        if let Some(range) = self.range(address, data.len()) {
            self.bytes[range].copy_from_slice(data);
        }
    }

    /// Write the low `width` bytes of `value`; false if the range is unmapped.
    fn write_uint(&mut self, address: Address, value: u64, width: u64) -> bool
    {
        let width = usize::try_from(width).unwrap_or(8).min(8);
        match self.range(address, width) {
            Some(range) => {
                self.bytes[range].copy_from_slice(&value.to_le_bytes()[..width]);
                true
            }
            None => false,
        }
    }

    fn read_uint(&self, address: Address, width: u64) -> HeapResult<u64>
    {
        let width = usize::try_from(width).unwrap_or(8).min(8);
        let range = self.range(address, width).ok_or_else(|| ReadError::unmapped(address, width))?;
        let mut raw = [0u8; 8];
        raw[..width].copy_from_slice(&self.bytes[range]);
        Ok(u64::from_le_bytes(raw))
    }

    fn type_at(&self, object: Address) -> HeapResult<&TypeDescriptor>
    {
        let raw = self.read_uint(object, self.layout.header_size)?;
        self.descriptor(TypeId(u32::try_from(raw).unwrap_or(u32::MAX)))
    }

    /// Resolve `path` from `object` to a slot address and its declared type.
    fn locate(&self, object: Address, path: &str) -> HeapResult<(Address, TypeId)>
    {
        let segments = parse_path(path)?;
        let mut cursor = Cursor::Object(object);

        for (position, segment) in segments.iter().enumerate() {
            // Step into the current value: follow references, stay inline for structs
            let (container, ty, interior) = match cursor {
                Cursor::Object(address) => (address, self.type_at(address)?, false),
                Cursor::Slot(location, id) => {
                    let ty = self.descriptor(id)?;
                    if ty.kind.is_reference() {
                        let target = Address::new(self.read_uint(location, self.layout.pointer_size)?);
                        if target.is_null() {
                            return Err(HeapError::NullReference(format_path(&segments[..position])));
                        }
                        (target, self.type_at(target)?, false)
                    } else {
                        (location, ty, true)
                    }
                }
            };

            cursor = match segment {
                PathSegment::Field(name) => {
                    let field = ty.field(name).ok_or_else(|| HeapError::FieldNotFound {
                        type_name: ty.name.clone(),
                        field: name.clone(),
                    })?;
                    let payload = if interior { container } else { container + self.layout.header_size };
                    Cursor::Slot(payload + field.offset, field.type_id)
                }
                PathSegment::Index(index) => {
                    let element = ty.element_type.ok_or_else(|| HeapError::NotAnArray(ty.name.clone()))?;
                    let header = container + self.layout.header_size;
                    let length = self.read_uint(header, self.layout.array_length_size)?;
                    if *index >= length {
                        return Err(HeapError::InvalidPath(format!(
                            "{path}: index {index} is out of bounds for length {length}"
                        )));
                    }
                    let stride = slot_size(&self.layout, self.descriptor(element)?);
                    Cursor::Slot(header + self.layout.array_length_size + index * stride, element)
                }
            };
        }

        match cursor {
            Cursor::Slot(location, id) => Ok((location, id)),
            Cursor::Object(_) => Err(HeapError::InvalidPath(format!("{path}: names no slot"))),
        }
    }
}
