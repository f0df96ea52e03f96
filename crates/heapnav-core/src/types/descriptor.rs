//! Type and field descriptors.
//!
//! Descriptors are owned by whoever supplies the metadata (the snapshot's
//! [`TypeMetadataProvider`](crate::metadata::TypeMetadataProvider) or a
//! [`LocalTypeCatalog`](crate::metadata::LocalTypeCatalog)) and shared as
//! `Arc<TypeDescriptor>`. Nothing in the engine mutates them.
//!
//! Field types are referenced by [`TypeId`] rather than by pointer so that
//! self-referential types (`class Node { Node next; }`) can be described
//! without ownership cycles. The owner resolves ids back to descriptors.

use std::collections::HashMap;
use std::fmt;

use once_cell::sync::Lazy;

/// Identifier of a type within one metadata source
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TypeId(pub u32);

impl TypeId
{
    /// Get the raw `u32` value of this id
    pub fn raw(self) -> u32
    {
        self.0
    }
}

impl From<u32> for TypeId
{
    fn from(value: u32) -> Self
    {
        Self(value)
    }
}

impl fmt::Display for TypeId
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "#{}", self.0)
    }
}

/// Primitive encodings, with their width and signedness
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveKind
{
    Bool,
    /// UTF-16 code unit
    Char,
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    F32,
    F64,
    /// Pointer-sized signed integer, stored as 8 bytes
    IntPtr,
    /// Pointer-sized unsigned integer, stored as 8 bytes
    UIntPtr,
}

static PRIMITIVE_NAMES: Lazy<HashMap<&'static str, PrimitiveKind>> = Lazy::new(|| {
    HashMap::from([
        ("System.Boolean", PrimitiveKind::Bool),
        ("System.Char", PrimitiveKind::Char),
        ("System.SByte", PrimitiveKind::I8),
        ("System.Byte", PrimitiveKind::U8),
        ("System.Int16", PrimitiveKind::I16),
        ("System.UInt16", PrimitiveKind::U16),
        ("System.Int32", PrimitiveKind::I32),
        ("System.UInt32", PrimitiveKind::U32),
        ("System.Int64", PrimitiveKind::I64),
        ("System.UInt64", PrimitiveKind::U64),
        ("System.Single", PrimitiveKind::F32),
        ("System.Double", PrimitiveKind::F64),
        ("System.IntPtr", PrimitiveKind::IntPtr),
        ("System.UIntPtr", PrimitiveKind::UIntPtr),
    ])
});

impl PrimitiveKind
{
    /// Width of the encoded value in bytes
    pub const fn size(self) -> u64
    {
        match self {
            PrimitiveKind::Bool | PrimitiveKind::I8 | PrimitiveKind::U8 => 1,
            PrimitiveKind::Char | PrimitiveKind::I16 | PrimitiveKind::U16 => 2,
            PrimitiveKind::I32 | PrimitiveKind::U32 | PrimitiveKind::F32 => 4,
            PrimitiveKind::I64
            | PrimitiveKind::U64
            | PrimitiveKind::F64
            | PrimitiveKind::IntPtr
            | PrimitiveKind::UIntPtr => 8,
        }
    }

    /// Map a well-known runtime type name (`System.Int32`, ...) to its encoding.
    pub fn from_type_name(name: &str) -> Option<Self>
    {
        PRIMITIVE_NAMES.get(name).copied()
    }

    /// Canonical runtime type name of this encoding.
    pub fn type_name(self) -> &'static str
    {
        match self {
            PrimitiveKind::Bool => "System.Boolean",
            PrimitiveKind::Char => "System.Char",
            PrimitiveKind::I8 => "System.SByte",
            PrimitiveKind::U8 => "System.Byte",
            PrimitiveKind::I16 => "System.Int16",
            PrimitiveKind::U16 => "System.UInt16",
            PrimitiveKind::I32 => "System.Int32",
            PrimitiveKind::U32 => "System.UInt32",
            PrimitiveKind::I64 => "System.Int64",
            PrimitiveKind::U64 => "System.UInt64",
            PrimitiveKind::F32 => "System.Single",
            PrimitiveKind::F64 => "System.Double",
            PrimitiveKind::IntPtr => "System.IntPtr",
            PrimitiveKind::UIntPtr => "System.UIntPtr",
        }
    }
}

/// Broad shape of a type, deciding how its values are read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind
{
    /// Fixed-width scalar
    Primitive(PrimitiveKind),
    /// Struct stored inline in its container
    ValueType,
    /// Class instance living behind a reference
    ReferenceType,
    /// Variable-length array behind a reference
    Array,
    /// Immutable text behind a reference
    String,
}

impl TypeKind
{
    /// Whether values of this kind are stored as a reference slot in their container
    pub fn is_reference(self) -> bool
    {
        matches!(self, TypeKind::ReferenceType | TypeKind::Array | TypeKind::String)
    }

    /// Primitives and strings, which decode without structural navigation
    pub fn is_simple_scalar(self) -> bool
    {
        matches!(self, TypeKind::Primitive(_) | TypeKind::String)
    }
}

/// Description of one field inside a type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor
{
    pub name: String,
    /// Byte offset from the start of the containing value's payload (header excluded)
    pub offset: u64,
    pub type_id: TypeId,
    /// True for primitives and strings
    pub is_simple_scalar: bool,
}

impl FieldDescriptor
{
    pub fn new(name: impl Into<String>, offset: u64, type_id: TypeId, is_simple_scalar: bool) -> Self
    {
        Self {
            name: name.into(),
            offset,
            type_id,
            is_simple_scalar,
        }
    }

    /// Build a field whose type descriptor is already known.
    pub fn of_type(name: impl Into<String>, offset: u64, ty: &TypeDescriptor) -> Self
    {
        Self::new(name, offset, ty.id, ty.kind.is_simple_scalar())
    }
}

/// Description of a type: its name, shape, size and fields
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDescriptor
{
    pub id: TypeId,
    pub name: String,
    pub kind: TypeKind,
    /// Payload size in bytes, header excluded. Zero for arrays and strings.
    pub size: u64,
    pub fields: Vec<FieldDescriptor>,
    /// Element type, arrays only
    pub element_type: Option<TypeId>,
}

impl TypeDescriptor
{
    /// A primitive type under its canonical runtime name.
    pub fn primitive(id: TypeId, kind: PrimitiveKind) -> Self
    {
        Self {
            id,
            name: kind.type_name().to_string(),
            kind: TypeKind::Primitive(kind),
            size: kind.size(),
            fields: Vec::new(),
            element_type: None,
        }
    }

    pub fn string(id: TypeId) -> Self
    {
        Self {
            id,
            name: "System.String".to_string(),
            kind: TypeKind::String,
            size: 0,
            fields: Vec::new(),
            element_type: None,
        }
    }

    pub fn array(id: TypeId, name: impl Into<String>, element_type: TypeId) -> Self
    {
        Self {
            id,
            name: name.into(),
            kind: TypeKind::Array,
            size: 0,
            fields: Vec::new(),
            element_type: Some(element_type),
        }
    }

    pub fn value_type(id: TypeId, name: impl Into<String>, size: u64, fields: Vec<FieldDescriptor>) -> Self
    {
        Self {
            id,
            name: name.into(),
            kind: TypeKind::ValueType,
            size,
            fields,
            element_type: None,
        }
    }

    pub fn class(id: TypeId, name: impl Into<String>, size: u64, fields: Vec<FieldDescriptor>) -> Self
    {
        Self {
            id,
            name: name.into(),
            kind: TypeKind::ReferenceType,
            size,
            fields,
            element_type: None,
        }
    }

    /// Look up a field by its exact name
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor>
    {
        self.fields.iter().find(|field| field.name == name)
    }

    pub fn is_array(&self) -> bool
    {
        self.kind == TypeKind::Array
    }

    pub fn is_value_type(&self) -> bool
    {
        self.kind == TypeKind::ValueType
    }
}
