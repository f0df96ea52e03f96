//! Decoded values.
//!
//! [`Scalar`] is what a primitive slot decodes to. [`Value`] and
//! [`ObjectGraph`] are what the [`Marshaller`](crate::marshal::Marshaller)
//! produces: owned local copies that no longer refer to snapshot memory.
//!
//! Class instances and arrays are not nested inside one another. Each one is
//! stored once in the graph, keyed by the address it was decoded from, and
//! referenced through an [`ObjectRef`] or [`ArrayRef`]. Shared and cyclic
//! references keep their topology without any cyclic ownership.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::types::{Address, PrimitiveKind};

/// A decoded primitive
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Scalar
{
    Bool(bool),
    /// UTF-16 code unit
    Char(u16),
    I8(i8),
    U8(u8),
    I16(i16),
    U16(u16),
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    F32(f32),
    F64(f64),
    IntPtr(i64),
    UIntPtr(u64),
}

fn le<const N: usize>(bytes: &[u8]) -> Option<[u8; N]>
{
    bytes.get(..N)?.try_into().ok()
}

impl Scalar
{
    /// Decode a little-endian primitive from the start of `bytes`.
    ///
    /// Returns `None` if `bytes` is shorter than the primitive's width.
    pub fn decode(kind: PrimitiveKind, bytes: &[u8]) -> Option<Self>
    {
        let scalar = match kind {
            PrimitiveKind::Bool => Scalar::Bool(*bytes.first()? != 0),
            PrimitiveKind::Char => Scalar::Char(u16::from_le_bytes(le(bytes)?)),
            PrimitiveKind::I8 => Scalar::I8(i8::from_le_bytes(le(bytes)?)),
            PrimitiveKind::U8 => Scalar::U8(*bytes.first()?),
            PrimitiveKind::I16 => Scalar::I16(i16::from_le_bytes(le(bytes)?)),
            PrimitiveKind::U16 => Scalar::U16(u16::from_le_bytes(le(bytes)?)),
            PrimitiveKind::I32 => Scalar::I32(i32::from_le_bytes(le(bytes)?)),
            PrimitiveKind::U32 => Scalar::U32(u32::from_le_bytes(le(bytes)?)),
            PrimitiveKind::I64 => Scalar::I64(i64::from_le_bytes(le(bytes)?)),
            PrimitiveKind::U64 => Scalar::U64(u64::from_le_bytes(le(bytes)?)),
            PrimitiveKind::F32 => Scalar::F32(f32::from_le_bytes(le(bytes)?)),
            PrimitiveKind::F64 => Scalar::F64(f64::from_le_bytes(le(bytes)?)),
            PrimitiveKind::IntPtr => Scalar::IntPtr(i64::from_le_bytes(le(bytes)?)),
            PrimitiveKind::UIntPtr => Scalar::UIntPtr(u64::from_le_bytes(le(bytes)?)),
        };
        Some(scalar)
    }

    /// Little-endian encoding, the inverse of [`Scalar::decode`]
    pub fn to_le_bytes(self) -> Vec<u8>
    {
        match self {
            Scalar::Bool(v) => vec![u8::from(v)],
            Scalar::Char(v) | Scalar::U16(v) => v.to_le_bytes().to_vec(),
            Scalar::I8(v) => v.to_le_bytes().to_vec(),
            Scalar::U8(v) => vec![v],
            Scalar::I16(v) => v.to_le_bytes().to_vec(),
            Scalar::I32(v) => v.to_le_bytes().to_vec(),
            Scalar::U32(v) => v.to_le_bytes().to_vec(),
            Scalar::I64(v) | Scalar::IntPtr(v) => v.to_le_bytes().to_vec(),
            Scalar::U64(v) | Scalar::UIntPtr(v) => v.to_le_bytes().to_vec(),
            Scalar::F32(v) => v.to_le_bytes().to_vec(),
            Scalar::F64(v) => v.to_le_bytes().to_vec(),
        }
    }

    pub fn kind(self) -> PrimitiveKind
    {
        match self {
            Scalar::Bool(_) => PrimitiveKind::Bool,
            Scalar::Char(_) => PrimitiveKind::Char,
            Scalar::I8(_) => PrimitiveKind::I8,
            Scalar::U8(_) => PrimitiveKind::U8,
            Scalar::I16(_) => PrimitiveKind::I16,
            Scalar::U16(_) => PrimitiveKind::U16,
            Scalar::I32(_) => PrimitiveKind::I32,
            Scalar::U32(_) => PrimitiveKind::U32,
            Scalar::I64(_) => PrimitiveKind::I64,
            Scalar::U64(_) => PrimitiveKind::U64,
            Scalar::F32(_) => PrimitiveKind::F32,
            Scalar::F64(_) => PrimitiveKind::F64,
            Scalar::IntPtr(_) => PrimitiveKind::IntPtr,
            Scalar::UIntPtr(_) => PrimitiveKind::UIntPtr,
        }
    }

    /// Integer value widened to `i64`, if it fits
    pub fn as_i64(self) -> Option<i64>
    {
        match self {
            Scalar::I8(v) => Some(i64::from(v)),
            Scalar::U8(v) => Some(i64::from(v)),
            Scalar::I16(v) => Some(i64::from(v)),
            Scalar::U16(v) | Scalar::Char(v) => Some(i64::from(v)),
            Scalar::I32(v) => Some(i64::from(v)),
            Scalar::U32(v) => Some(i64::from(v)),
            Scalar::I64(v) | Scalar::IntPtr(v) => Some(v),
            Scalar::U64(v) | Scalar::UIntPtr(v) => i64::try_from(v).ok(),
            Scalar::Bool(_) | Scalar::F32(_) | Scalar::F64(_) => None,
        }
    }

    /// Integer value widened to `u64`, if it is non-negative
    pub fn as_u64(self) -> Option<u64>
    {
        match self {
            Scalar::U64(v) | Scalar::UIntPtr(v) => Some(v),
            other => other.as_i64().and_then(|v| u64::try_from(v).ok()),
        }
    }

    pub fn as_f64(self) -> Option<f64>
    {
        match self {
            Scalar::F32(v) => Some(f64::from(v)),
            Scalar::F64(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bool(self) -> Option<bool>
    {
        match self {
            Scalar::Bool(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for Scalar
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            Scalar::Bool(v) => write!(f, "{v}"),
            Scalar::Char(v) => match char::from_u32(u32::from(*v)) {
                Some(c) => write!(f, "'{c}'"),
                None => write!(f, "'\\u{{{v:04x}}}'"),
            },
            Scalar::I8(v) => write!(f, "{v}"),
            Scalar::U8(v) => write!(f, "{v}"),
            Scalar::I16(v) => write!(f, "{v}"),
            Scalar::U16(v) => write!(f, "{v}"),
            Scalar::I32(v) => write!(f, "{v}"),
            Scalar::U32(v) => write!(f, "{v}"),
            Scalar::I64(v) | Scalar::IntPtr(v) => write!(f, "{v}"),
            Scalar::U64(v) | Scalar::UIntPtr(v) => write!(f, "{v}"),
            Scalar::F32(v) => write!(f, "{v}"),
            Scalar::F64(v) => write!(f, "{v}"),
        }
    }
}

/// Handle to a class instance stored in an [`ObjectGraph`]
///
/// Two handles are equal exactly when they denote the same instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectRef(pub(crate) Address);

impl ObjectRef
{
    /// Snapshot address the instance was decoded from
    pub fn address(self) -> Address
    {
        self.0
    }
}

/// Handle to an array stored in an [`ObjectGraph`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArrayRef(pub(crate) Address);

impl ArrayRef
{
    /// Snapshot address the array was decoded from
    pub fn address(self) -> Address
    {
        self.0
    }
}

/// A materialized local value
#[derive(Debug, Clone, PartialEq)]
pub enum Value
{
    /// Absent reference
    Null,
    Scalar(Scalar),
    Text(Arc<str>),
    /// Value type, held inline
    Struct(StructValue),
    /// Array, held in the graph
    Array(ArrayRef),
    /// Class instance, held in the graph
    Object(ObjectRef),
}

impl Value
{
    pub fn is_null(&self) -> bool
    {
        matches!(self, Value::Null)
    }

    pub fn as_scalar(&self) -> Option<Scalar>
    {
        match self {
            Value::Scalar(scalar) => Some(*scalar),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str>
    {
        match self {
            Value::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_struct(&self) -> Option<&StructValue>
    {
        match self {
            Value::Struct(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<ArrayRef>
    {
        match self {
            Value::Array(array) => Some(*array),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<ObjectRef>
    {
        match self {
            Value::Object(object) => Some(*object),
            _ => None,
        }
    }
}

/// Named field values in declaration order
pub type Fields = Vec<(String, Value)>;

fn find<'f>(fields: &'f Fields, name: &str) -> Option<&'f Value>
{
    fields.iter().find(|(field, _)| field == name).map(|(_, value)| value)
}

/// A decoded value type
#[derive(Debug, Clone, PartialEq)]
pub struct StructValue
{
    pub type_name: String,
    pub fields: Fields,
}

impl StructValue
{
    pub fn field(&self, name: &str) -> Option<&Value>
    {
        find(&self.fields, name)
    }
}

/// A decoded class instance
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectValue
{
    pub type_name: String,
    pub address: Address,
    pub fields: Fields,
}

impl ObjectValue
{
    pub fn field(&self, name: &str) -> Option<&Value>
    {
        find(&self.fields, name)
    }
}

/// A decoded array
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayValue
{
    pub type_name: String,
    pub address: Address,
    pub items: Vec<Value>,
}

/// Result of one materialization: a root value and every instance it reaches
#[derive(Debug, Clone)]
pub struct ObjectGraph
{
    root: Value,
    objects: HashMap<Address, ObjectValue>,
    arrays: HashMap<Address, ArrayValue>,
}

impl ObjectGraph
{
    pub(crate) fn new(root: Value, objects: HashMap<Address, ObjectValue>, arrays: HashMap<Address, ArrayValue>) -> Self
    {
        Self { root, objects, arrays }
    }

    pub fn root(&self) -> &Value
    {
        &self.root
    }

    pub fn into_root(self) -> Value
    {
        self.root
    }

    /// The instance behind a handle
    pub fn object(&self, object: ObjectRef) -> Option<&ObjectValue>
    {
        self.objects.get(&object.0)
    }

    /// The instance behind an `Object` value; `None` for every other variant
    pub fn resolve(&self, value: &Value) -> Option<&ObjectValue>
    {
        value.as_object().and_then(|object| self.object(object))
    }

    /// The root's instance, when the root is a class
    pub fn root_object(&self) -> Option<&ObjectValue>
    {
        self.resolve(&self.root)
    }

    pub fn array(&self, array: ArrayRef) -> Option<&ArrayValue>
    {
        self.arrays.get(&array.0)
    }

    /// Elements of the array behind an `Array` value
    pub fn items(&self, value: &Value) -> Option<&[Value]>
    {
        value
            .as_array()
            .and_then(|array| self.array(array))
            .map(|array| array.items.as_slice())
    }

    /// Number of distinct class instances decoded
    pub fn object_count(&self) -> usize
    {
        self.objects.len()
    }

    /// Number of distinct arrays decoded
    pub fn array_count(&self) -> usize
    {
        self.arrays.len()
    }
}
