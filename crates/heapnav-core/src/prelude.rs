//! Common module for library exports

pub use crate::config::{NavigationOptions, ObjectLayout};
pub use crate::error::{HeapError, HeapResult, ReadError};
pub use crate::marshal::Marshaller;
pub use crate::memory::MemoryReader;
pub use crate::metadata::{LocalTypeCatalog, TypeMetadataProvider};
pub use crate::names::{names_match, to_angle_form, to_bracket_form};
pub use crate::proxy::{FieldValue, Heap, Proxy, ProxyNode};
pub use crate::types::{Address, FieldDescriptor, PrimitiveKind, TypeDescriptor, TypeId, TypeKind};
pub use crate::value::{ArrayRef, ArrayValue, ObjectGraph, ObjectRef, ObjectValue, Scalar, Value};
