//! # Proxy Navigation
//!
//! Lazy, field-by-field navigation of objects in a snapshot.
//!
//! A [`ProxyNode`] is an `(address, type, interior)` triple. Navigating never
//! mutates a node: every field access or index produces a new one, and bytes
//! are read only when a scalar is actually requested.
//!
//! ## Usage
//!
//! ```rust
//! use heapnav_core::image::demo;
//! use heapnav_core::proxy::Heap;
//!
//! let image = demo::build()?;
//! let heap = Heap::new(&image, &image);
//! let proxies = heap.proxies_of_type(image.object_addresses(), "Fixtures.ClassWithArray")?;
//!
//! let values = proxies[0].field("Values")?.into_proxy().expect("array reference");
//! assert_eq!(values.length()?, 10);
//! assert_eq!(values.element(2)?.as_scalar().and_then(|s| s.as_i64()), Some(8));
//! # Ok::<(), heapnav_core::error::HeapError>(())
//! ```

use std::fmt;
use std::sync::Arc;

use tracing::trace;

use crate::config::NavigationOptions;
use crate::error::{HeapError, HeapResult};
use crate::memory::MemoryReader;
use crate::metadata::TypeMetadataProvider;
use crate::names::names_match;
use crate::path::{format_path, parse_path, PathSegment};
use crate::types::{Address, FieldDescriptor, TypeDescriptor, TypeKind};
use crate::value::Scalar;

/// Name of the storage field generated for an auto-implemented property
///
/// ```rust
/// assert_eq!(heapnav_core::proxy::backing_field_name("Field"), "<Field>k__BackingField");
/// ```
pub fn backing_field_name(property: &str) -> String
{
    format!("<{property}>k__BackingField")
}

/// Look a field up by name, then by its backing-field name when `fallback` is set.
pub(crate) fn lookup_field<'t>(
    metadata: &dyn TypeMetadataProvider,
    ty: &'t TypeDescriptor,
    name: &str,
    fallback: bool,
) -> HeapResult<&'t FieldDescriptor>
{
    let fields = metadata.fields_of(ty);
    let found = fields.iter().find(|field| field.name == name).or_else(|| {
        if fallback {
            let backing = backing_field_name(name);
            fields.iter().find(|field| field.name == backing)
        } else {
            None
        }
    });
    found.ok_or_else(|| HeapError::FieldNotFound {
        type_name: ty.name.clone(),
        field: name.to_string(),
    })
}

/// Location and type of a value in the snapshot
///
/// - `interior == false`: `address` is a reference object's header; the
///   payload starts `header_size` bytes later.
/// - `interior == true`: `address` already points at the payload (a struct
///   embedded in a container, or an array element).
#[derive(Debug, Clone)]
pub struct ProxyNode
{
    address: Address,
    ty: Arc<TypeDescriptor>,
    interior: bool,
}

impl ProxyNode
{
    /// A node for the object whose header is at `address`
    pub fn object(address: Address, ty: Arc<TypeDescriptor>) -> Self
    {
        Self {
            address,
            ty,
            interior: false,
        }
    }

    /// A node for a payload embedded at `address`
    pub fn interior(address: Address, ty: Arc<TypeDescriptor>) -> Self
    {
        Self {
            address,
            ty,
            interior: true,
        }
    }

    pub fn address(&self) -> Address
    {
        self.address
    }

    pub fn ty(&self) -> &Arc<TypeDescriptor>
    {
        &self.ty
    }

    pub fn is_interior(&self) -> bool
    {
        self.interior
    }

    /// Start of the value's payload, skipping the header of non-interior nodes
    pub fn payload_address(&self, header_size: u64) -> Address
    {
        if self.interior {
            self.address
        } else {
            self.address + header_size
        }
    }
}

/// Borrowed view of a snapshot: memory plus runtime metadata
///
/// `Heap` is `Copy`; it only holds references to its collaborators.
#[derive(Clone, Copy)]
pub struct Heap<'a>
{
    memory: &'a dyn MemoryReader,
    metadata: &'a dyn TypeMetadataProvider,
    options: NavigationOptions,
}

impl fmt::Debug for Heap<'_>
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.debug_struct("Heap")
            .field("header_size", &self.metadata.header_size())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl<'a> Heap<'a>
{
    pub fn new(memory: &'a dyn MemoryReader, metadata: &'a dyn TypeMetadataProvider) -> Self
    {
        Self {
            memory,
            metadata,
            options: NavigationOptions::default(),
        }
    }

    #[must_use]
    pub fn with_options(mut self, options: NavigationOptions) -> Self
    {
        self.options = options;
        self
    }

    pub fn memory(&self) -> &'a dyn MemoryReader
    {
        self.memory
    }

    pub fn metadata(&self) -> &'a dyn TypeMetadataProvider
    {
        self.metadata
    }

    pub fn options(&self) -> NavigationOptions
    {
        self.options
    }

    /// Proxy for the object at `address`, or `None` for the null address
    ///
    /// ## Errors
    ///
    /// Whatever the metadata provider reports while resolving the runtime type.
    pub fn proxy(&self, address: Address) -> HeapResult<Option<Proxy<'a>>>
    {
        if address.is_null() {
            return Ok(None);
        }
        let ty = self.metadata.type_at(address)?;
        Ok(Some(self.navigate(ProxyNode::object(address, ty))))
    }

    /// Proxy for an object whose type was already resolved elsewhere
    pub fn proxy_with_type(&self, address: Address, ty: Arc<TypeDescriptor>) -> Proxy<'a>
    {
        self.navigate(ProxyNode::object(address, ty))
    }

    /// Attach this heap to a node
    pub fn navigate(&self, node: ProxyNode) -> Proxy<'a>
    {
        Proxy { heap: *self, node }
    }

    /// Proxies for every address in `addresses` whose runtime type is `type_name`
    ///
    /// `type_name` may use either naming grammar. Null addresses are skipped.
    pub fn proxies_of_type<I>(&self, addresses: I, type_name: &str) -> HeapResult<Vec<Proxy<'a>>>
    where
        I: IntoIterator<Item = Address>,
    {
        let mut proxies = Vec::new();
        for address in addresses {
            if address.is_null() {
                continue;
            }
            let ty = self.metadata.type_at(address)?;
            if names_match(&ty.name, type_name) {
                proxies.push(self.navigate(ProxyNode::object(address, ty)));
            }
        }
        Ok(proxies)
    }

    /// Decode the slot at `location`, whose declared type is `declared`.
    fn read_slot(&self, location: Address, declared: Arc<TypeDescriptor>) -> HeapResult<FieldValue<'a>>
    {
        match declared.kind {
            TypeKind::Primitive(kind) => {
                let bytes = self.memory.read_bytes(location, usize::try_from(kind.size()).unwrap_or(8))?;
                let scalar = Scalar::decode(kind, &bytes).ok_or_else(|| HeapError::UnsupportedCast {
                    type_name: declared.name.clone(),
                    reason: "short read".to_string(),
                })?;
                Ok(FieldValue::Scalar(scalar))
            }
            TypeKind::ValueType => Ok(FieldValue::Struct(self.navigate(ProxyNode::interior(location, declared)))),
            TypeKind::String | TypeKind::ReferenceType | TypeKind::Array => {
                let target = self.memory.read_pointer(location)?;
                if target.is_null() {
                    return Ok(FieldValue::Null);
                }
                // The declared type may be a base class or interface; trust the pointee
                let runtime = self.metadata.type_at(target)?;
                if runtime.kind == TypeKind::String {
                    return Ok(FieldValue::Text(self.metadata.string_at(target)?));
                }
                Ok(FieldValue::Reference(self.navigate(ProxyNode::object(target, runtime))))
            }
        }
    }
}

/// Result of reading a field or an array element
#[derive(Debug, Clone)]
pub enum FieldValue<'a>
{
    /// A reference slot holding the null address
    Null,
    Scalar(Scalar),
    Text(String),
    /// A reference to another object, typed by its runtime type
    Reference(Proxy<'a>),
    /// An embedded struct (interior node); no bytes read yet
    Struct(Proxy<'a>),
}

impl<'a> FieldValue<'a>
{
    pub fn is_null(&self) -> bool
    {
        matches!(self, FieldValue::Null)
    }

    pub fn as_scalar(&self) -> Option<Scalar>
    {
        match self {
            FieldValue::Scalar(scalar) => Some(*scalar),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str>
    {
        match self {
            FieldValue::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_proxy(&self) -> Option<&Proxy<'a>>
    {
        match self {
            FieldValue::Reference(proxy) | FieldValue::Struct(proxy) => Some(proxy),
            _ => None,
        }
    }

    pub fn into_proxy(self) -> Option<Proxy<'a>>
    {
        match self {
            FieldValue::Reference(proxy) | FieldValue::Struct(proxy) => Some(proxy),
            _ => None,
        }
    }
}

/// A node bound to the heap it lives in
#[derive(Debug, Clone)]
pub struct Proxy<'a>
{
    heap: Heap<'a>,
    node: ProxyNode,
}

impl<'a> Proxy<'a>
{
    pub fn heap(&self) -> Heap<'a>
    {
        self.heap
    }

    pub fn node(&self) -> &ProxyNode
    {
        &self.node
    }

    pub fn into_node(self) -> ProxyNode
    {
        self.node
    }

    /// Address identifying this object, for comparison rather than decoding
    pub fn address(&self) -> Address
    {
        self.node.address
    }

    pub fn type_of(&self) -> &Arc<TypeDescriptor>
    {
        &self.node.ty
    }

    /// Whether the runtime type is `name`, given in either naming grammar
    pub fn is_of_type(&self, name: &str) -> bool
    {
        names_match(&self.node.ty.name, name)
    }

    /// Read a field by name
    ///
    /// The literal name is tried first, then the auto-property backing field
    /// `<name>k__BackingField` (unless disabled in [`NavigationOptions`]).
    ///
    /// - struct fields come back as [`FieldValue::Struct`], an interior node
    /// - primitives and strings are read and decoded immediately
    /// - references come back as [`FieldValue::Reference`] typed by the
    ///   pointee's runtime type, or [`FieldValue::Null`]
    ///
    /// ## Errors
    ///
    /// - `FieldNotFound`: neither name resolves
    /// - `Read`: a byte range could not be read
    pub fn field(&self, name: &str) -> HeapResult<FieldValue<'a>>
    {
        let metadata = self.heap.metadata;
        let field = lookup_field(metadata, &self.node.ty, name, self.heap.options.backing_field_fallback)?;
        let declared = metadata.type_by_id(field.type_id)?;
        let location = self.node.payload_address(metadata.header_size()) + field.offset;
        trace!(
            owner = %self.node.ty.name,
            field = %field.name,
            %location,
            "reading field"
        );
        self.heap.read_slot(location, declared)
    }

    /// Read element `index` of an array
    ///
    /// The index is not checked against the runtime length: reading past the
    /// end decodes whatever bytes follow the array, or fails with `Read`.
    ///
    /// ## Errors
    ///
    /// - `NotAnArray`: this node is not an array
    pub fn element(&self, index: u64) -> HeapResult<FieldValue<'a>>
    {
        let (element_type, location) = self.element_location(index)?;
        trace!(array = %self.node.ty.name, index, %location, "reading element");
        self.heap.read_slot(location, element_type)
    }

    /// Runtime element count of an array
    ///
    /// ## Errors
    ///
    /// - `NotAnArray`: this node is not an array
    pub fn length(&self) -> HeapResult<u64>
    {
        self.ensure_array()?;
        self.heap.metadata.array_length(self.node.address, &self.node.ty)
    }

    /// Iterate over all elements in index order
    ///
    /// The iterator holds its own position, so calling `iter` again starts over.
    ///
    /// ## Errors
    ///
    /// - `NotAnArray`: this node is not an array
    pub fn iter(&self) -> HeapResult<Elements<'a>>
    {
        let length = self.length()?;
        Ok(Elements {
            array: self.clone(),
            next: 0,
            length,
        })
    }

    /// Follow a path expression such as `Reference.Value` or `Values[2]`
    ///
    /// ## Errors
    ///
    /// - `InvalidPath`: the expression does not parse
    /// - `NullReference`: an intermediate step is null
    /// - anything [`field`](Self::field) or [`element`](Self::element) reports
    pub fn walk(&self, path: &str) -> HeapResult<FieldValue<'a>>
    {
        let segments = parse_path(path)?;
        let mut current = FieldValue::Reference(self.clone());
        for (position, segment) in segments.iter().enumerate() {
            let proxy = match current {
                FieldValue::Reference(proxy) | FieldValue::Struct(proxy) => proxy,
                FieldValue::Null => {
                    return Err(HeapError::NullReference(format_path(&segments[..position])));
                }
                FieldValue::Scalar(_) | FieldValue::Text(_) => {
                    return Err(HeapError::InvalidPath(format!(
                        "{path}: {} is a simple value and has no members",
                        format_path(&segments[..position])
                    )));
                }
            };
            current = match segment {
                PathSegment::Field(name) => proxy.field(name)?,
                PathSegment::Index(index) => proxy.element(*index)?,
            };
        }
        Ok(current)
    }

    fn ensure_array(&self) -> HeapResult<()>
    {
        if self.node.ty.is_array() {
            Ok(())
        } else {
            Err(HeapError::NotAnArray(self.node.ty.name.clone()))
        }
    }

    fn element_location(&self, index: u64) -> HeapResult<(Arc<TypeDescriptor>, Address)>
    {
        self.ensure_array()?;
        let metadata = self.heap.metadata;
        let element_id = self
            .node
            .ty
            .element_type
            .ok_or_else(|| HeapError::UnknownType(format!("element type of {}", self.node.ty.name)))?;
        let element_type = metadata.type_by_id(element_id)?;
        let location = metadata.element_address(self.node.address, &self.node.ty, index)?;
        Ok((element_type, location))
    }
}

/// Iterator over the elements of an array proxy
#[derive(Debug, Clone)]
pub struct Elements<'a>
{
    array: Proxy<'a>,
    next: u64,
    length: u64,
}

impl<'a> Iterator for Elements<'a>
{
    type Item = HeapResult<FieldValue<'a>>;

    fn next(&mut self) -> Option<Self::Item>
    {
        if self.next >= self.length {
            return None;
        }
        let index = self.next;
        self.next += 1;
        Some(self.array.element(index))
    }

    fn size_hint(&self) -> (usize, Option<usize>)
    {
        let remaining = usize::try_from(self.length - self.next).unwrap_or(usize::MAX);
        (remaining, Some(remaining))
    }
}
