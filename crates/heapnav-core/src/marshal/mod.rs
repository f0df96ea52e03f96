//! # Marshaller
//!
//! Reconstructs owned local values from snapshot objects.
//!
//! Given a [`ProxyNode`] and a target [`TypeDescriptor`] from a
//! [`LocalTypeCatalog`], [`Marshaller::materialize`] decodes the whole object
//! graph reachable from the node:
//!
//! | target kind      | decoding                                                  |
//! |------------------|-----------------------------------------------------------|
//! | primitive        | one read of the primitive's width                         |
//! | blittable struct | one bulk read of `size` bytes, split field by field       |
//! | array            | identity-cached; length, then each element by its kind    |
//! | class            | identity-cached; each target field read from the runtime  |
//! | string           | the metadata provider's string decoder                    |
//!
//! The runtime type name, translated into the local grammar, must equal the
//! target name; otherwise decoding fails with `TypeMismatch`. Structs must
//! be blittable all the way down; a struct holding a reference or an array
//! fails with `UnsupportedCast` rather than being read as raw bytes.
//!
//! Class instances and arrays are reserved in the cache when first reached
//! and their contents are decoded later from a worklist, so arbitrarily long
//! reference chains decode in constant stack depth.

mod cache;

use std::sync::Arc;

use tracing::{debug, trace};

use self::cache::DecodeCache;
use crate::error::{HeapError, HeapResult};
use crate::metadata::LocalTypeCatalog;
use crate::names::{names_match, to_bracket_form};
use crate::proxy::{lookup_field, Heap, Proxy, ProxyNode};
use crate::types::{Address, TypeDescriptor, TypeKind};
use crate::value::{ArrayRef, Fields, ObjectGraph, ObjectRef, Scalar, StructValue, Value};

/// Nesting limit when checking struct layouts, guarding against malformed catalogs
const MAX_LAYOUT_DEPTH: usize = 32;

/// Class instance or array reserved in the cache whose contents are still to be decoded
enum Pending
{
    Object
    {
        node: ProxyNode,
        target: Arc<TypeDescriptor>,
        handle: ObjectRef,
    },
    Array
    {
        node: ProxyNode,
        target: Arc<TypeDescriptor>,
        handle: ArrayRef,
    },
}

/// State of one `materialize` call
struct Pass
{
    cache: DecodeCache,
    pending: Vec<Pending>,
}

/// Decoder from snapshot objects to local values
#[derive(Clone, Copy)]
pub struct Marshaller<'a>
{
    heap: Heap<'a>,
    catalog: &'a dyn LocalTypeCatalog,
}

impl std::fmt::Debug for Marshaller<'_>
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result
    {
        f.debug_struct("Marshaller").field("heap", &self.heap).finish_non_exhaustive()
    }
}

impl<'a> Marshaller<'a>
{
    pub fn new(heap: Heap<'a>, catalog: &'a dyn LocalTypeCatalog) -> Self
    {
        Self { heap, catalog }
    }

    /// Decode `node` into `target`, with everything it references
    ///
    /// Each call starts a fresh identity cache, so two calls never share
    /// instances. Within one call, every class instance and array appears
    /// once, however many references lead to it (including references to
    /// itself). Referenced instances and arrays are queued and decoded from a
    /// worklist, so the depth of the graph does not grow the call stack.
    ///
    /// ## Errors
    ///
    /// - `TypeMismatch`: a runtime type does not match its target type
    /// - `UnsupportedCast`: a target struct is not blittable, or an array is
    ///   requested as something else
    /// - `FieldNotFound`: a target field has no runtime counterpart
    /// - `UnknownType`: a target field type is missing from the catalog
    /// - `Read`: a byte range could not be read
    ///
    /// On error nothing is returned; the partial graph is discarded.
    pub fn materialize(&self, node: &ProxyNode, target: &TypeDescriptor) -> HeapResult<ObjectGraph>
    {
        debug!(address = %node.address(), target = %target.name, "materializing");
        let mut pass = Pass {
            cache: DecodeCache::new(),
            pending: Vec::new(),
        };
        let root = self.decode_node(node.clone(), Arc::new(target.clone()), &mut pass)?;

        while let Some(task) = pass.pending.pop() {
            match task {
                Pending::Object { node, target, handle } => {
                    let fields = self.decode_fields(&node, &target, &mut pass)?;
                    pass.cache.complete(handle, fields);
                }
                Pending::Array { node, target, handle } => {
                    let items = self.decode_elements(&node, &target, &mut pass)?;
                    pass.cache.complete_array(handle, items);
                }
            }
        }

        let (objects, arrays) = pass.cache.into_parts();
        debug!(target = %target.name, objects = objects.len(), arrays = arrays.len(), "materialized");
        Ok(ObjectGraph::new(root, objects, arrays))
    }

    /// Decode into the local type registered under `name`
    ///
    /// ## Errors
    ///
    /// `UnknownType` if the catalog has no such type, then as [`materialize`](Self::materialize).
    pub fn materialize_as(&self, proxy: &Proxy<'_>, name: &str) -> HeapResult<ObjectGraph>
    {
        let target = self.describe(name)?;
        self.materialize(proxy.node(), &target)
    }

    /// The node's raw address, as an integer
    pub fn materialize_address(&self, node: &ProxyNode) -> u64
    {
        node.address().value()
    }

    /// Decode a string object directly
    ///
    /// ## Errors
    ///
    /// - `TypeMismatch`: the node is not a string
    /// - `Read`: the string could not be read
    pub fn materialize_text(&self, node: &ProxyNode) -> HeapResult<String>
    {
        if node.ty().kind != TypeKind::String {
            return Err(HeapError::TypeMismatch {
                expected: "System.String".to_string(),
                actual: to_bracket_form(&node.ty().name),
            });
        }
        self.heap.metadata().string_at(node.address())
    }

    fn describe(&self, name: &str) -> HeapResult<Arc<TypeDescriptor>>
    {
        self.catalog
            .describe(name)
            .ok_or_else(|| HeapError::UnknownType(name.to_string()))
    }

    fn resolve_local(&self, owner: &TypeDescriptor, id: crate::types::TypeId) -> HeapResult<Arc<TypeDescriptor>>
    {
        self.catalog
            .resolve(id)
            .ok_or_else(|| HeapError::UnknownType(format!("{id} referenced from {}", owner.name)))
    }

    fn decode_node(&self, node: ProxyNode, target: Arc<TypeDescriptor>, pass: &mut Pass) -> HeapResult<Value>
    {
        let runtime = node.ty();
        if runtime.is_array() && !target.is_array() {
            return Err(HeapError::UnsupportedCast {
                type_name: target.name.clone(),
                reason: format!("{} is an array and has no fixed layout", runtime.name),
            });
        }
        if !names_match(&runtime.name, &target.name) {
            return Err(HeapError::TypeMismatch {
                expected: target.name.clone(),
                actual: to_bracket_form(&runtime.name),
            });
        }

        let address = node.address();
        match target.kind {
            TypeKind::Primitive(_) | TypeKind::ValueType => self.decode_blittable(&node, &target),
            TypeKind::String => self.decode_string(address, &mut pass.cache),
            TypeKind::Array => {
                if let Some(existing) = pass.cache.array(address) {
                    debug!(%address, "array already decoded");
                    return Ok(Value::Array(existing));
                }
                let handle = pass.cache.reserve_array(address, &target.name);
                pass.pending.push(Pending::Array { node, target, handle });
                Ok(Value::Array(handle))
            }
            TypeKind::ReferenceType => {
                if let Some(existing) = pass.cache.object(address) {
                    debug!(%address, "instance already decoded");
                    return Ok(Value::Object(existing));
                }
                let handle = pass.cache.reserve(address, &target.name);
                pass.pending.push(Pending::Object { node, target, handle });
                Ok(Value::Object(handle))
            }
        }
    }

    /// Decode a value stored at `location` whose runtime declared type is `declared`.
    ///
    /// Shared by class fields and array elements.
    fn decode_slot(
        &self,
        location: Address,
        declared: Arc<TypeDescriptor>,
        target: &Arc<TypeDescriptor>,
        pass: &mut Pass,
    ) -> HeapResult<Value>
    {
        if !declared.kind.is_reference() {
            return self.decode_node(ProxyNode::interior(location, declared), Arc::clone(target), pass);
        }

        let address = self.heap.memory().read_pointer(location)?;
        if address.is_null() {
            return Ok(Value::Null);
        }
        let runtime = self.heap.metadata().type_at(address)?;
        // Decode against the pointee's own local type when the catalog has it
        let target = self
            .catalog
            .describe(&to_bracket_form(&runtime.name))
            .unwrap_or_else(|| Arc::clone(target));
        self.decode_node(ProxyNode::object(address, runtime), target, pass)
    }

    fn decode_blittable(&self, node: &ProxyNode, target: &TypeDescriptor) -> HeapResult<Value>
    {
        self.ensure_blittable(target, 0)?;
        let payload = node.payload_address(self.heap.metadata().header_size());
        let length = usize::try_from(target.size).map_err(|_| HeapError::UnsupportedCast {
            type_name: target.name.clone(),
            reason: format!("size {} does not fit in memory", target.size),
        })?;
        let bytes = self.heap.memory().read_bytes(payload, length)?;
        trace!(target = %target.name, %payload, length, "bulk read");
        self.decode_bytes(target, &bytes)
    }

    fn ensure_blittable(&self, ty: &TypeDescriptor, depth: usize) -> HeapResult<()>
    {
        let unsupported = |reason: String| HeapError::UnsupportedCast {
            type_name: ty.name.clone(),
            reason,
        };
        if depth > MAX_LAYOUT_DEPTH {
            return Err(unsupported("struct nesting is too deep".to_string()));
        }
        match ty.kind {
            TypeKind::Primitive(_) => Ok(()),
            TypeKind::ValueType => {
                for field in &ty.fields {
                    let field_type = self.resolve_local(ty, field.type_id)?;
                    match field_type.kind {
                        TypeKind::Primitive(_) => {}
                        TypeKind::ValueType => self.ensure_blittable(&field_type, depth + 1)?,
                        TypeKind::Array => {
                            return Err(unsupported(format!(
                                "field {} is an array ({}); inline fixed-size buffers are not supported",
                                field.name, field_type.name
                            )));
                        }
                        TypeKind::String | TypeKind::ReferenceType => {
                            return Err(unsupported(format!(
                                "field {} holds a reference ({}), so the struct is not blittable",
                                field.name, field_type.name
                            )));
                        }
                    }
                }
                Ok(())
            }
            TypeKind::Array | TypeKind::String | TypeKind::ReferenceType => {
                Err(unsupported("only primitives and structs have a fixed layout".to_string()))
            }
        }
    }
    /// Split an owned buffer into a value of type `ty`, by declared field offsets.
    fn decode_bytes(&self, ty: &TypeDescriptor, bytes: &[u8]) -> HeapResult<Value>
    {
        let slice = |offset: u64, size: u64| -> HeapResult<&[u8]> {
            let start = usize::try_from(offset).ok();
            let end = offset.checked_add(size).and_then(|end| usize::try_from(end).ok());
            start
                .zip(end)
                .and_then(|(start, end)| bytes.get(start..end))
                .ok_or_else(|| HeapError::UnsupportedCast {
                    type_name: ty.name.clone(),
                    reason: format!("field at offset {offset} overruns the {} byte layout", bytes.len()),
                })
        };

        match ty.kind {
            TypeKind::Primitive(kind) => {
                let raw = slice(0, kind.size())?;
                Scalar::decode(kind, raw).map(Value::Scalar).ok_or_else(|| HeapError::UnsupportedCast {
                    type_name: ty.name.clone(),
                    reason: "short buffer".to_string(),
                })
            }
            _ => {
                let mut fields = Fields::with_capacity(ty.fields.len());
                for field in &ty.fields {
                    let field_type = self.resolve_local(ty, field.type_id)?;
                    let size = match field_type.kind {
                        TypeKind::Primitive(kind) => kind.size(),
                        _ => field_type.size,
                    };
                    let value = self.decode_bytes(&field_type, slice(field.offset, size)?)?;
                    fields.push((field.name.clone(), value));
                }
                Ok(Value::Struct(StructValue {
                    type_name: ty.name.clone(),
                    fields,
                }))
            }
        }
    }

    fn decode_elements(&self, node: &ProxyNode, target: &TypeDescriptor, pass: &mut Pass) -> HeapResult<Vec<Value>>
    {
        let runtime = node.ty();
        let metadata = self.heap.metadata();
        let missing_element = |ty: &TypeDescriptor| HeapError::UnknownType(format!("element type of {}", ty.name));

        let element_target = self.resolve_local(target, target.element_type.ok_or_else(|| missing_element(target))?)?;
        let element_runtime = metadata.type_by_id(runtime.element_type.ok_or_else(|| missing_element(runtime))?)?;
        let length = metadata.array_length(node.address(), runtime)?;
        trace!(array = %runtime.name, length, "decoding array");

        let mut items = Vec::with_capacity(usize::try_from(length).unwrap_or(0).min(1 << 16));
        for index in 0..length {
            let location = metadata.element_address(node.address(), runtime, index)?;
            items.push(self.decode_slot(location, Arc::clone(&element_runtime), &element_target, pass)?);
        }
        Ok(items)
    }

    fn decode_string(&self, address: Address, cache: &mut DecodeCache) -> HeapResult<Value>
    {
        if let Some(text) = cache.string(address) {
            return Ok(Value::Text(text));
        }
        let text = self.heap.metadata().string_at(address)?;
        Ok(Value::Text(cache.insert_string(address, &text)))
    }

    fn decode_fields(&self, node: &ProxyNode, target: &TypeDescriptor, pass: &mut Pass) -> HeapResult<Fields>
    {
        let metadata = self.heap.metadata();
        let runtime = node.ty();
        let payload = node.payload_address(metadata.header_size());
        let fallback = self.heap.options().backing_field_fallback;

        let mut fields = Fields::with_capacity(target.fields.len());
        for field in &target.fields {
            let runtime_field = lookup_field(metadata, runtime, &field.name, fallback)?;
            let declared = metadata.type_by_id(runtime_field.type_id)?;
            let field_target = self.resolve_local(target, field.type_id)?;
            trace!(owner = %target.name, field = %field.name, "decoding field");
            let value = self.decode_slot(payload + runtime_field.offset, declared, &field_target, pass)?;
            fields.push((field.name.clone(), value));
        }
        Ok(fields)
    }
}

impl<'a> Heap<'a>
{
    /// A marshaller decoding into types from `catalog`
    pub fn marshaller(&self, catalog: &'a dyn LocalTypeCatalog) -> Marshaller<'a>
    {
        Marshaller::new(*self, catalog)
    }
}
