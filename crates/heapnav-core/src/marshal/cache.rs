//! # Decode Cache
//!
//! Per-call identity cache for materialization.
//!
//! Every class instance and array is decoded at most once per
//! [`materialize`](super::Marshaller::materialize) call. The entry is reserved
//! *before* the fields or elements are decoded, so a reference that leads back
//! to an entry still in progress resolves to the same [`ObjectRef`] or
//! [`ArrayRef`] instead of being decoded again.
//!
//! The cache lives on the stack of one call and is never shared. When the
//! call fails, the partially filled cache is dropped with it.

use std::collections::HashMap;
use std::sync::Arc;

use crate::types::Address;
use crate::value::{ArrayRef, ArrayValue, Fields, ObjectRef, ObjectValue, Value};

#[derive(Debug, Default)]
pub(crate) struct DecodeCache
{
    objects: HashMap<Address, ObjectValue>,
    arrays: HashMap<Address, ArrayValue>,
    strings: HashMap<Address, Arc<str>>,
}

impl DecodeCache
{
    pub(crate) fn new() -> Self
    {
        Self::default()
    }

    /// Handle for an instance already reserved or decoded at `address`
    pub(crate) fn object(&self, address: Address) -> Option<ObjectRef>
    {
        self.objects.contains_key(&address).then_some(ObjectRef(address))
    }

    /// Register a placeholder for `address` ahead of decoding its fields.
    pub(crate) fn reserve(&mut self, address: Address, type_name: &str) -> ObjectRef
    {
        self.objects.entry(address).or_insert_with(|| ObjectValue {
            type_name: type_name.to_string(),
            address,
            fields: Fields::new(),
        });
        ObjectRef(address)
    }

    /// Patch the decoded fields into a reserved placeholder.
    pub(crate) fn complete(&mut self, object: ObjectRef, fields: Fields)
    {
        if let Some(entry) = self.objects.get_mut(&object.0) {
            entry.fields = fields;
        }
    }

    /// Handle for an array already reserved or decoded at `address`
    pub(crate) fn array(&self, address: Address) -> Option<ArrayRef>
    {
        self.arrays.contains_key(&address).then_some(ArrayRef(address))
    }

    /// Register an empty array for `address` ahead of decoding its elements.
    pub(crate) fn reserve_array(&mut self, address: Address, type_name: &str) -> ArrayRef
    {
        self.arrays.entry(address).or_insert_with(|| ArrayValue {
            type_name: type_name.to_string(),
            address,
            items: Vec::new(),
        });
        ArrayRef(address)
    }

    pub(crate) fn complete_array(&mut self, array: ArrayRef, items: Vec<Value>)
    {
        if let Some(entry) = self.arrays.get_mut(&array.0) {
            entry.items = items;
        }
    }

    pub(crate) fn string(&self, address: Address) -> Option<Arc<str>>
    {
        self.strings.get(&address).cloned()
    }

    pub(crate) fn insert_string(&mut self, address: Address, text: &str) -> Arc<str>
    {
        self.strings.entry(address).or_insert_with(|| Arc::from(text)).clone()
    }

    pub(crate) fn into_parts(self) -> (HashMap<Address, ObjectValue>, HashMap<Address, ArrayValue>)
    {
        (self.objects, self.arrays)
    }
}
