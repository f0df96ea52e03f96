//! Shared fixtures for integration tests

#![allow(dead_code)]

use std::cell::{Cell, RefCell};

use heapnav_core::error::ReadError;
use heapnav_core::image::{demo, HeapImage};
use heapnav_core::memory::MemoryReader;
use heapnav_core::proxy::{FieldValue, Heap, Proxy};
use heapnav_core::types::Address;

pub fn image() -> HeapImage
{
    demo::build().expect("demo heap")
}

/// First instance of `type_name` in the image
pub fn first<'a>(image: &HeapImage, heap: Heap<'a>, type_name: &str) -> Proxy<'a>
{
    heap.proxies_of_type(image.object_addresses(), type_name)
        .expect("type lookup")
        .into_iter()
        .next()
        .unwrap_or_else(|| panic!("no instance of {type_name}"))
}

pub fn int(value: &FieldValue<'_>) -> i64
{
    value
        .as_scalar()
        .and_then(|scalar| scalar.as_i64())
        .unwrap_or_else(|| panic!("expected an integer, got {value:?}"))
}

/// Reader that records every range it serves
pub struct CountingReader<'a>
{
    pub inner: &'a HeapImage,
    pub reads: RefCell<Vec<(Address, usize)>>,
}

impl<'a> CountingReader<'a>
{
    pub fn new(inner: &'a HeapImage) -> Self
    {
        Self {
            inner,
            reads: RefCell::new(Vec::new()),
        }
    }

    pub fn count(&self) -> usize
    {
        self.reads.borrow().len()
    }

    pub fn reset(&self)
    {
        self.reads.borrow_mut().clear();
    }
}

impl MemoryReader for CountingReader<'_>
{
    fn read_bytes(&self, address: Address, length: usize) -> Result<Vec<u8>, ReadError>
    {
        self.reads.borrow_mut().push((address, length));
        self.inner.read_bytes(address, length)
    }
}

/// Reader that fails every read touching one address
pub struct FaultyReader<'a>
{
    pub inner: &'a HeapImage,
    pub poisoned: Address,
    pub failures: Cell<usize>,
}

impl<'a> FaultyReader<'a>
{
    pub fn new(inner: &'a HeapImage, poisoned: Address) -> Self
    {
        Self {
            inner,
            poisoned,
            failures: Cell::new(0),
        }
    }
}

impl MemoryReader for FaultyReader<'_>
{
    fn read_bytes(&self, address: Address, length: usize) -> Result<Vec<u8>, ReadError>
    {
        let end = address.value().saturating_add(length as u64);
        if (address.value()..end).contains(&self.poisoned.value()) {
            self.failures.set(self.failures.get() + 1);
            return Err(ReadError::new(address, length, "snapshot released"));
        }
        self.inner.read_bytes(address, length)
    }
}
