//! # heapnav-core
//!
//! Field-level navigation and typed decoding of objects in frozen managed-heap snapshots.
//!
//! This crate provides:
//! - Type name translation between the angle (`List<System.Int32>`) and
//!   backtick/bracket (``List`1[[System.Int32]]``) generic naming grammars
//! - Lazy proxies that walk fields, array elements and backing fields of
//!   snapshot objects without copying them
//! - A marshaller that turns snapshot objects into owned local values,
//!   preserving shared and cyclic references
//! - An in-memory heap image for building snapshots by hand
//!
//! ## Collaborators
//!
//! The engine never touches a live process. It reads bytes through a
//! [`MemoryReader`](memory::MemoryReader), learns runtime types from a
//! [`TypeMetadataProvider`](metadata::TypeMetadataProvider), and learns the
//! shapes to decode into from a [`LocalTypeCatalog`](metadata::LocalTypeCatalog).
//! [`image::HeapImage`] implements all three.
//!
//! ## Example
//!
//! ```rust
//! use heapnav_core::prelude::*;
//!
//! let image = heapnav_core::image::demo::build()?;
//! let heap = Heap::new(&image, &image);
//!
//! let node = heap.proxies_of_type(image.object_addresses(), "Fixtures.ClassWithReference")?[0].clone();
//! assert_eq!(node.walk("Reference.Value")?.as_text(), Some("OK"));
//!
//! let graph = heap.marshaller(&image).materialize_as(&node, "Fixtures.ClassWithReference")?;
//! let root = graph.root_object().expect("class instance");
//! let reference = graph.resolve(root.field("Reference").expect("field")).expect("instance");
//! assert_eq!(reference.field("Value").and_then(Value::as_text), Some("OK"));
//! # Ok::<(), HeapError>(())
//! ```

pub mod config;
pub mod error;
pub mod image;
pub mod marshal;
pub mod memory;
pub mod metadata;
pub mod names;
pub mod path;
pub mod prelude;
pub mod proxy;
pub mod types;
pub mod value;

// Re-export commonly used types
pub use error::{HeapError, HeapResult, ReadError};
pub use marshal::Marshaller;
pub use proxy::{FieldValue, Heap, Proxy, ProxyNode};
pub use types::{Address, TypeDescriptor, TypeId};
pub use value::{ObjectGraph, Value};
