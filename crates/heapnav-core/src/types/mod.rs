//! # Types
//!
//! Snapshot-agnostic types used throughout the engine.
//!
//! Addresses locate bytes in a snapshot; descriptors say how to interpret them.

pub mod address;
pub mod descriptor;

// Re-export all public types
pub use address::Address;
pub use descriptor::{FieldDescriptor, PrimitiveKind, TypeDescriptor, TypeId, TypeKind};
