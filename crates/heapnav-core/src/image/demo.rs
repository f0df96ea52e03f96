//! Demo heap.
//!
//! A small heap with one or more instances of each object shape the engine
//! handles: strings and scalars in classes, boxed and nested structs, arrays
//! of primitives, structs and classes, auto-property backing fields, generic
//! collections, a self-referencing node, a shared reference and null fields.
//!
//! Roots are allocated in a fixed order, so the first instance of each
//! `Fixtures.*` type is always the one described here.

use super::{HeapImage, HeapImageBuilder};
use crate::error::HeapResult;
use crate::types::{Address, PrimitiveKind, TypeId};
use crate::value::Scalar;

/// Ticks of 2001-01-01T00:00:00 in `System.DateTime` encoding
pub const MILLENNIUM_TICKS: u64 = 631_139_040_000_000_000;

fn join(prefix: &str, field: &str) -> String
{
    if prefix.is_empty() {
        field.to_string()
    } else {
        format!("{prefix}.{field}")
    }
}

/// Fill a `StructWithULongField` the way its constructor would
fn fill_ulong_struct(builder: &mut HeapImageBuilder, object: Address, prefix: &str, value: u64) -> HeapResult<()>
{
    for (name, filler) in ["Field", "Field2", "Field3", "Field4", "Field5"].into_iter().zip(42..) {
        builder.set_scalar(object, &join(prefix, name), Scalar::I32(filler))?;
    }
    builder.set_scalar(object, &join(prefix, "Value"), Scalar::U64(value))
}

fn fill_struct_field(builder: &mut HeapImageBuilder, object: Address, prefix: &str, value: u64) -> HeapResult<()>
{
    builder.set_scalar(object, &join(prefix, "Field1"), Scalar::I32(42))?;
    builder.set_scalar(object, &join(prefix, "Field2"), Scalar::I32(43))?;
    fill_ulong_struct(builder, object, &join(prefix, "Value"), value)
}

fn string_field(builder: &mut HeapImageBuilder, class: TypeId, text: &str) -> HeapResult<Address>
{
    let object = builder.alloc_object(class)?;
    builder.set_text(object, "Value", text)?;
    Ok(object)
}

/// Build the demo heap
///
/// ## Errors
///
/// Only if the fixture definitions themselves are inconsistent.
pub fn build() -> HeapResult<HeapImage>
{
    let mut b = HeapImageBuilder::default();

    let int = b.primitive(PrimitiveKind::I32);
    let ulong = b.primitive_named("System.UInt64")?;
    let text = b.string_type();
    let ints = b.array_of(int)?;
    let strings = b.array_of(text)?;

    let class_string = b.define_class("Fixtures.ClassWithStringField", &[("Value", text)])?;
    let class_reference = b.define_class("Fixtures.ClassWithReference", &[("Reference", class_string)])?;
    let class_property = b.define_class("Fixtures.ClassWithStringProperty", &[("<Field>k__BackingField", text)])?;
    let class_ulong = b.define_class("Fixtures.ClassWithULongField", &[("Value", ulong)])?;
    let class_reference2 = b.define_class("Fixtures.ClassWithReference2", &[("Reference", class_ulong)])?;
    let class_array = b.define_class(
        "Fixtures.ClassWithArray",
        &[("Field", int), ("Field2", int), ("Field3", int), ("Values", ints)],
    )?;
    let class_empty_array = b.define_class("Fixtures.ClassWithEmptyArray", &[("Values", ints)])?;

    let struct_string = b.define_struct("Fixtures.StructWithStringField", &[("Value", text)])?;
    let struct_ulong = b.define_struct(
        "Fixtures.StructWithULongField",
        &[
            ("Field", int),
            ("Field2", int),
            ("Field3", int),
            ("Field4", int),
            ("Field5", int),
            ("Value", ulong),
        ],
    )?;
    let struct_struct = b.define_struct(
        "Fixtures.StructWithStructField",
        &[("Field1", int), ("Field2", int), ("Value", struct_ulong)],
    )?;
    let struct_struct_struct = b.define_struct(
        "Fixtures.StructWithStructWithStructField",
        &[("Field1", int), ("Field2", int), ("Value", struct_struct)],
    )?;
    let struct_array = b.define_struct("Fixtures.StructWithArray", &[("Values", ints)])?;
    let date = b.define_struct("System.DateTime", &[("_dateData", ulong)])?;

    let class_struct = b.define_class(
        "Fixtures.ClassWithStructField",
        &[("Field", int), ("Field2", int), ("Value", struct_ulong)],
    )?;
    let struct_ulongs = b.array_of(struct_ulong)?;
    let class_array_of_struct = b.define_class(
        "Fixtures.ClassWithArrayOfStruct",
        &[("Field", int), ("Field2", int), ("Array", struct_ulongs)],
    )?;
    let class_strings = b.array_of(class_string)?;
    let class_array_of_class = b.define_class(
        "Fixtures.ClassWithArrayOfClass",
        &[("Field", int), ("Field2", int), ("Field3", int), ("Values", class_strings)],
    )?;
    let class_date = b.define_class("Fixtures.StructWithDate", &[("Date", date)])?;

    let dict_node = b.declare_class("System.Collections.Concurrent.ConcurrentDictionary+Node<System.Int32,System.String>")?;
    b.define_fields(
        dict_node,
        &[("m_key", int), ("m_value", text), ("m_next", dict_node), ("m_hashcode", int)],
    )?;
    let buckets = b.array_of(dict_node)?;
    let tables = b.define_class(
        "System.Collections.Concurrent.ConcurrentDictionary+Tables<System.Int32,System.String>",
        &[("m_buckets", buckets)],
    )?;
    let dictionary = b.define_class(
        "System.Collections.Concurrent.ConcurrentDictionary<System.Int32,System.String>",
        &[("m_tables", tables)],
    )?;

    let segment = b.declare_class("System.Collections.Concurrent.ConcurrentQueue+Segment<System.Int32>")?;
    b.define_fields(segment, &[("m_array", ints), ("m_next", segment)])?;
    let queue = b.define_class(
        "System.Collections.Concurrent.ConcurrentQueue<System.Int32>",
        &[("m_head", segment), ("m_tail", segment)],
    )?;

    let list = b.define_class(
        "System.Collections.Generic.List<System.String>",
        &[("_items", strings), ("_size", int), ("_version", int)],
    )?;
    let class_list = b.define_class("Fixtures.ClassWithListOfString", &[("List", list)])?;

    let node = b.declare_class("Fixtures.Node")?;
    b.define_fields(node, &[("Value", int), ("Next", node)])?;
    let pair = b.define_class("Fixtures.SharedPair", &[("First", class_string), ("Second", class_string)])?;

    // ClassWithReference
    let object = b.alloc_object(class_reference)?;
    let inner = string_field(&mut b, class_string, "OK")?;
    b.set_reference(object, "Reference", inner)?;

    string_field(&mut b, class_string, "OK")?;

    let object = b.alloc_object(class_property)?;
    b.set_text(object, "<Field>k__BackingField", "OK")?;

    let object = b.alloc_object(class_ulong)?;
    b.set_scalar(object, "Value", Scalar::U64(666))?;

    // ClassWithArray: 10, 9, ..., 1
    let object = b.alloc_object(class_array)?;
    let values = b.alloc_array(ints, 10)?;
    b.set_reference(object, "Values", values)?;
    for (index, value) in (1..=10).rev().enumerate() {
        b.set_scalar(object, &format!("Values[{index}]"), Scalar::I32(value))?;
    }

    let object = b.alloc_object(struct_string)?;
    b.set_text(object, "Value", "OK")?;

    let object = b.alloc_object(struct_ulong)?;
    fill_ulong_struct(&mut b, object, "", 666)?;

    let object = b.alloc_object(class_struct)?;
    b.set_scalar(object, "Field", Scalar::I32(4))?;
    b.set_scalar(object, "Field2", Scalar::I32(4))?;
    fill_ulong_struct(&mut b, object, "Value", 666)?;

    let object = b.alloc_object(class_array_of_struct)?;
    b.set_scalar(object, "Field", Scalar::I32(4))?;
    b.set_scalar(object, "Field2", Scalar::I32(4))?;
    let array = b.alloc_array(struct_ulongs, 4)?;
    b.set_reference(object, "Array", array)?;
    for index in 0..4u64 {
        fill_ulong_struct(&mut b, object, &format!("Array[{index}]"), index)?;
    }

    // ClassWithArrayOfClass: "0" ... "9"
    let object = b.alloc_object(class_array_of_class)?;
    for (field, value) in [("Field", 10), ("Field2", 11), ("Field3", 12)] {
        b.set_scalar(object, field, Scalar::I32(value))?;
    }
    let array = b.alloc_array(class_strings, 10)?;
    b.set_reference(object, "Values", array)?;
    for index in 0..10 {
        let element = string_field(&mut b, class_string, &index.to_string())?;
        b.set_reference(object, &format!("Values[{index}]"), element)?;
    }

    let object = b.alloc_object(struct_struct)?;
    fill_struct_field(&mut b, object, "", 666)?;

    let object = b.alloc_object(struct_struct_struct)?;
    b.set_scalar(object, "Field1", Scalar::I32(42))?;
    b.set_scalar(object, "Field2", Scalar::I32(43))?;
    fill_struct_field(&mut b, object, "Value", 666)?;

    let object = b.alloc_object(class_empty_array)?;
    let empty = b.alloc_array(ints, 0)?;
    b.set_reference(object, "Values", empty)?;

    let object = b.alloc_object(class_date)?;
    b.set_scalar(object, "Date._dateData", Scalar::U64(MILLENNIUM_TICKS))?;

    // StructWithArray keeps its null array
    b.alloc_object(struct_array)?;

    // ConcurrentDictionary<int, string> { 1: "one", 2: "two" }
    let object = b.alloc_object(dictionary)?;
    let table = b.alloc_object(tables)?;
    b.set_reference(object, "m_tables", table)?;
    let array = b.alloc_array(buckets, 4)?;
    b.set_reference(table, "m_buckets", array)?;
    for (key, value) in [(1, "one"), (2, "two")] {
        let entry = b.alloc_object(dict_node)?;
        b.set_scalar(entry, "m_key", Scalar::I32(key))?;
        b.set_scalar(entry, "m_hashcode", Scalar::I32(key))?;
        b.set_text(entry, "m_value", value)?;
        b.set_reference(table, &format!("m_buckets[{key}]"), entry)?;
    }

    // ConcurrentQueue<int> with a single segment
    let object = b.alloc_object(queue)?;
    let head = b.alloc_object(segment)?;
    let slots = b.alloc_array(ints, 32)?;
    b.set_reference(head, "m_array", slots)?;
    b.set_reference(object, "m_head", head)?;
    b.set_reference(object, "m_tail", head)?;

    let object = b.alloc_object(class_reference2)?;
    let inner = b.alloc_object(class_ulong)?;
    b.set_scalar(inner, "Value", Scalar::U64(666))?;
    b.set_reference(object, "Reference", inner)?;

    // List<string> { "Hello", "World" } with spare capacity
    let object = b.alloc_object(class_list)?;
    let items = b.alloc_object(list)?;
    b.set_reference(object, "List", items)?;
    let backing = b.alloc_array(strings, 4)?;
    b.set_reference(items, "_items", backing)?;
    b.set_text(items, "_items[0]", "Hello")?;
    b.set_text(items, "_items[1]", "World")?;
    b.set_scalar(items, "_size", Scalar::I32(2))?;

    let object = b.alloc_object(node)?;
    b.set_scalar(object, "Value", Scalar::I32(1))?;
    b.set_reference(object, "Next", object)?;

    let object = b.alloc_object(pair)?;
    let shared = string_field(&mut b, class_string, "shared")?;
    b.set_reference(object, "First", shared)?;
    b.set_reference(object, "Second", shared)?;

    Ok(b.build())
}
