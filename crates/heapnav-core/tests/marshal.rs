//! Tests for materializing snapshot objects into local values

mod common;

use common::{first, CountingReader};
use heapnav_core::error::HeapError;
use heapnav_core::image::demo::MILLENNIUM_TICKS;
use heapnav_core::image::HeapImageBuilder;
use heapnav_core::metadata::LocalTypeCatalog;
use heapnav_core::proxy::Heap;
use heapnav_core::types::PrimitiveKind;
use heapnav_core::value::{Scalar, Value};

fn scalar_u64(value: Option<&Value>) -> u64
{
    value
        .and_then(Value::as_scalar)
        .and_then(Scalar::as_u64)
        .unwrap_or_else(|| panic!("expected an integer, got {value:?}"))
}

#[test]
fn test_materialize_blittable_struct()
{
    let image = common::image();
    let heap = Heap::new(&image, &image);
    let proxy = first(&image, heap, "Fixtures.StructWithULongField");

    let graph = heap.marshaller(&image).materialize_as(&proxy, "Fixtures.StructWithULongField").unwrap();
    let value = graph.root().as_struct().unwrap();
    assert_eq!(value.type_name, "Fixtures.StructWithULongField");
    assert_eq!(scalar_u64(value.field("Value")), 666);
    assert_eq!(scalar_u64(value.field("Field5")), 46);
    assert_eq!(graph.object_count(), 0);
}

#[test]
fn test_blittable_struct_is_one_bulk_read()
{
    let image = common::image();
    let reader = CountingReader::new(&image);
    let heap = Heap::new(&reader, &image);
    let proxy = first(&image, heap, "Fixtures.StructWithStructWithStructField");

    reader.reset();
    heap.marshaller(&image)
        .materialize_as(&proxy, "Fixtures.StructWithStructWithStructField")
        .unwrap();
    let reads = reader.reads.borrow();
    assert_eq!(reads.len(), 1);
    assert_eq!(reads[0].1, 48);
}

#[test]
fn test_nested_value_agrees_with_navigation()
{
    let image = common::image();
    let heap = Heap::new(&image, &image);
    let proxy = first(&image, heap, "Fixtures.StructWithStructWithStructField");

    let navigated = proxy.walk("Value.Value.Value").unwrap().as_scalar().and_then(Scalar::as_u64);

    let inner = proxy.walk("Value.Value").unwrap().into_proxy().unwrap();
    let graph = heap.marshaller(&image).materialize_as(&inner, "Fixtures.StructWithULongField").unwrap();
    let materialized = scalar_u64(graph.root().as_struct().unwrap().field("Value"));

    let whole = heap
        .marshaller(&image)
        .materialize_as(&proxy, "Fixtures.StructWithStructWithStructField")
        .unwrap();
    let deep = whole.root().as_struct().unwrap().field("Value").and_then(Value::as_struct).unwrap();
    let deep = deep.field("Value").and_then(Value::as_struct).unwrap();

    assert_eq!(navigated, Some(666));
    assert_eq!(materialized, 666);
    assert_eq!(scalar_u64(deep.field("Value")), 666);
}

#[test]
fn test_struct_holding_an_array_is_not_blittable()
{
    let image = common::image();
    let heap = Heap::new(&image, &image);
    let proxy = first(&image, heap, "Fixtures.StructWithArray");

    let result = heap.marshaller(&image).materialize_as(&proxy, "Fixtures.StructWithArray");
    match result {
        Err(HeapError::UnsupportedCast { type_name, reason }) => {
            assert_eq!(type_name, "Fixtures.StructWithArray");
            assert!(reason.contains("Values"), "{reason}");
            assert!(reason.contains("fixed-size buffers are not supported"), "{reason}");
        }
        other => panic!("Expected UnsupportedCast, got {other:?}"),
    }
}

#[test]
fn test_array_requested_as_struct_is_rejected()
{
    let image = common::image();
    let heap = Heap::new(&image, &image);
    let values = first(&image, heap, "Fixtures.ClassWithArray").field("Values").unwrap().into_proxy().unwrap();

    let result = heap.marshaller(&image).materialize_as(&values, "Fixtures.StructWithULongField");
    assert!(matches!(result, Err(HeapError::UnsupportedCast { .. })));
}

#[test]
fn test_type_mismatch()
{
    let image = common::image();
    let heap = Heap::new(&image, &image);
    let proxy = first(&image, heap, "Fixtures.ClassWithULongField");

    match heap.marshaller(&image).materialize_as(&proxy, "Fixtures.ClassWithStringField") {
        Err(HeapError::TypeMismatch { expected, actual }) => {
            assert_eq!(expected, "Fixtures.ClassWithStringField");
            assert_eq!(actual, "Fixtures.ClassWithULongField");
        }
        other => panic!("expected TypeMismatch, got {other:?}"),
    }
}

#[test]
fn test_unknown_target_type()
{
    let image = common::image();
    let heap = Heap::new(&image, &image);
    let proxy = first(&image, heap, "Fixtures.ClassWithULongField");

    assert!(matches!(
        heap.marshaller(&image).materialize_as(&proxy, "Fixtures.Missing"),
        Err(HeapError::UnknownType(_))
    ));
}

#[test]
fn test_materialize_array_of_primitives()
{
    let image = common::image();
    let heap = Heap::new(&image, &image);
    let values = first(&image, heap, "Fixtures.ClassWithArray").field("Values").unwrap().into_proxy().unwrap();

    let graph = heap.marshaller(&image).materialize_as(&values, "System.Int32[]").unwrap();
    let items: Vec<i64> = graph
        .items(graph.root())
        .unwrap()
        .iter()
        .map(|item| item.as_scalar().and_then(Scalar::as_i64).unwrap())
        .collect();
    assert_eq!(items, vec![10, 9, 8, 7, 6, 5, 4, 3, 2, 1]);
    assert_eq!(items[2], 8);
}

#[test]
fn test_materialize_empty_array()
{
    let image = common::image();
    let heap = Heap::new(&image, &image);
    let values = first(&image, heap, "Fixtures.ClassWithEmptyArray").field("Values").unwrap().into_proxy().unwrap();

    let graph = heap.marshaller(&image).materialize_as(&values, "System.Int32[]").unwrap();
    assert_eq!(graph.items(graph.root()), Some(&[][..]));
    assert_eq!(graph.array_count(), 1);
}

#[test]
fn test_materialize_array_of_structs()
{
    let image = common::image();
    let heap = Heap::new(&image, &image);
    let array = first(&image, heap, "Fixtures.ClassWithArrayOfStruct").field("Array").unwrap().into_proxy().unwrap();

    let graph = heap
        .marshaller(&image)
        .materialize_as(&array, "Fixtures.StructWithULongField[]")
        .unwrap();
    let items = graph.items(graph.root()).unwrap();
    assert_eq!(items.len(), 4);
    for (index, item) in items.iter().enumerate() {
        assert_eq!(scalar_u64(item.as_struct().unwrap().field("Value")), index as u64);
    }
}

#[test]
fn test_materialize_class_graph()
{
    let image = common::image();
    let heap = Heap::new(&image, &image);
    let proxy = first(&image, heap, "Fixtures.ClassWithArrayOfClass");

    let graph = heap.marshaller(&image).materialize_as(&proxy, "Fixtures.ClassWithArrayOfClass").unwrap();
    let root = graph.root_object().unwrap();
    assert_eq!(root.address, proxy.address());
    assert_eq!(scalar_u64(root.field("Field3")), 12);

    let values = root.field("Values").and_then(|value| graph.items(value)).unwrap();
    let texts: Vec<&str> = values
        .iter()
        .map(|value| graph.resolve(value).unwrap().field("Value").and_then(Value::as_text).unwrap())
        .collect();
    assert_eq!(texts, ["0", "1", "2", "3", "4", "5", "6", "7", "8", "9"]);
    assert_eq!(graph.object_count(), 11);
}

#[test]
fn test_materialize_struct_field_inside_class()
{
    let image = common::image();
    let heap = Heap::new(&image, &image);
    let proxy = first(&image, heap, "Fixtures.ClassWithStructField");

    let graph = heap.marshaller(&image).materialize_as(&proxy, "Fixtures.ClassWithStructField").unwrap();
    let inner = graph.root_object().unwrap().field("Value").and_then(Value::as_struct).unwrap();
    assert_eq!(scalar_u64(inner.field("Value")), 666);
}

#[test]
fn test_materialize_date_struct()
{
    let image = common::image();
    let heap = Heap::new(&image, &image);
    let date = first(&image, heap, "Fixtures.StructWithDate").field("Date").unwrap().into_proxy().unwrap();

    let graph = heap.marshaller(&image).materialize_as(&date, "System.DateTime").unwrap();
    assert_eq!(scalar_u64(graph.root().as_struct().unwrap().field("_dateData")), MILLENNIUM_TICKS);
}

#[test]
fn test_self_reference_terminates_with_identity()
{
    let image = common::image();
    let heap = Heap::new(&image, &image);
    let proxy = first(&image, heap, "Fixtures.Node");

    let graph = heap.marshaller(&image).materialize_as(&proxy, "Fixtures.Node").unwrap();
    let root = graph.root().as_object().unwrap();
    let node = graph.object(root).unwrap();

    assert_eq!(node.field("Next").and_then(Value::as_object), Some(root));
    assert_eq!(graph.object_count(), 1);
}

#[test]
fn test_shared_references_decode_once()
{
    let image = common::image();
    let heap = Heap::new(&image, &image);
    let proxy = first(&image, heap, "Fixtures.SharedPair");

    let graph = heap.marshaller(&image).materialize_as(&proxy, "Fixtures.SharedPair").unwrap();
    let pair = graph.root_object().unwrap();
    let first_ref = pair.field("First").and_then(Value::as_object).unwrap();
    let second_ref = pair.field("Second").and_then(Value::as_object).unwrap();

    assert_eq!(first_ref, second_ref);
    assert_eq!(graph.object_count(), 2);
    assert_eq!(graph.object(first_ref).unwrap().field("Value").and_then(Value::as_text), Some("shared"));
}

#[test]
fn test_null_reference_materializes_as_null()
{
    let image = common::image();
    let heap = Heap::new(&image, &image);
    let queue = first(&image, heap, "System.Collections.Concurrent.ConcurrentQueue<System.Int32>");

    let graph = heap
        .marshaller(&image)
        .materialize_as(&queue, "System.Collections.Concurrent.ConcurrentQueue`1[[System.Int32]]")
        .unwrap();
    let root = graph.root_object().unwrap();
    let head = graph.resolve(root.field("m_head").unwrap()).unwrap();
    assert!(head.field("m_next").unwrap().is_null());

    // m_head and m_tail are the same segment
    assert_eq!(root.field("m_head"), root.field("m_tail"));
}

#[test]
fn test_materialize_generic_collection()
{
    let image = common::image();
    let heap = Heap::new(&image, &image);
    let holder = first(&image, heap, "Fixtures.ClassWithListOfString");

    let graph = heap.marshaller(&image).materialize_as(&holder, "Fixtures.ClassWithListOfString").unwrap();
    let list = graph.resolve(graph.root_object().unwrap().field("List").unwrap()).unwrap();
    assert_eq!(list.type_name, "System.Collections.Generic.List`1[[System.String]]");

    let items = list.field("_items").and_then(|value| graph.items(value)).unwrap();
    let texts: Vec<Option<&str>> = items.iter().map(Value::as_text).collect();
    assert_eq!(texts, [Some("Hello"), Some("World"), None, None]);
    assert!(items[3].is_null());
}

#[test]
fn test_address_and_text_shortcuts()
{
    let image = common::image();
    let heap = Heap::new(&image, &image);
    let marshaller = heap.marshaller(&image);
    let container = first(&image, heap, "Fixtures.ClassWithStringField");

    assert_eq!(marshaller.materialize_address(container.node()), container.address().value());

    let slot = container.address() + heapnav_core::metadata::TypeMetadataProvider::header_size(&image);
    let string = heapnav_core::memory::MemoryReader::read_pointer(&image, slot).unwrap();
    let text = heap.proxy(string).unwrap().unwrap();
    assert_eq!(marshaller.materialize_text(text.node()).unwrap(), "OK");

    assert!(matches!(
        marshaller.materialize_text(container.node()),
        Err(HeapError::TypeMismatch { .. })
    ));
}

#[test]
fn test_declared_field_type_is_not_trusted()
{
    // A field declared as the base class holds a derived instance
    let mut builder = HeapImageBuilder::default();
    let int = builder.primitive(PrimitiveKind::I32);
    let animal = builder.define_class("Zoo.Animal", &[("Legs", int)]).unwrap();
    let dog = builder.define_class("Zoo.Dog", &[("Legs", int), ("Tricks", int)]).unwrap();
    let pen = builder.define_class("Zoo.Pen", &[("Resident", animal)]).unwrap();

    let object = builder.alloc_object(pen).unwrap();
    let resident = builder.alloc_object(dog).unwrap();
    builder.set_scalar(resident, "Legs", Scalar::I32(4)).unwrap();
    builder.set_scalar(resident, "Tricks", Scalar::I32(3)).unwrap();
    builder.set_reference(object, "Resident", resident).unwrap();
    let image = builder.build();

    let heap = Heap::new(&image, &image);
    let pen = heap.proxy(object).unwrap().unwrap();
    let resident = pen.field("Resident").unwrap().into_proxy().unwrap();
    assert!(resident.is_of_type("Zoo.Dog"));
    assert_eq!(resident.field("Tricks").unwrap().as_scalar(), Some(Scalar::I32(3)));

    let graph = heap.marshaller(&image).materialize_as(&pen, "Zoo.Pen").unwrap();
    let dog = graph.resolve(graph.root_object().unwrap().field("Resident").unwrap()).unwrap();
    assert_eq!(dog.type_name, "Zoo.Dog");
    assert_eq!(dog.field("Tricks").and_then(Value::as_scalar), Some(Scalar::I32(3)));
}

#[test]
fn test_materialize_with_explicit_descriptor()
{
    let image = common::image();
    let heap = Heap::new(&image, &image);
    let proxy = first(&image, heap, "Fixtures.ClassWithReference");
    let target = image.describe("Fixtures.ClassWithReference").unwrap();

    let graph = heap.marshaller(&image).materialize(proxy.node(), &target).unwrap();
    let reference = graph.resolve(graph.root_object().unwrap().field("Reference").unwrap()).unwrap();
    assert_eq!(reference.type_name, "Fixtures.ClassWithStringField");
    assert_eq!(reference.field("Value").and_then(Value::as_text), Some("OK"));
}

#[test]
fn test_self_referencing_array_terminates()
{
    let mut builder = HeapImageBuilder::default();
    let object = builder.define_class("System.Object", &[]).unwrap();
    let objects = builder.array_of(object).unwrap();
    let array = builder.alloc_array(objects, 2).unwrap();
    builder.set_reference(array, "[0]", array).unwrap();
    let image = builder.build();

    let heap = Heap::new(&image, &image);
    let proxy = heap.proxy(array).unwrap().unwrap();
    let graph = heap.marshaller(&image).materialize_as(&proxy, "System.Object[]").unwrap();

    let root = graph.root().as_array().unwrap();
    assert_eq!(root.address(), array);
    let items = graph.items(graph.root()).unwrap();
    assert_eq!(items[0].as_array(), Some(root));
    assert!(items[1].is_null());
    assert_eq!(graph.array_count(), 1);
    assert_eq!(graph.object_count(), 0);
}

#[test]
fn test_shared_array_decodes_once()
{
    let mut builder = HeapImageBuilder::default();
    let int = builder.primitive(PrimitiveKind::I32);
    let ints = builder.array_of(int).unwrap();
    let holder = builder.define_class("Fixtures.SharedArrays", &[("A", ints), ("B", ints)]).unwrap();

    let object = builder.alloc_object(holder).unwrap();
    let values = builder.alloc_array(ints, 3).unwrap();
    for (index, value) in [7, 8, 9].into_iter().enumerate() {
        builder.set_scalar(values, &format!("[{index}]"), Scalar::I32(value)).unwrap();
    }
    builder.set_reference(object, "A", values).unwrap();
    builder.set_reference(object, "B", values).unwrap();
    let image = builder.build();

    let heap = Heap::new(&image, &image);
    let proxy = heap.proxy(object).unwrap().unwrap();
    let graph = heap.marshaller(&image).materialize_as(&proxy, "Fixtures.SharedArrays").unwrap();

    let root = graph.root_object().unwrap();
    assert_eq!(root.field("A"), root.field("B"));
    assert_eq!(graph.array_count(), 1);
    let items: Vec<Option<Scalar>> = graph.items(root.field("A").unwrap()).unwrap().iter().map(Value::as_scalar).collect();
    assert_eq!(items, [Some(Scalar::I32(7)), Some(Scalar::I32(8)), Some(Scalar::I32(9))]);
}

#[test]
fn test_long_reference_chain_materializes()
{
    const LENGTH: usize = 50_000;

    let mut builder = HeapImageBuilder::default();
    let node = builder.declare_class("Fixtures.Link").unwrap();
    let int = builder.primitive(PrimitiveKind::I32);
    builder.define_fields(node, &[("Index", int), ("Next", node)]).unwrap();

    let links: Vec<_> = (0..LENGTH).map(|_| builder.alloc_object(node).unwrap()).collect();
    for (index, pair) in links.windows(2).enumerate() {
        builder.set_scalar(pair[0], "Index", Scalar::I32(index as i32)).unwrap();
        builder.set_reference(pair[0], "Next", pair[1]).unwrap();
    }
    builder.set_scalar(links[LENGTH - 1], "Index", Scalar::I32((LENGTH - 1) as i32)).unwrap();
    let image = builder.build();

    let heap = Heap::new(&image, &image);
    let head = heap.proxy(links[0]).unwrap().unwrap();
    let graph = heap.marshaller(&image).materialize_as(&head, "Fixtures.Link").unwrap();
    assert_eq!(graph.object_count(), LENGTH);

    let mut current = graph.root_object().unwrap();
    for index in 1..LENGTH {
        current = graph.resolve(current.field("Next").unwrap()).unwrap();
        assert_eq!(current.field("Index").and_then(Value::as_scalar), Some(Scalar::I32(index as i32)));
    }
    assert_eq!(current.address, links[LENGTH - 1]);
    assert!(current.field("Next").unwrap().is_null());
}
