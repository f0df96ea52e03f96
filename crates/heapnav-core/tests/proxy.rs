//! Tests for proxy navigation over the demo heap

mod common;

use common::{first, int, CountingReader, FaultyReader};
use heapnav_core::config::NavigationOptions;
use heapnav_core::error::HeapError;
use heapnav_core::metadata::TypeMetadataProvider;
use heapnav_core::proxy::{FieldValue, Heap};
use heapnav_core::types::Address;

#[test]
fn test_read_reference_field_from_class()
{
    let image = common::image();
    let heap = Heap::new(&image, &image);
    let proxy = first(&image, heap, "Fixtures.ClassWithReference");

    let reference = proxy.field("Reference").unwrap().into_proxy().unwrap();
    assert_eq!(reference.field("Value").unwrap().as_text(), Some("OK"));
}

#[test]
fn test_read_reference_field_from_boxed_struct()
{
    let image = common::image();
    let heap = Heap::new(&image, &image);
    let proxy = first(&image, heap, "Fixtures.StructWithStringField");

    assert!(!proxy.node().is_interior());
    assert_eq!(proxy.field("Value").unwrap().as_text(), Some("OK"));
}

#[test]
fn test_read_value_fields()
{
    let image = common::image();
    let heap = Heap::new(&image, &image);

    let class = first(&image, heap, "Fixtures.ClassWithULongField");
    assert_eq!(int(&class.field("Value").unwrap()), 666);

    let boxed = first(&image, heap, "Fixtures.StructWithULongField");
    assert_eq!(int(&boxed.field("Value").unwrap()), 666);
    assert_eq!(int(&boxed.field("Field3").unwrap()), 44);
}

#[test]
fn test_struct_fields_are_interior_nodes()
{
    let image = common::image();
    let heap = Heap::new(&image, &image);
    let proxy = first(&image, heap, "Fixtures.ClassWithStructField");

    let FieldValue::Struct(inner) = proxy.field("Value").unwrap() else {
        panic!("expected an embedded struct");
    };
    assert!(inner.node().is_interior());
    assert!(inner.is_of_type("Fixtures.StructWithULongField"));

    // Field, Field2 precede the struct; it starts at payload offset 8
    let expected = proxy.address() + image.header_size() + 8;
    assert_eq!(inner.address(), expected);
    assert_eq!(int(&inner.field("Value").unwrap()), 666);
}

#[test]
fn test_nested_struct_fields()
{
    let image = common::image();
    let heap = Heap::new(&image, &image);

    let two = first(&image, heap, "Fixtures.StructWithStructField");
    assert_eq!(int(&two.walk("Value.Value").unwrap()), 666);

    let three = first(&image, heap, "Fixtures.StructWithStructWithStructField");
    assert_eq!(int(&three.walk("Value.Value.Value").unwrap()), 666);
    assert_eq!(int(&three.walk("Value.Field2").unwrap()), 43);
}

#[test]
fn test_backing_field_fallback()
{
    let image = common::image();
    let heap = Heap::new(&image, &image);
    let proxy = first(&image, heap, "Fixtures.ClassWithStringProperty");

    assert_eq!(proxy.field("Field").unwrap().as_text(), Some("OK"));
    assert_eq!(proxy.field("<Field>k__BackingField").unwrap().as_text(), Some("OK"));

    let strict = heap.with_options(NavigationOptions {
        backing_field_fallback: false,
    });
    let proxy = strict.navigate(proxy.into_node());
    assert!(matches!(
        proxy.field("Field"),
        Err(HeapError::FieldNotFound { ref field, .. }) if field == "Field"
    ));
}

#[test]
fn test_missing_field()
{
    let image = common::image();
    let heap = Heap::new(&image, &image);
    let proxy = first(&image, heap, "Fixtures.ClassWithReference");

    match proxy.field("Nope") {
        Err(HeapError::FieldNotFound { type_name, field }) => {
            assert_eq!(type_name, "Fixtures.ClassWithReference");
            assert_eq!(field, "Nope");
        }
        other => panic!("expected FieldNotFound, got {other:?}"),
    }
}

#[test]
fn test_array_length_elements_and_iteration()
{
    let image = common::image();
    let heap = Heap::new(&image, &image);
    let values = first(&image, heap, "Fixtures.ClassWithArray")
        .field("Values")
        .unwrap()
        .into_proxy()
        .unwrap();

    assert_eq!(values.length().unwrap(), 10);
    assert_eq!(int(&values.element(2).unwrap()), 8);

    let collected: Vec<i64> = values.iter().unwrap().map(|item| int(&item.unwrap())).collect();
    assert_eq!(collected, (1..=10).rev().collect::<Vec<i64>>());

    // Restartable: a second pass sees the same elements
    let elements = values.iter().unwrap();
    assert_eq!(elements.size_hint(), (10, Some(10)));
    assert_eq!(elements.count(), 10);
}

#[test]
fn test_empty_array()
{
    let image = common::image();
    let heap = Heap::new(&image, &image);
    let values = first(&image, heap, "Fixtures.ClassWithEmptyArray")
        .field("Values")
        .unwrap()
        .into_proxy()
        .unwrap();

    assert_eq!(values.length().unwrap(), 0);
    assert!(values.iter().unwrap().next().is_none());
}

#[test]
fn test_array_of_structs_and_classes()
{
    let image = common::image();
    let heap = Heap::new(&image, &image);

    let structs = first(&image, heap, "Fixtures.ClassWithArrayOfStruct");
    let element = structs.walk("Array[2]").unwrap().into_proxy().unwrap();
    assert!(element.node().is_interior());
    assert_eq!(int(&element.field("Value").unwrap()), 2);

    let classes = first(&image, heap, "Fixtures.ClassWithArrayOfClass");
    assert_eq!(classes.walk("Values[2].Value").unwrap().as_text(), Some("2"));
    let element = classes.walk("Values[7]").unwrap().into_proxy().unwrap();
    assert!(!element.node().is_interior());
    assert!(element.is_of_type("Fixtures.ClassWithStringField"));
}

#[test]
fn test_not_an_array()
{
    let image = common::image();
    let heap = Heap::new(&image, &image);
    let proxy = first(&image, heap, "Fixtures.ClassWithArray");

    assert!(matches!(proxy.length(), Err(HeapError::NotAnArray(_))));
    assert!(matches!(proxy.element(0), Err(HeapError::NotAnArray(_))));
    assert!(matches!(proxy.iter(), Err(HeapError::NotAnArray(_))));
}

#[test]
fn test_null_fields_are_absent()
{
    let image = common::image();
    let heap = Heap::new(&image, &image);
    let queue = first(&image, heap, "System.Collections.Concurrent.ConcurrentQueue<System.Int32>");

    let segment = queue.field("m_head").unwrap().into_proxy().unwrap();
    assert!(segment.field("m_next").unwrap().is_null());
    assert!(queue.walk("m_head.m_next").unwrap().is_null());
    assert!(matches!(
        queue.walk("m_head.m_next.m_array"),
        Err(HeapError::NullReference(ref at)) if at == "m_head.m_next"
    ));

    let boxed = first(&image, heap, "Fixtures.StructWithArray");
    assert!(boxed.field("Values").unwrap().is_null());
    assert!(heap.proxy(Address::NULL).unwrap().is_none());
}

#[test]
fn test_generic_collection_navigation()
{
    let image = common::image();
    let heap = Heap::new(&image, &image);
    let dictionary = first(
        &image,
        heap,
        "System.Collections.Concurrent.ConcurrentDictionary`2[[System.Int32],[System.String]]",
    );

    let buckets = dictionary.walk("m_tables.m_buckets").unwrap().into_proxy().unwrap();
    let bucket = buckets
        .iter()
        .unwrap()
        .map(Result::unwrap)
        .find(|bucket| !bucket.is_null())
        .and_then(FieldValue::into_proxy)
        .unwrap();
    assert_eq!(bucket.field("m_value").unwrap().as_text(), Some("one"));

    let list = first(&image, heap, "Fixtures.ClassWithListOfString");
    assert_eq!(list.walk("List._items[1]").unwrap().as_text(), Some("World"));
    assert!(list.walk("List._items[3]").unwrap().is_null());
}

#[test]
fn test_identity_and_type_queries()
{
    let image = common::image();
    let heap = Heap::new(&image, &image);
    let container = first(&image, heap, "Fixtures.ClassWithReference");

    // The identity address equals the raw reference stored in the field
    let slot = container.address() + image.header_size();
    let stored = heapnav_core::memory::MemoryReader::read_pointer(&image, slot).unwrap();
    let reference = container.field("Reference").unwrap().into_proxy().unwrap();
    assert_eq!(reference.address(), stored);

    assert_eq!(container.type_of().name, "Fixtures.ClassWithReference");
    assert!(container.is_of_type("Fixtures.ClassWithReference"));
    assert!(!container.is_of_type("Fixtures.ClassWithReference2"));
    assert_eq!(*container.type_of(), image.type_at(container.address()).unwrap());
}

#[test]
fn test_instances_of_a_type()
{
    let image = common::image();
    let heap = Heap::new(&image, &image);

    let expected = image
        .object_addresses()
        .filter(|address| image.type_at(*address).unwrap().name == "Fixtures.ClassWithStringField")
        .count();
    let proxies = heap
        .proxies_of_type(image.object_addresses(), "Fixtures.ClassWithStringField")
        .unwrap();

    // One referenced from ClassWithReference, one standalone, ten in an array, one shared
    assert_eq!(expected, 13);
    assert_eq!(proxies.len(), expected);
    assert!(proxies.iter().all(|proxy| proxy.is_of_type("Fixtures.ClassWithStringField")));
}

#[test]
fn test_proxy_from_address_and_type()
{
    let image = common::image();
    let heap = Heap::new(&image, &image);
    let original = first(&image, heap, "Fixtures.ClassWithReference");

    let converted = heap.proxy_with_type(original.address(), original.type_of().clone());
    assert_eq!(converted.walk("Reference.Value").unwrap().as_text(), Some("OK"));

    let resolved = heap.proxy(original.address()).unwrap().unwrap();
    assert_eq!(resolved.type_of().name, original.type_of().name);
}

#[test]
fn test_navigation_reads_lazily()
{
    let image = common::image();
    let reader = CountingReader::new(&image);
    let heap = Heap::new(&reader, &image);
    let proxy = first(&image, heap, "Fixtures.ClassWithStructField");

    reader.reset();
    let inner = proxy.field("Value").unwrap().into_proxy().unwrap();
    assert_eq!(reader.count(), 0, "struct navigation must not read memory");

    assert_eq!(int(&inner.field("Value").unwrap()), 666);
    assert_eq!(reader.count(), 1);
}

#[test]
fn test_read_errors_propagate()
{
    let image = common::image();
    let healthy = Heap::new(&image, &image);
    let container = first(&image, healthy, "Fixtures.ClassWithULongField");

    let poisoned = container.address() + image.header_size();
    let reader = FaultyReader::new(&image, poisoned);
    let heap = Heap::new(&reader, &image);
    let proxy = heap.navigate(container.into_node());

    match proxy.field("Value") {
        Err(HeapError::Read(error)) => {
            assert_eq!(error.address, poisoned);
            assert_eq!(error.reason, "snapshot released");
        }
        other => panic!("expected a read error, got {other:?}"),
    }
    assert_eq!(reader.failures.get(), 1);
}

#[test]
fn test_invalid_paths()
{
    let image = common::image();
    let heap = Heap::new(&image, &image);
    let proxy = first(&image, heap, "Fixtures.ClassWithReference");

    assert!(matches!(proxy.walk("Reference..Value"), Err(HeapError::InvalidPath(_))));
    assert!(matches!(proxy.walk("Reference.Value.Length"), Err(HeapError::InvalidPath(_))));
    assert!(matches!(proxy.walk("Reference[0]"), Err(HeapError::NotAnArray(_))));
}
