//! Text rendering of navigation results and materialized graphs.

use std::collections::{HashSet, VecDeque};
use std::fmt::Write as _;

use heapnav_core::prelude::*;

/// One-line rendering of a navigation result
pub fn field_value(value: &FieldValue<'_>) -> String
{
    match value {
        FieldValue::Null => "null".to_string(),
        FieldValue::Scalar(scalar) => scalar.to_string(),
        FieldValue::Text(text) => format!("{text:?}"),
        FieldValue::Reference(proxy) => format!("{} @ {}", proxy.type_of().name, proxy.address()),
        FieldValue::Struct(proxy) => format!("{} (inline @ {})", proxy.type_of().name, proxy.address()),
    }
}

/// Indented rendering of a materialized graph
///
/// The root prints first. Every instance and array it reaches is then listed
/// once, in discovery order; references print as `-> Type @ address`.
pub fn graph(graph: &ObjectGraph) -> String
{
    let mut out = String::new();
    let mut listing = Listing::default();
    out.push_str("root: ");
    value(graph, graph.root(), 0, &mut listing, &mut out);

    while let Some(entry) = listing.queue.pop_front() {
        out.push('\n');
        match entry {
            Entry::Object(handle) => {
                if let Some(object) = graph.object(handle) {
                    let _ = writeln!(out, "{} @ {}", object.type_name, object.address);
                    fields(graph, &object.fields, 1, &mut listing, &mut out);
                }
            }
            Entry::Array(handle) => {
                if let Some(array) = graph.array(handle) {
                    let _ = writeln!(out, "{} @ {} [{} items]", array.type_name, array.address, array.items.len());
                    for (index, item) in array.items.iter().enumerate() {
                        indent(&mut out, 1);
                        let _ = write!(out, "[{index}] ");
                        value(graph, item, 1, &mut listing, &mut out);
                    }
                }
            }
        }
    }
    out
}

enum Entry
{
    Object(ObjectRef),
    Array(ArrayRef),
}

#[derive(Default)]
struct Listing
{
    seen: HashSet<Address>,
    queue: VecDeque<Entry>,
}

impl Listing
{
    fn visit(&mut self, address: Address, entry: Entry)
    {
        if self.seen.insert(address) {
            self.queue.push_back(entry);
        }
    }
}

fn indent(out: &mut String, depth: usize)
{
    out.push_str(&"  ".repeat(depth));
}

fn fields(graph: &ObjectGraph, fields: &[(String, Value)], depth: usize, listing: &mut Listing, out: &mut String)
{
    for (name, field) in fields {
        indent(out, depth);
        let _ = write!(out, "{name}: ");
        value(graph, field, depth, listing, out);
    }
}

fn value(graph: &ObjectGraph, value: &Value, depth: usize, listing: &mut Listing, out: &mut String)
{
    match value {
        Value::Null => out.push_str("null\n"),
        Value::Scalar(scalar) => {
            let _ = writeln!(out, "{scalar}");
        }
        Value::Text(text) => {
            let _ = writeln!(out, "{text:?}");
        }
        Value::Struct(inner) => {
            let _ = writeln!(out, "{}", inner.type_name);
            self::fields(graph, &inner.fields, depth + 1, listing, out);
        }
        Value::Array(handle) => {
            let name = graph.array(*handle).map_or("<missing>", |array| array.type_name.as_str());
            let _ = writeln!(out, "-> {name} @ {}", handle.address());
            listing.visit(handle.address(), Entry::Array(*handle));
        }
        Value::Object(handle) => {
            let name = graph.object(*handle).map_or("<missing>", |object| object.type_name.as_str());
            let _ = writeln!(out, "-> {name} @ {}", handle.address());
            listing.visit(handle.address(), Entry::Object(*handle));
        }
    }
}
