//! Type table shared by a heap image and the catalog built from it.

use std::collections::HashMap;
use std::sync::Arc;

use crate::metadata::LocalTypeCatalog;
use crate::names::{to_angle_form, to_bracket_form};
use crate::types::{TypeDescriptor, TypeId};

/// Types of one heap image, indexed by id and by name
///
/// Every type is held twice: under its runtime (angle form) name, and as a
/// local copy registered under the bracket form name. The local copies are
/// what [`LocalTypeCatalog`] hands out.
#[derive(Debug, Clone, Default)]
pub struct TypeTable
{
    runtime: Vec<Arc<TypeDescriptor>>,
    local: Vec<Arc<TypeDescriptor>>,
    by_name: HashMap<String, TypeId>,
}

impl TypeTable
{
    /// Build a table from descriptors whose ids are their positions.
    pub(crate) fn new(types: Vec<TypeDescriptor>) -> Self
    {
        let mut table = Self::default();
        for ty in types {
            let mut local = ty.clone();
            local.name = to_bracket_form(&ty.name);
            table.by_name.insert(ty.name.clone(), ty.id);
            table.by_name.insert(local.name.clone(), ty.id);
            table.runtime.push(Arc::new(ty));
            table.local.push(Arc::new(local));
        }
        table
    }

    /// Runtime descriptor for `id`
    pub fn get(&self, id: TypeId) -> Option<&Arc<TypeDescriptor>>
    {
        self.runtime.get(usize::try_from(id.raw()).ok()?)
    }

    /// Runtime descriptor registered under `name`, in either grammar
    pub fn lookup(&self, name: &str) -> Option<&Arc<TypeDescriptor>>
    {
        let id = self
            .by_name
            .get(name)
            .or_else(|| self.by_name.get(&to_angle_form(name)))?;
        self.get(*id)
    }

    pub fn len(&self) -> usize
    {
        self.runtime.len()
    }

    pub fn is_empty(&self) -> bool
    {
        self.runtime.is_empty()
    }

    /// Runtime descriptors in id order
    pub fn iter(&self) -> impl Iterator<Item = &Arc<TypeDescriptor>>
    {
        self.runtime.iter()
    }
}

impl LocalTypeCatalog for TypeTable
{
    fn describe(&self, name: &str) -> Option<Arc<TypeDescriptor>>
    {
        let id = self.lookup(name)?.id;
        self.resolve(id)
    }

    fn resolve(&self, id: TypeId) -> Option<Arc<TypeDescriptor>>
    {
        self.local.get(usize::try_from(id.raw()).ok()?).cloned()
    }
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::types::PrimitiveKind;

    fn table() -> TypeTable
    {
        TypeTable::new(vec![
            TypeDescriptor::primitive(TypeId(0), PrimitiveKind::I32),
            TypeDescriptor::string(TypeId(1)),
            TypeDescriptor::class(TypeId(2), "Fixtures.Pair<System.Int32,System.String>", 16, Vec::new()),
        ])
    }

    #[test]
    fn test_lookup_in_either_grammar()
    {
        let table = table();
        let angle = table.lookup("Fixtures.Pair<System.Int32,System.String>").unwrap();
        let bracket = table.lookup("Fixtures.Pair`2[[System.Int32],[System.String]]").unwrap();
        assert_eq!(angle.id, bracket.id);
        assert!(table.lookup("Fixtures.Missing").is_none());
    }

    #[test]
    fn test_catalog_hands_out_bracket_names()
    {
        let table = table();
        let local = table.describe("Fixtures.Pair`2[[System.Int32],[System.String]]").unwrap();
        assert_eq!(local.name, "Fixtures.Pair`2[[System.Int32],[System.String]]");
        assert_eq!(table.resolve(TypeId(0)).unwrap().name, "System.Int32");
        assert!(table.resolve(TypeId(9)).is_none());
    }
}
