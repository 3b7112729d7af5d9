/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

use std::fmt;
use std::sync::Arc;

use allocative::Allocative;
use dashmap::DashMap;
use dupe::Dupe;

use crate::capability::Reflection;
use crate::object::TypeRef;

/// Primitive types of the measured runtime.
#[derive(Copy, Clone, Dupe, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Allocative)]
pub enum Primitive {
    Boolean,
    Byte,
    Char,
    Short,
    Int,
    Float,
    Long,
    Double,
}

impl Primitive {
    /// Size of the primitive when stored inline in an object or an array.
    pub const fn size_bytes(self) -> u32 {
        match self {
            Primitive::Boolean | Primitive::Byte => 1,
            Primitive::Char | Primitive::Short => 2,
            Primitive::Int | Primitive::Float => 4,
            Primitive::Long | Primitive::Double => 8,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Primitive::Boolean => "boolean",
            Primitive::Byte => "byte",
            Primitive::Char => "char",
            Primitive::Short => "short",
            Primitive::Int => "int",
            Primitive::Float => "float",
            Primitive::Long => "long",
            Primitive::Double => "double",
        }
    }

    /// Zero value, the initial value of a primitive slot.
    pub const fn zero(self) -> PrimitiveValue {
        match self {
            Primitive::Boolean => PrimitiveValue::Boolean(false),
            Primitive::Byte => PrimitiveValue::Byte(0),
            Primitive::Char => PrimitiveValue::Char(0),
            Primitive::Short => PrimitiveValue::Short(0),
            Primitive::Int => PrimitiveValue::Int(0),
            Primitive::Float => PrimitiveValue::Float(0.0),
            Primitive::Long => PrimitiveValue::Long(0),
            Primitive::Double => PrimitiveValue::Double(0.0),
        }
    }
}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Value of a primitive slot, or the payload of a boxed primitive.
#[derive(Copy, Clone, Debug, PartialEq, Allocative)]
pub enum PrimitiveValue {
    Boolean(bool),
    Byte(i8),
    Char(u16),
    Short(i16),
    Int(i32),
    Float(f32),
    Long(i64),
    Double(f64),
}

impl PrimitiveValue {
    pub const fn primitive(self) -> Primitive {
        match self {
            PrimitiveValue::Boolean(_) => Primitive::Boolean,
            PrimitiveValue::Byte(_) => Primitive::Byte,
            PrimitiveValue::Char(_) => Primitive::Char,
            PrimitiveValue::Short(_) => Primitive::Short,
            PrimitiveValue::Int(_) => Primitive::Int,
            PrimitiveValue::Float(_) => Primitive::Float,
            PrimitiveValue::Long(_) => Primitive::Long,
            PrimitiveValue::Double(_) => Primitive::Double,
        }
    }

    /// Value widened to `i64` for integral kinds (including `char`),
    /// `None` for booleans and floating point.
    pub const fn as_integral(self) -> Option<i64> {
        match self {
            PrimitiveValue::Byte(v) => Some(v as i64),
            PrimitiveValue::Char(v) => Some(v as i64),
            PrimitiveValue::Short(v) => Some(v as i64),
            PrimitiveValue::Int(v) => Some(v as i64),
            PrimitiveValue::Long(v) => Some(v),
            PrimitiveValue::Boolean(_) | PrimitiveValue::Float(_) | PrimitiveValue::Double(_) => {
                None
            }
        }
    }
}

/// Declared type of a field or of array elements.
#[derive(Copy, Clone, Dupe, Debug, Eq, PartialEq, Hash, Allocative)]
pub enum FieldType {
    Primitive(Primitive),
    Reference(TypeRef),
}

impl FieldType {
    #[inline]
    pub fn is_primitive(self) -> bool {
        matches!(self, FieldType::Primitive(_))
    }
}

/// One field declared directly on a type.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Allocative)]
pub struct FieldDescriptor {
    pub declaring_type: TypeRef,
    pub name: Arc<str>,
    pub is_static: bool,
    pub field_type: FieldType,
}

impl FieldDescriptor {
    pub fn instance(declaring_type: TypeRef, name: &str, field_type: FieldType) -> FieldDescriptor {
        FieldDescriptor {
            declaring_type,
            name: Arc::from(name),
            is_static: false,
            field_type,
        }
    }

    pub fn of_static(
        declaring_type: TypeRef,
        name: &str,
        field_type: FieldType,
    ) -> FieldDescriptor {
        FieldDescriptor {
            is_static: true,
            ..FieldDescriptor::instance(declaring_type, name, field_type)
        }
    }

    /// Only instance fields holding references lead to other objects.
    #[inline]
    pub fn is_traversable(&self) -> bool {
        !self.is_static && !self.field_type.is_primitive()
    }
}

/// Traversable fields of a type, including fields declared on its ancestors,
/// most derived type first.
pub(crate) type FieldTable = Arc<[FieldDescriptor]>;

/// Per-type cache of [`FieldTable`]s.
///
/// Type hierarchy of a live runtime does not change, so a table is derived
/// once per type and shared by all subsequent measurements.
#[derive(Default)]
pub(crate) struct FieldTables {
    tables: DashMap<TypeRef, FieldTable>,
}

impl FieldTables {
    pub(crate) fn get(&self, ty: TypeRef, reflection: &dyn Reflection) -> FieldTable {
        if let Some(table) = self.tables.get(&ty) {
            return table.value().dupe();
        }
        // Derived outside of the map lock, `Reflection` may be slow.
        let table = Self::derive_table(ty, reflection);
        self.tables.entry(ty).or_insert(table).value().dupe()
    }

    fn derive_table(ty: TypeRef, reflection: &dyn Reflection) -> FieldTable {
        let mut fields = Vec::new();
        let mut next = Some(ty);
        while let Some(ty) = next {
            fields.extend(
                reflection
                    .declared_fields(ty)
                    .into_iter()
                    .filter(FieldDescriptor::is_traversable),
            );
            next = reflection.super_type_of(ty);
        }
        tracing::trace!(
            "derived field table for `{}`: {} reference fields",
            reflection.type_name(ty),
            fields.len()
        );
        fields.into()
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.tables.len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::field::FieldDescriptor;
    use crate::field::FieldTables;
    use crate::field::FieldType;
    use crate::field::Primitive;
    use crate::field::PrimitiveValue;
    use crate::sim::ClassDef;
    use crate::sim::Heap;

    #[test]
    fn test_traversable() {
        let mut heap = Heap::new();
        let object = heap.object_type();
        let ty = heap
            .define(ClassDef::new("Holder").reference("r", object))
            .unwrap();
        let r = FieldType::Reference(object);
        let i = FieldType::Primitive(Primitive::Int);
        assert!(FieldDescriptor::instance(ty, "r", r).is_traversable());
        assert!(!FieldDescriptor::of_static(ty, "r", r).is_traversable());
        assert!(!FieldDescriptor::instance(ty, "i", i).is_traversable());
    }

    #[test]
    fn test_table_walks_ancestors() {
        let mut heap = Heap::new();
        let object = heap.object_type();
        let parent = heap
            .define(
                ClassDef::new("Parent")
                    .primitive("i", Primitive::Int)
                    .reference("p", object),
            )
            .unwrap();
        let child = heap
            .define(
                ClassDef::new("Child")
                    .extends(parent)
                    .reference("c", object)
                    .static_reference("s", object)
                    .primitive("j", Primitive::Long),
            )
            .unwrap();
        let heap = Arc::new(heap);

        let tables = FieldTables::default();
        let table = tables.get(child, &*heap);
        let names: Vec<&str> = table.iter().map(|f| &*f.name).collect();
        assert_eq!(names, vec!["c", "p"]);
        assert_eq!(table[1].declaring_type, parent);

        let again = tables.get(child, &*heap);
        assert!(Arc::ptr_eq(&table, &again));
        assert_eq!(tables.len(), 1);
    }

    #[test]
    fn test_as_integral() {
        assert_eq!(PrimitiveValue::Char(97).as_integral(), Some(97));
        assert_eq!(PrimitiveValue::Long(-1).as_integral(), Some(-1));
        assert_eq!(PrimitiveValue::Boolean(true).as_integral(), None);
        assert_eq!(PrimitiveValue::Double(1.0).as_integral(), None);
        assert_eq!(Primitive::Long.size_bytes(), 8);
    }
}
