/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

use std::sync::Arc;

use allocative::Allocative;

use crate::capability::TypeKind;
use crate::field::FieldDescriptor;
use crate::field::FieldType;
use crate::field::Primitive;
use crate::field::PrimitiveValue;
use crate::object::ObjectRef;
use crate::object::TypeRef;
use crate::sim::layout::LayoutModel;

/// Content of a field or of an array element.
#[derive(Copy, Clone, Debug, PartialEq, Allocative)]
pub enum Slot {
    Ref(Option<ObjectRef>),
    Primitive(PrimitiveValue),
}

impl Slot {
    pub(crate) fn zero(field_type: FieldType) -> Slot {
        match field_type {
            FieldType::Primitive(p) => Slot::Primitive(p.zero()),
            FieldType::Reference(_) => Slot::Ref(None),
        }
    }

    pub(crate) fn fits(&self, field_type: FieldType) -> bool {
        match (self, field_type) {
            (Slot::Ref(_), FieldType::Reference(_)) => true,
            (Slot::Primitive(v), FieldType::Primitive(p)) => v.primitive() == p,
            _ => false,
        }
    }
}

#[derive(Clone, Debug)]
struct FieldDef {
    name: String,
    field_type: FieldType,
    is_static: bool,
    sealed: bool,
}

/// Declaration of a class of the simulated heap.
///
/// ```
/// use sizeof::Primitive;
/// use sizeof::sim::ClassDef;
/// use sizeof::sim::Heap;
///
/// let mut heap = Heap::new();
/// let object = heap.object_type();
/// let base = heap.define(ClassDef::new("Base").primitive("id", Primitive::Long)).unwrap();
/// let derived = heap
///     .define(ClassDef::new("Derived").extends(base).reference("next", object))
///     .unwrap();
/// assert_eq!(heap.instance_size(derived), 24);
/// ```
#[derive(Clone, Debug)]
pub struct ClassDef {
    name: String,
    is_enum: bool,
    super_type: Option<TypeRef>,
    fields: Vec<FieldDef>,
}

impl ClassDef {
    pub fn new(name: &str) -> ClassDef {
        ClassDef {
            name: name.to_owned(),
            is_enum: false,
            super_type: None,
            fields: Vec::new(),
        }
    }

    /// Super class, `Object` if not specified.
    pub fn extends(mut self, super_type: TypeRef) -> ClassDef {
        self.super_type = Some(super_type);
        self
    }

    /// Enumeration type, instances are created with
    /// [`Heap::new_enum_constant`](crate::sim::Heap::new_enum_constant).
    pub fn enumeration(mut self) -> ClassDef {
        self.is_enum = true;
        self
    }

    fn field(
        mut self,
        name: &str,
        field_type: FieldType,
        is_static: bool,
        sealed: bool,
    ) -> ClassDef {
        self.fields.push(FieldDef {
            name: name.to_owned(),
            field_type,
            is_static,
            sealed,
        });
        self
    }

    pub fn primitive(self, name: &str, primitive: Primitive) -> ClassDef {
        self.field(name, FieldType::Primitive(primitive), false, false)
    }

    pub fn reference(self, name: &str, declared_type: TypeRef) -> ClassDef {
        self.field(name, FieldType::Reference(declared_type), false, false)
    }

    /// Reference field which cannot be read reflectively.
    pub fn sealed_reference(self, name: &str, declared_type: TypeRef) -> ClassDef {
        self.field(name, FieldType::Reference(declared_type), false, true)
    }

    pub fn static_primitive(self, name: &str, primitive: Primitive) -> ClassDef {
        self.field(name, FieldType::Primitive(primitive), true, false)
    }

    pub fn static_reference(self, name: &str, declared_type: TypeRef) -> ClassDef {
        self.field(name, FieldType::Reference(declared_type), true, false)
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn is_enum(&self) -> bool {
        self.is_enum
    }

    pub(crate) fn super_type(&self) -> Option<TypeRef> {
        self.super_type
    }

    /// Names declared more than once.
    pub(crate) fn duplicate_field(&self) -> Option<&str> {
        self.fields.iter().enumerate().find_map(|(i, f)| {
            self.fields[..i]
                .iter()
                .any(|g| g.name == f.name)
                .then_some(f.name.as_str())
        })
    }
}

#[derive(Debug, Allocative)]
pub(crate) struct DeclaredField {
    pub(crate) descriptor: FieldDescriptor,
    pub(crate) sealed: bool,
}

/// Registered type.
#[derive(Debug, Allocative)]
pub(crate) struct TypeDef {
    pub(crate) name: String,
    pub(crate) kind: TypeKind,
    pub(crate) super_type: Option<TypeRef>,
    pub(crate) declared: Vec<DeclaredField>,
    /// Instance fields of the type and its ancestors, ancestors first.
    pub(crate) slots: Vec<FieldDescriptor>,
    pub(crate) statics: Vec<(Arc<str>, Slot)>,
    /// Shallow size of instances, for non-array types.
    pub(crate) instance_size: u64,
    /// Element type, for array types.
    pub(crate) component: Option<FieldType>,
    /// Enum constants created so far.
    pub(crate) constants: u32,
}

impl TypeDef {
    /// Register a class, `parent` is the definition of its super class.
    pub(crate) fn class(
        this: TypeRef,
        def: &ClassDef,
        kind: TypeKind,
        parent: Option<(TypeRef, &TypeDef)>,
        layout: &LayoutModel,
    ) -> TypeDef {
        let declared: Vec<DeclaredField> = def
            .fields
            .iter()
            .map(|f| DeclaredField {
                descriptor: FieldDescriptor {
                    declaring_type: this,
                    name: Arc::from(f.name.as_str()),
                    is_static: f.is_static,
                    field_type: f.field_type,
                },
                sealed: f.sealed,
            })
            .collect();
        let mut slots = parent.map(|(_, p)| p.slots.clone()).unwrap_or_default();
        let mut statics = Vec::new();
        for f in &declared {
            let descriptor = &f.descriptor;
            if descriptor.is_static {
                statics.push((descriptor.name.clone(), Slot::zero(descriptor.field_type)));
            } else {
                slots.push(descriptor.clone());
            }
        }
        TypeDef {
            name: def.name.clone(),
            kind,
            super_type: parent.map(|(ty, _)| ty),
            instance_size: layout.instance_size(slots.iter().map(|f| f.field_type)),
            declared,
            slots,
            statics,
            component: None,
            constants: 0,
        }
    }

    pub(crate) fn array(name: String, component: FieldType, super_type: TypeRef) -> TypeDef {
        TypeDef {
            name,
            kind: TypeKind::Array,
            super_type: Some(super_type),
            declared: Vec::new(),
            slots: Vec::new(),
            statics: Vec::new(),
            instance_size: 0,
            component: Some(component),
            constants: 0,
        }
    }

    /// Instance fields of a new object, zero or null.
    pub(crate) fn zero_slots(&self) -> Vec<Slot> {
        self.slots
            .iter()
            .map(|f| Slot::zero(f.field_type))
            .collect()
    }

    /// Slot index of the instance field visible under `name`; a field of a
    /// subclass hides a field of the same name of its ancestors.
    pub(crate) fn slot_by_name(&self, name: &str) -> Option<usize> {
        self.slots.iter().rposition(|f| &*f.name == name)
    }

    /// Slot index of the instance field `name` declared by `declaring_type`.
    pub(crate) fn slot_of(&self, declaring_type: TypeRef, name: &str) -> Option<usize> {
        self.slots
            .iter()
            .position(|f| f.declaring_type == declaring_type && &*f.name == name)
    }

    pub(crate) fn is_sealed(&self, name: &str) -> bool {
        self.declared
            .iter()
            .any(|f| f.sealed && &*f.descriptor.name == name)
    }
}
