/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

use std::collections::HashMap;
use std::sync::Arc;

use allocative::Allocative;
use dupe::Dupe;
use serde::Deserialize;
use serde::Serialize;

use crate::capability::Capabilities;
use crate::capability::Reflection;
use crate::capability::ShallowSizeOracle;
use crate::capability::TypeKind;
use crate::classify::FlyweightConfig;
use crate::error::AccessDenied;
use crate::field::FieldDescriptor;
use crate::field::FieldType;
use crate::field::Primitive;
use crate::field::PrimitiveValue;
use crate::object::ObjectRef;
use crate::object::TypeRef;
use crate::sim::layout::LayoutModel;
use crate::sim::types::ClassDef;
use crate::sim::types::Slot;
use crate::sim::types::TypeDef;

/// Address of the first allocated object.
const HEAP_BASE: usize = 0x1000;

#[derive(Debug, thiserror::Error)]
enum HeapError {
    #[error("Unknown object {0}")]
    UnknownObject(ObjectRef),
    #[error("Type `{0}` has no instance field `{1}`")]
    NoSuchField(String, String),
    #[error("Type `{0}` has no static field `{1}`")]
    NoSuchStaticField(String, String),
    #[error("Field `{field}` of `{ty}` cannot hold {value:?}")]
    TypeMismatch {
        ty: String,
        field: String,
        value: Slot,
    },
    #[error("Field `{1}` is declared twice on `{0}`")]
    DuplicateField(String, String),
    #[error("Type `{0}` cannot be extended")]
    NotExtendable(String),
    #[error("Enum `{0}` cannot declare a super type")]
    EnumSuperType(String),
    #[error("Type `{0}` cannot be instantiated with `new_object`")]
    NotInstantiable(String),
    #[error("Type `{0}` is not an enum")]
    NotEnum(String),
    #[error("Object {0} is not a reference array")]
    NotReferenceArray(ObjectRef),
    #[error("Index {index} is out of bounds for array of length {len}")]
    IndexOutOfBounds { index: usize, len: usize },
}

/// Simulated heap configuration.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeapConfig {
    pub layout: LayoutModel,
    /// Values for which the heap keeps canonical boxes.
    pub box_cache: FlyweightConfig,
}

impl HeapConfig {
    /// Parse JSON, missing keys take default values.
    pub fn from_json(json: &str) -> serde_json::Result<HeapConfig> {
        serde_json::from_str(json)
    }
}

#[derive(Debug, Allocative)]
struct ObjectData {
    address: usize,
    ty: TypeRef,
    /// Shallow size, fixed at allocation.
    size: u64,
    /// Instance fields (see `TypeDef::slots`) or array elements.
    slots: Vec<Slot>,
}

/// Types every heap starts with.
#[derive(Debug, Allocative)]
struct WellKnown {
    object: TypeRef,
    string: TypeRef,
    enum_base: TypeRef,
    char_array: TypeRef,
    /// Box types in the order of `Primitive` variants.
    boxes: Vec<(Primitive, TypeRef)>,
}

/// Canonical boxes.
///
/// Both booleans are boxed when the heap is created. An integral box is
/// created by the first [`Heap::value_of`] of a value in the configured range.
#[derive(Debug, Allocative)]
struct BoxCache {
    config: FlyweightConfig,
    booleans: Option<[ObjectRef; 2]>,
    integral: HashMap<(Primitive, i64), ObjectRef>,
}

impl BoxCache {
    /// Key of a value which has a canonical box, `None` for uncached values.
    fn key(&self, value: PrimitiveValue) -> Option<(Primitive, i64)> {
        let primitive = value.primitive();
        let range = self.config.range_for(primitive)?;
        let v = value.as_integral()?;
        range.contains(v).then_some((primitive, v))
    }

    fn get(&self, value: PrimitiveValue) -> Option<ObjectRef> {
        if let PrimitiveValue::Boolean(b) = value {
            return self.booleans.map(|bs| bs[b as usize]);
        }
        let key = self.key(value)?;
        self.integral.get(&key).copied()
    }
}

/// Simulated managed heap.
///
/// Heap holds a registry of types (classes with single inheritance, enums, boxed
/// primitives, strings and arrays) and a bump-allocated set of objects.
/// It implements both [`Reflection`] and [`ShallowSizeOracle`].
///
/// Heap is built with `&mut self` methods, and measured through `Arc<Heap>`
/// (see [`Heap::capabilities`]), so a measured heap is never mutated.
#[derive(Debug, Allocative)]
pub struct Heap {
    layout: LayoutModel,
    types: Vec<TypeDef>,
    /// Sorted by address.
    objects: Vec<ObjectData>,
    next_address: usize,
    well_known: WellKnown,
    array_types: Vec<(FieldType, TypeRef)>,
    box_cache: BoxCache,
}

impl Default for Heap {
    fn default() -> Heap {
        Heap::new()
    }
}

impl Heap {
    pub fn new() -> Heap {
        Heap::with_config(HeapConfig::default())
    }

    pub fn with_config(config: HeapConfig) -> Heap {
        let placeholder = TypeRef::new(0);
        let mut heap = Heap {
            layout: config.layout,
            types: Vec::new(),
            objects: Vec::new(),
            next_address: HEAP_BASE,
            well_known: WellKnown {
                object: placeholder,
                string: placeholder,
                enum_base: placeholder,
                char_array: placeholder,
                boxes: Vec::new(),
            },
            array_types: Vec::new(),
            box_cache: BoxCache {
                config: config.box_cache,
                booleans: None,
                integral: HashMap::new(),
            },
        };

        let object = heap.register(&ClassDef::new("Object"), TypeKind::Class, None);
        heap.well_known.object = object;
        let char_array = heap.array_type(FieldType::Primitive(Primitive::Char));
        heap.well_known.char_array = char_array;
        let string_def = ClassDef::new("String")
            .reference("value", char_array)
            .primitive("hash", Primitive::Int);
        let string = heap.register(&string_def, TypeKind::Class, Some(object));
        heap.well_known.string = string;
        let enum_def = ClassDef::new("Enum")
            .reference("name", string)
            .primitive("ordinal", Primitive::Int);
        let enum_base = heap.register(&enum_def, TypeKind::Class, Some(object));
        heap.well_known.enum_base = enum_base;
        for (primitive, name) in [
            (Primitive::Boolean, "Boolean"),
            (Primitive::Byte, "Byte"),
            (Primitive::Char, "Character"),
            (Primitive::Short, "Short"),
            (Primitive::Int, "Integer"),
            (Primitive::Float, "Float"),
            (Primitive::Long, "Long"),
            (Primitive::Double, "Double"),
        ] {
            let def = ClassDef::new(name).primitive("value", primitive);
            let ty = heap.register(&def, TypeKind::Boxed(primitive), Some(object));
            heap.well_known.boxes.push((primitive, ty));
        }

        let no = heap.new_box(PrimitiveValue::Boolean(false));
        let yes = heap.new_box(PrimitiveValue::Boolean(true));
        heap.box_cache.booleans = Some([no, yes]);
        heap
    }

    /// Measurement capabilities backed by this heap.
    pub fn capabilities(self: Arc<Self>) -> Capabilities {
        Capabilities::new(self.dupe()).with_oracle(self)
    }

    pub fn layout(&self) -> &LayoutModel {
        &self.layout
    }

    /// Root of the class hierarchy.
    pub fn object_type(&self) -> TypeRef {
        self.well_known.object
    }

    pub fn string_type(&self) -> TypeRef {
        self.well_known.string
    }

    pub fn box_type(&self, primitive: Primitive) -> TypeRef {
        self.well_known
            .boxes
            .iter()
            .find(|(p, _)| *p == primitive)
            .map(|(_, ty)| *ty)
            .unwrap_or(self.well_known.object)
    }

    /// Array type with given element type, registered on first use.
    pub fn array_type(&mut self, component: FieldType) -> TypeRef {
        if let Some((_, ty)) = self.array_types.iter().find(|(c, _)| *c == component) {
            return *ty;
        }
        let element_name = match component {
            FieldType::Primitive(p) => p.name().to_owned(),
            FieldType::Reference(ty) => self.type_def(ty).name.clone(),
        };
        let ty = self.next_type();
        let name = format!("{}[]", element_name);
        let def = TypeDef::array(name, component, self.well_known.object);
        self.types.push(def);
        self.array_types.push((component, ty));
        ty
    }

    /// Register a class. Enums always extend `Enum`.
    pub fn define(&mut self, def: ClassDef) -> anyhow::Result<TypeRef> {
        if let Some(field) = def.duplicate_field() {
            let name = def.name().to_owned();
            return Err(HeapError::DuplicateField(name, field.to_owned()).into());
        }
        let (kind, super_type) = if def.is_enum() {
            if def.super_type().is_some() {
                return Err(HeapError::EnumSuperType(def.name().to_owned()).into());
            }
            (TypeKind::Enum, self.well_known.enum_base)
        } else {
            let object = self.well_known.object;
            (TypeKind::Class, def.super_type().unwrap_or(object))
        };
        let parent = self.type_def(super_type);
        let extendable = match parent.kind {
            TypeKind::Class => true,
            TypeKind::Enum | TypeKind::Boxed(_) | TypeKind::Array => false,
        };
        if !extendable || super_type == self.well_known.string {
            return Err(HeapError::NotExtendable(parent.name.clone()).into());
        }
        Ok(self.register(&def, kind, Some(super_type)))
    }

    fn register(&mut self, def: &ClassDef, kind: TypeKind, super_type: Option<TypeRef>) -> TypeRef {
        let ty = self.next_type();
        let parent = super_type.map(|s| (s, self.type_def(s)));
        let type_def = TypeDef::class(ty, def, kind, parent, &self.layout);
        self.types.push(type_def);
        tracing::trace!("registered type `{}` as {}", def.name(), ty);
        ty
    }

    fn next_type(&self) -> TypeRef {
        TypeRef::new(self.types.len() as u32)
    }

    fn type_def(&self, ty: TypeRef) -> &TypeDef {
        &self.types[ty.index() as usize]
    }

    /// Shallow size of instances of a non-array type.
    pub fn instance_size(&self, ty: TypeRef) -> u64 {
        self.type_def(ty).instance_size
    }

    fn alloc(&mut self, ty: TypeRef, size: u64, slots: Vec<Slot>) -> ObjectRef {
        let address = self.next_address;
        self.next_address += size.max(1) as usize;
        self.objects.push(ObjectData {
            address,
            ty,
            size,
            slots,
        });
        match ObjectRef::new(address) {
            Some(obj) => obj,
            None => unreachable!("heap starts at {HEAP_BASE:#x}"),
        }
    }

    fn alloc_instance(&mut self, ty: TypeRef) -> ObjectRef {
        let def = self.type_def(ty);
        let slots = def.zero_slots();
        let size = def.instance_size;
        self.alloc(ty, size, slots)
    }

    /// Instance of a class with all fields zero or null.
    pub fn new_object(&mut self, ty: TypeRef) -> anyhow::Result<ObjectRef> {
        let def = self.type_def(ty);
        if def.kind != TypeKind::Class {
            return Err(HeapError::NotInstantiable(def.name.clone()).into());
        }
        Ok(self.alloc_instance(ty))
    }

    /// New constant of an enum type.
    ///
    /// Name and ordinal are stored in the fields inherited from `Enum`, fields
    /// of the enum itself are left zero even if they have the same names.
    pub fn new_enum_constant(&mut self, ty: TypeRef, name: &str) -> anyhow::Result<ObjectRef> {
        let def = self.type_def(ty);
        if def.kind != TypeKind::Enum {
            return Err(HeapError::NotEnum(def.name.clone()).into());
        }
        let enum_base = self.well_known.enum_base;
        let name_slot = def.slot_of(enum_base, "name");
        let ordinal_slot = def.slot_of(enum_base, "ordinal");
        let (Some(name_slot), Some(ordinal_slot)) = (name_slot, ordinal_slot) else {
            unreachable!("enum `{}` does not extend `Enum`", def.name);
        };
        let ordinal = PrimitiveValue::Int(def.constants as i32);
        let name = self.new_string(name);
        let obj = self.alloc_instance(ty);
        let slots = &mut self.object_mut(obj).slots;
        slots[name_slot] = Slot::Ref(Some(name));
        slots[ordinal_slot] = Slot::Primitive(ordinal);
        self.types[ty.index() as usize].constants += 1;
        Ok(obj)
    }

    /// Fresh box, never the canonical one.
    pub fn new_box(&mut self, value: PrimitiveValue) -> ObjectRef {
        let ty = self.box_type(value.primitive());
        let obj = self.alloc_instance(ty);
        self.object_mut(obj).slots[0] = Slot::Primitive(value);
        obj
    }

    /// Canonical box if the value is cached, fresh box otherwise.
    ///
    /// The canonical box of a cached value is allocated by the first call.
    pub fn value_of(&mut self, value: PrimitiveValue) -> ObjectRef {
        if let Some(obj) = self.box_cache.get(value) {
            return obj;
        }
        let obj = self.new_box(value);
        if let Some(key) = self.box_cache.key(value) {
            self.box_cache.integral.insert(key, obj);
        }
        obj
    }

    /// String with UTF-16 contents.
    pub fn new_string(&mut self, s: &str) -> ObjectRef {
        let units: Vec<Slot> = s
            .encode_utf16()
            .map(|u| Slot::Primitive(PrimitiveValue::Char(u)))
            .collect();
        let component = FieldType::Primitive(Primitive::Char);
        let size = self.layout.array_size(component, units.len());
        let chars = self.alloc(self.well_known.char_array, size, units);
        let string = self.alloc_instance(self.well_known.string);
        self.object_mut(string).slots[0] = Slot::Ref(Some(chars));
        string
    }

    /// Array of zeroes or nulls.
    pub fn new_array(&mut self, component: FieldType, len: usize) -> ObjectRef {
        let ty = self.array_type(component);
        let size = self.layout.array_size(component, len);
        self.alloc(ty, size, vec![Slot::zero(component); len])
    }

    /// Slot index of the instance field visible under `name`.
    fn field_slot(&self, ty: TypeRef, name: &str) -> anyhow::Result<usize> {
        let def = self.type_def(ty);
        let Some(index) = def.slot_by_name(name) else {
            let owner = def.name.clone();
            return Err(HeapError::NoSuchField(owner, name.to_owned()).into());
        };
        Ok(index)
    }

    pub fn set_field(&mut self, obj: ObjectRef, name: &str, value: Slot) -> anyhow::Result<()> {
        let data = self.object(obj)?;
        let index = self.field_slot(data.ty, name)?;
        let def = self.type_def(data.ty);
        if !value.fits(def.slots[index].field_type) {
            let e = HeapError::TypeMismatch {
                ty: def.name.clone(),
                field: name.to_owned(),
                value,
            };
            return Err(e.into());
        }
        self.object_mut(obj).slots[index] = value;
        Ok(())
    }

    pub fn set_ref(
        &mut self,
        obj: ObjectRef,
        name: &str,
        value: Option<ObjectRef>,
    ) -> anyhow::Result<()> {
        self.set_field(obj, name, Slot::Ref(value))
    }

    pub fn set_primitive(
        &mut self,
        obj: ObjectRef,
        name: &str,
        value: PrimitiveValue,
    ) -> anyhow::Result<()> {
        self.set_field(obj, name, Slot::Primitive(value))
    }

    pub fn get_field(&self, obj: ObjectRef, name: &str) -> anyhow::Result<Slot> {
        let data = self.object(obj)?;
        let index = self.field_slot(data.ty, name)?;
        Ok(data.slots[index])
    }

    /// Store a reference into a reference array.
    pub fn set_element(
        &mut self,
        array: ObjectRef,
        index: usize,
        value: Option<ObjectRef>,
    ) -> anyhow::Result<()> {
        let data = self.object(array)?;
        match self.type_def(data.ty).component {
            Some(FieldType::Reference(_)) => {}
            _ => return Err(HeapError::NotReferenceArray(array).into()),
        }
        let len = data.slots.len();
        if index >= len {
            return Err(HeapError::IndexOutOfBounds { index, len }.into());
        }
        self.object_mut(array).slots[index] = Slot::Ref(value);
        Ok(())
    }

    pub fn set_static(
        &mut self,
        ty: TypeRef,
        name: &str,
        value: Option<ObjectRef>,
    ) -> anyhow::Result<()> {
        let def = &mut self.types[ty.index() as usize];
        let owner = def.name.clone();
        let Some((_, slot)) = def.statics.iter_mut().find(|(n, _)| &**n == name) else {
            return Err(HeapError::NoSuchStaticField(owner, name.to_owned()).into());
        };
        if !matches!(slot, Slot::Ref(_)) {
            let e = HeapError::TypeMismatch {
                ty: owner,
                field: name.to_owned(),
                value: Slot::Ref(value),
            };
            return Err(e.into());
        }
        *slot = Slot::Ref(value);
        Ok(())
    }

    /// Number of allocated objects, including canonical boxes.
    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    /// Sum of shallow sizes of all allocated objects.
    pub fn allocated_bytes(&self) -> u64 {
        self.objects.iter().map(|o| o.size).sum()
    }

    fn index_of(&self, obj: ObjectRef) -> Option<usize> {
        let address = obj.address();
        self.objects
            .binary_search_by_key(&address, |o| o.address)
            .ok()
    }

    fn object(&self, obj: ObjectRef) -> anyhow::Result<&ObjectData> {
        match self.index_of(obj) {
            Some(index) => Ok(&self.objects[index]),
            None => Err(HeapError::UnknownObject(obj).into()),
        }
    }

    /// Object known to exist, because it was just allocated or was checked before.
    fn object_mut(&mut self, obj: ObjectRef) -> &mut ObjectData {
        match self.index_of(obj) {
            Some(index) => &mut self.objects[index],
            None => panic!("unknown object {}", obj),
        }
    }

    /// Object handed to the measurement engine. Handles come from this heap,
    /// a dangling handle is a bug of the caller.
    fn live(&self, obj: ObjectRef) -> &ObjectData {
        match self.object(obj) {
            Ok(data) => data,
            Err(e) => panic!("{}", e),
        }
    }
}

impl ShallowSizeOracle for Heap {
    fn shallow_size(&self, obj: ObjectRef) -> u64 {
        self.live(obj).size
    }
}

impl Reflection for Heap {
    fn type_of(&self, obj: ObjectRef) -> TypeRef {
        self.live(obj).ty
    }

    fn type_kind(&self, ty: TypeRef) -> TypeKind {
        self.type_def(ty).kind
    }

    fn type_name(&self, ty: TypeRef) -> &str {
        &self.type_def(ty).name
    }

    fn declared_fields(&self, ty: TypeRef) -> Vec<FieldDescriptor> {
        self.type_def(ty)
            .declared
            .iter()
            .map(|f| f.descriptor.clone())
            .collect()
    }

    fn super_type_of(&self, ty: TypeRef) -> Option<TypeRef> {
        self.type_def(ty).super_type
    }

    fn read_field(
        &self,
        obj: ObjectRef,
        field: &FieldDescriptor,
    ) -> Result<Option<ObjectRef>, AccessDenied> {
        let declaring = self.type_def(field.declaring_type);
        if declaring.is_sealed(&field.name) {
            return Err(AccessDenied {
                declaring_type: declaring.name.clone(),
                field: field.name.to_string(),
            });
        }
        let slot = if field.is_static {
            declaring
                .statics
                .iter()
                .find(|(name, _)| *name == field.name)
                .map(|(_, slot)| *slot)
        } else {
            let data = self.live(obj);
            self.type_def(data.ty)
                .slot_of(field.declaring_type, &field.name)
                .map(|index| data.slots[index])
        };
        match slot {
            Some(Slot::Ref(value)) => Ok(value),
            Some(Slot::Primitive(_)) | None => Ok(None),
        }
    }

    fn array_length(&self, array: ObjectRef) -> usize {
        self.live(array).slots.len()
    }

    fn array_element(&self, array: ObjectRef, index: usize) -> Option<ObjectRef> {
        match self.live(array).slots.get(index) {
            Some(Slot::Ref(value)) => *value,
            Some(Slot::Primitive(_)) | None => None,
        }
    }

    fn component_type_of(&self, array_type: TypeRef) -> FieldType {
        let def = self.type_def(array_type);
        match def.component {
            Some(component) => component,
            None => panic!("`{}` is not an array type", def.name),
        }
    }

    fn unbox(&self, obj: ObjectRef) -> Option<PrimitiveValue> {
        let data = self.live(obj);
        match (self.type_def(data.ty).kind, data.slots.first()) {
            (TypeKind::Boxed(_), Some(Slot::Primitive(value))) => Some(*value),
            _ => None,
        }
    }

    fn canonical_box(&self, value: PrimitiveValue) -> Option<ObjectRef> {
        self.box_cache.get(value)
    }
}
