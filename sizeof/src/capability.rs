/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

//! Capabilities supplied by the host runtime.

use std::sync::Arc;

use allocative::Allocative;
use dupe::Dupe;

use crate::error::AccessDenied;
use crate::error::SizeOfError;
use crate::field::FieldDescriptor;
use crate::field::FieldType;
use crate::field::Primitive;
use crate::field::PrimitiveValue;
use crate::object::ObjectRef;
use crate::object::TypeRef;

/// Knows the footprint of a single object.
pub trait ShallowSizeOracle: Send + Sync + 'static {
    /// Own storage of the object: header, primitive fields and reference slots,
    /// or header and elements for arrays. Referenced objects are not included.
    ///
    /// Must be deterministic for an object which is not mutated.
    fn shallow_size(&self, obj: ObjectRef) -> u64;
}

/// What kind of type a runtime type is.
#[derive(Copy, Clone, Dupe, Debug, Eq, PartialEq, Hash, Allocative)]
pub enum TypeKind {
    /// Ordinary class.
    Class,
    /// Enumeration type, all instances are process-wide constants.
    Enum,
    /// Box of a primitive value.
    Boxed(Primitive),
    /// Array, see [`Reflection::component_type_of`].
    Array,
}

/// Runtime type introspection.
pub trait Reflection: Send + Sync + 'static {
    /// Most derived type of the object.
    fn type_of(&self, obj: ObjectRef) -> TypeRef;

    fn type_kind(&self, ty: TypeRef) -> TypeKind;

    fn type_name(&self, ty: TypeRef) -> &str;

    /// Fields declared directly on `ty`, not including inherited fields.
    fn declared_fields(&self, ty: TypeRef) -> Vec<FieldDescriptor>;

    fn super_type_of(&self, ty: TypeRef) -> Option<TypeRef>;

    /// Current value of a reference field of `obj`.
    fn read_field(
        &self,
        obj: ObjectRef,
        field: &FieldDescriptor,
    ) -> Result<Option<ObjectRef>, AccessDenied>;

    /// Number of elements of an array object.
    fn array_length(&self, array: ObjectRef) -> usize;

    /// Element of a reference array.
    fn array_element(&self, array: ObjectRef, index: usize) -> Option<ObjectRef>;

    /// Element type of an array type.
    fn component_type_of(&self, array_type: TypeRef) -> FieldType;

    /// Payload of a boxed primitive, `None` if `obj` is not a box.
    fn unbox(&self, obj: ObjectRef) -> Option<PrimitiveValue>;

    /// Canonical shared box of the value, if the host caches boxes of this value.
    ///
    /// Must not allocate.
    fn canonical_box(&self, value: PrimitiveValue) -> Option<ObjectRef>;
}

/// Capabilities injected into [`SizeOf`](crate::SizeOf).
///
/// Shallow size oracle is optional: a host may be able to provide reflection
/// before it is able to measure objects. Operations which need the oracle fail
/// with [`SizeOfError::UnavailableCapability`] until it is provided.
#[derive(Clone, Dupe)]
pub struct Capabilities {
    oracle: Option<Arc<dyn ShallowSizeOracle>>,
    reflection: Arc<dyn Reflection>,
}

impl Capabilities {
    pub fn new(reflection: Arc<dyn Reflection>) -> Capabilities {
        Capabilities {
            oracle: None,
            reflection,
        }
    }

    pub fn with_oracle(self, oracle: Arc<dyn ShallowSizeOracle>) -> Capabilities {
        Capabilities {
            oracle: Some(oracle),
            ..self
        }
    }

    pub fn is_ready(&self) -> bool {
        self.oracle.is_some()
    }

    pub(crate) fn oracle(&self) -> Result<&dyn ShallowSizeOracle, SizeOfError> {
        match &self.oracle {
            Some(oracle) => Ok(&**oracle),
            None => Err(SizeOfError::UnavailableCapability),
        }
    }

    pub fn reflection(&self) -> &dyn Reflection {
        &*self.reflection
    }
}
