/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

use std::fmt;
use std::num::NonZeroUsize;

use allocative::Allocative;
use dupe::Dupe;

/// Handle to a live object of the measured runtime.
///
/// Handle is an address: two handles are equal iff they denote the same storage,
/// regardless of what the referenced objects contain. Null reference is
/// represented as `Option::<ObjectRef>::None`.
#[derive(Copy, Clone, Dupe, Eq, PartialEq, Hash, Ord, PartialOrd, Allocative)]
#[repr(transparent)]
pub struct ObjectRef(NonZeroUsize);

impl ObjectRef {
    /// Handle for given address, `None` for null address.
    #[inline]
    pub const fn new(address: usize) -> Option<ObjectRef> {
        match NonZeroUsize::new(address) {
            Some(address) => Some(ObjectRef(address)),
            None => None,
        }
    }

    #[inline]
    pub const fn from_address(address: NonZeroUsize) -> ObjectRef {
        ObjectRef(address)
    }

    #[inline]
    pub const fn address(self) -> usize {
        self.0.get()
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectRef({:#x})", self.address())
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{:#x}", self.address())
    }
}

/// Runtime type handle issued by the host.
#[derive(Copy, Clone, Dupe, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Allocative)]
#[repr(transparent)]
pub struct TypeRef(u32);

impl TypeRef {
    #[inline]
    pub const fn new(index: u32) -> TypeRef {
        TypeRef(index)
    }

    #[inline]
    pub const fn index(self) -> u32 {
        self.0
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "type#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use dupe::Dupe;

    use crate::object::ObjectRef;
    use crate::object::TypeRef;

    #[test]
    fn test_null_address() {
        assert_eq!(ObjectRef::new(0), None);
        assert_eq!(ObjectRef::new(0x10).map(ObjectRef::address), Some(0x10));
    }

    #[test]
    fn test_identity_hash() {
        let a = ObjectRef::new(0x10).unwrap();
        let b = ObjectRef::new(0x10).unwrap();
        let c = ObjectRef::new(0x20).unwrap();
        let set: HashSet<ObjectRef> = [a, b, c].into_iter().collect();
        assert_eq!(set.len(), 2);
        assert_eq!(format!("{}", c), "@0x20");
    }

    #[test]
    fn test_dupe() {
        let a = ObjectRef::new(0x10).unwrap();
        assert_eq!(a.dupe(), a);
        assert_eq!(Some(a).dupe(), Some(a));
        let ty = TypeRef::new(3);
        assert_eq!(ty.dupe().index(), 3);
    }
}
