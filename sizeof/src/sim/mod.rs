/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

//! Simulated managed heap.
//!
//! [`Heap`] models a runtime with single inheritance, static fields, enums,
//! boxed primitives with a cache of canonical boxes, strings backed by
//! character arrays, and arrays of primitives or references.
//! Object sizes follow a [`LayoutModel`].
//!
//! ```
//! use std::sync::Arc;
//!
//! use sizeof::SizeOf;
//! use sizeof::sim::ClassDef;
//! use sizeof::sim::Heap;
//!
//! let mut heap = Heap::new();
//! let object = heap.object_type();
//! let node = heap.define(ClassDef::new("Node").reference("next", object)).unwrap();
//! let a = heap.new_object(node).unwrap();
//! let b = heap.new_object(node).unwrap();
//! heap.set_ref(a, "next", Some(b)).unwrap();
//! heap.set_ref(b, "next", Some(a)).unwrap();
//!
//! let size_of = SizeOf::new(Heap::capabilities(Arc::new(heap)));
//! assert_eq!(size_of.retained_size(Some(a)).unwrap(), 32);
//! ```

mod heap;
mod layout;
mod types;

pub use crate::sim::heap::Heap;
pub use crate::sim::heap::HeapConfig;
pub use crate::sim::layout::LayoutModel;
pub use crate::sim::types::ClassDef;
pub use crate::sim::types::Slot;
