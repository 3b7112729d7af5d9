/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

//! # sizeof
//!
//! Crate measures how much memory an object graph of a managed runtime retains.
//!
//! Two measurements are provided:
//! * [`SizeOf::shallow_size`]: the footprint of one object (header, primitive
//!   fields, reference slots), excluding everything it references
//! * [`SizeOf::retained_size`]: the sum of shallow sizes of every distinct object
//!   reachable from a root through reference fields and array elements
//!
//! The runtime itself is not part of this crate. It is described by two
//! capabilities supplied by the host:
//! * [`ShallowSizeOracle`] which knows the size of one object
//! * [`Reflection`] which knows types, fields, arrays and boxed primitives
//!
//! Capabilities are bundled into [`Capabilities`] and injected into [`SizeOf`].
//! A process-wide engine can be registered once with [`install`], after which the
//! free functions [`shallow_size`] and [`retained_size`] can be used.
//!
//! ## Shared objects
//!
//! Objects shared by the whole process (enum constants, cached boxed booleans,
//! integers and characters) are not charged to the graph that references them.
//! Cache bounds differ between hosts, so they are configured with [`FlyweightConfig`].
//! Interned strings are always measured: checking whether a string is interned
//! would require interning it.
//!
//! ## Simulated heap
//!
//! The [`sim`] module contains a self-contained managed heap which implements
//! both capabilities. It is used by the tests, and can be used to estimate
//! the footprint of data models before a real runtime is attached.

#![deny(rustdoc::broken_intra_doc_links)]

mod capability;
mod classify;
mod error;
mod field;
mod object;
pub mod sim;
mod size_of;
mod summary;
mod traverse;

pub use crate::capability::Capabilities;
pub use crate::capability::Reflection;
pub use crate::capability::ShallowSizeOracle;
pub use crate::capability::TypeKind;
pub use crate::classify::CacheRange;
pub use crate::classify::Classification;
pub use crate::classify::FlyweightConfig;
pub use crate::error::AccessDenied;
pub use crate::error::SizeOfError;
pub use crate::field::FieldDescriptor;
pub use crate::field::FieldType;
pub use crate::field::Primitive;
pub use crate::field::PrimitiveValue;
pub use crate::object::ObjectRef;
pub use crate::object::TypeRef;
pub use crate::size_of::SizeOf;
pub use crate::size_of::install;
pub use crate::size_of::installed;
pub use crate::size_of::retained_size;
pub use crate::size_of::shallow_size;
pub use crate::summary::AllocCounts;
pub use crate::summary::HeapSummary;
pub use crate::traverse::RetainedStats;
