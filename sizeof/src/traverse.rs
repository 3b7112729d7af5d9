/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

//! Retained size traversal.
//!
//! Graph is walked with an explicit stack: measured graphs can be arbitrarily deep
//! (linked lists of millions of nodes), and recursion would overflow the native stack.

use std::collections::HashSet;

use allocative::Allocative;
use dupe::Dupe;

use crate::capability::Reflection;
use crate::capability::ShallowSizeOracle;
use crate::classify::Classification;
use crate::classify::Classifier;
use crate::classify::FlyweightConfig;
use crate::error::SizeOfError;
use crate::field::FieldTables;
use crate::object::ObjectRef;

/// Outcome of one retained size measurement.
#[derive(Default, Copy, Clone, Dupe, Debug, Eq, PartialEq, Allocative)]
pub struct RetainedStats {
    /// Retained size.
    pub bytes: u64,
    /// Distinct objects measured.
    pub objects: u64,
    /// References to shared flyweights, which were not measured.
    pub flyweight_refs: u64,
    /// Null fields and array elements.
    pub null_refs: u64,
    /// References to objects measured earlier in the same traversal.
    pub revisited_refs: u64,
}

/// Objects already measured, by identity.
#[derive(Default)]
struct VisitedSet {
    visited: HashSet<ObjectRef>,
}

impl VisitedSet {
    /// Returns `false` if the object was already visited.
    #[inline]
    fn insert(&mut self, obj: ObjectRef) -> bool {
        self.visited.insert(obj)
    }
}

/// References waiting to be classified. Order of exploration is irrelevant.
#[derive(Default)]
struct WorkStack {
    stack: Vec<Option<ObjectRef>>,
}

impl WorkStack {
    #[inline]
    fn push(&mut self, obj: Option<ObjectRef>) {
        self.stack.push(obj);
    }

    #[inline]
    fn pop(&mut self) -> Option<Option<ObjectRef>> {
        self.stack.pop()
    }

    fn reserve(&mut self, additional: usize) {
        self.stack.reserve(additional);
    }
}

/// State of one retained size measurement.
pub(crate) struct Traversal<'a> {
    oracle: &'a dyn ShallowSizeOracle,
    reflection: &'a dyn Reflection,
    classifier: Classifier<'a>,
    tables: &'a FieldTables,
    visited: VisitedSet,
    stack: WorkStack,
    stats: RetainedStats,
}

impl<'a> Traversal<'a> {
    pub(crate) fn new(
        oracle: &'a dyn ShallowSizeOracle,
        reflection: &'a dyn Reflection,
        flyweights: &'a FlyweightConfig,
        tables: &'a FieldTables,
    ) -> Traversal<'a> {
        Traversal {
            oracle,
            reflection,
            classifier: Classifier::new(reflection, flyweights),
            tables,
            visited: VisitedSet::default(),
            stack: WorkStack::default(),
            stats: RetainedStats::default(),
        }
    }

    /// Measure everything reachable from `root`.
    ///
    /// `on_measured` is called once for each measured object with its shallow size.
    pub(crate) fn run(
        mut self,
        root: ObjectRef,
        mut on_measured: impl FnMut(ObjectRef, u64),
    ) -> Result<RetainedStats, SizeOfError> {
        self.stack.push(Some(root));
        while let Some(next) = self.stack.pop() {
            self.step(next, &mut on_measured)?;
        }
        Ok(self.stats)
    }

    fn step(
        &mut self,
        next: Option<ObjectRef>,
        on_measured: &mut impl FnMut(ObjectRef, u64),
    ) -> Result<(), SizeOfError> {
        let classification = self.classifier.classify(next);
        let obj = match next {
            None => {
                self.stats.null_refs += 1;
                return Ok(());
            }
            Some(_) if classification == Classification::SharedFlyweight => {
                self.stats.flyweight_refs += 1;
                return Ok(());
            }
            Some(obj) => obj,
        };
        // Marked before children are pushed, so a cycle back to `obj` stops here.
        if !self.visited.insert(obj) {
            self.stats.revisited_refs += 1;
            return Ok(());
        }

        let size = self.oracle.shallow_size(obj);
        self.stats.bytes += size;
        self.stats.objects += 1;
        on_measured(obj, size);

        match classification {
            Classification::Array => self.push_elements(obj),
            Classification::Ordinary => self.push_fields(obj)?,
            Classification::Null | Classification::SharedFlyweight => {}
        }
        Ok(())
    }

    fn push_elements(&mut self, array: ObjectRef) {
        let ty = self.reflection.type_of(array);
        // Primitive elements are part of the array's shallow size.
        if self.reflection.component_type_of(ty).is_primitive() {
            return;
        }
        let len = self.reflection.array_length(array);
        self.stack.reserve(len);
        for index in 0..len {
            self.stack.push(self.reflection.array_element(array, index));
        }
    }

    fn push_fields(&mut self, obj: ObjectRef) -> Result<(), SizeOfError> {
        let ty = self.reflection.type_of(obj);
        let table = self.tables.get(ty, self.reflection);
        self.stack.reserve(table.len());
        for field in table.iter() {
            self.stack.push(self.reflection.read_field(obj, field)?);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::classify::FlyweightConfig;
    use crate::field::FieldTables;
    use crate::field::Primitive;
    use crate::field::PrimitiveValue;
    use crate::object::ObjectRef;
    use crate::sim::ClassDef;
    use crate::sim::Heap;
    use crate::traverse::RetainedStats;
    use crate::traverse::Traversal;
    use crate::traverse::VisitedSet;

    fn run(heap: &Heap, root: ObjectRef) -> (RetainedStats, Vec<(ObjectRef, u64)>) {
        let config = FlyweightConfig::default();
        let tables = FieldTables::default();
        let mut measured = Vec::new();
        let stats = Traversal::new(heap, heap, &config, &tables)
            .run(root, |obj, size| measured.push((obj, size)))
            .unwrap();
        (stats, measured)
    }

    #[test]
    fn test_visited_set_is_identity_keyed() {
        let mut heap = Heap::new();
        let a = heap.new_string("same");
        let b = heap.new_string("same");
        let mut visited = VisitedSet::default();
        assert!(visited.insert(a));
        assert!(visited.insert(b));
        assert!(!visited.insert(a));
    }

    #[test]
    fn test_each_object_reported_once() {
        let mut heap = Heap::new();
        let object = heap.object_type();
        let pair = heap
            .define(
                ClassDef::new("Pair")
                    .reference("first", object)
                    .reference("second", object),
            )
            .unwrap();
        let root = heap.new_object(pair).unwrap();
        let child = heap.new_object(pair).unwrap();
        heap.set_ref(root, "first", Some(child)).unwrap();
        heap.set_ref(root, "second", Some(child)).unwrap();
        heap.set_ref(child, "first", Some(root)).unwrap();

        let (stats, measured) = run(&heap, root);
        assert_eq!(measured.len(), 2);
        assert_eq!(measured[0].0, root);
        assert_eq!(
            stats,
            RetainedStats {
                bytes: 2 * heap.instance_size(pair),
                objects: 2,
                flyweight_refs: 0,
                null_refs: 1,
                revisited_refs: 2,
            }
        );
    }

    #[test]
    fn test_flyweights_counted_in_stats() {
        let mut heap = Heap::new();
        let object = heap.object_type();
        let holder = heap
            .define(
                ClassDef::new("Holder")
                    .reference("small", object)
                    .reference("large", object)
                    .primitive("n", Primitive::Int),
            )
            .unwrap();
        let root = heap.new_object(holder).unwrap();
        let small = heap.value_of(PrimitiveValue::Int(1));
        let large = heap.value_of(PrimitiveValue::Int(100_000));
        heap.set_ref(root, "small", Some(small)).unwrap();
        heap.set_ref(root, "large", Some(large)).unwrap();

        let (stats, measured) = run(&heap, root);
        assert_eq!(stats.flyweight_refs, 1);
        assert_eq!(stats.objects, 2);
        assert!(measured.iter().any(|(obj, _)| *obj == large));
        assert!(!measured.iter().any(|(obj, _)| *obj == small));
    }
}
