/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

use once_cell::sync::OnceCell;

use crate::capability::Capabilities;
use crate::classify::Classification;
use crate::classify::Classifier;
use crate::classify::FlyweightConfig;
use crate::error::SizeOfError;
use crate::field::FieldTables;
use crate::object::ObjectRef;
use crate::summary::HeapSummary;
use crate::traverse::RetainedStats;
use crate::traverse::Traversal;

/// Measures objects of one host runtime.
///
/// Engine is `Send + Sync`, independent measurements may run concurrently
/// as long as the measured graphs are not mutated.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
///
/// use sizeof::SizeOf;
/// use sizeof::sim::ClassDef;
/// use sizeof::sim::Heap;
///
/// let mut heap = Heap::new();
/// let object = heap.object_type();
/// let node = heap.define(ClassDef::new("Node").reference("next", object)).unwrap();
/// let a = heap.new_object(node).unwrap();
/// let b = heap.new_object(node).unwrap();
/// heap.set_ref(a, "next", Some(b)).unwrap();
/// heap.set_ref(b, "next", Some(a)).unwrap();
///
/// let size_of = SizeOf::new(Heap::capabilities(Arc::new(heap)));
/// let shallow = size_of.shallow_size(a).unwrap();
/// assert_eq!(size_of.retained_size(Some(a)).unwrap(), 2 * shallow);
/// ```
pub struct SizeOf {
    capabilities: Capabilities,
    flyweights: FlyweightConfig,
    tables: FieldTables,
}

impl SizeOf {
    pub fn new(capabilities: Capabilities) -> SizeOf {
        SizeOf {
            capabilities,
            flyweights: FlyweightConfig::default(),
            tables: FieldTables::default(),
        }
    }

    /// Replace canonical box cache bounds.
    pub fn with_flyweights(self, flyweights: FlyweightConfig) -> SizeOf {
        SizeOf { flyweights, ..self }
    }

    pub fn flyweights(&self) -> &FlyweightConfig {
        &self.flyweights
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    /// Whether the shallow size oracle is available.
    pub fn is_ready(&self) -> bool {
        self.capabilities.is_ready()
    }

    pub fn classify(&self, obj: Option<ObjectRef>) -> Classification {
        let reflection = self.capabilities.reflection();
        Classifier::new(reflection, &self.flyweights).classify(obj)
    }

    /// Size of the object itself, not including objects it references.
    pub fn shallow_size(&self, obj: ObjectRef) -> Result<u64, SizeOfError> {
        Ok(self.capabilities.oracle()?.shallow_size(obj))
    }

    /// Size of the object and every distinct object reachable from it,
    /// excluding process-wide shared objects. Size of null is zero.
    pub fn retained_size(&self, root: Option<ObjectRef>) -> Result<u64, SizeOfError> {
        Ok(self.measure(root)?.bytes)
    }

    /// Like [`retained_size`](SizeOf::retained_size), with traversal counters.
    pub fn measure(&self, root: Option<ObjectRef>) -> Result<RetainedStats, SizeOfError> {
        self.traverse(root, |_, _| {})
    }

    /// Retained size broken down by type.
    pub fn summarize(&self, root: Option<ObjectRef>) -> Result<HeapSummary, SizeOfError> {
        let reflection = self.capabilities.reflection();
        let mut summary = HeapSummary::default();
        let stats = self.traverse(root, |obj, bytes| {
            let ty = reflection.type_of(obj);
            summary.record(ty, bytes);
        })?;
        Ok(summary.finish(stats))
    }

    fn traverse(
        &self,
        root: Option<ObjectRef>,
        on_measured: impl FnMut(ObjectRef, u64),
    ) -> Result<RetainedStats, SizeOfError> {
        let Some(root) = root else {
            return Ok(RetainedStats::default());
        };
        let oracle = self.capabilities.oracle()?;
        let reflection = self.capabilities.reflection();
        let traversal = Traversal::new(oracle, reflection, &self.flyweights, &self.tables);
        let result = traversal.run(root, on_measured);
        match &result {
            Ok(stats) => {
                let ty = reflection.type_name(reflection.type_of(root));
                let (bytes, objects) = (stats.bytes, stats.objects);
                tracing::debug!(
                    "retained size of {root} ({ty}): {bytes} bytes in {objects} objects"
                );
            }
            Err(e) => tracing::debug!("retained size of {} aborted: {}", root, e),
        }
        result
    }
}

static INSTALLED: OnceCell<SizeOf> = OnceCell::new();

/// Register the process-wide engine used by [`shallow_size`] and [`retained_size`].
///
/// Engine can be installed only once, subsequent calls return the rejected engine.
pub fn install(size_of: SizeOf) -> Result<(), SizeOf> {
    INSTALLED.set(size_of)?;
    tracing::debug!("process-wide sizeof engine installed");
    Ok(())
}

/// Process-wide engine, fails if [`install`] was not called.
pub fn installed() -> Result<&'static SizeOf, SizeOfError> {
    INSTALLED.get().ok_or(SizeOfError::UnavailableCapability)
}

/// [`SizeOf::shallow_size`] of the process-wide engine.
pub fn shallow_size(obj: ObjectRef) -> Result<u64, SizeOfError> {
    installed()?.shallow_size(obj)
}

/// [`SizeOf::retained_size`] of the process-wide engine.
///
/// Size of null is zero even if no engine is installed.
pub fn retained_size(root: Option<ObjectRef>) -> Result<u64, SizeOfError> {
    match root {
        None => Ok(0),
        Some(_) => installed()?.retained_size(root),
    }
}
