/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

use std::collections::HashMap;
use std::fmt::Write as _;
use std::ops::AddAssign;

use allocative::Allocative;
use dupe::Dupe;

use crate::capability::Reflection;
use crate::object::TypeRef;
use crate::traverse::RetainedStats;

/// Measured objects counters.
#[derive(Default, Copy, Clone, Dupe, Debug, Eq, PartialEq, Allocative)]
pub struct AllocCounts {
    pub bytes: u64,
    pub count: u64,
}

impl AddAssign for AllocCounts {
    fn add_assign(&mut self, other: AllocCounts) {
        self.bytes += other.bytes;
        self.count += other.count;
    }
}

/// Retained size of a graph broken down by runtime type of measured objects.
#[derive(Default, Debug, Clone, Allocative)]
pub struct HeapSummary {
    by_type: HashMap<TypeRef, AllocCounts>,
    stats: RetainedStats,
}

impl HeapSummary {
    pub(crate) fn record(&mut self, ty: TypeRef, bytes: u64) {
        *self.by_type.entry(ty).or_default() += AllocCounts { bytes, count: 1 };
    }

    pub(crate) fn finish(mut self, stats: RetainedStats) -> HeapSummary {
        self.stats = stats;
        self
    }

    pub fn stats(&self) -> RetainedStats {
        self.stats
    }

    pub fn get(&self, ty: TypeRef) -> AllocCounts {
        self.by_type.get(&ty).copied().unwrap_or_default()
    }

    /// Number of distinct types measured.
    pub fn type_count(&self) -> usize {
        self.by_type.len()
    }

    /// Types sorted by retained bytes, largest first.
    pub fn by_bytes(&self) -> Vec<(TypeRef, AllocCounts)> {
        let mut types: Vec<_> = self.by_type.iter().map(|(t, c)| (*t, *c)).collect();
        types.sort_by(|(ta, a), (tb, b)| b.bytes.cmp(&a.bytes).then(ta.cmp(tb)));
        types
    }

    /// Text table: one line per type, largest first, then a total.
    pub fn render(&self, reflection: &dyn Reflection) -> String {
        let mut s = String::new();
        writeln!(s, "{:>12} {:>10}  type", "bytes", "count").unwrap();
        for (ty, counts) in self.by_bytes() {
            let name = reflection.type_name(ty);
            writeln!(s, "{:>12} {:>10}  {}", counts.bytes, counts.count, name).unwrap();
        }
        let stats = self.stats;
        writeln!(s, "{:>12} {:>10}  TOTAL", stats.bytes, stats.objects).unwrap();
        s
    }
}
