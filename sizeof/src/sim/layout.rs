/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

use allocative::Allocative;
use dupe::Dupe;
use serde::Deserialize;
use serde::Serialize;

use crate::field::FieldType;

/// Object layout of the simulated heap.
///
/// Fields are packed without gaps, the whole object is padded to `alignment`.
/// Defaults describe a 64-bit runtime with compressed references.
#[derive(Copy, Clone, Dupe, Debug, Eq, PartialEq, Serialize, Deserialize, Allocative)]
#[serde(default)]
pub struct LayoutModel {
    /// Header of a non-array object.
    pub header_bytes: u32,
    /// Header of an array, including the length.
    pub array_header_bytes: u32,
    pub reference_bytes: u32,
    pub alignment: u32,
}

impl Default for LayoutModel {
    fn default() -> LayoutModel {
        LayoutModel {
            header_bytes: 12,
            array_header_bytes: 16,
            reference_bytes: 4,
            alignment: 8,
        }
    }
}

impl LayoutModel {
    /// 64-bit runtime with full-width references.
    pub fn uncompressed() -> LayoutModel {
        LayoutModel {
            header_bytes: 16,
            array_header_bytes: 24,
            reference_bytes: 8,
            alignment: 8,
        }
    }

    #[inline]
    pub fn align_up(&self, bytes: u64) -> u64 {
        let alignment = self.alignment.max(1) as u64;
        bytes.div_ceil(alignment) * alignment
    }

    pub fn slot_bytes(&self, field_type: FieldType) -> u64 {
        match field_type {
            FieldType::Primitive(p) => p.size_bytes() as u64,
            FieldType::Reference(_) => self.reference_bytes as u64,
        }
    }

    pub fn instance_size(&self, fields: impl IntoIterator<Item = FieldType>) -> u64 {
        let fields: u64 = fields.into_iter().map(|f| self.slot_bytes(f)).sum();
        self.align_up(self.header_bytes as u64 + fields)
    }

    pub fn array_size(&self, component: FieldType, len: usize) -> u64 {
        let elements = self.slot_bytes(component) * len as u64;
        self.align_up(self.array_header_bytes as u64 + elements)
    }
}
