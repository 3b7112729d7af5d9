/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

/// Host refused a reflective read of a field.
#[derive(thiserror::Error, Debug, Clone, Eq, PartialEq)]
#[error("Access denied reading field `{field}` declared on `{declaring_type}`")]
pub struct AccessDenied {
    pub declaring_type: String,
    pub field: String,
}

/// Measurement failure. Measurement is aborted, no partial size is reported.
#[derive(thiserror::Error, Debug, Clone, Eq, PartialEq)]
pub enum SizeOfError {
    #[error("Shallow size oracle is not initialized")]
    UnavailableCapability,
    #[error(transparent)]
    AccessDenied(#[from] AccessDenied),
}
