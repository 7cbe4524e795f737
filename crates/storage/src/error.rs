// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use thiserror::Error;

/// Errors from the metadata repository.
#[derive(Debug, Error)]
pub enum RepoError {
    #[error("no such row")]
    NotFound,

    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("unsupported schema version {found}, expected {expected}")]
    SchemaVersion { found: i64, expected: i64 },

    #[error("invalid input: {0}")]
    Validation(#[from] jm_core::ValidationError),

    #[error("tag scope {0} not permitted for this user")]
    TagScopeDenied(String),
}

impl RepoError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, RepoError::NotFound)
    }
}
