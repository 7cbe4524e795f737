// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use jm_core::ValidationError;
use jm_storage::RepoError;
use thiserror::Error;

/// Error taxonomy of the lifecycle and archival pipeline.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed or semantically invalid input.
    #[error("{0}")]
    Validation(#[from] ValidationError),

    /// Same `(jobId, cluster)` within the 24 h duplicate window.
    #[error("job {job_id} on cluster {cluster} already started within the duplicate window")]
    Duplicate { job_id: i64, cluster: String },

    /// Referenced job or tag does not exist.
    #[error("job or tag not found")]
    NotFound,

    /// State-machine violation (stop on a terminal job, ...).
    #[error("{0}")]
    Precondition(String),

    /// Metadata store failure.
    #[error("repository error: {0}")]
    Repo(RepoError),

    /// Metric backend failure.
    #[error(transparent)]
    Metric(#[from] jm_metrics::MetricError),

    /// Archive backend failure.
    #[error(transparent)]
    Archive(#[from] jm_archive::ArchiveError),
}

impl From<RepoError> for EngineError {
    fn from(e: RepoError) -> Self {
        match e {
            RepoError::NotFound => EngineError::NotFound,
            RepoError::Validation(v) => EngineError::Validation(v),
            other => EngineError::Repo(other),
        }
    }
}
