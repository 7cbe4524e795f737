// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! jm-archive: versioned on-disk record of completed jobs.
//!
//! An archive holds, per job, a `meta.json` (the job snapshot with summary
//! statistics) and a `data.json` (the full metric payload). The pair is
//! the unit of validity: a record is complete only when both are readable.
//! Three backends share the contract: the local filesystem, S3, and an
//! embedded SQLite table store.

mod format;
mod fs;
mod s3;
mod sqlite;

use std::sync::Arc;

use async_trait::async_trait;
use jm_core::{Job, JobData, MetricScope};
use thiserror::Error;

pub use format::ARCHIVE_VERSION;
pub use fs::FsArchive;
pub use s3::S3Archive;
pub use sqlite::SqliteArchive;

/// Value identifier of one archived job.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobRef {
    pub cluster: String,
    pub job_id: i64,
    pub start_time: i64,
}

impl From<&Job> for JobRef {
    fn from(job: &Job) -> Self {
        Self { cluster: job.cluster.clone(), job_id: job.job_id, start_time: job.start_time }
    }
}

impl std::fmt::Display for JobRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.cluster, self.job_id, self.start_time)
    }
}

/// Errors from archive backends.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("archive record not found: {0}")]
    NotFound(JobRef),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("object store error: {0}")]
    ObjectStore(String),

    #[error("unsupported archive version {found}, expected {expected}")]
    Version { found: u32, expected: u32 },
}

/// Contract shared by all archive backends.
///
/// `store_meta` and `store_data` are individually atomic; writers call
/// them as a pair and treat any failure as "record absent".
#[async_trait]
pub trait ArchiveBackend: Send + Sync {
    /// Load the archived job snapshot (including summary statistics).
    async fn load_meta(&self, job: &JobRef) -> Result<Job, ArchiveError>;

    /// Load the metric payload, optionally filtered by metric name and scope.
    async fn load_data(
        &self,
        job: &JobRef,
        metrics: Option<&[String]>,
        scopes: Option<&[MetricScope]>,
    ) -> Result<JobData, ArchiveError>;

    /// Atomically write the job snapshot.
    async fn store_meta(&self, job: &Job) -> Result<(), ArchiveError>;

    /// Atomically write the metric payload.
    async fn store_data(&self, job: &JobRef, data: &JobData) -> Result<(), ArchiveError>;

    /// Whether a complete record (meta and data) exists.
    async fn exists(&self, job: &JobRef) -> bool;

    /// Delete records with `start_time < before`; returns the count.
    async fn clean(&self, before: i64) -> Result<u64, ArchiveError>;

    /// Compress the payloads of the `n` oldest records; returns the count
    /// of newly compressed records.
    async fn compress_last(&self, n: usize) -> Result<u64, ArchiveError>;

    /// List every archived job reference.
    async fn iter_refs(&self) -> Result<Vec<JobRef>, ArchiveError>;
}

/// The configured archive: a tagged set of built-in backends plus an
/// escape hatch for external ones.
#[derive(Clone)]
pub enum Archive {
    Fs(Arc<FsArchive>),
    S3(Arc<S3Archive>),
    Sqlite(Arc<SqliteArchive>),
    Custom(Arc<dyn ArchiveBackend>),
}

impl Archive {
    fn backend(&self) -> &dyn ArchiveBackend {
        match self {
            Archive::Fs(b) => b.as_ref(),
            Archive::S3(b) => b.as_ref(),
            Archive::Sqlite(b) => b.as_ref(),
            Archive::Custom(b) => b.as_ref(),
        }
    }
}

#[async_trait]
impl ArchiveBackend for Archive {
    async fn load_meta(&self, job: &JobRef) -> Result<Job, ArchiveError> {
        self.backend().load_meta(job).await
    }

    async fn load_data(
        &self,
        job: &JobRef,
        metrics: Option<&[String]>,
        scopes: Option<&[MetricScope]>,
    ) -> Result<JobData, ArchiveError> {
        self.backend().load_data(job, metrics, scopes).await
    }

    async fn store_meta(&self, job: &Job) -> Result<(), ArchiveError> {
        self.backend().store_meta(job).await
    }

    async fn store_data(&self, job: &JobRef, data: &JobData) -> Result<(), ArchiveError> {
        self.backend().store_data(job, data).await
    }

    async fn exists(&self, job: &JobRef) -> bool {
        self.backend().exists(job).await
    }

    async fn clean(&self, before: i64) -> Result<u64, ArchiveError> {
        self.backend().clean(before).await
    }

    async fn compress_last(&self, n: usize) -> Result<u64, ArchiveError> {
        self.backend().compress_last(n).await
    }

    async fn iter_refs(&self) -> Result<Vec<JobRef>, ArchiveError> {
        self.backend().iter_refs().await
    }
}
