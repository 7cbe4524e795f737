// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The job lifecycle state machine: start, stop, delete, tagging.
//!
//! Transitions:
//!
//! ```text
//!   (none) --start--> RUNNING --stop--> COMPLETED | FAILED | CANCELLED
//!                                      | STOPPED | TIMEOUT | OUT_OF_MEMORY
//!   RUNNING | terminal --delete--> (none)
//! ```
//!
//! No terminal state ever transitions again.

use std::sync::Arc;

use jm_core::{
    ClusterRegistry, Job, JobState, MonitoringStatus, Tag, ValidationError, DUPLICATE_WINDOW_SECS,
};
use jm_storage::{JobRepository, RepoError};
use parking_lot::Mutex;
use serde::Deserialize;
use tracing::{info, warn};

use crate::archiver::ArchiverHandle;
use crate::error::EngineError;
use crate::locks::KeyedLocks;

/// Body of a stop request; the job is addressed either by the path id or
/// by its `(jobId, cluster, startTime)` identity.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct StopRequest {
    #[serde(default)]
    pub job_id: Option<i64>,
    #[serde(default)]
    pub cluster: Option<String>,
    #[serde(default)]
    pub start_time: Option<i64>,
    pub stop_time: i64,
    #[serde(default)]
    pub state: Option<JobState>,
}

/// How a stop request addresses its job.
#[derive(Debug, Clone)]
pub enum StopTarget {
    ByDbId(i64),
    ByIdentity { job_id: i64, cluster: String, start_time: Option<i64> },
}

impl StopTarget {
    /// Identity key for the per-job mutex. Stable across the cache
    /// promotion that may rewrite the internal id mid-stop.
    fn lock_key(&self) -> String {
        match self {
            StopTarget::ByDbId(id) => format!("id:{id}"),
            StopTarget::ByIdentity { job_id, cluster, .. } => format!("{cluster}:{job_id}"),
        }
    }
}

/// How a delete request addresses its jobs.
#[derive(Debug, Clone)]
pub enum DeleteTarget {
    ByDbId(i64),
    ByIdentity { job_id: i64, cluster: String, start_time: Option<i64> },
    Before { ts: i64, omit_tagged: bool },
}

/// Validates lifecycle requests, enforces the state machine and the
/// duplicate window, and schedules archiving on stop.
pub struct LifecycleEngine {
    repo: Arc<JobRepository>,
    registry: Arc<ClusterRegistry>,
    archiver: ArchiverHandle,
    /// Serializes starts so the duplicate-window read-then-insert is
    /// race-free within this process. The repository's unique index backs
    /// it up across processes.
    start_lock: Mutex<()>,
    job_locks: KeyedLocks<String>,
}

impl LifecycleEngine {
    pub fn new(
        repo: Arc<JobRepository>,
        registry: Arc<ClusterRegistry>,
        archiver: ArchiverHandle,
    ) -> Self {
        Self {
            repo,
            registry,
            archiver,
            start_lock: Mutex::new(()),
            job_locks: KeyedLocks::new(),
        }
    }

    pub fn repo(&self) -> &Arc<JobRepository> {
        &self.repo
    }

    pub fn registry(&self) -> &Arc<ClusterRegistry> {
        &self.registry
    }

    /// Register a started job. Returns the generated internal id.
    pub fn start_job(&self, mut job: Job) -> Result<i64, EngineError> {
        job.validate()?;
        if self.registry.cluster(&job.cluster).is_none() {
            return Err(ValidationError::UnknownCluster(job.cluster).into());
        }
        if !self.registry.partition_known(&job.cluster, &job.partition) {
            return Err(ValidationError::UnknownPartition {
                cluster: job.cluster,
                partition: job.partition,
            }
            .into());
        }
        if let Some(sub) = self.registry.assign_sub_cluster(&job.cluster, &job.sub_cluster) {
            job.sub_cluster = sub;
        }
        job.id = None;
        job.state = JobState::Running;
        job.duration = 0;

        let _guard = self.start_lock.lock();
        for existing in self.repo.find_all(job.job_id, &job.cluster)? {
            if (existing.start_time - job.start_time).abs() < DUPLICATE_WINDOW_SECS {
                return Err(EngineError::Duplicate {
                    job_id: job.job_id,
                    cluster: job.cluster.clone(),
                });
            }
        }
        let id = if job.tags.is_empty() {
            self.repo.start(&job)?
        } else {
            // Tags need the main table's link rows right away.
            self.repo.start_direct(&job)?
        };
        info!(id, job_id = job.job_id, cluster = %job.cluster, user = %job.user, "job started");
        Ok(id)
    }

    /// Stop a running job and schedule its archival.
    ///
    /// `wait_for_queue` selects the back-pressure mode: synchronous
    /// ingress blocks on a full archiver queue, bus ingress spills to the
    /// persistent retry list instead.
    pub async fn stop_job(
        &self,
        target: StopTarget,
        stop_time: i64,
        state: Option<JobState>,
        wait_for_queue: bool,
    ) -> Result<Job, EngineError> {
        if let Some(s) = state {
            if !s.is_terminal() {
                return Err(ValidationError::BadState(s.to_string()).into());
            }
        }

        let _guard = self.job_locks.acquire(target.lock_key()).await;

        let job = self.resolve_for_stop(&target)?;
        let id = job.id.ok_or(EngineError::NotFound)?;
        if job.state.is_terminal() {
            return Err(EngineError::Precondition(format!(
                "job {} is already stopped ({})",
                job.job_id, job.state
            )));
        }
        if stop_time < job.start_time {
            return Err(ValidationError::StopBeforeStart {
                start: job.start_time,
                stop: stop_time,
            }
            .into());
        }

        let duration = stop_time - job.start_time;
        let final_state = state.unwrap_or(JobState::Completed);
        let monitoring = if job.monitoring_status == MonitoringStatus::Disabled {
            MonitoringStatus::Disabled
        } else {
            MonitoringStatus::RunningOrArchiving
        };
        self.repo.stop(id, duration, final_state, monitoring)?;
        info!(id, job_id = job.job_id, duration, state = %final_state, "job stopped");

        if monitoring != MonitoringStatus::Disabled {
            let queued = if wait_for_queue {
                self.archiver.enqueue(id).await
            } else {
                self.archiver.try_enqueue(id)
            };
            if !queued {
                // The retry sweep picks it up from the persistent list.
                warn!(id, "archiver queue full, deferring to retry sweep");
                self.repo.update_monitoring_status(id, MonitoringStatus::ArchivingFailed)?;
            }
        }

        Ok(self.repo.find_by_id(id)?)
    }

    /// Cache-first job resolution for stop (a stop may arrive before the
    /// job cache was ever flushed; the row is promoted on the spot).
    fn resolve_for_stop(&self, target: &StopTarget) -> Result<Job, EngineError> {
        let cached = match target {
            StopTarget::ByDbId(id) => self.repo.find_cached_by_id(*id),
            StopTarget::ByIdentity { job_id, cluster, start_time } => {
                self.repo.find_cached(*job_id, cluster, *start_time)
            }
        };
        match cached {
            Ok(job) => {
                let old_id = job.id.ok_or(EngineError::NotFound)?;
                let new_id = self.repo.promote_cached(old_id)?;
                return Ok(self.repo.find_by_id(new_id)?);
            }
            Err(RepoError::NotFound) => {}
            Err(e) => return Err(e.into()),
        }
        match target {
            StopTarget::ByDbId(id) => Ok(self.repo.find_by_id(*id)?),
            StopTarget::ByIdentity { job_id, cluster, start_time } => {
                match self.repo.find_running(*job_id, cluster, *start_time) {
                    Ok(job) => Ok(job),
                    Err(RepoError::NotFound) => {
                        // Distinguish "already stopped" from "never seen".
                        let all = self.repo.find_all(*job_id, cluster)?;
                        let matching = all.into_iter().find(|j| match start_time {
                            Some(st) => j.start_time == *st,
                            None => true,
                        });
                        matching.ok_or(EngineError::NotFound)
                    }
                    Err(e) => Err(e.into()),
                }
            }
        }
    }

    /// Delete job rows. Archive records are never touched; retention
    /// sweeps are the only archive deleters.
    pub fn delete_job(&self, target: DeleteTarget) -> Result<u64, EngineError> {
        match target {
            DeleteTarget::ByDbId(id) => {
                self.delete_one(id)?;
                info!(id, "job deleted");
                Ok(1)
            }
            DeleteTarget::ByIdentity { job_id, cluster, start_time } => {
                let all = self.repo.find_all(job_id, &cluster)?;
                let mut deleted = 0;
                for job in all {
                    let matches = match start_time {
                        Some(st) => job.start_time == st,
                        None => true,
                    };
                    if let (true, Some(id)) = (matches, job.id) {
                        self.delete_one(id)?;
                        deleted += 1;
                    }
                }
                if deleted == 0 {
                    return Err(EngineError::NotFound);
                }
                Ok(deleted)
            }
            DeleteTarget::Before { ts, omit_tagged } => {
                let deleted = self.repo.delete_before(ts, omit_tagged)?;
                info!(deleted, before = ts, "old jobs deleted");
                Ok(deleted)
            }
        }
    }

    /// Attach tags, promoting the job out of the cache if necessary.
    pub fn tag_job(
        &self,
        acting_user: &str,
        is_admin: bool,
        job_db_id: i64,
        tags: &[Tag],
    ) -> Result<Job, EngineError> {
        let id = self.promote_if_cached(job_db_id)?;
        for tag in tags {
            self.repo
                .add_tag_or_create(acting_user, is_admin, id, &tag.tag_type, &tag.name, &tag.scope)?;
        }
        Ok(self.repo.find_by_id(id)?)
    }

    /// Detach tags, promoting the job out of the cache if necessary.
    pub fn untag_job(&self, job_db_id: i64, tags: &[Tag]) -> Result<Job, EngineError> {
        let id = self.promote_if_cached(job_db_id)?;
        for tag in tags {
            let tag_id = self.repo.find_tag(&tag.tag_type, &tag.name, &tag.scope)?;
            self.repo.remove_job_tag(id, tag_id)?;
        }
        Ok(self.repo.find_by_id(id)?)
    }

    /// Upsert one metadata entry, promoting the job out of the cache if
    /// necessary.
    pub fn edit_metadata(
        &self,
        job_db_id: i64,
        key: &str,
        value: &str,
    ) -> Result<Job, EngineError> {
        let id = self.promote_if_cached(job_db_id)?;
        self.repo.update_metadata(id, key, value)?;
        Ok(self.repo.find_by_id(id)?)
    }

    /// Delete a row wherever it lives, committed table first.
    fn delete_one(&self, id: i64) -> Result<(), EngineError> {
        match self.repo.delete_by_id(id) {
            Ok(()) => Ok(()),
            Err(RepoError::NotFound) => Ok(self.repo.delete_cached_by_id(id)?),
            Err(e) => Err(e.into()),
        }
    }

    fn promote_if_cached(&self, id: i64) -> Result<i64, EngineError> {
        match self.repo.find_by_id(id) {
            Ok(_) => Ok(id),
            Err(RepoError::NotFound) => match self.repo.find_cached_by_id(id) {
                Ok(_) => Ok(self.repo.promote_cached(id)?),
                Err(e) => Err(e.into()),
            },
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
