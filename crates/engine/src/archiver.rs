// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The archiver: a bounded work queue plus N workers that materialize a
//! stopped job's metrics, derive summary statistics, and write the
//! archive record.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use jm_archive::{Archive, ArchiveBackend, JobRef};
use jm_core::MonitoringStatus;
use jm_metrics::{stats, MetricDispatch};
use jm_storage::JobRepository;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::error::EngineError;

#[derive(Debug, Clone)]
pub struct ArchiverConfig {
    /// Parallel archival workers.
    pub workers: usize,
    /// Queue bound; producers block (HTTP) or fall back to the retry
    /// sweep (bus) when full.
    pub queue_depth: usize,
    /// How long a blocking enqueue waits before giving up.
    pub enqueue_timeout: Duration,
    /// Deadline for each metric-backend and archive call.
    pub backend_deadline: Duration,
}

impl Default for ArchiverConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            queue_depth: 32,
            enqueue_timeout: Duration::from_secs(5),
            backend_deadline: Duration::from_secs(30),
        }
    }
}

/// Producer side of the archiver queue.
#[derive(Clone)]
pub struct ArchiverHandle {
    tx: mpsc::Sender<i64>,
    enqueue_timeout: Duration,
}

impl ArchiverHandle {
    /// Enqueue, waiting up to the configured timeout when the queue is
    /// full (synchronous-ingress back-pressure). Returns false on timeout
    /// or shutdown.
    pub async fn enqueue(&self, job_db_id: i64) -> bool {
        self.tx
            .send_timeout(job_db_id, self.enqueue_timeout)
            .await
            .is_ok()
    }

    /// Enqueue without waiting (bus ingress). Returns false when full;
    /// the caller marks the job archive-failed so the retry sweep picks
    /// it up.
    pub fn try_enqueue(&self, job_db_id: i64) -> bool {
        self.tx.try_send(job_db_id).is_ok()
    }
}

struct Inner {
    repo: Arc<JobRepository>,
    dispatch: Arc<MetricDispatch>,
    archive: Archive,
    deadline: Duration,
    /// Jobs currently being archived; a second enqueue of the same id is
    /// dropped instead of racing the first.
    inflight: Mutex<HashSet<i64>>,
}

/// The worker pool. One per process.
pub struct Archiver {
    inner: Arc<Inner>,
    tx: mpsc::Sender<i64>,
    enqueue_timeout: Duration,
    workers: Vec<JoinHandle<()>>,
}

impl Archiver {
    pub fn spawn(
        repo: Arc<JobRepository>,
        dispatch: Arc<MetricDispatch>,
        archive: Archive,
        config: ArchiverConfig,
        shutdown: CancellationToken,
    ) -> Self {
        let (tx, rx) = mpsc::channel::<i64>(config.queue_depth.max(1));
        let rx = Arc::new(tokio::sync::Mutex::new(rx));
        let inner = Arc::new(Inner {
            repo,
            dispatch,
            archive,
            deadline: config.backend_deadline,
            inflight: Mutex::new(HashSet::new()),
        });

        let mut workers = Vec::with_capacity(config.workers.max(1));
        for worker_id in 0..config.workers.max(1) {
            let inner = Arc::clone(&inner);
            let rx = Arc::clone(&rx);
            let shutdown = shutdown.clone();
            workers.push(tokio::spawn(async move {
                loop {
                    let item = {
                        let mut rx = rx.lock().await;
                        tokio::select! {
                            _ = shutdown.cancelled() => None,
                            item = rx.recv() => item,
                        }
                    };
                    let Some(job_db_id) = item else { break };
                    if let Err(e) = run_one(&inner, job_db_id).await {
                        error!(worker_id, job_db_id, error = %e, "archiving failed");
                        if let Err(e) =
                            inner.repo.update_monitoring_status(job_db_id, MonitoringStatus::ArchivingFailed)
                        {
                            error!(job_db_id, error = %e, "could not record archive failure");
                        }
                    }
                }
            }));
        }

        Self { inner, tx, enqueue_timeout: config.enqueue_timeout, workers }
    }

    pub fn handle(&self) -> ArchiverHandle {
        ArchiverHandle { tx: self.tx.clone(), enqueue_timeout: self.enqueue_timeout }
    }

    /// Archive one job synchronously, bypassing the queue. Used by the
    /// retry sweep so back-off bookkeeping sees the result.
    pub async fn archive_job(&self, job_db_id: i64) -> Result<(), EngineError> {
        let result = run_one(&self.inner, job_db_id).await;
        if result.is_err() {
            self.inner
                .repo
                .update_monitoring_status(job_db_id, MonitoringStatus::ArchivingFailed)?;
        }
        result
    }

    /// Stop accepting work and wait for the workers to drain, up to
    /// `drain_timeout`.
    pub async fn shutdown(self, drain_timeout: Duration) {
        drop(self.tx);
        let join_all = async {
            for worker in self.workers {
                let _ = worker.await;
            }
        };
        if tokio::time::timeout(drain_timeout, join_all).await.is_err() {
            warn!("archiver drain timed out");
        }
    }
}

async fn run_one(inner: &Inner, job_db_id: i64) -> Result<(), EngineError> {
    // Mutual exclusion per job id without holding a lock across the
    // backend calls: a duplicate enqueue is simply dropped.
    if !inner.inflight.lock().insert(job_db_id) {
        return Ok(());
    }
    let result = archive_one(inner, job_db_id).await;
    inner.inflight.lock().remove(&job_db_id);
    result
}

async fn archive_one(inner: &Inner, job_db_id: i64) -> Result<(), EngineError> {
    let mut job = inner.repo.find_by_id(job_db_id)?;
    if job.monitoring_status == MonitoringStatus::Disabled {
        return Ok(());
    }
    let job_ref = JobRef::from(&job);
    if job.monitoring_status == MonitoringStatus::ArchivingSuccessful
        && inner.archive.exists(&job_ref).await
    {
        return Ok(());
    }
    inner
        .repo
        .update_monitoring_status(job_db_id, MonitoringStatus::RunningOrArchiving)?;

    let registry = inner.dispatch.registry();
    let metrics = registry.archivable_metrics(&job.cluster, &job.sub_cluster);
    let result = inner
        .dispatch
        .load_job_data(&job, Some(&metrics), None, 0, inner.deadline)
        .await?;

    let mut data = result.data.clone();
    for per_scope in data.values_mut() {
        for metric in per_scope.values_mut() {
            stats::fill_series_statistics(metric);
            stats::attach_statistics_series(metric);
        }
    }

    let summary =
        stats::summarize_job(registry, &job.cluster, &job.sub_cluster, job.duration, &data);
    job.statistics = summary.statistics;
    job.footprint = summary.footprint.clone();
    job.energy = summary.energy;
    job.energy_footprint = summary.energy_footprint.clone();
    // The snapshot records the terminal outcome it is part of.
    job.monitoring_status = MonitoringStatus::ArchivingSuccessful;

    // meta + data form the atomic unit; any failure leaves the record
    // invalid and the job marked archive-failed for the retry sweep.
    inner.archive.store_meta(&job).await?;
    inner.archive.store_data(&job_ref, &data).await?;

    inner.repo.update_footprint(job_db_id, &summary.footprint)?;
    if !summary.energy_footprint.is_empty() {
        inner.repo.update_energy(job_db_id, summary.energy, &summary.energy_footprint)?;
    }
    inner
        .repo
        .stop(job_db_id, job.duration, job.state, MonitoringStatus::ArchivingSuccessful)?;

    info!(job_db_id, job_ref = %job_ref, metrics = data.len(), "job archived");
    Ok(())
}

#[cfg(test)]
#[path = "archiver_tests.rs"]
mod tests;
