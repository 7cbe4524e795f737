// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Periodic maintenance: retention sweeps, archive compression, duration
//! refresh for running jobs, re-archival of failed jobs, cache flushes.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use jm_archive::{Archive, ArchiveBackend};
use jm_core::{Clock, MonitoringStatus};
use jm_storage::JobRepository;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::archiver::ArchiverHandle;
use crate::error::EngineError;

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Delete jobs older than this many seconds; `None` disables the sweep.
    pub retention_age: Option<i64>,
    pub retention_omit_tagged: bool,
    /// Also delete the corresponding archive records.
    pub retention_clean_archive: bool,
    pub retention_interval: Duration,
    /// Compress the payloads of this many oldest records per pass;
    /// 0 disables compression.
    pub compression_batch: usize,
    pub compression_interval: Duration,
    /// Recompute `duration` for running jobs this often.
    pub duration_refresh_interval: Option<Duration>,
    pub retry_interval: Duration,
    /// First retry delay; doubles per attempt.
    pub retry_base_delay: i64,
    pub retry_max_attempts: u32,
    pub cache_sync_interval: Option<Duration>,
    /// Cached jobs younger than this many seconds stay in the cache on a
    /// sync; older ones are promoted.
    pub cache_retention: i64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            retention_age: None,
            retention_omit_tagged: true,
            retention_clean_archive: false,
            retention_interval: Duration::from_secs(24 * 3600),
            compression_batch: 0,
            compression_interval: Duration::from_secs(24 * 3600),
            duration_refresh_interval: Some(Duration::from_secs(300)),
            retry_interval: Duration::from_secs(60),
            retry_base_delay: 60,
            retry_max_attempts: 5,
            cache_sync_interval: Some(Duration::from_secs(60)),
            cache_retention: 300,
        }
    }
}

struct RetryState {
    attempts: u32,
    next_at: i64,
}

/// Owns the periodic tasks. Each `run_*_once` method is also callable
/// directly, which is how the tests drive it.
pub struct Scheduler<C: Clock> {
    repo: Arc<JobRepository>,
    archive: Archive,
    archiver: ArchiverHandle,
    clock: C,
    config: SchedulerConfig,
    retries: Mutex<HashMap<i64, RetryState>>,
}

impl<C: Clock> Scheduler<C> {
    pub fn new(
        repo: Arc<JobRepository>,
        archive: Archive,
        archiver: ArchiverHandle,
        clock: C,
        config: SchedulerConfig,
    ) -> Self {
        Self { repo, archive, archiver, clock, config, retries: Mutex::new(HashMap::new()) }
    }

    /// Delete metadata rows (and optionally archive records) older than
    /// the retention age. Returns `(rows, archive_records)` deleted.
    pub async fn run_retention_once(&self) -> Result<(u64, u64), EngineError> {
        let Some(age) = self.config.retention_age else { return Ok((0, 0)) };
        let cutoff = self.clock.now_unix() - age;
        let rows = self.repo.delete_before(cutoff, self.config.retention_omit_tagged)?;
        let records = if self.config.retention_clean_archive {
            self.archive.clean(cutoff).await?
        } else {
            0
        };
        if rows > 0 || records > 0 {
            info!(rows, records, cutoff, "retention sweep");
        }
        Ok((rows, records))
    }

    /// Compress the oldest uncompressed archive payloads.
    pub async fn run_compression_once(&self) -> Result<u64, EngineError> {
        if self.config.compression_batch == 0 {
            return Ok(0);
        }
        Ok(self.archive.compress_last(self.config.compression_batch).await?)
    }

    /// Refresh `duration` for running jobs so reads see fresh values
    /// without a stop event.
    pub fn run_duration_refresh_once(&self) -> Result<u64, EngineError> {
        let now = self.clock.now_unix();
        let mut updated = 0;
        for job in self.repo.running_jobs()? {
            let duration = now - job.start_time;
            if duration < 0 {
                continue;
            }
            if let Some(id) = job.id {
                self.repo.update_duration(id, duration)?;
                updated += 1;
            }
        }
        Ok(updated)
    }

    /// Re-enqueue archive-failed jobs with exponential back-off, up to
    /// the attempt cap. Returns the number of jobs enqueued.
    pub fn run_retry_once(&self) -> Result<u64, EngineError> {
        let failed = self.repo.jobs_with_status(MonitoringStatus::ArchivingFailed)?;
        let now = self.clock.now_unix();
        let mut retries = self.retries.lock();

        // Drop bookkeeping for jobs that recovered or disappeared. An
        // in-flight archival (running-or-archiving) keeps its entry so a
        // failure landing after this sweep resumes the same back-off.
        retries.retain(|id, _| match self.repo.find_by_id(*id) {
            Ok(job) => !matches!(
                job.monitoring_status,
                MonitoringStatus::ArchivingSuccessful | MonitoringStatus::Disabled
            ),
            Err(_) => false,
        });

        let mut enqueued = 0;
        for job in failed {
            let Some(id) = job.id else { continue };
            let entry = retries.entry(id).or_insert(RetryState { attempts: 0, next_at: now });
            if entry.attempts >= self.config.retry_max_attempts {
                continue;
            }
            if now < entry.next_at {
                continue;
            }
            if self.archiver.try_enqueue(id) {
                entry.attempts += 1;
                entry.next_at =
                    now + self.config.retry_base_delay * (1i64 << entry.attempts.min(16));
                info!(id, attempt = entry.attempts, "re-archiving job");
                enqueued += 1;
            }
        }
        Ok(enqueued)
    }

    /// Flush cached jobs older than the cache retention into the main
    /// table.
    pub fn run_cache_sync_once(&self) -> Result<u64, EngineError> {
        let before = self.clock.now_unix() - self.config.cache_retention;
        Ok(self.repo.sync_cache(before)?)
    }

    /// Spawn the interval loops. Each loop stops when `shutdown` fires.
    pub fn spawn(self: Arc<Self>, shutdown: CancellationToken) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();

        if self.config.retention_age.is_some() {
            let sched = Arc::clone(&self);
            let token = shutdown.clone();
            handles.push(tokio::spawn(async move {
                let period = sched.config.retention_interval;
                run_loop(period, token, move || {
                    let sched = Arc::clone(&sched);
                    async move { sched.run_retention_once().await.map(|_| ()) }
                })
                .await;
            }));
        }

        if self.config.compression_batch > 0 {
            let sched = Arc::clone(&self);
            let token = shutdown.clone();
            handles.push(tokio::spawn(async move {
                let period = sched.config.compression_interval;
                run_loop(period, token, move || {
                    let sched = Arc::clone(&sched);
                    async move { sched.run_compression_once().await.map(|_| ()) }
                })
                .await;
            }));
        }

        if let Some(interval) = self.config.duration_refresh_interval {
            let sched = Arc::clone(&self);
            let token = shutdown.clone();
            handles.push(tokio::spawn(async move {
                run_loop(interval, token, move || {
                    let sched = Arc::clone(&sched);
                    async move { sched.run_duration_refresh_once().map(|_| ()) }
                })
                .await;
            }));
        }

        {
            let sched = Arc::clone(&self);
            let token = shutdown.clone();
            handles.push(tokio::spawn(async move {
                let period = sched.config.retry_interval;
                run_loop(period, token, move || {
                    let sched = Arc::clone(&sched);
                    async move { sched.run_retry_once().map(|_| ()) }
                })
                .await;
            }));
        }

        if let Some(interval) = self.config.cache_sync_interval {
            let sched = Arc::clone(&self);
            let token = shutdown.clone();
            handles.push(tokio::spawn(async move {
                run_loop(interval, token, move || {
                    let sched = Arc::clone(&sched);
                    async move { sched.run_cache_sync_once().map(|_| ()) }
                })
                .await;
            }));
        }

        handles
    }
}

async fn run_loop<F, Fut>(period: Duration, shutdown: CancellationToken, mut task: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<(), EngineError>>,
{
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick fires immediately; skip it so tasks run after one
    // full period.
    interval.tick().await;
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = interval.tick() => {
                if let Err(e) = task().await {
                    match e {
                        EngineError::Archive(_) | EngineError::Metric(_) => {
                            warn!(error = %e, "periodic task backend failure");
                        }
                        other => error!(error = %other, "periodic task failed"),
                    }
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
