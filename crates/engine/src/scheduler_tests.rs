// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::archiver::{Archiver, ArchiverConfig};
use jm_archive::{Archive, ArchiveBackend, JobRef, SqliteArchive};
use jm_core::{FakeClock, JobState};
use jm_metrics::{MetricBackendRegistry, MetricDispatch, ReplayBackend};
use jm_storage::JobRepository;
use tokio_util::sync::CancellationToken;

struct Harness {
    repo: Arc<JobRepository>,
    archive: Archive,
    backend: Arc<ReplayBackend>,
    clock: FakeClock,
    scheduler: Scheduler<FakeClock>,
    _archiver: Archiver,
}

fn harness(config: SchedulerConfig) -> Harness {
    let repo = Arc::new(JobRepository::in_memory().unwrap());
    let registry = Arc::new(jm_core::ClusterRegistry::new(vec![
        jm_core::test_support::test_cluster(),
    ]));
    let backend = ReplayBackend::new();
    let mut backends = MetricBackendRegistry::new();
    let data_backend: Arc<dyn jm_metrics::MetricDataBackend> = Arc::clone(&backend) as Arc<dyn jm_metrics::MetricDataBackend>;
    backends.register("testcluster", data_backend);
    let dispatch = Arc::new(MetricDispatch::new(registry, backends));
    let archive = Archive::Sqlite(Arc::new(SqliteArchive::in_memory().unwrap()));
    let archiver = Archiver::spawn(
        Arc::clone(&repo),
        dispatch,
        archive.clone(),
        ArchiverConfig::default(),
        CancellationToken::new(),
    );
    let clock = FakeClock::new(100_000);
    let scheduler = Scheduler::new(
        Arc::clone(&repo),
        archive.clone(),
        archiver.handle(),
        clock.clone(),
        config,
    );
    Harness { repo, archive, backend, clock, scheduler, _archiver: archiver }
}

fn committed_job(h: &Harness, job_id: i64, start_time: i64) -> i64 {
    let job = jm_core::Job::builder().job_id(job_id).start_time(start_time).build();
    h.repo.start_direct(&job).unwrap()
}

#[tokio::test]
async fn duration_refresh_updates_running_jobs() {
    let h = harness(SchedulerConfig::default());
    let id = committed_job(&h, 1, 90_000);
    let done = committed_job(&h, 2, 80_000);
    h.repo.stop(done, 500, JobState::Completed, jm_core::MonitoringStatus::Disabled).unwrap();

    assert_eq!(h.scheduler.run_duration_refresh_once().unwrap(), 1);
    assert_eq!(h.repo.find_by_id(id).unwrap().duration, 10_000);
    // Terminal jobs keep their stop-derived duration
    assert_eq!(h.repo.find_by_id(done).unwrap().duration, 500);

    h.clock.advance(300);
    h.scheduler.run_duration_refresh_once().unwrap();
    assert_eq!(h.repo.find_by_id(id).unwrap().duration, 10_300);
}

#[tokio::test]
async fn cache_sync_respects_retention() {
    // Clock at 100_000, retention 300: cutoff is 99_700
    let h = harness(SchedulerConfig::default());
    h.repo.start(&jm_core::Job::builder().job_id(1).start_time(1000).build()).unwrap();
    h.repo.start(&jm_core::Job::builder().job_id(2).start_time(99_900).build()).unwrap();

    assert_eq!(h.scheduler.run_cache_sync_once().unwrap(), 1);
    assert_eq!(h.repo.cached_count().unwrap(), 1);
    assert!(h.repo.find_cached(2, "testcluster", Some(99_900)).is_ok());
    assert_eq!(h.repo.find_all(1, "testcluster").unwrap().len(), 1);

    // Once the fresh job ages past the retention it is promoted too
    h.clock.advance(400);
    assert_eq!(h.scheduler.run_cache_sync_once().unwrap(), 1);
    assert_eq!(h.repo.cached_count().unwrap(), 0);
}

#[tokio::test]
async fn retention_sweep_deletes_rows_and_records() {
    let config = SchedulerConfig {
        retention_age: Some(50_000),
        retention_omit_tagged: false,
        retention_clean_archive: true,
        ..Default::default()
    };
    let h = harness(config);

    // Old job (start 10_000 < cutoff 50_000), with an archive record
    let old = committed_job(&h, 1, 10_000);
    let job = h.repo.find_by_id(old).unwrap();
    h.archive.store_meta(&job).await.unwrap();
    h.archive.store_data(&JobRef::from(&job), &jm_core::JobData::default()).await.unwrap();
    // Recent job stays
    committed_job(&h, 2, 90_000);

    let (rows, records) = h.scheduler.run_retention_once().await.unwrap();
    assert_eq!(rows, 1);
    assert_eq!(records, 1);
    assert!(h.repo.find_by_id(old).unwrap_err().is_not_found());
    assert!(h.archive.iter_refs().await.unwrap().is_empty());
}

#[tokio::test]
async fn retention_disabled_is_a_noop() {
    let h = harness(SchedulerConfig::default());
    committed_job(&h, 1, 1);
    assert_eq!(h.scheduler.run_retention_once().await.unwrap(), (0, 0));
}

#[tokio::test]
async fn compression_batch() {
    let config = SchedulerConfig { compression_batch: 10, ..Default::default() };
    let h = harness(config);
    let id = committed_job(&h, 1, 10_000);
    let job = h.repo.find_by_id(id).unwrap();
    h.archive.store_meta(&job).await.unwrap();
    h.archive.store_data(&JobRef::from(&job), &jm_core::JobData::default()).await.unwrap();

    assert_eq!(h.scheduler.run_compression_once().await.unwrap(), 1);
    assert_eq!(h.scheduler.run_compression_once().await.unwrap(), 0);
}

#[tokio::test]
async fn retry_sweep_backs_off_and_recovers() {
    let config = SchedulerConfig { retry_base_delay: 60, ..Default::default() };
    let h = harness(config);

    let id = committed_job(&h, 5, 10_000);
    h.repo
        .stop(id, 100, JobState::Completed, jm_core::MonitoringStatus::ArchivingFailed)
        .unwrap();
    h.backend.insert(5, jm_core::JobData::default());

    // First sweep enqueues the failed job
    assert_eq!(h.scheduler.run_retry_once().unwrap(), 1);
    // Immediately after, the back-off window suppresses a second enqueue
    assert_eq!(h.scheduler.run_retry_once().unwrap(), 0);

    // The background worker archives it
    for _ in 0..200 {
        if h.repo.find_by_id(id).unwrap().monitoring_status
            == jm_core::MonitoringStatus::ArchivingSuccessful
        {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert_eq!(
        h.repo.find_by_id(id).unwrap().monitoring_status,
        jm_core::MonitoringStatus::ArchivingSuccessful
    );

    // Recovered jobs drop out of the sweep entirely
    h.clock.advance(10_000);
    assert_eq!(h.scheduler.run_retry_once().unwrap(), 0);
}

#[tokio::test]
async fn retry_respects_attempt_cap() {
    let config = SchedulerConfig {
        retry_base_delay: 0,
        retry_max_attempts: 2,
        ..Default::default()
    };
    let h = harness(config);
    let id = committed_job(&h, 6, 10_000);
    h.repo
        .stop(id, 100, JobState::Completed, jm_core::MonitoringStatus::ArchivingFailed)
        .unwrap();
    // Every attempt fails at the backend
    h.backend.fail_times(100);

    let mut total = 0;
    for _ in 0..10 {
        h.clock.advance(3600);
        total += h.scheduler.run_retry_once().unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    }
    assert_eq!(total, 2);
}
