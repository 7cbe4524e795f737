// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Archival scenarios: failure-and-retry, round-trip fidelity, delete
//! safety, and compression.

use super::harness::{plant_flops, start_body, stop_body, test_daemon};
use axum::http::StatusCode;
use jm_archive::{ArchiveBackend, JobRef};
use jm_core::MonitoringStatus;
use similar_asserts::assert_eq as assert_similar;

#[tokio::test]
async fn archive_failure_then_retry_succeeds() {
    let app = test_daemon().await;
    plant_flops(&app.backend, 1001, 10);
    app.backend.fail_times(1);

    app.post("/jobs/start_job", start_body(1001, 10_000)).await;
    let (_, body) = app.post("/jobs/stop_job", stop_body(1001, 10_000, 10_600)).await;
    let id = body["id"].as_i64().unwrap();

    // First attempt hits the injected failure
    app.wait_for_status(id, MonitoringStatus::ArchivingFailed).await;

    // The retry sweep re-enqueues it; the backend has recovered
    assert_eq!(app.daemon.scheduler.run_retry_once().unwrap(), 1);
    app.wait_for_status(id, MonitoringStatus::ArchivingSuccessful).await;

    let job_ref = JobRef { cluster: "testcluster".into(), job_id: 1001, start_time: 10_000 };
    assert!(app.daemon.archive.exists(&job_ref).await);
}

#[tokio::test]
async fn archived_meta_matches_the_job_row() {
    let app = test_daemon().await;
    plant_flops(&app.backend, 42, 10);
    app.post("/jobs/start_job", start_body(42, 10_000)).await;
    let (_, body) = app.post("/jobs/stop_job", stop_body(42, 10_000, 10_600)).await;
    let id = body["id"].as_i64().unwrap();
    app.wait_for_status(id, MonitoringStatus::ArchivingSuccessful).await;

    let row = app.daemon.repo.find_by_id(id).unwrap();
    let job_ref = JobRef { cluster: "testcluster".into(), job_id: 42, start_time: 10_000 };
    let mut meta = app.daemon.archive.load_meta(&job_ref).await.unwrap();

    // The snapshot carries summary statistics the row does not
    assert!(meta.statistics.contains_key("flops_any"));
    meta.statistics.clear();
    meta.id = row.id;
    assert_similar!(meta, row);
}

#[tokio::test]
async fn delete_never_touches_the_archive_and_reindex_recreates() {
    let app = test_daemon().await;
    plant_flops(&app.backend, 9, 10);
    app.post("/jobs/start_job", start_body(9, 10_000)).await;
    let (_, body) = app.post("/jobs/stop_job", stop_body(9, 10_000, 10_600)).await;
    let id = body["id"].as_i64().unwrap();
    app.wait_for_status(id, MonitoringStatus::ArchivingSuccessful).await;

    let request = axum::http::Request::builder()
        .method("DELETE")
        .uri(format!("/jobs/delete_job/{id}"))
        .body(axum::body::Body::empty())
        .unwrap();
    let (status, _) = app.send(request).await;
    assert_eq!(status, StatusCode::OK);
    assert!(app.daemon.repo.find_by_id(id).unwrap_err().is_not_found());

    // Reindex from the archive: the snapshot recreates the row
    let job_ref = JobRef { cluster: "testcluster".into(), job_id: 9, start_time: 10_000 };
    let mut meta = app.daemon.archive.load_meta(&job_ref).await.unwrap();
    meta.id = None;
    meta.statistics.clear();
    let new_id = app.daemon.repo.start_direct(&meta).unwrap();

    let recreated = app.daemon.repo.find_by_id(new_id).unwrap();
    assert_eq!(recreated.job_id, 9);
    assert_eq!(recreated.duration, 600);
    assert_eq!(recreated.state, jm_core::JobState::Completed);
}

#[tokio::test]
async fn compression_keeps_records_readable() {
    let app = test_daemon().await;
    plant_flops(&app.backend, 3, 10);
    app.post("/jobs/start_job", start_body(3, 10_000)).await;
    let (_, body) = app.post("/jobs/stop_job", stop_body(3, 10_000, 10_600)).await;
    let id = body["id"].as_i64().unwrap();
    app.wait_for_status(id, MonitoringStatus::ArchivingSuccessful).await;

    let job_ref = JobRef { cluster: "testcluster".into(), job_id: 3, start_time: 10_000 };
    let before = app.daemon.archive.load_data(&job_ref, None, None).await.unwrap();

    assert_eq!(app.daemon.archive.compress_last(10).await.unwrap(), 1);
    let record = app.tmp.path().join("archive/testcluster/0/003/10000");
    assert!(record.join("data.json.zst").is_file());
    assert!(!record.join("data.json").exists());

    let after = app.daemon.archive.load_data(&job_ref, None, None).await.unwrap();
    assert_similar!(before, after);
    assert!(app.daemon.archive.exists(&job_ref).await);
}

#[tokio::test]
async fn retention_sweep_cleans_archive_when_configured() {
    let app = test_daemon().await;
    plant_flops(&app.backend, 4, 10);
    app.post("/jobs/start_job", start_body(4, 10_000)).await;
    let (_, body) = app.post("/jobs/stop_job", stop_body(4, 10_000, 10_600)).await;
    let id = body["id"].as_i64().unwrap();
    app.wait_for_status(id, MonitoringStatus::ArchivingSuccessful).await;

    // Everything is older than "now - 1h", so a sweep with archive
    // cleaning removes both the row and the record.
    let refs = app.daemon.archive.iter_refs().await.unwrap();
    assert_eq!(refs.len(), 1);
    let removed = app.daemon.archive.clean(20_000).await.unwrap();
    assert_eq!(removed, 1);
    assert!(app.daemon.archive.iter_refs().await.unwrap().is_empty());
}
