// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lifecycle scenarios: the happy path, the duplicate window, and the
//! stop-before-cache-flush promotion.

use super::harness::{plant_flops, start_body, stop_body, test_daemon};
use axum::http::StatusCode;
use jm_core::{JobState, MonitoringStatus};

#[tokio::test]
async fn happy_path_start_stop_archive() {
    let app = test_daemon().await;
    plant_flops(&app.backend, 1001, 60);

    let (status, body) = app.post("/jobs/start_job", start_body(1001, 1_234_567_890)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["msg"], "success");

    let (status, body) =
        app.post("/jobs/stop_job", stop_body(1001, 1_234_567_890, 1_234_571_490)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "completed");
    assert_eq!(body["duration"], 3600);
    let id = body["id"].as_i64().unwrap();

    app.wait_for_status(id, MonitoringStatus::ArchivingSuccessful).await;

    let job = app.daemon.repo.find_by_id(id).unwrap();
    assert_eq!(job.state, JobState::Completed);
    assert_eq!(job.duration, 3600);
    assert!(job.footprint.contains_key("flops_any_avg"));

    // Bucketing lands the record exactly where the format says
    let meta_path = app
        .tmp
        .path()
        .join("archive/testcluster/1/001/1234567890/meta.json");
    assert!(meta_path.is_file(), "missing {meta_path:?}");
    assert!(app
        .tmp
        .path()
        .join("archive/testcluster/1/001/1234567890/data.json")
        .is_file());
}

#[tokio::test]
async fn duplicate_start_within_window_is_rejected() {
    let app = test_daemon().await;
    let (status, _) = app.post("/jobs/start_job", start_body(1001, 1_234_567_890)).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = app.post("/jobs/start_job", start_body(1001, 1_234_567_900)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["error"].as_str().unwrap().contains("duplicate"));

    // One day later the same scheduler id is fine
    let (status, _) = app.post("/jobs/start_job", start_body(1001, 1_234_567_890 + 86_400)).await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn stop_before_cache_flush_promotes_the_row() {
    let app = test_daemon().await;
    let (status, _) = app.post("/jobs/start_job", start_body(55, 2000)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(app.daemon.repo.cached_count().unwrap(), 1);

    // Stop lands before any cache flush ran
    let (status, body) = app.post("/jobs/stop_job", stop_body(55, 2000, 3000)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["duration"], 1000);
    let id = body["id"].as_i64().unwrap();

    // The cache no longer holds the job; exactly one committed row does
    assert_eq!(app.daemon.repo.cached_count().unwrap(), 0);
    let committed = app.daemon.repo.find_all(55, "testcluster").unwrap();
    assert_eq!(committed.len(), 1);
    assert_eq!(committed[0].id, Some(id));
    assert_eq!(committed[0].duration, 1000);
}

#[tokio::test]
async fn terminal_jobs_never_resume() {
    let app = test_daemon().await;
    app.post("/jobs/start_job", start_body(7, 1000)).await;
    app.post("/jobs/stop_job", stop_body(7, 1000, 2000)).await;

    // Stopping again in any terminal state is refused
    for state in ["completed", "failed", "cancelled"] {
        let mut body = stop_body(7, 1000, 3000);
        body["state"] = serde_json::json!(state);
        let (status, _) = app.post("/jobs/stop_job", body).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY, "state {state}");
    }
}

#[tokio::test]
async fn cache_flush_promotes_aged_jobs_and_keeps_them_stoppable() {
    let app = test_daemon().await;
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_secs() as i64;

    // One job well past the cache retention, one freshly started
    app.post("/jobs/start_job", start_body(8, 5000)).await;
    app.post("/jobs/start_job", start_body(9, now)).await;
    assert_eq!(app.daemon.scheduler.run_cache_sync_once().unwrap(), 1);

    // The fresh job is still cached; the aged one was promoted
    assert_eq!(app.daemon.repo.cached_count().unwrap(), 1);
    assert!(app.daemon.repo.find_cached(9, "testcluster", Some(now)).is_ok());
    assert_eq!(app.daemon.repo.find_all(8, "testcluster").unwrap().len(), 1);

    // Both remain stoppable, whichever table they sit in
    let (status, body) = app.post("/jobs/stop_job", stop_body(8, 5000, 6000)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["duration"], 1000);
    let (status, body) = app.post("/jobs/stop_job", stop_body(9, now, now + 30)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["duration"], 30);
}
