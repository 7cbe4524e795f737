// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use jm_archive::{Archive, SqliteArchive};
use jm_core::ClusterRegistry;
use jm_engine::{Archiver, ArchiverConfig};
use jm_metrics::{MetricBackendRegistry, MetricDispatch, ReplayBackend};
use jm_storage::JobRepository;
use tokio_util::sync::CancellationToken;

struct Harness {
    ctx: BusCtx,
    repo: Arc<JobRepository>,
    _archiver: Archiver,
}

fn harness() -> Harness {
    let repo = Arc::new(JobRepository::in_memory().unwrap());
    let registry = Arc::new(ClusterRegistry::new(vec![jm_core::test_support::test_cluster()]));
    let backend = ReplayBackend::new();
    let mut backends = MetricBackendRegistry::new();
    let data_backend: Arc<dyn jm_metrics::MetricDataBackend> = backend;
    backends.register("testcluster", data_backend);
    let dispatch = Arc::new(MetricDispatch::new(Arc::clone(&registry), backends));
    let archive = Archive::Sqlite(Arc::new(SqliteArchive::in_memory().unwrap()));
    let archiver = Archiver::spawn(
        Arc::clone(&repo),
        dispatch,
        archive,
        ArchiverConfig::default(),
        CancellationToken::new(),
    );
    let engine = Arc::new(LifecycleEngine::new(Arc::clone(&repo), registry, archiver.handle()));
    Harness { ctx: BusCtx { engine, clock: SystemClock }, repo, _archiver: archiver }
}

fn start_line(job_id: i64, start_time: i64) -> String {
    let payload = serde_json::json!({
        "jobId": job_id, "user": "alice", "project": "p1",
        "cluster": "testcluster", "numNodes": 1, "startTime": start_time,
        "resources": [{"hostname": "host123"}]
    });
    let escaped = payload.to_string().replace('\\', "\\\\").replace('"', "\\\"");
    format!("job,function=start_job event=\"{escaped}\" 1725600000000000000")
}

fn stop_line(job_id: i64, stop_time: i64) -> String {
    let payload = serde_json::json!({
        "jobId": job_id, "cluster": "testcluster", "stopTime": stop_time, "state": "completed"
    });
    let escaped = payload.to_string().replace('\\', "\\\\").replace('"', "\\\"");
    format!("job,function=stop_job event=\"{escaped}\" 1725600000000000001")
}

#[tokio::test]
async fn start_and_stop_via_bus() {
    let h = harness();
    handle_line(&h.ctx, &start_line(42, 5000)).await.unwrap();
    assert_eq!(h.repo.cached_count().unwrap(), 1);

    handle_line(&h.ctx, &stop_line(42, 8600)).await.unwrap();
    let jobs = h.repo.find_all(42, "testcluster").unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].duration, 3600);
    assert_eq!(jobs[0].state, jm_core::JobState::Completed);
}

#[tokio::test]
async fn duplicate_start_is_an_error_for_logging() {
    let h = harness();
    handle_line(&h.ctx, &start_line(42, 5000)).await.unwrap();
    let err = handle_line(&h.ctx, &start_line(42, 5010)).await.unwrap_err();
    assert!(matches!(err, BusError::Engine(EngineError::Duplicate { .. })));
    // The event is dropped; state is unchanged
    assert_eq!(h.repo.cached_count().unwrap(), 1);
}

#[tokio::test]
async fn nodestate_via_bus() {
    let h = harness();
    let payload = serde_json::json!({
        "cluster": "testcluster",
        "nodes": [{"hostname": "host1", "states": ["allocated"], "jobsRunning": 1}]
    });
    let escaped = payload.to_string().replace('\\', "\\\\").replace('"', "\\\"");
    let line = format!("nodestate event=\"{escaped}\"");
    handle_line(&h.ctx, &line).await.unwrap();

    let node = h.repo.node("testcluster", "host1").unwrap();
    assert_eq!(node.node_state, jm_core::NodeState::Allocated);
}

#[tokio::test]
async fn unknown_measurement_and_function_are_rejected() {
    let h = harness();
    let err = handle_line(&h.ctx, "weather event=\"{}\"").await.unwrap_err();
    assert!(matches!(err, BusError::UnknownMeasurement(_)));

    let err = handle_line(&h.ctx, "job,function=suspend_job event=\"{}\"").await.unwrap_err();
    assert!(matches!(err, BusError::UnknownFunction(_)));
}

#[tokio::test]
async fn malformed_payload_is_rejected() {
    let h = harness();
    let err = handle_line(&h.ctx, "job,function=start_job event=\"not json\"").await.unwrap_err();
    assert!(matches!(err, BusError::Payload(_)));
}
