// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared end-to-end fixture: a real daemon wired against a tempdir
//! filesystem archive and a replay metric backend.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use jm_archive::FsArchive;
use jm_core::{Float, JobData, JobMetric, MetricScope, MetricStatistics, MonitoringStatus, Series, SystemClock, Unit};
use jm_daemon::http::{router, ApiState};
use jm_daemon::{startup, Daemon, DaemonConfig};
use jm_metrics::{MetricBackendRegistry, ReplayBackend};
use tempfile::TempDir;
use tower::ServiceExt;

pub struct TestDaemon {
    pub daemon: Daemon,
    pub router: Router,
    pub backend: Arc<ReplayBackend>,
    pub tmp: TempDir,
}

pub async fn test_daemon() -> TestDaemon {
    let tmp = TempDir::new().expect("tempdir");
    let archive_root = tmp.path().join("archive");

    // Seed the archive with the cluster topology before startup reads it.
    let seed = FsArchive::init(&archive_root).expect("archive init");
    seed.store_cluster(&jm_core::test_support::test_cluster()).expect("cluster.json");
    drop(seed);

    let backend = ReplayBackend::new();
    let mut backends = MetricBackendRegistry::new();
    let data_backend: Arc<dyn jm_metrics::MetricDataBackend> = Arc::clone(&backend) as Arc<dyn jm_metrics::MetricDataBackend>;
    backends.register("testcluster", data_backend);

    let config = DaemonConfig {
        db_path: tmp.path().join("meta.db"),
        archive_root,
        ..Default::default()
    };
    let daemon = startup(config, backends).await.expect("startup");

    let state = ApiState {
        engine: Arc::clone(&daemon.engine),
        dispatch: Arc::clone(&daemon.dispatch),
        archive: daemon.archive.clone(),
        clock: SystemClock,
        request_timeout: Duration::from_secs(5),
    };
    let router = router(state);

    TestDaemon { daemon, router, backend, tmp }
}

impl TestDaemon {
    pub async fn send(&self, request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = self.router.clone().oneshot(request).await.expect("request");
        let status = response.status();
        let bytes = response.into_body().collect().await.expect("body").to_bytes();
        let value = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("json body")
        };
        (status, value)
    }

    pub async fn post(&self, uri: &str, body: serde_json::Value) -> (StatusCode, serde_json::Value) {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .expect("request");
        self.send(request).await
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, serde_json::Value) {
        let request = Request::builder().uri(uri).body(Body::empty()).expect("request");
        self.send(request).await
    }

    /// Poll until the job reaches the given monitoring status.
    pub async fn wait_for_status(&self, id: i64, status: MonitoringStatus) {
        for _ in 0..300 {
            if let Ok(job) = self.daemon.repo.find_by_id(id) {
                if job.monitoring_status == status {
                    return;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {id} never reached monitoring status {status}");
    }
}

pub fn start_body(job_id: i64, start_time: i64) -> serde_json::Value {
    serde_json::json!({
        "jobId": job_id,
        "user": "alice",
        "project": "p1",
        "cluster": "testcluster",
        "partition": "main",
        "numNodes": 1,
        "startTime": start_time,
        "resources": [{"hostname": "host123", "hwthreads": [0,1,2,3,4,5,6,7]}]
    })
}

pub fn stop_body(job_id: i64, start_time: i64, stop_time: i64) -> serde_json::Value {
    serde_json::json!({
        "jobId": job_id,
        "cluster": "testcluster",
        "startTime": start_time,
        "stopTime": stop_time,
        "state": "completed"
    })
}

/// Plant a single-metric payload for a job on the replay backend.
pub fn plant_flops(backend: &ReplayBackend, job_id: i64, samples: usize) {
    let mut data = JobData::default();
    data.entry("flops_any".to_string()).or_default().insert(
        MetricScope::Node,
        JobMetric {
            unit: Unit::with_prefix("F/s", "G"),
            timestep: 60,
            series: vec![Series {
                hostname: "host123".into(),
                id: None,
                statistics: MetricStatistics::default(),
                data: (0..samples).map(|i| Float(100.0 + i as f64)).collect(),
            }],
            statistics_series: None,
        },
    );
    backend.insert(job_id, data);
}
