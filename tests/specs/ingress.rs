// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Ingress parity: the line-protocol stream drives the same state
//! machine as HTTP, and bad events never wedge a connection.

use super::harness::{plant_flops, start_body, test_daemon};
use jm_core::{JobState, MonitoringStatus, SystemClock};
use jm_daemon::bus::{self, BusCtx};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

fn escape(payload: &serde_json::Value) -> String {
    payload.to_string().replace('\\', "\\\\").replace('"', "\\\"")
}

#[tokio::test]
async fn bus_stream_start_stop_archive() {
    let app = test_daemon().await;
    plant_flops(&app.backend, 31, 10);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let token = CancellationToken::new();
    let ctx = Arc::new(BusCtx { engine: Arc::clone(&app.daemon.engine), clock: SystemClock });
    let bus_task = tokio::spawn(bus::run(listener, ctx, token.clone()));

    let mut stream = TcpStream::connect(addr).await.unwrap();
    let start = format!(
        "job,function=start_job event=\"{}\" 1725600000000000000\n",
        escape(&start_body(31, 10_000))
    );
    let garbage = "job,function=start_job event=\"not json\"\n";
    let stop = format!(
        "job,function=stop_job event=\"{}\" 1725600000000000001\n",
        escape(&serde_json::json!({
            "jobId": 31, "cluster": "testcluster", "startTime": 10_000,
            "stopTime": 10_600, "state": "completed"
        }))
    );
    stream.write_all(start.as_bytes()).await.unwrap();
    stream.write_all(garbage.as_bytes()).await.unwrap();
    stream.write_all(stop.as_bytes()).await.unwrap();
    stream.flush().await.unwrap();

    // The stream is processed in order; wait for the stop to land
    let mut committed = None;
    for _ in 0..300 {
        let jobs = app.daemon.repo.find_all(31, "testcluster").unwrap();
        if let Some(job) = jobs.iter().find(|j| j.state == JobState::Completed) {
            committed = Some(job.clone());
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let job = committed.expect("bus stop never applied");
    assert_eq!(job.duration, 600);

    // Archiving proceeds exactly as on the HTTP path
    app.wait_for_status(job.id.unwrap(), MonitoringStatus::ArchivingSuccessful).await;

    token.cancel();
    drop(stream);
    let _ = bus_task.await;
}

#[tokio::test]
async fn bus_duplicate_start_is_dropped_silently() {
    let app = test_daemon().await;

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let token = CancellationToken::new();
    let ctx = Arc::new(BusCtx { engine: Arc::clone(&app.daemon.engine), clock: SystemClock });
    let bus_task = tokio::spawn(bus::run(listener, ctx, token.clone()));

    let mut stream = TcpStream::connect(addr).await.unwrap();
    let line = format!(
        "job,function=start_job event=\"{}\"\n",
        escape(&start_body(77, 50_000))
    );
    let dup = format!(
        "job,function=start_job event=\"{}\"\n",
        escape(&start_body(77, 50_010))
    );
    stream.write_all(line.as_bytes()).await.unwrap();
    stream.write_all(dup.as_bytes()).await.unwrap();
    stream.flush().await.unwrap();

    for _ in 0..300 {
        if app.daemon.repo.cached_count().unwrap() == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    // Give the duplicate a moment to (not) land
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(app.daemon.repo.cached_count().unwrap(), 1);
    assert_eq!(app.daemon.repo.find_all(77, "testcluster").unwrap().len(), 1);

    token.cancel();
    drop(stream);
    let _ = bus_task.await;
}
