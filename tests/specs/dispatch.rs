// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dispatch scenarios: subcluster-disabled metrics and idempotent reads.

use super::harness::{plant_flops, test_daemon};
use std::time::Duration;

#[tokio::test]
async fn subcluster_disabled_metric_is_flagged() {
    let app = test_daemon().await;
    plant_flops(&app.backend, 21, 10);

    // A job on sc1, where flops_dp is removed
    let job = jm_core::Job::builder().job_id(21).sub_cluster("sc1").duration(600).build();
    let metrics = vec!["flops_dp".to_string(), "flops_any".to_string()];
    let result = app
        .daemon
        .dispatch
        .load_job_data(&job, Some(&metrics), None, 0, Duration::from_secs(5))
        .await
        .unwrap();

    assert_eq!(result.disabled, vec!["flops_dp".to_string()]);
    assert!(!result.data.contains_key("flops_dp"));
    assert!(result.data.contains_key("flops_any"));
}

#[tokio::test]
async fn repeated_dispatch_is_byte_identical() {
    let app = test_daemon().await;
    plant_flops(&app.backend, 22, 10);
    let job = jm_core::Job::builder().job_id(22).duration(600).build();
    let metrics = vec!["flops_any".to_string()];

    let first = app
        .daemon
        .dispatch
        .load_job_data(&job, Some(&metrics), None, 0, Duration::from_secs(5))
        .await
        .unwrap();
    let second = app
        .daemon
        .dispatch
        .load_job_data(&job, Some(&metrics), None, 0, Duration::from_secs(5))
        .await
        .unwrap();

    let a = serde_json::to_vec(&first.data).unwrap();
    let b = serde_json::to_vec(&second.data).unwrap();
    assert_eq!(a, b);
    // Served from the cache: one backend round-trip total
    assert_eq!(app.backend.load_calls(), 1);
}
