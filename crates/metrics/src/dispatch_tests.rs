// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::replay::ReplayBackend;
use jm_core::{Float, Job, JobMetric, MetricStatistics, Series, Unit};
use std::sync::Arc;

fn metric(timestep: i64, samples: &[f64]) -> JobMetric {
    JobMetric {
        unit: Unit::new("x"),
        timestep,
        series: vec![Series {
            hostname: "host123".into(),
            id: None,
            statistics: MetricStatistics::default(),
            data: samples.iter().map(|v| Float(*v)).collect(),
        }],
        statistics_series: None,
    }
}

fn planted_backend(job_id: i64) -> Arc<ReplayBackend> {
    let backend = ReplayBackend::new();
    let mut data = jm_core::JobData::default();
    let flops = data.entry("flops_any".to_string()).or_default();
    flops.insert(MetricScope::Node, metric(60, &[100.0, 200.0]));
    flops.insert(MetricScope::Core, metric(60, &[25.0, 50.0]));
    data.entry("mem_used".to_string())
        .or_default()
        .insert(MetricScope::Node, metric(30, &[10.0, 20.0, 30.0, 40.0]));
    backend.insert(job_id, data);
    backend
}

fn dispatch_with(backend: Arc<ReplayBackend>) -> MetricDispatch {
    let registry = Arc::new(jm_core::ClusterRegistry::new(vec![
        jm_core::test_support::test_cluster(),
    ]));
    let mut backends = MetricBackendRegistry::new();
    backends.register("testcluster", backend);
    MetricDispatch::new(registry, backends)
}

fn deadline() -> std::time::Duration {
    std::time::Duration::from_secs(5)
}

#[tokio::test]
async fn removed_metric_is_disabled_not_loaded() {
    let backend = planted_backend(1);
    let dispatch = dispatch_with(Arc::clone(&backend));
    let job = Job::builder().sub_cluster("sc1").duration(120).build();

    let metrics = vec!["flops_any".to_string(), "flops_dp".to_string()];
    let result = dispatch.load_job_data(&job, Some(&metrics), None, 0, deadline()).await.unwrap();

    assert_eq!(result.disabled, vec!["flops_dp".to_string()]);
    assert!(result.data.contains_key("flops_any"));
    assert!(!result.data.contains_key("flops_dp"));
}

#[tokio::test]
async fn single_node_job_keeps_finest_scope() {
    let backend = planted_backend(1);
    let dispatch = dispatch_with(backend);
    let job = Job::builder().num_nodes(1).duration(120).build();

    let metrics = vec!["flops_any".to_string()];
    let result = dispatch.load_job_data(&job, Some(&metrics), None, 0, deadline()).await.unwrap();

    let per_scope = &result.data["flops_any"];
    assert_eq!(per_scope.len(), 1);
    assert!(per_scope.contains_key(&MetricScope::Core));
}

#[tokio::test]
async fn multi_node_job_keeps_coarsest_scope() {
    let backend = planted_backend(1);
    let dispatch = dispatch_with(backend);
    let job = Job::builder().num_nodes(4).duration(120).build();

    let metrics = vec!["flops_any".to_string()];
    let result = dispatch.load_job_data(&job, Some(&metrics), None, 0, deadline()).await.unwrap();

    let per_scope = &result.data["flops_any"];
    assert_eq!(per_scope.len(), 1);
    assert!(per_scope.contains_key(&MetricScope::Node));
}

#[tokio::test]
async fn explicit_scope_request_is_honored() {
    let backend = planted_backend(1);
    let dispatch = dispatch_with(backend);
    let job = Job::builder().duration(120).build();

    let metrics = vec!["flops_any".to_string()];
    let scopes = vec![MetricScope::Node, MetricScope::Core];
    let result = dispatch
        .load_job_data(&job, Some(&metrics), Some(&scopes), 0, deadline())
        .await
        .unwrap();

    assert_eq!(result.data["flops_any"].len(), 2);
}

#[tokio::test]
async fn scope_finer_than_native_falls_back() {
    // mem_used is collected at node scope; a core-scope request cannot go
    // finer and must be served at node scope.
    let backend = planted_backend(1);
    let dispatch = dispatch_with(backend);
    let job = Job::builder().duration(120).build();

    let metrics = vec!["mem_used".to_string()];
    let scopes = vec![MetricScope::Core];
    let result = dispatch
        .load_job_data(&job, Some(&metrics), Some(&scopes), 0, deadline())
        .await
        .unwrap();

    assert!(result.data["mem_used"].contains_key(&MetricScope::Node));
}

#[tokio::test]
async fn missing_metric_is_a_warning_not_an_error() {
    let backend = ReplayBackend::new(); // nothing planted
    let dispatch = dispatch_with(backend);
    let job = Job::builder().duration(120).build();

    let metrics = vec!["flops_any".to_string()];
    let result = dispatch.load_job_data(&job, Some(&metrics), None, 0, deadline()).await.unwrap();

    assert!(result.data.is_empty());
    assert_eq!(result.warnings.len(), 1);
    assert!(result.warnings[0].contains("flops_any"));
}

#[tokio::test]
async fn identical_requests_hit_the_cache() {
    let backend = planted_backend(1);
    let dispatch = dispatch_with(Arc::clone(&backend));
    let job = Job::builder().duration(120).build();

    let metrics = vec!["flops_any".to_string()];
    let first = dispatch.load_job_data(&job, Some(&metrics), None, 0, deadline()).await.unwrap();
    let second = dispatch.load_job_data(&job, Some(&metrics), None, 0, deadline()).await.unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(backend.load_calls(), 1);
}

#[tokio::test]
async fn unknown_cluster_has_no_backend() {
    let backend = planted_backend(1);
    let dispatch = dispatch_with(backend);
    let job = Job::builder().cluster("elsewhere").build();

    // No config for the cluster means nothing to load; the backend
    // registry is never consulted.
    let result = dispatch.load_job_data(&job, None, None, 0, deadline()).await.unwrap();
    assert!(result.data.is_empty());

    // An explicit metric list is reported as unconfigured, not an error.
    let metrics = vec!["flops_any".to_string()];
    let result = dispatch.load_job_data(&job, Some(&metrics), None, 0, deadline()).await.unwrap();
    assert!(result.warnings[0].contains("not configured"));
}

#[tokio::test]
async fn alignment_mismatch_is_flagged() {
    let backend = ReplayBackend::new();
    let mut data = jm_core::JobData::default();
    // 10 samples at 60 s for a 120 s job: way off
    data.entry("flops_any".to_string())
        .or_default()
        .insert(MetricScope::Node, metric(60, &[1.0; 10]));
    backend.insert(1, data);
    let dispatch = dispatch_with(backend);
    let job = Job::builder().duration(120).build();

    let metrics = vec!["flops_any".to_string()];
    let result = dispatch.load_job_data(&job, Some(&metrics), None, 0, deadline()).await.unwrap();
    assert!(result.warnings.iter().any(|w| w.contains("samples")));
}
