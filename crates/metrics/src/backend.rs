// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The metric-data backend contract and per-cluster registry.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use jm_core::{Job, JobData, MetricScope, MetricStatistics, NodeData};
use thiserror::Error;

/// Errors from metric loading.
#[derive(Debug, Error)]
pub enum MetricError {
    #[error("no metric backend configured for cluster {0}")]
    NoBackend(String),

    #[error("metric backend error: {0}")]
    Backend(String),

    #[error("metric backend timed out after {0:?}")]
    Timeout(std::time::Duration),
}

/// Contract every metric-data backend implements.
///
/// The interface is deliberately narrow so backends stay replaceable.
/// Implementations may downsample when `resolution` is non-zero and may
/// return fewer metrics than requested; the dispatcher treats a missing
/// metric as a warning, not an error.
#[async_trait]
pub trait MetricDataBackend: Send + Sync {
    /// Load raw time-series for one job across the requested metrics and
    /// scopes.
    async fn load_data(
        &self,
        job: &Job,
        metrics: &[String],
        scopes: &[MetricScope],
        resolution: i64,
    ) -> Result<JobData, MetricError>;

    /// Load only per-metric summary statistics for one job.
    async fn load_stats(
        &self,
        job: &Job,
        metrics: &[String],
    ) -> Result<HashMap<String, MetricStatistics>, MetricError>;

    /// Load node-scope series for a set of hosts in a time window.
    async fn load_node_data(
        &self,
        cluster: &str,
        metrics: &[String],
        nodes: &[String],
        from: i64,
        to: i64,
    ) -> Result<NodeData, MetricError>;
}

/// Backend selection: one backend per cluster, chosen by configuration at
/// startup and passed down from construction.
#[derive(Clone, Default)]
pub struct MetricBackendRegistry {
    backends: HashMap<String, Arc<dyn MetricDataBackend>>,
}

impl MetricBackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, cluster: impl Into<String>, backend: Arc<dyn MetricDataBackend>) {
        self.backends.insert(cluster.into(), backend);
    }

    pub fn for_cluster(&self, cluster: &str) -> Result<Arc<dyn MetricDataBackend>, MetricError> {
        self.backends
            .get(cluster)
            .cloned()
            .ok_or_else(|| MetricError::NoBackend(cluster.to_string()))
    }
}
