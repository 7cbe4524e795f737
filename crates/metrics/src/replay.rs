// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory backend serving planted series, with fault injection.
//!
//! Used by tests and local development; production backends implement
//! [`MetricDataBackend`] out of tree.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use jm_core::{Job, JobData, MetricScope, MetricStatistics, NodeData};
use parking_lot::Mutex;

use crate::backend::{MetricDataBackend, MetricError};
use crate::stats;

#[derive(Default)]
struct Inner {
    /// Planted job payloads keyed by the scheduler job id.
    jobs: HashMap<i64, JobData>,
    node_data: HashMap<String, NodeData>,
    fail_remaining: u32,
    load_calls: u32,
}

/// A [`MetricDataBackend`] replaying planted data.
#[derive(Default)]
pub struct ReplayBackend {
    inner: Mutex<Inner>,
}

impl ReplayBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Plant the full payload for one job id.
    pub fn insert(&self, job_id: i64, data: JobData) {
        self.inner.lock().jobs.insert(job_id, data);
    }

    /// Plant node-scope data for one cluster.
    pub fn insert_node_data(&self, cluster: impl Into<String>, data: NodeData) {
        self.inner.lock().node_data.insert(cluster.into(), data);
    }

    /// Make the next `n` load calls fail with a backend error.
    pub fn fail_times(&self, n: u32) {
        self.inner.lock().fail_remaining = n;
    }

    /// Number of `load_data` calls served so far.
    pub fn load_calls(&self) -> u32 {
        self.inner.lock().load_calls
    }

    fn check_fault(&self) -> Result<(), MetricError> {
        let mut inner = self.inner.lock();
        inner.load_calls += 1;
        if inner.fail_remaining > 0 {
            inner.fail_remaining -= 1;
            return Err(MetricError::Backend("injected failure".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl MetricDataBackend for ReplayBackend {
    async fn load_data(
        &self,
        job: &Job,
        metrics: &[String],
        scopes: &[MetricScope],
        _resolution: i64,
    ) -> Result<JobData, MetricError> {
        self.check_fault()?;
        let inner = self.inner.lock();
        let Some(planted) = inner.jobs.get(&job.job_id) else {
            return Ok(JobData::default());
        };
        let mut out = JobData::default();
        for (name, per_scope) in planted {
            if !metrics.iter().any(|m| m == name) {
                continue;
            }
            for (scope, metric) in per_scope {
                if scopes.contains(scope) {
                    out.entry(name.clone()).or_default().insert(*scope, metric.clone());
                }
            }
        }
        Ok(out)
    }

    async fn load_stats(
        &self,
        job: &Job,
        metrics: &[String],
    ) -> Result<HashMap<String, MetricStatistics>, MetricError> {
        self.check_fault()?;
        let inner = self.inner.lock();
        let mut out = HashMap::new();
        if let Some(planted) = inner.jobs.get(&job.job_id) {
            for (name, per_scope) in planted {
                if !metrics.iter().any(|m| m == name) {
                    continue;
                }
                if let Some(metric) = per_scope.values().next() {
                    out.insert(name.clone(), stats::rollup(metric));
                }
            }
        }
        Ok(out)
    }

    async fn load_node_data(
        &self,
        cluster: &str,
        metrics: &[String],
        nodes: &[String],
        _from: i64,
        _to: i64,
    ) -> Result<NodeData, MetricError> {
        self.check_fault()?;
        let inner = self.inner.lock();
        let mut out = NodeData::default();
        if let Some(planted) = inner.node_data.get(cluster) {
            for (host, per_metric) in planted {
                if !nodes.is_empty() && !nodes.contains(host) {
                    continue;
                }
                for (name, metric) in per_metric {
                    if metrics.iter().any(|m| m == name) {
                        out.entry(host.clone()).or_default().insert(name.clone(), metric.clone());
                    }
                }
            }
        }
        Ok(out)
    }
}
