// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The dispatch layer: per-subcluster config resolution, scope derivation,
//! backend fan-out, and result composition.

use std::sync::Arc;
use std::time::Duration;

use jm_core::{ClusterRegistry, Job, JobData, MetricScope, NodeData};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::backend::{MetricBackendRegistry, MetricError};
use crate::cache::BoundedCache;

const QUERY_CACHE_CAPACITY: usize = 128;

/// Outcome of one dispatch: the composed data plus per-metric flags.
#[derive(Debug, Default)]
pub struct DispatchResult {
    pub data: JobData,
    /// Metrics the subcluster marks `remove`: not available there.
    pub disabled: Vec<String>,
    /// Requested metrics the backend did not return, and alignment issues.
    pub warnings: Vec<String>,
}

/// Composes job metric payloads from the configured backends.
pub struct MetricDispatch {
    registry: Arc<ClusterRegistry>,
    backends: MetricBackendRegistry,
    cache: Mutex<BoundedCache<String, DispatchResult>>,
}

impl MetricDispatch {
    pub fn new(registry: Arc<ClusterRegistry>, backends: MetricBackendRegistry) -> Self {
        Self {
            registry,
            backends,
            cache: Mutex::new(BoundedCache::new(QUERY_CACHE_CAPACITY)),
        }
    }

    pub fn registry(&self) -> &ClusterRegistry {
        &self.registry
    }

    /// Load and compose metric data for one job.
    ///
    /// `metrics = None` requests every metric configured for the job's
    /// subcluster. `scopes = None` derives the scope list from the job
    /// shape. Results for identical requests are served from a bounded
    /// cache while the underlying data is assumed stable.
    pub async fn load_job_data(
        &self,
        job: &Job,
        metrics: Option<&[String]>,
        scopes: Option<&[MetricScope]>,
        resolution: i64,
        deadline: Duration,
    ) -> Result<Arc<DispatchResult>, MetricError> {
        let effective = self.registry.effective_config(&job.cluster, &job.sub_cluster);

        let requested: Vec<String> = match metrics {
            Some(list) => list.to_vec(),
            None => effective.iter().map(|m| m.name.clone()).collect(),
        };

        let key = cache_key(job, &requested, scopes, resolution);
        if let Some(hit) = self.cache.lock().get(&key) {
            return Ok(hit);
        }

        let mut result = DispatchResult::default();
        let mut load_metrics: Vec<String> = Vec::new();
        let mut load_scopes: Vec<MetricScope> = Vec::new();

        for name in &requested {
            let Some(config) = effective.iter().find(|m| &m.name == name) else {
                result.warnings.push(format!("metric {name} not configured"));
                continue;
            };
            if config.removed {
                result.disabled.push(name.clone());
                continue;
            }
            load_metrics.push(name.clone());
            for scope in scopes_for(job, scopes, config.scope) {
                if !load_scopes.contains(&scope) {
                    load_scopes.push(scope);
                }
            }
        }

        if !load_metrics.is_empty() {
            let backend = self.backends.for_cluster(&job.cluster)?;
            // One backend call covers the metric/scope union.
            let data = with_deadline(
                deadline,
                backend.load_data(job, &load_metrics, &load_scopes, resolution),
            )
            .await?;
            result.data = data;
        }

        for name in &load_metrics {
            match result.data.get_mut(name) {
                None => result.warnings.push(format!("metric {name} missing from backend")),
                Some(per_scope) => {
                    if scopes.is_none() {
                        select_scope_for_shape(job, per_scope);
                    }
                    validate_alignment(name, per_scope, job.duration, &mut result.warnings);
                }
            }
        }
        result.data.retain(|_, per_scope| !per_scope.is_empty());

        for w in &result.warnings {
            debug!(job_id = job.job_id, cluster = %job.cluster, "{w}");
        }

        let result = Arc::new(result);
        self.cache.lock().put(key, Arc::clone(&result));
        Ok(result)
    }

    /// Load only summary statistics (no series) for one job.
    pub async fn load_stats(
        &self,
        job: &Job,
        metrics: &[String],
        deadline: Duration,
    ) -> Result<std::collections::HashMap<String, jm_core::MetricStatistics>, MetricError> {
        let backend = self.backends.for_cluster(&job.cluster)?;
        with_deadline(deadline, backend.load_stats(job, metrics)).await
    }

    /// Load node-scope series for a host set.
    pub async fn load_node_data(
        &self,
        cluster: &str,
        metrics: &[String],
        nodes: &[String],
        from: i64,
        to: i64,
        deadline: Duration,
    ) -> Result<NodeData, MetricError> {
        let backend = self.backends.for_cluster(cluster)?;
        with_deadline(deadline, backend.load_node_data(cluster, metrics, nodes, from, to)).await
    }
}

async fn with_deadline<T>(
    deadline: Duration,
    fut: impl std::future::Future<Output = Result<T, MetricError>>,
) -> Result<T, MetricError> {
    match tokio::time::timeout(deadline, fut).await {
        Ok(res) => res,
        Err(_) => {
            warn!(?deadline, "metric backend call timed out");
            Err(MetricError::Timeout(deadline))
        }
    }
}

/// Scope list for one metric: caller preference, restricted to scopes
/// coarser than or equal to the metric's native collection scope.
fn scopes_for(job: &Job, requested: Option<&[MetricScope]>, native: MetricScope) -> Vec<MetricScope> {
    let wanted: Vec<MetricScope> = match requested {
        Some(list) => list.to_vec(),
        None if job.is_single_node() => {
            let mut v = vec![MetricScope::Node, MetricScope::Core];
            if job.has_accelerators() {
                v.push(MetricScope::Accelerator);
            }
            v
        }
        None => vec![MetricScope::Node],
    };
    let filtered: Vec<MetricScope> = wanted.into_iter().filter(|s| *s >= native).collect();
    if filtered.is_empty() {
        vec![native]
    } else {
        filtered
    }
}

/// When the caller expressed no scope preference, reduce each metric to
/// the one scope matching the job shape: coarsest for multi-node jobs,
/// finest available for single-node jobs.
fn select_scope_for_shape(
    job: &Job,
    per_scope: &mut indexmap::IndexMap<MetricScope, jm_core::JobMetric>,
) {
    if per_scope.len() <= 1 {
        return;
    }
    let keep = if job.is_single_node() {
        *per_scope.keys().min().unwrap_or(&MetricScope::Node)
    } else {
        *per_scope.keys().max().unwrap_or(&MetricScope::Node)
    };
    per_scope.retain(|scope, _| *scope == keep);
}

/// Every series of a metric shares one timestep and timebase; sample
/// counts must match the job duration within one sample.
fn validate_alignment(
    name: &str,
    per_scope: &indexmap::IndexMap<MetricScope, jm_core::JobMetric>,
    duration: i64,
    warnings: &mut Vec<String>,
) {
    if duration <= 0 {
        return;
    }
    for (scope, metric) in per_scope {
        if metric.timestep <= 0 {
            warnings.push(format!("metric {name}@{scope} has invalid timestep"));
            continue;
        }
        let expected = (duration as f64 / metric.timestep as f64).ceil() as i64;
        for series in &metric.series {
            let len = series.data.len() as i64;
            if (len - expected).abs() > 1 {
                warnings.push(format!(
                    "metric {name}@{scope} host {h}: {len} samples, expected ~{expected}",
                    h = series.hostname
                ));
            }
        }
    }
}

fn cache_key(
    job: &Job,
    metrics: &[String],
    scopes: Option<&[MetricScope]>,
    resolution: i64,
) -> String {
    use std::fmt::Write;
    let mut key = format!(
        "{}:{}:{}:{resolution}",
        job.cluster, job.job_id, job.start_time
    );
    for m in metrics {
        let _ = write!(key, ":{m}");
    }
    if let Some(scopes) = scopes {
        for s in scopes {
            let _ = write!(key, "@{s}");
        }
    }
    key
}

#[cfg(test)]
#[path = "dispatch_tests.rs"]
mod tests;
