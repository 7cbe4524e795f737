// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cluster topology and per-subcluster metric configuration.
//!
//! The shapes here mirror the `cluster.json` file stored at the root of
//! each cluster's archive subtree. The [`ClusterRegistry`] is built once at
//! startup and passed down by reference; there is no global registry.

use crate::metric::{MetricScope, Unit};
use serde::{Deserialize, Serialize};

/// An accelerator device as listed in the topology.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Accelerator {
    pub id: String,
    #[serde(rename = "type")]
    pub acc_type: String,
    #[serde(default)]
    pub model: String,
}

/// Hardware-thread layout of one subcluster's node type.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Topology {
    /// All hwthread ids of a node.
    #[serde(default)]
    pub node: Vec<u32>,
    /// Hwthread ids grouped by socket.
    #[serde(default)]
    pub socket: Vec<Vec<u32>>,
    /// Hwthread ids grouped by memory domain.
    #[serde(default)]
    pub memory_domain: Vec<Vec<u32>>,
    /// Hwthread ids grouped by physical core.
    #[serde(default)]
    pub core: Vec<Vec<u32>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub accelerators: Vec<Accelerator>,
}

/// How a metric's footprint statistic is selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FootprintKind {
    Avg,
    Max,
    Min,
}

crate::simple_display! {
    FootprintKind {
        Avg => "avg",
        Max => "max",
        Min => "min",
    }
}

/// How a metric contributes to the job's energy total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnergyKind {
    /// Series is instantaneous power; integrated over the runtime.
    Power,
    /// Series is already-accumulated energy; summed.
    Energy,
}

/// Per-subcluster override of a metric's configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubClusterConfig {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peak: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub normal: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caution: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alert: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub footprint: Option<FootprintKind>,
    /// The metric is not collected on this subcluster at all.
    #[serde(default)]
    pub remove: bool,
    #[serde(default)]
    pub lower_is_better: bool,
}

/// Cluster-wide configuration of one metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricConfig {
    pub name: String,
    pub unit: Unit,
    /// Native collection scope; queries never go finer than this.
    pub scope: MetricScope,
    pub timestep: i64,
    #[serde(default)]
    pub aggregation: String,
    #[serde(default)]
    pub peak: f64,
    #[serde(default)]
    pub normal: f64,
    #[serde(default)]
    pub caution: f64,
    #[serde(default)]
    pub alert: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub footprint: Option<FootprintKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub energy: Option<EnergyKind>,
    #[serde(default)]
    pub lower_is_better: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sub_clusters: Vec<SubClusterConfig>,
}

/// A homogeneous hardware partition within a cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubCluster {
    pub name: String,
    /// Nodelist expression describing member hosts (informational).
    #[serde(default)]
    pub nodes: String,
    #[serde(default)]
    pub processor_type: String,
    #[serde(default)]
    pub sockets_per_node: u32,
    #[serde(default)]
    pub cores_per_socket: u32,
    #[serde(default)]
    pub threads_per_core: u32,
    #[serde(default)]
    pub topology: Topology,
}

/// One cluster as described by its archive `cluster.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cluster {
    pub name: String,
    pub metric_config: Vec<MetricConfig>,
    pub sub_clusters: Vec<SubCluster>,
    /// Scheduler partitions accepted on start; empty means any.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub partitions: Vec<String>,
}

/// A metric's configuration after applying the subcluster overlay.
#[derive(Debug, Clone, PartialEq)]
pub struct EffectiveMetric {
    pub name: String,
    pub unit: Unit,
    pub scope: MetricScope,
    pub timestep: i64,
    pub aggregation: String,
    pub peak: f64,
    pub normal: f64,
    pub caution: f64,
    pub alert: f64,
    pub footprint: Option<FootprintKind>,
    pub energy: Option<EnergyKind>,
    pub lower_is_better: bool,
    /// True when the subcluster marks the metric `remove`: the metric is
    /// unavailable there and must be reported as disabled.
    pub removed: bool,
}

impl MetricConfig {
    fn resolve(&self, sub_cluster: &str) -> EffectiveMetric {
        let overlay = self.sub_clusters.iter().find(|sc| sc.name == sub_cluster);
        let mut eff = EffectiveMetric {
            name: self.name.clone(),
            unit: self.unit.clone(),
            scope: self.scope,
            timestep: self.timestep,
            aggregation: self.aggregation.clone(),
            peak: self.peak,
            normal: self.normal,
            caution: self.caution,
            alert: self.alert,
            footprint: self.footprint,
            energy: self.energy,
            lower_is_better: self.lower_is_better,
            removed: false,
        };
        if let Some(o) = overlay {
            if o.remove {
                eff.removed = true;
                return eff;
            }
            if let Some(v) = o.peak {
                eff.peak = v;
            }
            if let Some(v) = o.normal {
                eff.normal = v;
            }
            if let Some(v) = o.caution {
                eff.caution = v;
            }
            if let Some(v) = o.alert {
                eff.alert = v;
            }
            if let Some(v) = o.footprint {
                eff.footprint = Some(v);
            }
            if o.lower_is_better {
                eff.lower_is_better = true;
            }
        }
        eff
    }
}

/// All configured clusters, indexed by name.
#[derive(Debug, Clone, Default)]
pub struct ClusterRegistry {
    clusters: Vec<Cluster>,
}

impl ClusterRegistry {
    pub fn new(clusters: Vec<Cluster>) -> Self {
        Self { clusters }
    }

    pub fn clusters(&self) -> &[Cluster] {
        &self.clusters
    }

    pub fn cluster(&self, name: &str) -> Option<&Cluster> {
        self.clusters.iter().find(|c| c.name == name)
    }

    pub fn sub_cluster(&self, cluster: &str, name: &str) -> Option<&SubCluster> {
        self.cluster(cluster)?.sub_clusters.iter().find(|sc| sc.name == name)
    }

    /// Subcluster a job lands on: the requested one if known, else the first.
    pub fn assign_sub_cluster(&self, cluster: &str, requested: &str) -> Option<String> {
        let c = self.cluster(cluster)?;
        if !requested.is_empty() && c.sub_clusters.iter().any(|sc| sc.name == requested) {
            return Some(requested.to_string());
        }
        c.sub_clusters.first().map(|sc| sc.name.clone())
    }

    /// Whether the partition is acceptable for the cluster. An empty
    /// partition list in the config accepts anything.
    pub fn partition_known(&self, cluster: &str, partition: &str) -> bool {
        match self.cluster(cluster) {
            Some(c) => {
                c.partitions.is_empty()
                    || partition.is_empty()
                    || c.partitions.iter().any(|p| p == partition)
            }
            None => false,
        }
    }

    /// All metrics of a cluster with the subcluster overlay applied,
    /// including removed ones (callers surface those as disabled).
    pub fn effective_config(&self, cluster: &str, sub_cluster: &str) -> Vec<EffectiveMetric> {
        match self.cluster(cluster) {
            Some(c) => c.metric_config.iter().map(|mc| mc.resolve(sub_cluster)).collect(),
            None => Vec::new(),
        }
    }

    /// One metric's effective configuration.
    pub fn metric(&self, cluster: &str, sub_cluster: &str, name: &str) -> Option<EffectiveMetric> {
        self.cluster(cluster)?
            .metric_config
            .iter()
            .find(|mc| mc.name == name)
            .map(|mc| mc.resolve(sub_cluster))
    }

    /// Names of the metrics to materialize when archiving a job on the
    /// given subcluster (everything not removed there).
    pub fn archivable_metrics(&self, cluster: &str, sub_cluster: &str) -> Vec<String> {
        self.effective_config(cluster, sub_cluster)
            .into_iter()
            .filter(|m| !m.removed)
            .map(|m| m.name)
            .collect()
    }

    /// Metrics with a footprint role on the given subcluster.
    pub fn footprint_metrics(
        &self,
        cluster: &str,
        sub_cluster: &str,
    ) -> Vec<(String, FootprintKind)> {
        self.effective_config(cluster, sub_cluster)
            .into_iter()
            .filter(|m| !m.removed)
            .filter_map(|m| m.footprint.map(|kind| (m.name, kind)))
            .collect()
    }

    /// Metrics contributing to the job energy total on the given subcluster.
    pub fn energy_metrics(&self, cluster: &str, sub_cluster: &str) -> Vec<(String, EnergyKind)> {
        self.effective_config(cluster, sub_cluster)
            .into_iter()
            .filter(|m| !m.removed)
            .filter_map(|m| m.energy.map(|kind| (m.name, kind)))
            .collect()
    }
}

#[cfg(test)]
#[path = "cluster_tests.rs"]
mod tests;
