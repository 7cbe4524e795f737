// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Metric value model: scopes, series, and the archived data shape.

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Granularity at which a metric was collected.
///
/// Ordered from finest to coarsest; `max` of two scopes is the coarser one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MetricScope {
    Accelerator,
    #[serde(rename = "hwthread")]
    HwThread,
    Core,
    MemoryDomain,
    Socket,
    Node,
}

crate::simple_display! {
    MetricScope {
        Accelerator => "accelerator",
        HwThread => "hwthread",
        Core => "core",
        MemoryDomain => "memoryDomain",
        Socket => "socket",
        Node => "node",
    }
}

impl MetricScope {
    pub fn parse(s: &str) -> Option<MetricScope> {
        match s {
            "hwthread" => Some(MetricScope::HwThread),
            "accelerator" => Some(MetricScope::Accelerator),
            "core" => Some(MetricScope::Core),
            "memoryDomain" => Some(MetricScope::MemoryDomain),
            "socket" => Some(MetricScope::Socket),
            "node" => Some(MetricScope::Node),
            _ => None,
        }
    }
}

/// Measurement unit split into SI prefix and base.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Unit {
    #[serde(default)]
    pub base: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
}

impl Unit {
    pub fn new(base: impl Into<String>) -> Self {
        Self { base: base.into(), prefix: None }
    }

    pub fn with_prefix(base: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self { base: base.into(), prefix: Some(prefix.into()) }
    }
}

/// A sample value. Missing samples are NaN in memory and `null` on the wire.
#[derive(Debug, Clone, Copy, Default)]
pub struct Float(pub f64);

impl Float {
    pub const NAN: Float = Float(f64::NAN);

    pub fn is_nan(self) -> bool {
        self.0.is_nan()
    }
}

impl From<f64> for Float {
    fn from(v: f64) -> Self {
        Float(v)
    }
}

// NaN compares equal to NaN so archived payloads can be compared verbatim.
impl PartialEq for Float {
    fn eq(&self, other: &Self) -> bool {
        (self.0.is_nan() && other.0.is_nan()) || self.0 == other.0
    }
}

impl Serialize for Float {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.0.is_nan() {
            serializer.serialize_none()
        } else {
            serializer.serialize_f64(self.0)
        }
    }
}

impl<'de> Deserialize<'de> for Float {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let v = Option::<f64>::deserialize(deserializer)?;
        Ok(Float(v.unwrap_or(f64::NAN)))
    }
}

/// Min/avg/max of one series or one roll-up.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MetricStatistics {
    pub min: f64,
    pub avg: f64,
    pub max: f64,
}

/// Samples collected for one resource (node, core, accelerator, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Series {
    pub hostname: String,
    /// Sub-node resource id (core number, accelerator id); absent at node scope.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub statistics: MetricStatistics,
    pub data: Vec<Float>,
}

/// Time-aligned min/median/max across all series of a metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsSeries {
    pub min: Vec<Float>,
    pub median: Vec<Float>,
    pub max: Vec<Float>,
}

/// All series of one metric at one scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobMetric {
    pub unit: Unit,
    /// Seconds between samples; uniform for all series of the metric.
    pub timestep: i64,
    pub series: Vec<Series>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statistics_series: Option<StatsSeries>,
}

/// Full metric payload of a job: `metric → scope → data`.
pub type JobData = IndexMap<String, IndexMap<MetricScope, JobMetric>>;

/// Node-scope metric payload for live node queries: `host → metric → data`.
pub type NodeData = IndexMap<String, IndexMap<String, JobMetric>>;

#[cfg(test)]
#[path = "metric_tests.rs"]
mod tests;
