// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job record, lifecycle states, and validation.

use crate::tag::Tag;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Two jobs sharing `(jobId, cluster)` whose start times differ by less
/// than this window are treated as the same job; the second start is
/// rejected as a duplicate.
pub const DUPLICATE_WINDOW_SECS: i64 = 86_400;

/// Scheduler-reported lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Running,
    Completed,
    Failed,
    Cancelled,
    Stopped,
    Timeout,
    OutOfMemory,
}

impl JobState {
    /// A terminal state never transitions again.
    pub fn is_terminal(self) -> bool {
        !matches!(self, JobState::Running)
    }

    /// Parse the wire name used by schedulers and filters.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "running" => Some(JobState::Running),
            "completed" => Some(JobState::Completed),
            "failed" => Some(JobState::Failed),
            "cancelled" => Some(JobState::Cancelled),
            "stopped" => Some(JobState::Stopped),
            "timeout" => Some(JobState::Timeout),
            "out_of_memory" => Some(JobState::OutOfMemory),
            _ => None,
        }
    }
}

crate::simple_display! {
    JobState {
        Running => "running",
        Completed => "completed",
        Failed => "failed",
        Cancelled => "cancelled",
        Stopped => "stopped",
        Timeout => "timeout",
        OutOfMemory => "out_of_memory",
    }
}

/// Whether metric archiving for a job is pending, done, failed, or off.
///
/// Stored (and serialized) as its integer discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum MonitoringStatus {
    Disabled = 0,
    RunningOrArchiving = 1,
    ArchivingFailed = 2,
    ArchivingSuccessful = 3,
}

impl From<MonitoringStatus> for u8 {
    fn from(s: MonitoringStatus) -> u8 {
        s as u8
    }
}

impl TryFrom<u8> for MonitoringStatus {
    type Error = String;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(MonitoringStatus::Disabled),
            1 => Ok(MonitoringStatus::RunningOrArchiving),
            2 => Ok(MonitoringStatus::ArchivingFailed),
            3 => Ok(MonitoringStatus::ArchivingSuccessful),
            other => Err(format!("invalid monitoring status: {other}")),
        }
    }
}

crate::simple_display! {
    MonitoringStatus {
        Disabled => "disabled",
        RunningOrArchiving => "running-or-archiving",
        ArchivingFailed => "archiving-failed",
        ArchivingSuccessful => "archiving-successful",
    }
}

/// Node-sharing mode of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SharedMode {
    /// Exclusive node usage.
    #[default]
    None,
    /// Shares nodes with jobs of the same user.
    Single,
    /// Shares nodes with arbitrary jobs.
    Multi,
}

crate::simple_display! {
    SharedMode {
        None => "none",
        Single => "single",
        Multi => "multi",
    }
}

/// One allocated host plus the hardware threads and accelerators the job
/// was given on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub hostname: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hwthreads: Option<Vec<u32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accelerators: Option<Vec<String>>,
}

impl Resource {
    pub fn new(hostname: impl Into<String>) -> Self {
        Self { hostname: hostname.into(), hwthreads: None, accelerators: None }
    }
}

/// Summary statistics for one metric, as stored in the archived snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatistics {
    pub unit: crate::metric::Unit,
    pub min: f64,
    pub avg: f64,
    pub max: f64,
}

/// A batch job as known to the metadata store and the archive.
///
/// Serde field names follow the archive wire format; the same shape is
/// accepted on the start-job ingress paths and written to `meta.json`.
/// Unknown fields are rejected so ingress typos fail loudly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Job {
    /// Internal identifier, assigned at insert. Absent until persisted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    /// Scheduler-supplied job id.
    pub job_id: i64,
    pub user: String,
    pub project: String,
    pub cluster: String,
    #[serde(default)]
    pub sub_cluster: String,
    #[serde(default)]
    pub partition: String,
    #[serde(default)]
    pub array_job_id: i64,
    pub num_nodes: u32,
    #[serde(default)]
    pub num_hwthreads: u32,
    #[serde(default)]
    pub num_acc: u32,
    #[serde(default)]
    pub shared: SharedMode,
    #[serde(default)]
    pub smt: bool,
    #[serde(default = "JobState::default_running")]
    pub state: JobState,
    /// Unix seconds; always > 0 for a valid job.
    pub start_time: i64,
    #[serde(default)]
    pub duration: i64,
    #[serde(default)]
    pub walltime: i64,
    #[serde(default = "MonitoringStatus::default_running")]
    pub monitoring_status: MonitoringStatus,
    pub resources: Vec<Resource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta_data: Option<HashMap<String, String>>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub footprint: IndexMap<String, f64>,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub energy: f64,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub energy_footprint: IndexMap<String, f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<Tag>,
    /// Per-metric summary statistics; present only in archived snapshots.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub statistics: IndexMap<String, JobStatistics>,
}

fn is_zero(v: &f64) -> bool {
    *v == 0.0
}

impl JobState {
    fn default_running() -> Self {
        JobState::Running
    }
}

impl MonitoringStatus {
    fn default_running() -> Self {
        MonitoringStatus::RunningOrArchiving
    }
}

/// Malformed or semantically invalid job input.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("user must not be empty")]
    EmptyUser,
    #[error("cluster must not be empty")]
    EmptyCluster,
    #[error("startTime must be > 0")]
    BadStartTime,
    #[error("numNodes must be >= 1")]
    BadNumNodes,
    #[error("resources must not be empty")]
    EmptyResources,
    #[error("resource hostname must not be empty")]
    EmptyHostname,
    #[error("stopTime {stop} precedes startTime {start}")]
    StopBeforeStart { start: i64, stop: i64 },
    #[error("unknown cluster: {0}")]
    UnknownCluster(String),
    #[error("unknown partition {partition} on cluster {cluster}")]
    UnknownPartition { cluster: String, partition: String },
    #[error("invalid job state: {0}")]
    BadState(String),
}

impl Job {
    /// Check the structural invariants every ingested job must satisfy.
    ///
    /// Cluster and partition existence is checked separately against the
    /// topology registry by the lifecycle engine.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.user.is_empty() {
            return Err(ValidationError::EmptyUser);
        }
        if self.cluster.is_empty() {
            return Err(ValidationError::EmptyCluster);
        }
        if self.start_time <= 0 {
            return Err(ValidationError::BadStartTime);
        }
        if self.num_nodes < 1 {
            return Err(ValidationError::BadNumNodes);
        }
        if self.resources.is_empty() {
            return Err(ValidationError::EmptyResources);
        }
        if self.resources.iter().any(|r| r.hostname.is_empty()) {
            return Err(ValidationError::EmptyHostname);
        }
        Ok(())
    }

    /// Hostnames of all allocated nodes, in resource order.
    pub fn hosts(&self) -> Vec<String> {
        self.resources.iter().map(|r| r.hostname.clone()).collect()
    }

    /// True when the job runs on a single node and may be dispatched at
    /// finer metric scopes.
    pub fn is_single_node(&self) -> bool {
        self.num_nodes == 1
    }

    /// True when the job has accelerators allocated.
    pub fn has_accelerators(&self) -> bool {
        self.num_acc > 0
    }
}

crate::builder! {
    pub struct JobBuilder => Job {
        into {
            user: String = "testuser",
            project: String = "testproj",
            cluster: String = "testcluster",
            sub_cluster: String = "sc0",
            partition: String = "main",
        }
        set {
            job_id: i64 = 1,
            array_job_id: i64 = 0,
            num_nodes: u32 = 1,
            num_hwthreads: u32 = 0,
            num_acc: u32 = 0,
            shared: SharedMode = SharedMode::None,
            smt: bool = false,
            state: JobState = JobState::Running,
            start_time: i64 = 1_234_567_890,
            duration: i64 = 0,
            walltime: i64 = 3600,
            monitoring_status: MonitoringStatus = MonitoringStatus::RunningOrArchiving,
            resources: Vec<Resource> = vec![Resource::new("host123")],
            footprint: IndexMap<String, f64> = IndexMap::new(),
            energy: f64 = 0.0,
            energy_footprint: IndexMap<String, f64> = IndexMap::new(),
            tags: Vec<Tag> = Vec::new(),
            statistics: IndexMap<String, JobStatistics> = IndexMap::new(),
        }
        option {
            id: i64 = None,
            meta_data: HashMap<String, String> = None,
        }
    }
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
