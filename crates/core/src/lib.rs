// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! jm-core: Domain types for the jobmon monitoring backend.

pub mod macros;

pub mod clock;
pub mod cluster;
pub mod job;
pub mod metric;
pub mod node;
pub mod tag;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use clock::{Clock, SystemClock};
#[cfg(any(test, feature = "test-support"))]
pub use clock::FakeClock;
pub use cluster::{
    Accelerator, Cluster, ClusterRegistry, EffectiveMetric, EnergyKind, FootprintKind,
    MetricConfig, SubCluster, SubClusterConfig, Topology,
};
pub use job::{
    Job, JobState, JobStatistics, MonitoringStatus, Resource, SharedMode, ValidationError,
    DUPLICATE_WINDOW_SECS,
};
#[cfg(any(test, feature = "test-support"))]
pub use job::JobBuilder;
pub use metric::{
    Float, JobData, JobMetric, MetricScope, MetricStatistics, NodeData, Series, StatsSeries, Unit,
};
pub use node::{HealthState, NodePayload, NodeState, NodeStateUpdate};
pub use tag::{Tag, TagScope};
