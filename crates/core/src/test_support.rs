// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixtures for this crate's tests and, via the `test-support`
//! feature, for downstream crates' tests.

use crate::cluster::{
    Cluster, EnergyKind, FootprintKind, MetricConfig, SubCluster, SubClusterConfig, Topology,
};
use crate::metric::{MetricScope, Unit};

/// A two-subcluster test topology: `sc0` has all metrics, `sc1` removes
/// `flops_dp` and raises the `mem_used` peak.
pub fn test_cluster() -> Cluster {
    Cluster {
        name: "testcluster".into(),
        metric_config: vec![
            MetricConfig {
                name: "flops_any".into(),
                unit: Unit::with_prefix("F/s", "G"),
                scope: MetricScope::HwThread,
                timestep: 60,
                aggregation: "sum".into(),
                peak: 5600.0,
                normal: 1000.0,
                caution: 200.0,
                alert: 50.0,
                footprint: Some(FootprintKind::Avg),
                energy: None,
                lower_is_better: false,
                sub_clusters: vec![],
            },
            MetricConfig {
                name: "flops_dp".into(),
                unit: Unit::with_prefix("F/s", "G"),
                scope: MetricScope::HwThread,
                timestep: 60,
                aggregation: "sum".into(),
                peak: 2800.0,
                normal: 500.0,
                caution: 100.0,
                alert: 25.0,
                footprint: None,
                energy: None,
                lower_is_better: false,
                sub_clusters: vec![SubClusterConfig {
                    name: "sc1".into(),
                    peak: None,
                    normal: None,
                    caution: None,
                    alert: None,
                    footprint: None,
                    remove: true,
                    lower_is_better: false,
                }],
            },
            MetricConfig {
                name: "mem_used".into(),
                unit: Unit::with_prefix("B", "G"),
                scope: MetricScope::Node,
                timestep: 30,
                aggregation: "sum".into(),
                peak: 256.0,
                normal: 128.0,
                caution: 200.0,
                alert: 240.0,
                footprint: Some(FootprintKind::Max),
                energy: None,
                lower_is_better: true,
                sub_clusters: vec![SubClusterConfig {
                    name: "sc1".into(),
                    peak: Some(512.0),
                    normal: None,
                    caution: None,
                    alert: None,
                    footprint: None,
                    remove: false,
                    lower_is_better: false,
                }],
            },
            MetricConfig {
                name: "cpu_power".into(),
                unit: Unit::new("W"),
                scope: MetricScope::Socket,
                timestep: 60,
                aggregation: "sum".into(),
                peak: 500.0,
                normal: 250.0,
                caution: 400.0,
                alert: 450.0,
                footprint: None,
                energy: Some(EnergyKind::Power),
                lower_is_better: false,
                sub_clusters: vec![],
            },
        ],
        sub_clusters: vec![
            SubCluster {
                name: "sc0".into(),
                nodes: "host[100-199]".into(),
                processor_type: "TestProc".into(),
                sockets_per_node: 2,
                cores_per_socket: 4,
                threads_per_core: 1,
                topology: Topology {
                    node: (0..8).collect(),
                    socket: vec![(0..4).collect(), (4..8).collect()],
                    memory_domain: vec![(0..8).collect()],
                    core: (0..8).map(|i| vec![i]).collect(),
                    accelerators: vec![],
                },
            },
            SubCluster {
                name: "sc1".into(),
                nodes: "host[200-299]".into(),
                processor_type: "TestProc2".into(),
                sockets_per_node: 1,
                cores_per_socket: 64,
                threads_per_core: 1,
                topology: Topology::default(),
            },
        ],
        partitions: vec!["main".into(), "gpu".into()],
    }
}
