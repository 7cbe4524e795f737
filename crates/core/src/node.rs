// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Node occupancy state and the heartbeat payload.

use serde::{Deserialize, Serialize};

/// Canonical scheduler state of a node.
///
/// Heartbeats report a set of raw state strings; the canonical state is the
/// first match in the priority order
/// `allocated > reserved > mixed > idle > down > unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeState {
    Allocated,
    Reserved,
    Mixed,
    Idle,
    Down,
    Unknown,
}

crate::simple_display! {
    NodeState {
        Allocated => "allocated",
        Reserved => "reserved",
        Mixed => "mixed",
        Idle => "idle",
        Down => "down",
        Unknown => "unknown",
    }
}

impl NodeState {
    /// Derive the canonical state from the raw state set.
    pub fn derive(raw: &[String]) -> NodeState {
        const PRIORITY: [NodeState; 5] = [
            NodeState::Allocated,
            NodeState::Reserved,
            NodeState::Mixed,
            NodeState::Idle,
            NodeState::Down,
        ];
        for state in PRIORITY {
            if raw.iter().any(|s| s.eq_ignore_ascii_case(&state.to_string())) {
                return state;
            }
        }
        NodeState::Unknown
    }
}

/// Health of the monitoring pipeline for a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    Full,
    Partial,
    Failed,
}

crate::simple_display! {
    HealthState {
        Full => "full",
        Partial => "partial",
        Failed => "failed",
    }
}

/// Per-node entry of a heartbeat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodePayload {
    pub hostname: String,
    pub states: Vec<String>,
    #[serde(default)]
    pub cpus_allocated: u32,
    #[serde(default)]
    pub memory_allocated: u64,
    #[serde(default)]
    pub gpus_allocated: u32,
    #[serde(default)]
    pub jobs_running: u32,
}

/// A full node-state heartbeat from the workload manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NodeStateUpdate {
    pub cluster: String,
    pub nodes: Vec<NodePayload>,
}

#[cfg(test)]
#[path = "node_tests.rs"]
mod tests;
