// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Node-state tracking from workload-manager heartbeats.

use jm_core::{Clock, HealthState, NodeState, NodeStateUpdate};
use jm_storage::{JobRepository, NodeRow};
use tracing::debug;

use crate::error::EngineError;

/// Apply one heartbeat: derive each node's canonical state from the raw
/// state set and upsert the row with health `full` and the ingest time.
pub fn apply_node_state(
    repo: &JobRepository,
    clock: &impl Clock,
    update: &NodeStateUpdate,
) -> Result<usize, EngineError> {
    let now = clock.now_unix();
    for node in &update.nodes {
        let row = NodeRow {
            hostname: node.hostname.clone(),
            cluster: update.cluster.clone(),
            cpus_allocated: node.cpus_allocated,
            memory_allocated: node.memory_allocated,
            gpus_allocated: node.gpus_allocated,
            jobs_running: node.jobs_running,
            node_state: NodeState::derive(&node.states),
            health_state: HealthState::Full,
            time_stamp: now,
        };
        repo.upsert_node(&row)?;
    }
    debug!(cluster = %update.cluster, nodes = update.nodes.len(), "node states applied");
    Ok(update.nodes.len())
}

#[cfg(test)]
#[path = "nodestate_tests.rs"]
mod tests;
