// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Node occupancy rows maintained from workload-manager heartbeats.

use jm_core::{HealthState, NodeState};
use rusqlite::params;

use crate::error::RepoError;
use crate::repo::{not_found, JobRepository};

/// One row of the `node` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeRow {
    pub hostname: String,
    pub cluster: String,
    pub cpus_allocated: u32,
    pub memory_allocated: u64,
    pub gpus_allocated: u32,
    pub jobs_running: u32,
    pub node_state: NodeState,
    pub health_state: HealthState,
    pub time_stamp: i64,
}

fn node_state_from(s: &str) -> NodeState {
    match s {
        "allocated" => NodeState::Allocated,
        "reserved" => NodeState::Reserved,
        "mixed" => NodeState::Mixed,
        "idle" => NodeState::Idle,
        "down" => NodeState::Down,
        _ => NodeState::Unknown,
    }
}

fn health_state_from(s: &str) -> HealthState {
    match s {
        "partial" => HealthState::Partial,
        "failed" => HealthState::Failed,
        _ => HealthState::Full,
    }
}

impl JobRepository {
    /// Insert or refresh one node row.
    pub fn upsert_node(&self, node: &NodeRow) -> Result<(), RepoError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO node (hostname, cluster, cpus_allocated, memory_allocated,
                gpus_allocated, jobs_running, node_state, health_state, time_stamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT (hostname, cluster) DO UPDATE SET
                cpus_allocated = excluded.cpus_allocated,
                memory_allocated = excluded.memory_allocated,
                gpus_allocated = excluded.gpus_allocated,
                jobs_running = excluded.jobs_running,
                node_state = excluded.node_state,
                health_state = excluded.health_state,
                time_stamp = excluded.time_stamp",
            params![
                node.hostname,
                node.cluster,
                node.cpus_allocated,
                node.memory_allocated,
                node.gpus_allocated,
                node.jobs_running,
                node.node_state.to_string(),
                node.health_state.to_string(),
                node.time_stamp,
            ],
        )?;
        Ok(())
    }

    pub fn node(&self, cluster: &str, hostname: &str) -> Result<NodeRow, RepoError> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT hostname, cluster, cpus_allocated, memory_allocated, gpus_allocated,
                    jobs_running, node_state, health_state, time_stamp
             FROM node WHERE cluster = ?1 AND hostname = ?2",
            params![cluster, hostname],
            node_from_row,
        )
        .map_err(not_found)
    }

    pub fn list_nodes(&self, cluster: &str) -> Result<Vec<NodeRow>, RepoError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT hostname, cluster, cpus_allocated, memory_allocated, gpus_allocated,
                    jobs_running, node_state, health_state, time_stamp
             FROM node WHERE cluster = ?1 ORDER BY hostname",
        )?;
        let rows = stmt.query_map(params![cluster], node_from_row)?;
        let mut nodes = Vec::new();
        for row in rows {
            nodes.push(row?);
        }
        Ok(nodes)
    }
}

fn node_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<NodeRow> {
    let state_raw: String = row.get(6)?;
    let health_raw: String = row.get(7)?;
    Ok(NodeRow {
        hostname: row.get(0)?,
        cluster: row.get(1)?,
        cpus_allocated: row.get(2)?,
        memory_allocated: row.get(3)?,
        gpus_allocated: row.get(4)?,
        jobs_running: row.get(5)?,
        node_state: node_state_from(&state_raw),
        health_state: health_state_from(&health_raw),
        time_stamp: row.get(8)?,
    })
}

#[cfg(test)]
#[path = "nodes_tests.rs"]
mod tests;
