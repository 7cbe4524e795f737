// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[parameterized(
    allocated_wins          = { &["idle", "allocated"], NodeState::Allocated },
    reserved_over_mixed     = { &["mixed", "reserved"], NodeState::Reserved },
    mixed_over_idle         = { &["idle", "mixed"], NodeState::Mixed },
    idle_over_down          = { &["down", "idle"], NodeState::Idle },
    down_alone              = { &["down"], NodeState::Down },
    unknown_when_empty      = { &[], NodeState::Unknown },
    unknown_when_unmatched  = { &["draining"], NodeState::Unknown },
    case_insensitive        = { &["IDLE", "Mixed"], NodeState::Mixed },
)]
fn derive_follows_priority(raw: &[&str], expected: NodeState) {
    let raw: Vec<String> = raw.iter().map(|s| s.to_string()).collect();
    assert_eq!(NodeState::derive(&raw), expected);
}

#[test]
fn heartbeat_payload_parses() {
    let json = r#"{
        "cluster": "testcluster",
        "nodes": [
            {"hostname": "host1", "states": ["allocated"], "cpusAllocated": 64,
             "memoryAllocated": 256000, "gpusAllocated": 4, "jobsRunning": 2},
            {"hostname": "host2", "states": ["idle"]}
        ]
    }"#;
    let update: NodeStateUpdate = serde_json::from_str(json).unwrap();
    assert_eq!(update.cluster, "testcluster");
    assert_eq!(update.nodes.len(), 2);
    assert_eq!(update.nodes[0].cpus_allocated, 64);
    assert_eq!(update.nodes[1].jobs_running, 0);
}

#[test]
fn heartbeat_rejects_unknown_fields() {
    let json = r#"{"cluster": "c", "nodes": [], "extra": 1}"#;
    assert!(serde_json::from_str::<NodeStateUpdate>(json).is_err());
}
