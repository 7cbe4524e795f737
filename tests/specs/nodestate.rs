// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Node-state scenario: the documented priority order over HTTP ingest.

use super::harness::test_daemon;
use axum::http::StatusCode;
use jm_core::NodeState;

#[tokio::test]
async fn heartbeat_applies_priority_order() {
    let app = test_daemon().await;
    let (status, _) = app
        .post(
            "/nodestate",
            serde_json::json!({
                "cluster": "testcluster",
                "nodes": [
                    {"hostname": "host1", "states": ["idle", "mixed"]},
                    {"hostname": "host2", "states": ["down", "allocated"]},
                    {"hostname": "host3", "states": ["weird"]}
                ]
            }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let repo = &app.daemon.repo;
    assert_eq!(repo.node("testcluster", "host1").unwrap().node_state, NodeState::Mixed);
    assert_eq!(repo.node("testcluster", "host2").unwrap().node_state, NodeState::Allocated);
    assert_eq!(repo.node("testcluster", "host3").unwrap().node_state, NodeState::Unknown);
}
