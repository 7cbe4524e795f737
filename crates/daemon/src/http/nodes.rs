// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Node-state heartbeat ingest.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use jm_core::NodeStateUpdate;
use jm_engine::apply_node_state;
use serde_json::json;

use super::{ApiError, ApiState};

/// `POST /nodestate`: request/response twin of the bus heartbeat event.
pub(crate) async fn node_state(
    State(state): State<ApiState>,
    payload: Result<Json<NodeStateUpdate>, JsonRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let Json(update) = payload?;
    let applied = apply_node_state(state.engine.repo(), &state.clock, &update)?;
    Ok(Json(json!({"msg": "success", "nodes": applied})))
}
