// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The HTTP/JSON ingress surface.
//!
//! Handlers are thin: parse, call the engine/repository/dispatcher,
//! map errors to status codes. Authentication is an upstream proxy's
//! concern; the forwarded identity headers are trusted as-is.

mod error;
mod jobs;
mod nodes;

use std::sync::Arc;
use std::time::Duration;

use axum::http::HeaderMap;
use axum::routing::{delete, get, patch, post};
use axum::Router;
use jm_archive::Archive;
use jm_core::SystemClock;
use jm_engine::LifecycleEngine;
use jm_metrics::MetricDispatch;
use tower_http::trace::TraceLayer;

pub use error::ApiError;

#[derive(Clone)]
pub struct ApiState {
    pub engine: Arc<LifecycleEngine>,
    pub dispatch: Arc<MetricDispatch>,
    pub archive: Archive,
    pub clock: SystemClock,
    /// Deadline propagated to metric and archive loads.
    pub request_timeout: Duration,
}

/// Identity forwarded by the auth proxy: `X-Auth-User` and
/// `X-Auth-Role: admin`. Absent headers fall back to an admin service
/// identity (lifecycle ingress is a trusted scheduler integration).
pub(crate) fn acting_user(headers: &HeaderMap) -> (String, bool) {
    let user = headers
        .get("x-auth-user")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("admin")
        .to_string();
    let is_admin = match headers.get("x-auth-role").and_then(|v| v.to_str().ok()) {
        Some(role) => role.eq_ignore_ascii_case("admin"),
        None => true,
    };
    (user, is_admin)
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/jobs/start_job", post(jobs::start_job))
        .route("/jobs/stop_job", post(jobs::stop_job))
        .route("/jobs/stop_job/:id", post(jobs::stop_job_by_id))
        .route("/jobs/delete_job", delete(jobs::delete_job))
        .route("/jobs/delete_job/", delete(jobs::delete_job))
        .route("/jobs/delete_job/:id", delete(jobs::delete_job_by_id))
        .route("/jobs/delete_job_before/:ts", delete(jobs::delete_job_before))
        .route("/jobs/", get(jobs::list_jobs))
        .route("/jobs/:id", get(jobs::get_job).post(jobs::get_job_with_metrics))
        .route("/jobs/tag_job/:id", post(jobs::tag_job).delete(jobs::untag_job))
        .route("/jobs/edit_meta/:id", patch(jobs::edit_meta))
        .route("/jobs/metrics/:id", get(jobs::job_metrics))
        .route("/nodestate", post(nodes::node_state))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
