// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP error mapping: every failure becomes a `{status, error}` body.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use jm_engine::EngineError;
use serde_json::json;

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self { status, message: message.into() }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({
            "status": self.status.canonical_reason().unwrap_or("error"),
            "error": self.message,
        });
        (self.status, Json(body)).into_response()
    }
}

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        let status = match &e {
            EngineError::Validation(_) => StatusCode::BAD_REQUEST,
            EngineError::Duplicate { .. } | EngineError::Precondition(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            EngineError::NotFound => StatusCode::NOT_FOUND,
            EngineError::Metric(jm_metrics::MetricError::Timeout(_)) => {
                StatusCode::GATEWAY_TIMEOUT
            }
            EngineError::Repo(_) | EngineError::Metric(_) | EngineError::Archive(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self::new(status, e.to_string())
    }
}

impl From<jm_storage::RepoError> for ApiError {
    fn from(e: jm_storage::RepoError) -> Self {
        ApiError::from(EngineError::from(e))
    }
}

impl From<jm_metrics::MetricError> for ApiError {
    fn from(e: jm_metrics::MetricError) -> Self {
        ApiError::from(EngineError::from(e))
    }
}

impl From<jm_archive::ArchiveError> for ApiError {
    fn from(e: jm_archive::ArchiveError) -> Self {
        match e {
            jm_archive::ArchiveError::NotFound(_) => Self::not_found(e.to_string()),
            other => ApiError::from(EngineError::from(other)),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(format!("malformed request body: {rejection}"))
    }
}
