// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job endpoints: lifecycle, queries, tags, metadata, metrics.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, RawQuery, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use jm_archive::{ArchiveBackend, JobRef};
use jm_core::{Job, JobData, JobState, MetricScope, MonitoringStatus, Tag};
use jm_engine::{DeleteTarget, StopRequest, StopTarget};
use jm_storage::{JobFilter, Page};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{acting_user, ApiError, ApiState};

/// `POST /jobs/start_job`: 201 on success, 422 on duplicate.
pub(crate) async fn start_job(
    State(state): State<ApiState>,
    payload: Result<Json<Job>, JsonRejection>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let Json(job) = payload?;
    state.engine.start_job(job)?;
    Ok((StatusCode::CREATED, Json(json!({"msg": "success"}))))
}

/// `POST /jobs/stop_job`: the job is addressed by its identity tuple.
pub(crate) async fn stop_job(
    State(state): State<ApiState>,
    payload: Result<Json<StopRequest>, JsonRejection>,
) -> Result<Json<Job>, ApiError> {
    let Json(req) = payload?;
    let (Some(job_id), Some(cluster)) = (req.job_id, req.cluster.clone()) else {
        return Err(ApiError::bad_request("stop_job requires jobId and cluster"));
    };
    let target = StopTarget::ByIdentity { job_id, cluster, start_time: req.start_time };
    let job = state.engine.stop_job(target, req.stop_time, req.state, true).await?;
    Ok(Json(job))
}

/// `POST /jobs/stop_job/{id}`: addressed by internal id.
pub(crate) async fn stop_job_by_id(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
    payload: Result<Json<StopRequest>, JsonRejection>,
) -> Result<Json<Job>, ApiError> {
    let Json(req) = payload?;
    let job = state
        .engine
        .stop_job(StopTarget::ByDbId(id), req.stop_time, req.state, true)
        .await?;
    Ok(Json(job))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct DeleteRequest {
    job_id: i64,
    cluster: String,
    #[serde(default)]
    start_time: Option<i64>,
}

pub(crate) async fn delete_job_by_id(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.engine.delete_job(DeleteTarget::ByDbId(id))?;
    Ok(Json(json!({"msg": format!("deleted job {id}")})))
}

pub(crate) async fn delete_job(
    State(state): State<ApiState>,
    payload: Result<Json<DeleteRequest>, JsonRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let Json(req) = payload?;
    let deleted = state.engine.delete_job(DeleteTarget::ByIdentity {
        job_id: req.job_id,
        cluster: req.cluster,
        start_time: req.start_time,
    })?;
    Ok(Json(json!({"msg": format!("deleted {deleted} jobs")})))
}

#[derive(Debug, Deserialize)]
pub(crate) struct DeleteBeforeParams {
    #[serde(rename = "omit-tagged", default)]
    omit_tagged: bool,
}

pub(crate) async fn delete_job_before(
    State(state): State<ApiState>,
    Path(ts): Path<i64>,
    Query(params): Query<DeleteBeforeParams>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let deleted = state
        .engine
        .delete_job(DeleteTarget::Before { ts, omit_tagged: params.omit_tagged })?;
    Ok(Json(json!({"msg": format!("deleted {deleted} jobs")})))
}

#[derive(Debug, Deserialize)]
pub(crate) struct ListParams {
    state: Option<String>,
    cluster: Option<String>,
    project: Option<String>,
    user: Option<String>,
    /// `from-to` Unix-second range.
    #[serde(rename = "start-time")]
    start_time: Option<String>,
    #[serde(rename = "items-per-page")]
    items_per_page: Option<u32>,
    page: Option<u32>,
    #[serde(rename = "with-metadata", default)]
    with_metadata: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct JobList {
    jobs: Vec<Job>,
    total_jobs: u64,
    page: u32,
    items_per_page: u32,
}

/// `GET /jobs/`: filtered, paginated listing.
pub(crate) async fn list_jobs(
    State(state): State<ApiState>,
    Query(params): Query<ListParams>,
) -> Result<Json<JobList>, ApiError> {
    let mut filter = JobFilter {
        cluster: params.cluster,
        project: params.project,
        user: params.user,
        ..Default::default()
    };
    if let Some(raw) = &params.state {
        filter.state = Some(
            JobState::parse(raw)
                .ok_or_else(|| ApiError::bad_request(format!("invalid state filter: {raw}")))?,
        );
    }
    if let Some(range) = &params.start_time {
        let (from, to) = range
            .split_once('-')
            .and_then(|(a, b)| Some((a.parse::<i64>().ok()?, b.parse::<i64>().ok()?)))
            .ok_or_else(|| {
                ApiError::bad_request("start-time must be <from>-<to> in Unix seconds")
            })?;
        filter.start_time_from = Some(from);
        filter.start_time_to = Some(to);
    }
    let page = Page {
        items_per_page: params.items_per_page.unwrap_or(25),
        page: params.page.unwrap_or(1),
    };

    let mut jobs = state.engine.repo().query_jobs(&filter, page)?;
    if !params.with_metadata {
        for job in &mut jobs {
            job.meta_data = None;
        }
    }
    let total_jobs = state.engine.repo().count_jobs(&filter)?;
    Ok(Json(JobList { jobs, total_jobs, page: page.page, items_per_page: page.items_per_page }))
}

/// Load the payload from the archive for archived jobs, live from the
/// metric backend otherwise.
async fn load_data(
    state: &ApiState,
    job: &Job,
    metrics: Option<&[String]>,
    scopes: Option<&[MetricScope]>,
) -> Result<JobData, ApiError> {
    if job.monitoring_status == MonitoringStatus::ArchivingSuccessful {
        let job_ref = JobRef::from(job);
        Ok(state.archive.load_data(&job_ref, metrics, scopes).await?)
    } else {
        let result = state
            .dispatch
            .load_job_data(job, metrics, scopes, 0, state.request_timeout)
            .await?;
        Ok(result.data.clone())
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct GetJobParams {
    #[serde(rename = "all-metrics", default)]
    all_metrics: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct JobPayload {
    meta: Job,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<JobData>,
}

/// `GET /jobs/{id}`: job snapshot, optionally with all archived metrics.
pub(crate) async fn get_job(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
    Query(params): Query<GetJobParams>,
) -> Result<Json<JobPayload>, ApiError> {
    let job = state.engine.repo().find_by_id(id)?;
    let data = if params.all_metrics {
        Some(load_data(&state, &job, None, None).await?)
    } else {
        None
    };
    Ok(Json(JobPayload { meta: job, data }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct MetricSelection {
    metrics: Vec<String>,
    #[serde(default)]
    scopes: Option<Vec<MetricScope>>,
}

/// `POST /jobs/{id}`: job plus the selected metrics.
pub(crate) async fn get_job_with_metrics(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
    payload: Result<Json<MetricSelection>, JsonRejection>,
) -> Result<Json<JobPayload>, ApiError> {
    let Json(selection) = payload?;
    let job = state.engine.repo().find_by_id(id)?;
    let data =
        load_data(&state, &job, Some(&selection.metrics), selection.scopes.as_deref()).await?;
    Ok(Json(JobPayload { meta: job, data: Some(data) }))
}

/// `GET /jobs/metrics/{id}?metric=…&scope=…`: repeated query keys
/// select metrics and scopes.
pub(crate) async fn job_metrics(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
    RawQuery(query): RawQuery,
) -> Result<Json<JobPayload>, ApiError> {
    let mut metrics: Vec<String> = Vec::new();
    let mut scopes: Vec<MetricScope> = Vec::new();
    for (key, value) in query
        .as_deref()
        .unwrap_or("")
        .split('&')
        .filter(|s| !s.is_empty())
        .filter_map(|pair| pair.split_once('='))
    {
        match key {
            "metric" => metrics.push(value.to_string()),
            "scope" => scopes.push(
                MetricScope::parse(value)
                    .ok_or_else(|| ApiError::bad_request(format!("invalid scope: {value}")))?,
            ),
            _ => {}
        }
    }

    let job = state.engine.repo().find_by_id(id)?;
    let metrics = if metrics.is_empty() { None } else { Some(metrics) };
    let scopes = if scopes.is_empty() { None } else { Some(scopes) };
    let data = load_data(&state, &job, metrics.as_deref(), scopes.as_deref()).await?;
    Ok(Json(JobPayload { meta: job, data: Some(data) }))
}

/// `POST /jobs/tag_job/{id}`: attach tags (creating them if needed).
pub(crate) async fn tag_job(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
    headers: HeaderMap,
    payload: Result<Json<Vec<Tag>>, JsonRejection>,
) -> Result<Json<Job>, ApiError> {
    let Json(tags) = payload?;
    let (user, is_admin) = acting_user(&headers);
    let job = state.engine.tag_job(&user, is_admin, id, &tags)?;
    Ok(Json(job))
}

/// `DELETE /jobs/tag_job/{id}`: detach tags.
pub(crate) async fn untag_job(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
    payload: Result<Json<Vec<Tag>>, JsonRejection>,
) -> Result<Json<Job>, ApiError> {
    let Json(tags) = payload?;
    let job = state.engine.untag_job(id, &tags)?;
    Ok(Json(job))
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct EditMetaRequest {
    key: String,
    value: String,
}

/// `PATCH /jobs/edit_meta/{id}`: upsert one metadata entry.
pub(crate) async fn edit_meta(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
    payload: Result<Json<EditMetaRequest>, JsonRejection>,
) -> Result<Json<Job>, ApiError> {
    let Json(req) = payload?;
    let job = state.engine.edit_metadata(id, &req.key, &req.value)?;
    Ok(Json(job))
}

#[cfg(test)]
#[path = "jobs_tests.rs"]
mod tests;
