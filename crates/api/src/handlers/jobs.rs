//! Handlers for job submission and polling.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use shipyard_core::error::CoreError;
use shipyard_core::job::NewJob;
use shipyard_core::types::DbId;

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

const DEFAULT_LIST_LIMIT: i64 = 20;

#[derive(Debug, Deserialize)]
pub struct JobListQuery {
    pub limit: Option<i64>,
}

/// POST /api/jobs
///
/// Validates the payload against the job type, then inserts a pending job.
/// Returns 201, or 409 if the app already has a pending or running job.
pub async fn submit_job(
    State(state): State<AppState>,
    Json(input): Json<NewJob>,
) -> AppResult<impl IntoResponse> {
    input.validate()?;
    let job = state.jobs.submit(&input).await?;

    tracing::info!(
        job_id = job.id,
        app_id = job.app_id,
        job_type = %job.job_type,
        "Job submitted",
    );

    Ok((StatusCode::CREATED, Json(DataResponse { data: job })))
}

/// GET /api/jobs/{id}
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let job = state
        .jobs
        .find_by_id(job_id)
        .await?
        .ok_or_else(|| CoreError::NotFound {
            entity: "Job",
            id: job_id.to_string(),
        })?;
    Ok(Json(DataResponse { data: job }))
}

/// GET /api/apps/{app_id}/jobs
///
/// Newest first; `limit` defaults to 20 and is capped by the store.
pub async fn list_app_jobs(
    State(state): State<AppState>,
    Path(app_id): Path<DbId>,
    Query(params): Query<JobListQuery>,
) -> AppResult<impl IntoResponse> {
    let limit = params.limit.unwrap_or(DEFAULT_LIST_LIMIT);
    let jobs = state.jobs.list_by_app(app_id, limit).await?;
    Ok(Json(DataResponse { data: jobs }))
}
