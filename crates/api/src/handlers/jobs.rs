//! Handlers for the `/jobs` resource.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;

use medialoom_core::job::JobStatus;
use medialoom_core::payload::SubmitJob;
use medialoom_core::types::JobId;
use medialoom_engine::store::JobFilter;

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

/// Query parameters for `GET /jobs`.
#[derive(Debug, Default, Deserialize)]
pub struct JobListQuery {
    /// Filter by status (`pending`, `running`, `completed`, ...).
    pub status: Option<JobStatus>,
    /// Filter by submitting owner.
    pub owner: Option<String>,
    /// Page size; unset returns everything.
    pub limit: Option<usize>,
    /// Records to skip (newest-first ordering).
    #[serde(default)]
    pub offset: usize,
}

// ---------------------------------------------------------------------------
// Submit
// ---------------------------------------------------------------------------

/// POST /api/v1/jobs
///
/// Submit a new background job. Returns 201 with the created job record.
/// A malformed payload returns 400; a full pool queue returns 429 and
/// leaves no record behind.
pub async fn submit_job(
    State(state): State<AppState>,
    Json(input): Json<SubmitJob>,
) -> AppResult<impl IntoResponse> {
    let job = state.dispatcher.submit(input).await?;
    Ok((StatusCode::CREATED, Json(DataResponse { data: job })))
}

// ---------------------------------------------------------------------------
// List
// ---------------------------------------------------------------------------

/// GET /api/v1/jobs
///
/// List job records newest-first. Supports optional `status`, `owner`,
/// `limit`, and `offset` query parameters.
pub async fn list_jobs(
    State(state): State<AppState>,
    Query(params): Query<JobListQuery>,
) -> AppResult<impl IntoResponse> {
    let jobs = state
        .store
        .list(&JobFilter {
            status: params.status,
            owner: params.owner,
            limit: params.limit,
            offset: params.offset,
        })
        .await;
    Ok(Json(DataResponse { data: jobs }))
}

// ---------------------------------------------------------------------------
// Get
// ---------------------------------------------------------------------------

/// GET /api/v1/jobs/{id}
///
/// Get a single job record, including progress, per-item errors, and the
/// result summary once terminal.
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<JobId>,
) -> AppResult<impl IntoResponse> {
    let job = state.dispatcher.status(job_id).await?;
    Ok(Json(DataResponse { data: job }))
}

// ---------------------------------------------------------------------------
// Cancel
// ---------------------------------------------------------------------------

/// POST /api/v1/jobs/{id}/cancel
///
/// Record cancellation intent for a pending or running job. Returns 204
/// once the intent is recorded (cancellation itself is asynchronous),
/// 409 if the job is already in a terminal state.
pub async fn cancel_job(
    State(state): State<AppState>,
    Path(job_id): Path<JobId>,
) -> AppResult<impl IntoResponse> {
    let cancelled = state.dispatcher.cancel(job_id).await?;

    if !cancelled {
        return Err(AppError::Core(medialoom_core::error::CoreError::Conflict(
            "Job is already in a terminal state and cannot be cancelled".into(),
        )));
    }

    Ok(StatusCode::NO_CONTENT)
}
