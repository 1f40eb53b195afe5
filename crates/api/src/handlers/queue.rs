//! Handlers for queue introspection.

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

/// GET /api/v1/queue
///
/// Per-pool load snapshot: queued and running job counts plus the
/// configured depth and concurrency limits.
pub async fn get_queue_status(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let snapshot = state.dispatcher.queue_stats();
    Ok(Json(DataResponse { data: snapshot }))
}
