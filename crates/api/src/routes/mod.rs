pub mod health;
pub mod jobs;
pub mod queue;

use axum::routing::get;
use axum::Router;

use crate::state::AppState;
use crate::ws;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /ws                      WebSocket progress streaming
///
/// /jobs                    list, submit
/// /jobs/{id}               get
/// /jobs/{id}/cancel        cancel (POST)
///
/// /queue                   per-pool load snapshot
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/ws", get(ws::ws_handler))
        .nest("/jobs", jobs::router())
        .nest("/queue", queue::router())
}
