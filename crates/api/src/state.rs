use std::sync::Arc;

use medialoom_engine::dispatcher::JobDispatcher;
use medialoom_engine::store::JobStore;
use medialoom_events::ProgressBus;

use crate::config::ServerConfig;
use crate::ws::WsManager;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc`).
#[derive(Clone)]
pub struct AppState {
    /// Server configuration (accessed by middleware and handlers).
    pub config: Arc<ServerConfig>,
    /// Job submission, cancellation, and pool introspection.
    pub dispatcher: Arc<JobDispatcher>,
    /// Job record store, read directly for listing and status snapshots.
    pub store: Arc<JobStore>,
    /// Per-job progress fan-out, consumed by WebSocket relays.
    pub bus: Arc<ProgressBus>,
    /// WebSocket connection manager (browser clients).
    pub ws_manager: Arc<WsManager>,
}
