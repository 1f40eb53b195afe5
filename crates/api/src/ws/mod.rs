//! WebSocket infrastructure for real-time progress streaming.
//!
//! Provides connection management, per-job relay tasks, heartbeat
//! monitoring, and the HTTP upgrade handler used by Axum routes.

mod handler;
mod heartbeat;
pub mod manager;
pub mod messages;

pub use handler::ws_handler;
pub use heartbeat::start_heartbeat;
pub use manager::WsManager;
