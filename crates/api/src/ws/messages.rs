//! WebSocket wire messages.
//!
//! Clients drive subscriptions with small tagged JSON commands; the
//! server answers with acknowledgements, a full job snapshot per new
//! subscription, and then live progress events.

use serde::{Deserialize, Serialize};

use medialoom_core::job::Job;
use medialoom_core::types::JobId;
use medialoom_events::ProgressEvent;

/// Inbound client command, tagged by `type`:
/// `{"type": "subscribe", "job_id": "..."}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Start receiving progress events for one job.
    Subscribe { job_id: JobId },
    /// Stop receiving progress events for one job.
    Unsubscribe { job_id: JobId },
    /// Subscribe to every job owned by `owner` in one command.
    SubscribeOwner { owner: String },
    /// Application-level liveness check; answered with `pong`.
    Ping,
}

/// Outbound server message, tagged by `type`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Subscription acknowledged.
    Subscribed { job_id: JobId },
    /// Unsubscription acknowledged.
    Unsubscribed { job_id: JobId },
    /// Full snapshot of the job record, sent once per new subscription so
    /// late subscribers start from current state rather than zero.
    JobState {
        #[serde(flatten)]
        job: Job,
    },
    /// A live progress event.
    Progress {
        #[serde(flatten)]
        event: ProgressEvent,
    },
    /// Reply to a client `ping`.
    Pong,
    /// A command failed; the connection stays open.
    Error { message: String },
}

impl ServerMessage {
    /// Serialize to the JSON text sent over the socket.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            tracing::error!(error = %e, "Failed to serialize server message");
            r#"{"type":"error","message":"Internal serialization error"}"#.to_string()
        })
    }
}
