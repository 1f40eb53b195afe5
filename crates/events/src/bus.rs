//! Per-job progress bus backed by `tokio::sync::broadcast` channels.
//!
//! [`ProgressBus`] decouples workers (publishers) from connection fan-out
//! (subscribers). Each job id gets its own broadcast channel, created on
//! first subscription; every subscriber receives its own copy of every
//! event. Delivery is at-least-once and ordered per publisher. A slow
//! subscriber lags (oldest events are dropped for it) without blocking the
//! publisher or any other subscriber — progress is idempotent and
//! superseded by later events.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, RwLock};

use medialoom_core::job::JobStatus;
use medialoom_core::types::JobId;

// ---------------------------------------------------------------------------
// ProgressEvent
// ---------------------------------------------------------------------------

/// A point-in-time progress observation for one job.
///
/// Transient: never persisted beyond the last-known values on the job
/// record. Consumers tolerate duplicates; `(job_id, progress)` is a
/// sufficient dedupe key because progress is monotonic within a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub job_id: JobId,
    pub status: JobStatus,
    /// Percentage in `[0, 100]`.
    pub progress: f32,
    pub current_item: Option<String>,
    /// When the event was published (UTC).
    pub timestamp: DateTime<Utc>,
}

impl ProgressEvent {
    /// Build an event stamped with the current time.
    pub fn now(
        job_id: JobId,
        status: JobStatus,
        progress: f32,
        current_item: Option<String>,
    ) -> Self {
        Self {
            job_id,
            status,
            progress,
            current_item,
            timestamp: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// ProgressBus
// ---------------------------------------------------------------------------

/// Default per-job channel capacity. A receiver further behind than this
/// observes a `Lagged` error and resumes from the oldest retained event.
const DEFAULT_CAPACITY: usize = 256;

/// Publish/subscribe hub keyed by job id.
///
/// Designed to be shared via `Arc<ProgressBus>` between the engine
/// (publisher side) and the connection manager (subscriber side).
pub struct ProgressBus {
    channels: RwLock<HashMap<JobId, broadcast::Sender<ProgressEvent>>>,
    capacity: usize,
}

impl ProgressBus {
    /// Create a bus with a specific per-job channel capacity.
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
            capacity,
        }
    }

    /// Publish an event for its job.
    ///
    /// If nobody has subscribed to the job the event is dropped — the job
    /// store retains the last-known truth, and subscribers receive a full
    /// snapshot when they attach. Channels whose receivers have all gone
    /// away are pruned here.
    pub async fn publish(&self, event: ProgressEvent) {
        let job_id = event.job_id;
        let stale = {
            let channels = self.channels.read().await;
            match channels.get(&job_id) {
                Some(sender) => sender.send(event).is_err(),
                None => false,
            }
        };
        if stale {
            // All receivers dropped without an explicit release.
            self.channels.write().await.remove(&job_id);
            tracing::trace!(job_id = %job_id, "Pruned progress channel with no receivers");
        }
    }

    /// Subscribe to all future events for one job.
    ///
    /// Creates the job's channel if this is the first subscriber. Events
    /// published before subscription are not replayed.
    pub async fn subscribe(&self, job_id: JobId) -> broadcast::Receiver<ProgressEvent> {
        let mut channels = self.channels.write().await;
        channels
            .entry(job_id)
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Drop the channel for a job that no longer has listeners.
    ///
    /// Existing receivers may still drain already-buffered events (the
    /// terminal event in particular) before observing channel closure.
    pub async fn release(&self, job_id: JobId) {
        self.channels.write().await.remove(&job_id);
    }

    /// Number of live subscribers for a job. Used by cleanup logic and tests.
    pub async fn subscriber_count(&self, job_id: JobId) -> usize {
        self.channels
            .read()
            .await
            .get(&job_id)
            .map(|s| s.receiver_count())
            .unwrap_or(0)
    }

    /// Number of job channels currently held.
    pub async fn channel_count(&self) -> usize {
        self.channels.read().await.len()
    }
}

impl Default for ProgressBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
