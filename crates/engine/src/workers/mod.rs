//! The three worker variants behind one job/progress contract.
//!
//! Each worker drives one job to exactly one terminal status, requesting
//! all state mutations through the job store and publishing progress to
//! the bus. Cancellation arrives through the job's cancellation token,
//! routed from the dispatcher — workers never receive cancel signals any
//! other way.

pub mod batch;
pub mod stream;
pub mod thread_pool;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use medialoom_core::job::{JobStatus, ResultSummary};
use medialoom_core::types::JobId;
use medialoom_events::{ProgressBus, ProgressEvent};

use crate::store::JobStore;

/// Shared handles a worker needs to execute one job.
#[derive(Clone)]
pub struct WorkerContext {
    pub store: Arc<JobStore>,
    pub bus: Arc<ProgressBus>,
    /// Per-job token; cancelled by the dispatcher on cancellation intent.
    pub cancel: CancellationToken,
}

impl WorkerContext {
    /// Publish a progress observation for the job.
    pub async fn publish(
        &self,
        job_id: JobId,
        status: JobStatus,
        progress: f32,
        current_item: Option<String>,
    ) {
        self.bus
            .publish(ProgressEvent::now(job_id, status, progress, current_item))
            .await;
    }

    /// Record a terminal status and publish the terminal event.
    ///
    /// Exactly-once: if the job already reached a terminal state (e.g. a
    /// racing cancel), nothing is published and false is returned.
    pub async fn finish(
        &self,
        job_id: JobId,
        status: JobStatus,
        summary: Option<ResultSummary>,
    ) -> bool {
        if !self.store.finish(job_id, status, summary).await {
            return false;
        }
        let progress = self
            .store
            .get(job_id)
            .await
            .map(|job| job.progress)
            .unwrap_or(0.0);
        self.publish(job_id, status, progress, None).await;
        true
    }
}
