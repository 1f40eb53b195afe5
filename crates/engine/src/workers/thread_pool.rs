//! Thread-pool worker: many short, independent, CPU-bound units within
//! one job.
//!
//! Units run on the blocking pool, gated by a semaphore sized from host
//! parallelism clamped to the configured bounds. Per-unit failures are
//! recorded and do not abort sibling units; the job fails as a whole only
//! past the failure threshold. Cancellation stops submission of new units
//! and lets in-flight ones drain.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use medialoom_core::job::{JobStatus, ResultSummary};
use medialoom_core::pool::{batch_outcome, clamp_pool_size};
use medialoom_core::progress::completion_percent;
use medialoom_core::types::JobId;

use crate::ops::{BlockingItemOp, ItemOutcome};
use crate::workers::WorkerContext;

/// Above this many completions per published event the event rate is
/// bounded by batching (one event per `total / MAX_PROGRESS_EVENTS`).
const MAX_PROGRESS_EVENTS: usize = 200;

#[derive(Default)]
struct Tally {
    succeeded: usize,
    failed: usize,
    skipped: usize,
    completed: usize,
}

pub struct ThreadPoolWorker {
    threads: usize,
    failure_threshold: f64,
}

impl ThreadPoolWorker {
    /// Size the pool from host CPU count, clamped to `[min, max]`.
    pub fn new(min_threads: usize, max_threads: usize, failure_threshold: f64) -> Self {
        let host = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(min_threads);
        let threads = clamp_pool_size(host, min_threads, max_threads);
        tracing::debug!(threads, host, "Thread-pool worker sized");
        Self {
            threads,
            failure_threshold,
        }
    }

    /// Run one thread-pool job to a terminal status.
    pub async fn execute(
        &self,
        ctx: &WorkerContext,
        job_id: JobId,
        items: &[String],
        op: BlockingItemOp,
    ) -> JobStatus {
        if !ctx.store.mark_started(job_id).await {
            return JobStatus::Cancelled;
        }
        ctx.publish(job_id, JobStatus::Running, 0.0, None).await;

        let total = items.len();
        let publish_every = (total / MAX_PROGRESS_EVENTS).max(1);
        let semaphore = Arc::new(Semaphore::new(self.threads));
        let mut units: JoinSet<(String, ItemOutcome)> = JoinSet::new();
        let mut tally = Tally::default();
        let mut submitted = 0usize;
        let mut cancelled = false;

        for item in items {
            if ctx.cancel.is_cancelled() {
                cancelled = true;
                break;
            }
            // Acquiring before spawning paces submission to pool capacity,
            // so cancellation can stop work that has not yet started.
            let permit = match semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };
            submitted += 1;

            let item = item.clone();
            let op = Arc::clone(&op);
            units.spawn(async move {
                let _permit = permit;
                let unit_item = item.clone();
                let outcome = tokio::task::spawn_blocking(move || op(&unit_item))
                    .await
                    .unwrap_or_else(|e| ItemOutcome::Failed(format!("Unit panicked: {e}")));
                (item, outcome)
            });

            // Drain whatever has already finished so progress flows while
            // we keep submitting.
            while let Some(done) = units.try_join_next() {
                self.settle(ctx, job_id, total, publish_every, &mut tally, done)
                    .await;
            }
        }

        while let Some(done) = units.join_next().await {
            self.settle(ctx, job_id, total, publish_every, &mut tally, done)
                .await;
        }

        // A cancel that lands after the last unit was submitted never hits
        // the submission-loop check; the token is the source of truth.
        cancelled = cancelled || ctx.cancel.is_cancelled();

        // Items never submitted count as skipped.
        tally.skipped += total - submitted;

        let summary = ResultSummary {
            succeeded: tally.succeeded,
            failed: tally.failed,
            skipped: tally.skipped,
        };
        let status = if cancelled {
            JobStatus::Cancelled
        } else {
            batch_outcome(tally.succeeded, tally.failed, self.failure_threshold)
        };
        ctx.finish(job_id, status, Some(summary)).await;
        status
    }

    /// Fold one finished unit into the tally and publish progress.
    async fn settle(
        &self,
        ctx: &WorkerContext,
        job_id: JobId,
        total: usize,
        publish_every: usize,
        tally: &mut Tally,
        done: Result<(String, ItemOutcome), tokio::task::JoinError>,
    ) {
        let (item, outcome) = match done {
            Ok(done) => done,
            Err(e) => {
                tally.failed += 1;
                tally.completed += 1;
                tracing::error!(job_id = %job_id, error = %e, "Unit task join failed");
                return;
            }
        };

        tally.completed += 1;
        match outcome {
            ItemOutcome::Succeeded => tally.succeeded += 1,
            ItemOutcome::Skipped => tally.skipped += 1,
            ItemOutcome::Failed(message) => {
                tally.failed += 1;
                ctx.store.record_error(job_id, item.clone(), message).await;
            }
        }

        let percent = completion_percent(tally.completed, total);
        if let Some(actual) = ctx
            .store
            .update_progress(job_id, percent, Some(item))
            .await
        {
            if tally.completed % publish_every == 0 || tally.completed == total {
                let current_item = ctx
                    .store
                    .get(job_id)
                    .await
                    .and_then(|job| job.current_item);
                ctx.publish(job_id, JobStatus::Running, actual, current_item)
                    .await;
            }
        }
    }
}
