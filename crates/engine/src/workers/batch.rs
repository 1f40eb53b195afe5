//! Batch worker: a large ordered collection processed in fixed-size
//! batches with bounded per-item concurrency.
//!
//! Intended for I/O-bound per-item cost (metadata lookups, file moves).
//! Items are retried with exponential backoff before a terminal per-item
//! error is recorded; one progress event is published per batch.
//! Cancellation is checked between batches and between item dispatches.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;

use medialoom_core::job::{JobStatus, ResultSummary};
use medialoom_core::payload::BatchOptions;
use medialoom_core::pool::batch_outcome;
use medialoom_core::progress::completion_percent;
use medialoom_core::types::JobId;

use crate::ops::{ItemOperation, ItemOutcome};
use crate::workers::WorkerContext;

pub struct BatchWorker {
    default_failure_threshold: f64,
    item_timeout: Duration,
    retry_base_delay: Duration,
}

impl BatchWorker {
    pub fn new(
        default_failure_threshold: f64,
        item_timeout: Duration,
        retry_base_delay: Duration,
    ) -> Self {
        Self {
            default_failure_threshold,
            item_timeout,
            retry_base_delay,
        }
    }

    /// Run one batch job to a terminal status.
    pub async fn execute(
        &self,
        ctx: &WorkerContext,
        job_id: JobId,
        items: &[String],
        op: Arc<dyn ItemOperation>,
        options: &BatchOptions,
    ) -> JobStatus {
        if !ctx.store.mark_started(job_id).await {
            return JobStatus::Cancelled;
        }
        ctx.publish(job_id, JobStatus::Running, 0.0, None).await;

        let total = items.len();
        let threshold = options
            .failure_threshold
            .unwrap_or(self.default_failure_threshold);

        let mut succeeded = 0usize;
        let mut failed = 0usize;
        let mut skipped = 0usize;
        let mut done = 0usize;
        let mut cancelled = false;
        let mut aborted = false;

        'batches: for batch in items.chunks(options.batch_size) {
            if ctx.cancel.is_cancelled() {
                cancelled = true;
                break;
            }

            let outcomes: Vec<(String, ItemOutcome)> = stream::iter(batch.iter().cloned())
                .map(|item| {
                    let op = Arc::clone(&op);
                    let cancel = ctx.cancel.clone();
                    let retry_attempts = options.retry_attempts;
                    let item_timeout = self.item_timeout;
                    let base_delay = self.retry_base_delay;
                    async move {
                        let outcome = run_item(
                            op.as_ref(),
                            &item,
                            retry_attempts,
                            item_timeout,
                            base_delay,
                            &cancel,
                        )
                        .await;
                        (item, outcome)
                    }
                })
                .buffer_unordered(options.max_concurrency)
                .collect()
                .await;

            let mut last_item = None;
            for (item, outcome) in outcomes {
                done += 1;
                match outcome {
                    ItemOutcome::Succeeded => succeeded += 1,
                    ItemOutcome::Skipped => skipped += 1,
                    ItemOutcome::Failed(message) => {
                        failed += 1;
                        ctx.store.record_error(job_id, item.clone(), message).await;
                        if !options.continue_on_error {
                            aborted = true;
                        }
                    }
                }
                last_item = Some(item);
            }

            if aborted {
                break 'batches;
            }

            let percent = completion_percent(done, total);
            if let Some(actual) = ctx
                .store
                .update_progress(job_id, percent, last_item.clone())
                .await
            {
                ctx.publish(job_id, JobStatus::Running, actual, last_item)
                    .await;
            }
        }

        // A cancel that lands mid-batch never reaches the top-of-loop
        // check (the final batch in particular), but it still skips the
        // remaining items. Settle the status from the token, not just the
        // loop-entry flag.
        cancelled = cancelled || ctx.cancel.is_cancelled();

        skipped += total - done;
        let summary = ResultSummary {
            succeeded,
            failed,
            skipped,
        };
        let status = if cancelled {
            JobStatus::Cancelled
        } else if aborted {
            JobStatus::Failed
        } else {
            batch_outcome(succeeded, failed, threshold)
        };
        ctx.finish(job_id, status, Some(summary)).await;
        status
    }
}

/// Apply the operation to one item with retries.
///
/// A timeout counts as a per-item failure. Retries back off
/// exponentially from `base_delay`. A cancellation observed before an
/// attempt skips the item rather than failing it.
async fn run_item(
    op: &dyn ItemOperation,
    item: &str,
    retry_attempts: u32,
    item_timeout: Duration,
    base_delay: Duration,
    cancel: &CancellationToken,
) -> ItemOutcome {
    let mut attempt = 0u32;
    loop {
        if cancel.is_cancelled() {
            return ItemOutcome::Skipped;
        }

        let failure = match tokio::time::timeout(item_timeout, op.apply(item)).await {
            Ok(ItemOutcome::Failed(message)) => message,
            Ok(outcome) => return outcome,
            Err(_) => format!("Timed out after {}s", item_timeout.as_secs()),
        };

        if attempt >= retry_attempts {
            return ItemOutcome::Failed(failure);
        }
        tokio::time::sleep(base_delay * 2u32.pow(attempt)).await;
        attempt += 1;
    }
}
