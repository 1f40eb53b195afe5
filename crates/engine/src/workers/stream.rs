//! Stream worker: one long-lived external process per job.
//!
//! Launches the process described by the payload, translates its
//! diagnostic output into progress updates, and guarantees the process is
//! gone on both normal completion and cancellation. Cancellation first
//! requests graceful termination, then force-kills after the grace
//! period.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use medialoom_core::job::{JobStatus, ResultSummary};
use medialoom_core::payload::StreamSpec;
use medialoom_core::progress::{parse_time_marker, ratio_percent, ProgressThrottle};
use medialoom_core::types::JobId;

use crate::process::{ProcessHandle, ProcessLauncher, ProcessSpec};
use crate::workers::WorkerContext;

/// Diagnostic lines retained for the failure report.
const DIAGNOSTIC_TAIL_LINES: usize = 20;

/// How the read loop ended.
enum StreamEnd {
    Cancelled,
    Exited(i32),
}

pub struct StreamWorker {
    launcher: Arc<dyn ProcessLauncher>,
    grace_period: Duration,
    publish_interval: Duration,
    heartbeat_interval: Duration,
}

impl StreamWorker {
    pub fn new(
        launcher: Arc<dyn ProcessLauncher>,
        grace_period: Duration,
        publish_interval: Duration,
        heartbeat_interval: Duration,
    ) -> Self {
        Self {
            launcher,
            grace_period,
            publish_interval,
            heartbeat_interval,
        }
    }

    /// Run one stream job to a terminal status.
    pub async fn execute(&self, ctx: &WorkerContext, job_id: JobId, spec: &StreamSpec) -> JobStatus {
        if !ctx.store.mark_started(job_id).await {
            // Cancelled while queued; never launch the process.
            return JobStatus::Cancelled;
        }

        let process_spec = ProcessSpec {
            program: spec.program.clone(),
            args: spec.args.clone(),
        };

        let mut handle = match self.launcher.launch(&process_spec).await {
            Ok(handle) => handle,
            Err(e) => {
                // Launch failures (missing executable, permissions) are
                // fatal before any progress has been published.
                tracing::error!(job_id = %job_id, program = %spec.program, error = %e, "Failed to launch external process");
                ctx.store
                    .record_error(job_id, spec.program.clone(), format!("Launch failed: {e}"))
                    .await;
                ctx.finish(job_id, JobStatus::Failed, Some(failed_summary())).await;
                return JobStatus::Failed;
            }
        };
        ctx.publish(job_id, JobStatus::Running, 0.0, None).await;

        let total_secs = spec.total_duration_secs.unwrap_or(0.0);
        let mut throttle = ProgressThrottle::new(self.publish_interval);
        let mut tail: VecDeque<String> = VecDeque::with_capacity(DIAGNOSTIC_TAIL_LINES);
        let mut heartbeat = tokio::time::interval(self.heartbeat_interval);
        heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        heartbeat.reset();

        let end = loop {
            tokio::select! {
                _ = ctx.cancel.cancelled() => break StreamEnd::Cancelled,

                line = handle.read_line() => match line {
                    Ok(Some(line)) => {
                        if tail.len() == DIAGNOSTIC_TAIL_LINES {
                            tail.pop_front();
                        }
                        tail.push_back(line.clone());

                        if let Some(processed_secs) = parse_time_marker(&line) {
                            let percent = ratio_percent(processed_secs, total_secs);
                            if let Some(actual) =
                                ctx.store.update_progress(job_id, percent, None).await
                            {
                                if throttle.allow() {
                                    ctx.publish(job_id, JobStatus::Running, actual, None).await;
                                }
                            }
                            heartbeat.reset();
                        }
                    }
                    // End of stream (or a broken pipe): the process is
                    // exiting; collect its status.
                    Ok(None) | Err(_) => {
                        break StreamEnd::Exited(handle.wait().await.unwrap_or(-1));
                    }
                },

                // No parseable output lately: refresh the timestamp so
                // subscribers can tell a stalled process from a dead
                // connection.
                _ = heartbeat.tick() => {
                    let progress = ctx
                        .store
                        .get(job_id)
                        .await
                        .map(|job| job.progress)
                        .unwrap_or(0.0);
                    ctx.publish(job_id, JobStatus::Running, progress, None).await;
                }
            }
        };

        match end {
            StreamEnd::Cancelled => self.cancel_process(ctx, job_id, handle).await,
            StreamEnd::Exited(0) => {
                ctx.store.update_progress(job_id, 100.0, None).await;
                ctx.finish(
                    job_id,
                    JobStatus::Completed,
                    Some(ResultSummary {
                        succeeded: 1,
                        failed: 0,
                        skipped: 0,
                    }),
                )
                .await;
                JobStatus::Completed
            }
            StreamEnd::Exited(code) => {
                let tail: Vec<String> = tail.into_iter().collect();
                tracing::warn!(job_id = %job_id, exit_code = code, "External process failed");
                ctx.store
                    .record_error(
                        job_id,
                        spec.program.clone(),
                        format!("Exited with code {code}:\n{}", tail.join("\n")),
                    )
                    .await;
                ctx.finish(job_id, JobStatus::Failed, Some(failed_summary())).await;
                JobStatus::Failed
            }
        }
    }

    /// Terminate the process for a cancelled job: graceful first, then
    /// force-kill once the grace period elapses.
    async fn cancel_process(
        &self,
        ctx: &WorkerContext,
        job_id: JobId,
        mut handle: Box<dyn ProcessHandle>,
    ) -> JobStatus {
        handle.terminate();
        if tokio::time::timeout(self.grace_period, handle.wait())
            .await
            .is_err()
        {
            tracing::warn!(job_id = %job_id, "Process ignored terminate; killing");
            handle.kill().await;
            let _ = handle.wait().await;
        }
        ctx.finish(
            job_id,
            JobStatus::Cancelled,
            Some(ResultSummary {
                succeeded: 0,
                failed: 0,
                skipped: 1,
            }),
        )
        .await;
        JobStatus::Cancelled
    }
}

fn failed_summary() -> ResultSummary {
    ResultSummary {
        succeeded: 0,
        failed: 1,
        skipped: 0,
    }
}
