//! Job dispatcher: submission intake, per-pool backpressure, and
//! cancellation routing.
//!
//! Each worker pool has a bounded FIFO intake queue and a concurrency
//! ceiling. Submissions are validated synchronously — a malformed or
//! over-capacity submission never leaves a job record behind. Pool loops
//! are long-lived tasks shut down through a root cancellation token.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{mpsc, RwLock, Semaphore};
use tokio_util::sync::CancellationToken;

use medialoom_core::error::CoreError;
use medialoom_core::job::{Job, JobStatus};
use medialoom_core::payload::{BatchOptions, JobSpec, StreamSpec, SubmitJob};
use medialoom_core::types::JobId;
use medialoom_events::{ProgressBus, ProgressEvent};

use crate::config::EngineConfig;
use crate::ops::{BlockingItemOp, ItemOperation};
use crate::process::ProcessLauncher;
use crate::store::JobStore;
use crate::workers::batch::BatchWorker;
use crate::workers::stream::StreamWorker;
use crate::workers::thread_pool::ThreadPoolWorker;
use crate::workers::WorkerContext;

type TokenMap = Arc<RwLock<HashMap<JobId, CancellationToken>>>;

/// The pluggable collaborators a dispatcher executes jobs with.
pub struct WorkerSet {
    /// External-process invocation for stream jobs.
    pub launcher: Arc<dyn ProcessLauncher>,
    /// CPU-bound unit operation for thumbnail jobs.
    pub thumbnail_op: BlockingItemOp,
    /// I/O-bound per-item operation for enrichment jobs.
    pub enrich_op: Arc<dyn ItemOperation>,
}

/// A job queued for its pool, carrying everything the worker needs.
enum QueuedJob {
    Stream {
        id: JobId,
        spec: StreamSpec,
    },
    Thumbnail {
        id: JobId,
        items: Vec<String>,
    },
    Batch {
        id: JobId,
        items: Vec<String>,
        options: BatchOptions,
    },
}

impl QueuedJob {
    fn id(&self) -> JobId {
        match self {
            Self::Stream { id, .. } | Self::Thumbnail { id, .. } | Self::Batch { id, .. } => *id,
        }
    }
}

/// Snapshot of one pool's load, for introspection endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct PoolStats {
    /// Jobs waiting in the intake queue.
    pub queued: usize,
    /// Jobs currently executing.
    pub running: usize,
    /// Configured queue depth limit.
    pub depth: usize,
    /// Configured concurrency ceiling.
    pub concurrency: usize,
}

/// Per-pool load snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct QueueSnapshot {
    pub stream: PoolStats,
    pub thumbnail: PoolStats,
    pub batch: PoolStats,
}

/// The worker variants shared by all pool loops.
struct Executors {
    stream: StreamWorker,
    thumbnail: ThreadPoolWorker,
    batch: BatchWorker,
    thumbnail_op: BlockingItemOp,
    enrich_op: Arc<dyn ItemOperation>,
}

impl Executors {
    async fn run(&self, ctx: &WorkerContext, job: QueuedJob) -> JobStatus {
        match job {
            QueuedJob::Stream { id, spec } => self.stream.execute(ctx, id, &spec).await,
            QueuedJob::Thumbnail { id, items } => {
                self.thumbnail
                    .execute(ctx, id, &items, Arc::clone(&self.thumbnail_op))
                    .await
            }
            QueuedJob::Batch { id, items, options } => {
                self.batch
                    .execute(ctx, id, &items, Arc::clone(&self.enrich_op), &options)
                    .await
            }
        }
    }
}

/// Accepts submissions, routes them to worker pools, and routes
/// cancellation intent to the owning worker.
pub struct JobDispatcher {
    store: Arc<JobStore>,
    bus: Arc<ProgressBus>,
    config: EngineConfig,
    tokens: TokenMap,
    stream_tx: mpsc::Sender<QueuedJob>,
    thumbnail_tx: mpsc::Sender<QueuedJob>,
    batch_tx: mpsc::Sender<QueuedJob>,
    stream_running: Arc<AtomicUsize>,
    thumbnail_running: Arc<AtomicUsize>,
    batch_running: Arc<AtomicUsize>,
    shutdown: CancellationToken,
}

impl JobDispatcher {
    /// Spawn the three pool loops and return the dispatcher handle.
    pub fn start(
        config: EngineConfig,
        store: Arc<JobStore>,
        bus: Arc<ProgressBus>,
        workers: WorkerSet,
    ) -> Arc<Self> {
        let tokens: TokenMap = Arc::new(RwLock::new(HashMap::new()));
        let shutdown = CancellationToken::new();

        let executors = Arc::new(Executors {
            stream: StreamWorker::new(
                workers.launcher,
                config.grace_period,
                config.publish_interval,
                config.heartbeat_interval,
            ),
            thumbnail: ThreadPoolWorker::new(
                config.thumbnail_min_threads,
                config.thumbnail_max_threads,
                config.failure_threshold,
            ),
            batch: BatchWorker::new(
                config.failure_threshold,
                config.item_timeout,
                config.retry_base_delay,
            ),
            thumbnail_op: workers.thumbnail_op,
            enrich_op: workers.enrich_op,
        });

        let (stream_tx, stream_rx) = mpsc::channel(config.stream_queue_depth);
        let (thumbnail_tx, thumbnail_rx) = mpsc::channel(config.thumbnail_queue_depth);
        let (batch_tx, batch_rx) = mpsc::channel(config.batch_queue_depth);

        let stream_running = Arc::new(AtomicUsize::new(0));
        let thumbnail_running = Arc::new(AtomicUsize::new(0));
        let batch_running = Arc::new(AtomicUsize::new(0));

        for (name, rx, concurrency, running) in [
            ("stream", stream_rx, config.stream_concurrency, &stream_running),
            (
                "thumbnail",
                thumbnail_rx,
                config.thumbnail_concurrency,
                &thumbnail_running,
            ),
            ("batch", batch_rx, config.batch_concurrency, &batch_running),
        ] {
            tokio::spawn(run_pool(
                name,
                rx,
                Arc::new(Semaphore::new(concurrency.max(1))),
                Arc::clone(running),
                Arc::clone(&executors),
                Arc::clone(&store),
                Arc::clone(&bus),
                Arc::clone(&tokens),
                shutdown.clone(),
            ));
        }

        tracing::info!(
            stream_depth = config.stream_queue_depth,
            thumbnail_depth = config.thumbnail_queue_depth,
            batch_depth = config.batch_queue_depth,
            "Job dispatcher started",
        );

        Arc::new(Self {
            store,
            bus,
            config,
            tokens,
            stream_tx,
            thumbnail_tx,
            batch_tx,
            stream_running,
            thumbnail_running,
            batch_running,
            shutdown,
        })
    }

    /// Submit a new job.
    ///
    /// Validates the payload synchronously and applies backpressure: if
    /// the target pool's queue is at its depth limit the submission is
    /// rejected with `CapacityExceeded` and no record is created.
    pub async fn submit(&self, submission: SubmitJob) -> Result<Job, CoreError> {
        submission.spec.validate()?;

        let job = Job::new(submission.spec.job_type(), submission.owner);
        let job_id = job.id;

        // Insert before enqueueing so the pool loop always finds the
        // record; rolled back below if the queue is full.
        self.store.insert(job.clone()).await;
        self.tokens
            .write()
            .await
            .insert(job_id, CancellationToken::new());

        let (tx, pool, depth) = match &submission.spec {
            JobSpec::StreamTranscode(_) => {
                (&self.stream_tx, "stream", self.config.stream_queue_depth)
            }
            JobSpec::ThumbnailBatch(_) => (
                &self.thumbnail_tx,
                "thumbnail",
                self.config.thumbnail_queue_depth,
            ),
            JobSpec::MetadataEnrich(_) => {
                (&self.batch_tx, "batch", self.config.batch_queue_depth)
            }
        };
        let queued = match submission.spec {
            JobSpec::StreamTranscode(spec) => QueuedJob::Stream { id: job_id, spec },
            JobSpec::ThumbnailBatch(spec) => QueuedJob::Thumbnail {
                id: job_id,
                items: spec.items,
            },
            JobSpec::MetadataEnrich(spec) => QueuedJob::Batch {
                id: job_id,
                items: spec.items,
                options: spec.options,
            },
        };

        if let Err(e) = tx.try_send(queued) {
            self.store.remove(job_id).await;
            self.tokens.write().await.remove(&job_id);
            return match e {
                mpsc::error::TrySendError::Full(_) => {
                    tracing::warn!(pool, depth, "Submission rejected: pool queue full");
                    Err(CoreError::CapacityExceeded { pool, depth })
                }
                mpsc::error::TrySendError::Closed(_) => Err(CoreError::Internal(
                    "Job engine is shutting down".to_string(),
                )),
            };
        }

        tracing::info!(
            job_id = %job_id,
            job_type = %job.job_type,
            pool,
            "Job submitted",
        );
        Ok(job)
    }

    /// Record cancellation intent for a job.
    ///
    /// Best-effort and asynchronous: returns once intent is recorded, not
    /// once execution has stopped. Returns `Ok(false)` if the job is
    /// already terminal.
    pub async fn cancel(&self, job_id: JobId) -> Result<bool, CoreError> {
        let job = self
            .store
            .get(job_id)
            .await
            .ok_or(CoreError::NotFound {
                entity: "Job",
                id: job_id,
            })?;
        if job.status.is_terminal() {
            return Ok(false);
        }

        if let Some(token) = self.tokens.read().await.get(&job_id) {
            token.cancel();
        }

        // A job still waiting in its pool queue never reaches a worker;
        // settle it here so the intent is visible immediately.
        if self.store.cancel_pending(job_id).await {
            self.bus
                .publish(ProgressEvent::now(
                    job_id,
                    JobStatus::Cancelled,
                    job.progress,
                    None,
                ))
                .await;
        }

        tracing::info!(job_id = %job_id, "Job cancellation requested");
        Ok(true)
    }

    /// Current record for a job.
    pub async fn status(&self, job_id: JobId) -> Result<Job, CoreError> {
        self.store.get(job_id).await.ok_or(CoreError::NotFound {
            entity: "Job",
            id: job_id,
        })
    }

    /// Per-pool load snapshot.
    pub fn queue_stats(&self) -> QueueSnapshot {
        let stats = |tx: &mpsc::Sender<QueuedJob>,
                     depth: usize,
                     running: &AtomicUsize,
                     concurrency: usize| PoolStats {
            queued: depth.saturating_sub(tx.capacity()),
            running: running.load(Ordering::SeqCst),
            depth,
            concurrency,
        };
        QueueSnapshot {
            stream: stats(
                &self.stream_tx,
                self.config.stream_queue_depth,
                &self.stream_running,
                self.config.stream_concurrency,
            ),
            thumbnail: stats(
                &self.thumbnail_tx,
                self.config.thumbnail_queue_depth,
                &self.thumbnail_running,
                self.config.thumbnail_concurrency,
            ),
            batch: stats(
                &self.batch_tx,
                self.config.batch_queue_depth,
                &self.batch_running,
                self.config.batch_concurrency,
            ),
        }
    }

    /// Stop the pool loops. In-flight jobs drain via their own tasks.
    pub fn shutdown(&self) {
        tracing::info!("Job dispatcher shutting down");
        self.shutdown.cancel();
    }
}

/// One pool loop: pull queued jobs FIFO, respect the concurrency
/// ceiling, and run each job on its own task.
#[allow(clippy::too_many_arguments)]
async fn run_pool(
    name: &'static str,
    mut rx: mpsc::Receiver<QueuedJob>,
    semaphore: Arc<Semaphore>,
    running: Arc<AtomicUsize>,
    executors: Arc<Executors>,
    store: Arc<JobStore>,
    bus: Arc<ProgressBus>,
    tokens: TokenMap,
    shutdown: CancellationToken,
) {
    loop {
        // Take a concurrency permit before pulling from the queue, so a
        // waiting job occupies a queue slot (and counts against the depth
        // limit) until the pool can actually run it.
        let permit = tokio::select! {
            _ = shutdown.cancelled() => break,
            permit = semaphore.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };
        let job = tokio::select! {
            _ = shutdown.cancelled() => break,
            next = rx.recv() => match next {
                Some(job) => job,
                None => break,
            },
        };

        let job_id = job.id();
        let cancel = tokens
            .read()
            .await
            .get(&job_id)
            .cloned()
            .unwrap_or_default();
        let ctx = WorkerContext {
            store: Arc::clone(&store),
            bus: Arc::clone(&bus),
            cancel,
        };
        let executors = Arc::clone(&executors);
        let running = Arc::clone(&running);
        let tokens = Arc::clone(&tokens);
        let bus = Arc::clone(&bus);

        tokio::spawn(async move {
            let _permit = permit;
            running.fetch_add(1, Ordering::SeqCst);
            let status = executors.run(&ctx, job).await;
            running.fetch_sub(1, Ordering::SeqCst);
            tracing::info!(job_id = %job_id, status = %status, "Job finished");

            tokens.write().await.remove(&job_id);
            // Drop the job's bus channel: subscribers drain the buffered
            // terminal event, then observe closure.
            bus.release(job_id).await;
        });
    }
    tracing::info!(pool = name, "Pool loop stopped");
}
