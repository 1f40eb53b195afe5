//! In-memory job record store: the single source of truth for job state.
//!
//! All status and progress mutations go through this store, which
//! serializes concurrent updates per job behind one `RwLock` with short
//! critical sections; reads return cloned snapshots. Workers never hold a
//! private copy of canonical status.

use std::collections::HashMap;

use tokio::sync::RwLock;

use medialoom_core::job::{Job, JobItemError, JobStatus, ResultSummary};
use medialoom_core::types::JobId;

/// Per-item errors kept on a job record; older entries are dropped first
/// once the bound is reached (a count of everything recorded lives in
/// `result_summary`).
const MAX_RECORDED_ERRORS: usize = 100;

/// Query parameters for [`JobStore::list`].
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    pub status: Option<JobStatus>,
    pub owner: Option<String>,
    pub limit: Option<usize>,
    pub offset: usize,
}

/// Thread-safe in-memory table of job records.
///
/// Designed to be wrapped in `Arc` and shared between the dispatcher,
/// workers, and the API layer.
pub struct JobStore {
    jobs: RwLock<HashMap<JobId, Job>>,
}

impl JobStore {
    pub fn new() -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
        }
    }

    /// Insert a freshly created job record.
    pub async fn insert(&self, job: Job) {
        self.jobs.write().await.insert(job.id, job);
    }

    /// Remove a record entirely. Used only to roll back a submission whose
    /// pool queue turned out to be full.
    pub async fn remove(&self, id: JobId) -> Option<Job> {
        self.jobs.write().await.remove(&id)
    }

    /// Snapshot of a single job.
    pub async fn get(&self, id: JobId) -> Option<Job> {
        self.jobs.read().await.get(&id).cloned()
    }

    /// Number of records held.
    pub async fn count(&self) -> usize {
        self.jobs.read().await.len()
    }

    /// List jobs newest-first, optionally filtered by status and owner.
    pub async fn list(&self, filter: &JobFilter) -> Vec<Job> {
        let jobs = self.jobs.read().await;
        let mut matched: Vec<Job> = jobs
            .values()
            .filter(|job| filter.status.is_none_or(|s| job.status == s))
            .filter(|job| {
                filter
                    .owner
                    .as_deref()
                    .is_none_or(|o| job.owner.as_deref() == Some(o))
            })
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        matched
            .into_iter()
            .skip(filter.offset)
            .take(filter.limit.unwrap_or(usize::MAX))
            .collect()
    }

    /// Ids of all non-terminal and terminal jobs owned by `owner`.
    /// Used to expand the user-scope subscription alias.
    pub async fn ids_by_owner(&self, owner: &str) -> Vec<JobId> {
        self.jobs
            .read()
            .await
            .values()
            .filter(|job| job.owner.as_deref() == Some(owner))
            .map(|job| job.id)
            .collect()
    }

    /// Transition `Pending -> Running` and stamp `started_at`.
    ///
    /// Returns false if the job is missing or not pending (e.g. it was
    /// cancelled while queued), in which case the worker must not run it.
    pub async fn mark_started(&self, id: JobId) -> bool {
        let mut jobs = self.jobs.write().await;
        match jobs.get_mut(&id) {
            Some(job) if job.status == JobStatus::Pending => {
                job.status = JobStatus::Running;
                job.started_at = Some(chrono::Utc::now());
                true
            }
            _ => false,
        }
    }

    /// Update progress and the in-flight item description.
    ///
    /// Only applies while the job is running, and never moves progress
    /// backwards: a regressing value is clamped to the current one.
    /// Returns the effective progress after clamping, or `None` if the
    /// job is not running.
    pub async fn update_progress(
        &self,
        id: JobId,
        progress: f32,
        current_item: Option<String>,
    ) -> Option<f32> {
        let mut jobs = self.jobs.write().await;
        let job = jobs.get_mut(&id)?;
        if job.status != JobStatus::Running {
            return None;
        }
        job.progress = job.progress.max(progress.clamp(0.0, 100.0));
        if current_item.is_some() {
            job.current_item = current_item;
        }
        Some(job.progress)
    }

    /// Append a per-item error, keeping at most [`MAX_RECORDED_ERRORS`].
    pub async fn record_error(&self, id: JobId, item: impl Into<String>, message: impl Into<String>) {
        let mut jobs = self.jobs.write().await;
        if let Some(job) = jobs.get_mut(&id) {
            if job.errors.len() == MAX_RECORDED_ERRORS {
                job.errors.remove(0);
            }
            job.errors.push(JobItemError {
                item: item.into(),
                message: message.into(),
                timestamp: chrono::Utc::now(),
            });
        }
    }

    /// Transition to a terminal status exactly once.
    ///
    /// Stamps `ended_at`, stores the result summary, and forces progress
    /// to 100 on completion. Returns false if the job is missing or
    /// already terminal — callers use this to guarantee a single terminal
    /// event per job.
    pub async fn finish(
        &self,
        id: JobId,
        status: JobStatus,
        summary: Option<ResultSummary>,
    ) -> bool {
        debug_assert!(status.is_terminal());
        let mut jobs = self.jobs.write().await;
        match jobs.get_mut(&id) {
            Some(job) if !job.status.is_terminal() => {
                job.status = status;
                job.ended_at = Some(chrono::Utc::now());
                job.result_summary = summary;
                if status == JobStatus::Completed {
                    job.progress = 100.0;
                }
                true
            }
            _ => false,
        }
    }

    /// Cancel a job only if it is still pending (not yet claimed by a
    /// worker). Running jobs are cancelled by their owning worker via the
    /// cancellation token.
    pub async fn cancel_pending(&self, id: JobId) -> bool {
        let mut jobs = self.jobs.write().await;
        match jobs.get_mut(&id) {
            Some(job) if job.status == JobStatus::Pending => {
                job.status = JobStatus::Cancelled;
                job.ended_at = Some(chrono::Utc::now());
                true
            }
            _ => false,
        }
    }
}

impl Default for JobStore {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
