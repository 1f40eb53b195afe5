//! The job record: the unit of trackable background work.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{JobId, Timestamp};

/// Lifecycle status of a job.
///
/// `Pending -> Running -> {Completed, Failed, Cancelled}`, with a direct
/// `Pending -> Cancelled` edge for jobs cancelled before a worker picks
/// them up. Terminal states are final; the store refuses further
/// transitions once one is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    /// Whether this status is terminal (no further transitions allowed).
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Which worker variant owns a job. Fixed at submission time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobType {
    /// One long-lived external process (e.g. an ffmpeg transcode) whose
    /// diagnostic output is translated into progress.
    StreamTranscode,
    /// Many short, independent, CPU-bound units within one job (e.g. one
    /// thumbnail per source image), run on a bounded thread pool.
    ThumbnailBatch,
    /// A large ordered collection processed in fixed-size batches with
    /// bounded per-item concurrency (I/O-bound metadata enrichment).
    MetadataEnrich,
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::StreamTranscode => "stream-transcode",
            Self::ThumbnailBatch => "thumbnail-batch",
            Self::MetadataEnrich => "metadata-enrich",
        };
        f.write_str(s)
    }
}

/// One recorded per-item failure within a job.
///
/// Item errors accumulate without terminating the job unless the failure
/// threshold is crossed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobItemError {
    /// Reference to the item that failed (file path, catalog id, batch index).
    pub item: String,
    pub message: String,
    pub timestamp: Timestamp,
}

/// Per-item outcome counts, populated when a job reaches a terminal state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultSummary {
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// A submitted, trackable unit of background work.
///
/// The job store is the single source of truth for these fields; workers
/// request mutations through it and never hold a private copy of status.
#[derive(Debug, Clone, Serialize)]
pub struct Job {
    pub id: JobId,
    pub job_type: JobType,
    pub status: JobStatus,
    /// Percentage in `[0, 100]`, monotonically non-decreasing while running.
    pub progress: f32,
    /// Human-readable description of the work currently in flight.
    pub current_item: Option<String>,
    pub created_at: Timestamp,
    pub started_at: Option<Timestamp>,
    pub ended_at: Option<Timestamp>,
    /// Accumulated per-item errors (bounded; see the store).
    pub errors: Vec<JobItemError>,
    pub result_summary: Option<ResultSummary>,
    /// Submitting user, if known. Used by the user-scope subscription alias.
    pub owner: Option<String>,
}

impl Job {
    /// Create a new pending job with a fresh random id.
    pub fn new(job_type: JobType, owner: Option<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            job_type,
            status: JobStatus::Pending,
            progress: 0.0,
            current_item: None,
            created_at: chrono::Utc::now(),
            started_at: None,
            ended_at: None,
            errors: Vec::new(),
            result_summary: None,
            owner,
        }
    }
}
