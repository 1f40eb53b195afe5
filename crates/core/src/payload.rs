//! Submission payloads and their validation.
//!
//! Validation happens synchronously at submit time, before any job record
//! is created — a malformed submission never produces a job id.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::job::JobType;

/// Maximum number of items in a thumbnail job.
const MAX_THUMBNAIL_ITEMS: usize = 10_000;

/// Maximum number of items in an enrichment job.
const MAX_ENRICH_ITEMS: usize = 100_000;

/// Maximum number of arguments passed to an external process.
const MAX_STREAM_ARGS: usize = 256;

/// Upper bounds on batch tuning knobs.
const MAX_BATCH_SIZE: usize = 1_000;
const MAX_BATCH_CONCURRENCY: usize = 64;
const MAX_RETRY_ATTEMPTS: u32 = 10;

/// A job submission as received from the API layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitJob {
    /// The type tag and type-specific payload.
    #[serde(flatten)]
    pub spec: JobSpec,
    /// Submitting user, if the caller tracks ownership.
    #[serde(default)]
    pub owner: Option<String>,
}

/// Type-specific job payload, tagged by the `type` field on the wire:
/// `{"type": "stream-transcode", "payload": {...}}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "kebab-case")]
pub enum JobSpec {
    StreamTranscode(StreamSpec),
    ThumbnailBatch(ThumbnailSpec),
    MetadataEnrich(EnrichSpec),
}

impl JobSpec {
    /// The worker variant this payload is routed to.
    pub fn job_type(&self) -> JobType {
        match self {
            Self::StreamTranscode(_) => JobType::StreamTranscode,
            Self::ThumbnailBatch(_) => JobType::ThumbnailBatch,
            Self::MetadataEnrich(_) => JobType::MetadataEnrich,
        }
    }

    /// Validate payload shape. Called by the dispatcher before creating
    /// the job record.
    pub fn validate(&self) -> Result<(), CoreError> {
        match self {
            Self::StreamTranscode(spec) => spec.validate(),
            Self::ThumbnailBatch(spec) => spec.validate(),
            Self::MetadataEnrich(spec) => spec.validate(),
        }
    }
}

// ---------------------------------------------------------------------------
// Stream transcode
// ---------------------------------------------------------------------------

/// Description of one long-lived external process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamSpec {
    /// Program to execute (e.g. `ffmpeg`).
    pub program: String,
    /// Program arguments, passed through verbatim.
    #[serde(default)]
    pub args: Vec<String>,
    /// Known total duration of the input in seconds. Used to turn parsed
    /// `time=` markers into a percentage; without it only heartbeats are
    /// published.
    #[serde(default)]
    pub total_duration_secs: Option<f64>,
}

impl StreamSpec {
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.program.trim().is_empty() {
            return Err(CoreError::Validation(
                "Stream program must not be empty".to_string(),
            ));
        }
        if self.args.len() > MAX_STREAM_ARGS {
            return Err(CoreError::Validation(format!(
                "Stream job may pass at most {MAX_STREAM_ARGS} arguments"
            )));
        }
        if let Some(total) = self.total_duration_secs {
            if !total.is_finite() || total <= 0.0 {
                return Err(CoreError::Validation(
                    "total_duration_secs must be a positive number".to_string(),
                ));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Thumbnail batch
// ---------------------------------------------------------------------------

/// Items for a CPU-bound thread-pool job (one unit per source image).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThumbnailSpec {
    /// Source item references (file paths or catalog ids).
    pub items: Vec<String>,
}

impl ThumbnailSpec {
    pub fn validate(&self) -> Result<(), CoreError> {
        validate_items(&self.items, MAX_THUMBNAIL_ITEMS)
    }
}

// ---------------------------------------------------------------------------
// Metadata enrichment
// ---------------------------------------------------------------------------

/// A large ordered collection plus batch tuning knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichSpec {
    /// Item references, processed in submission order.
    pub items: Vec<String>,
    #[serde(default)]
    pub options: BatchOptions,
}

impl EnrichSpec {
    pub fn validate(&self) -> Result<(), CoreError> {
        validate_items(&self.items, MAX_ENRICH_ITEMS)?;
        self.options.validate()
    }
}

/// Tuning knobs for batch execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchOptions {
    /// Items per batch; one progress event is published per batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Concurrent item operations within a batch.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// Retries per item (with backoff) before recording a terminal
    /// per-item error.
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    /// Keep processing after per-item failures. When false, the first
    /// exhausted item aborts the job as failed.
    #[serde(default = "default_continue_on_error")]
    pub continue_on_error: bool,
    /// Failed-item fraction above which the whole job fails. Falls back
    /// to the engine default when unset.
    #[serde(default)]
    pub failure_threshold: Option<f64>,
}

fn default_batch_size() -> usize {
    50
}
fn default_max_concurrency() -> usize {
    8
}
fn default_retry_attempts() -> u32 {
    2
}
fn default_continue_on_error() -> bool {
    true
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            max_concurrency: default_max_concurrency(),
            retry_attempts: default_retry_attempts(),
            continue_on_error: default_continue_on_error(),
            failure_threshold: None,
        }
    }
}

impl BatchOptions {
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.batch_size == 0 || self.batch_size > MAX_BATCH_SIZE {
            return Err(CoreError::Validation(format!(
                "batch_size must be between 1 and {MAX_BATCH_SIZE}"
            )));
        }
        if self.max_concurrency == 0 || self.max_concurrency > MAX_BATCH_CONCURRENCY {
            return Err(CoreError::Validation(format!(
                "max_concurrency must be between 1 and {MAX_BATCH_CONCURRENCY}"
            )));
        }
        if self.retry_attempts > MAX_RETRY_ATTEMPTS {
            return Err(CoreError::Validation(format!(
                "retry_attempts must not exceed {MAX_RETRY_ATTEMPTS}"
            )));
        }
        if let Some(threshold) = self.failure_threshold {
            if !threshold.is_finite() || threshold <= 0.0 || threshold > 1.0 {
                return Err(CoreError::Validation(
                    "failure_threshold must be in (0, 1]".to_string(),
                ));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Shared item validation
// ---------------------------------------------------------------------------

fn validate_items(items: &[String], max: usize) -> Result<(), CoreError> {
    if items.is_empty() {
        return Err(CoreError::Validation(
            "Job must contain at least one item".to_string(),
        ));
    }
    if items.len() > max {
        return Err(CoreError::Validation(format!(
            "Job may contain at most {max} items"
        )));
    }
    for (i, item) in items.iter().enumerate() {
        if item.trim().is_empty() {
            return Err(CoreError::Validation(format!(
                "Item at index {i} must not be empty"
            )));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    // -- wire format ----------------------------------------------------------

    #[test]
    fn submit_job_parses_stream_payload() {
        let raw = serde_json::json!({
            "type": "stream-transcode",
            "payload": {
                "program": "ffmpeg",
                "args": ["-i", "in.mkv", "out.mp4"],
                "total_duration_secs": 120.0
            },
            "owner": "alice"
        });
        let submit: SubmitJob = serde_json::from_value(raw).unwrap();
        assert_eq!(submit.spec.job_type(), JobType::StreamTranscode);
        assert_eq!(submit.owner.as_deref(), Some("alice"));
        assert!(submit.spec.validate().is_ok());
    }

    #[test]
    fn submit_job_parses_enrich_payload_with_defaults() {
        let raw = serde_json::json!({
            "type": "metadata-enrich",
            "payload": { "items": ["video:1", "video:2"] }
        });
        let submit: SubmitJob = serde_json::from_value(raw).unwrap();
        match &submit.spec {
            JobSpec::MetadataEnrich(spec) => {
                assert_eq!(spec.options.batch_size, 50);
                assert_eq!(spec.options.max_concurrency, 8);
                assert_eq!(spec.options.retry_attempts, 2);
                assert!(spec.options.continue_on_error);
                assert!(spec.options.failure_threshold.is_none());
            }
            other => panic!("Unexpected spec: {other:?}"),
        }
    }

    #[test]
    fn unknown_type_tag_is_rejected() {
        let raw = serde_json::json!({
            "type": "reticulate-splines",
            "payload": {}
        });
        assert!(serde_json::from_value::<SubmitJob>(raw).is_err());
    }

    // -- stream validation ----------------------------------------------------

    #[test]
    fn empty_program_rejected() {
        let spec = StreamSpec {
            program: "  ".into(),
            args: vec![],
            total_duration_secs: None,
        };
        assert!(spec.validate().is_err());
    }

    #[test]
    fn negative_duration_rejected() {
        let spec = StreamSpec {
            program: "ffmpeg".into(),
            args: vec![],
            total_duration_secs: Some(-1.0),
        };
        assert!(spec.validate().is_err());
    }

    // -- item list validation -------------------------------------------------

    #[test]
    fn empty_item_list_rejected() {
        let spec = ThumbnailSpec { items: vec![] };
        assert!(spec.validate().is_err());
    }

    #[test]
    fn blank_item_rejected() {
        let spec = ThumbnailSpec {
            items: vec!["a.png".into(), "".into()],
        };
        assert!(spec.validate().is_err());
    }

    // -- batch options --------------------------------------------------------

    #[test]
    fn zero_batch_size_rejected() {
        let options = BatchOptions {
            batch_size: 0,
            ..Default::default()
        };
        assert!(options.validate().is_err());
    }

    #[test]
    fn threshold_above_one_rejected() {
        let options = BatchOptions {
            failure_threshold: Some(1.5),
            ..Default::default()
        };
        assert!(options.validate().is_err());
    }

    #[test]
    fn default_options_are_valid() {
        assert!(BatchOptions::default().validate().is_ok());
    }
}
