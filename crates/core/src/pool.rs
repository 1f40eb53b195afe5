//! Worker-pool sizing constants and the partial-failure policy.
//!
//! Pure functions used by the engine's thread-pool and batch workers.

use crate::job::JobStatus;

/// Lower clamp for the thread pool, regardless of host CPU count.
pub const DEFAULT_MIN_THREADS: usize = 2;

/// Upper clamp for the thread pool on large hosts.
pub const DEFAULT_MAX_THREADS: usize = 32;

/// Failed-item fraction above which a whole job is considered failed.
/// Exposed as a per-submission knob; this is only the fallback.
pub const DEFAULT_FAILURE_THRESHOLD: f64 = 0.5;

/// Size a thread pool from host parallelism, clamped to `[min, max]`.
///
/// Degenerate bounds are repaired rather than rejected: `min` is raised
/// to 1 and `max` is raised to `min`.
pub fn clamp_pool_size(host_parallelism: usize, min: usize, max: usize) -> usize {
    let min = min.max(1);
    let max = max.max(min);
    host_parallelism.clamp(min, max)
}

/// Terminal status for a job whose items have all been attempted.
///
/// The job fails as a whole only if nothing succeeded (while something
/// failed) or the failed fraction of attempted items strictly exceeds
/// `threshold`. Anything below that is a partial-failure completion;
/// skipped items do not count against the threshold.
pub fn batch_outcome(succeeded: usize, failed: usize, threshold: f64) -> JobStatus {
    let attempted = succeeded + failed;
    if attempted == 0 {
        return JobStatus::Completed;
    }
    if succeeded == 0 {
        return JobStatus::Failed;
    }
    if failed as f64 / attempted as f64 > threshold {
        JobStatus::Failed
    } else {
        JobStatus::Completed
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
