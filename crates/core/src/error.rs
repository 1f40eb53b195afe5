use crate::types::JobId;

/// Domain-level error type shared across the engine and API crates.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// A submission payload failed validation. Raised before any job
    /// record is created.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A worker pool's intake queue is at its configured depth limit.
    /// Raised before any job record is created; callers apply their own
    /// retry/backoff.
    #[error("{pool} pool queue is full (depth {depth})")]
    CapacityExceeded { pool: &'static str, depth: usize },

    /// An entity lookup by id found nothing.
    #[error("{entity} with id {id} not found")]
    NotFound { entity: &'static str, id: JobId },

    /// The requested operation conflicts with the entity's current state
    /// (e.g. cancelling a job that already reached a terminal status).
    #[error("Conflict: {0}")]
    Conflict(String),

    /// An unexpected internal failure.
    #[error("Internal error: {0}")]
    Internal(String),
}
