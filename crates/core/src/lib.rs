//! Pure domain types and policy for the medialoom job engine.
//!
//! This crate has no internal dependencies and no I/O: the job model and
//! its state machine, submission payload validation, progress arithmetic,
//! and the worker-pool sizing / partial-failure policy all live here so
//! the engine and API crates share one source of truth.

pub mod error;
pub mod job;
pub mod payload;
pub mod pool;
pub mod progress;
pub mod types;
