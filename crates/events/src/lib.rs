//! Progress event fan-out for the medialoom job engine.

pub mod bus;

pub use bus::{ProgressBus, ProgressEvent};
