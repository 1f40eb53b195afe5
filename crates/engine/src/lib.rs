//! The medialoom job engine: in-memory job record store, dispatcher with
//! per-pool backpressure, and the three worker variants (stream /
//! thread-pool / batch) behind one progress contract.

pub mod catalog;
pub mod config;
pub mod dispatcher;
pub mod ops;
pub mod process;
pub mod store;
pub mod workers;
