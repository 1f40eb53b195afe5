//! Item-level operations: the opaque per-item work invoked by workers.
//!
//! The concrete codecs and metadata providers are external collaborators;
//! the engine sees only "apply one operation to one item and report the
//! outcome". Failures here are data, never `Err` — a failed item is
//! recorded on the job and processing continues.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use crate::catalog::Catalog;

/// Outcome of applying an operation to one item.
#[derive(Debug, Clone)]
pub enum ItemOutcome {
    Succeeded,
    Skipped,
    Failed(String),
}

/// A synchronous, CPU-bound unit operation run on the blocking pool
/// (thread-pool worker). Must be pure per item: no shared mutable state.
pub type BlockingItemOp = Arc<dyn Fn(&str) -> ItemOutcome + Send + Sync>;

/// An async, I/O-bound per-item operation (batch worker).
#[async_trait]
pub trait ItemOperation: Send + Sync {
    async fn apply(&self, item: &str) -> ItemOutcome;
}

/// Metadata enrichment backed by the catalog collaborator: an unknown
/// reference is a per-item failure, not a job failure.
pub struct CatalogEnrichOperation {
    catalog: Arc<dyn Catalog>,
}

impl CatalogEnrichOperation {
    pub fn new(catalog: Arc<dyn Catalog>) -> Self {
        Self { catalog }
    }
}

#[async_trait]
impl ItemOperation for CatalogEnrichOperation {
    async fn apply(&self, item: &str) -> ItemOutcome {
        match self.catalog.resolve(item).await {
            Some(_) => ItemOutcome::Succeeded,
            None => ItemOutcome::Failed(format!("Unknown catalog item: {item}")),
        }
    }
}

/// Thumbnail unit operation that verifies the source file before handing
/// off to the (external) image pipeline. Items whose source is missing
/// fail individually.
pub fn source_probe_op() -> BlockingItemOp {
    Arc::new(|item| {
        if Path::new(item).is_file() {
            ItemOutcome::Succeeded
        } else {
            ItemOutcome::Failed(format!("Source file not found: {item}"))
        }
    })
}
