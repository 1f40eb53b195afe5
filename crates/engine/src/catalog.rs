//! Media catalog collaborator contract.
//!
//! The catalog itself (artists, videos, playlists and their query layer)
//! is external to the engine; item operations consume only this
//! resolve-by-reference seam.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

/// A resolved catalog item.
#[derive(Debug, Clone)]
pub struct CatalogItem {
    /// The reference it was resolved by (e.g. `video:42`).
    pub reference: String,
    pub title: String,
    /// Filesystem path of the backing media, when the item has one.
    pub path: Option<String>,
}

/// Resolve item references to catalog items.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// `None` when the reference is unknown; item operations record that
    /// as a per-item failure rather than aborting the job.
    async fn resolve(&self, reference: &str) -> Option<CatalogItem>;
}

/// Simple in-memory catalog used by the binary wiring and tests.
pub struct InMemoryCatalog {
    items: RwLock<HashMap<String, CatalogItem>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self {
            items: RwLock::new(HashMap::new()),
        }
    }

    pub fn insert(&self, item: CatalogItem) {
        if let Ok(mut items) = self.items.write() {
            items.insert(item.reference.clone(), item);
        }
    }
}

impl Default for InMemoryCatalog {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Catalog for InMemoryCatalog {
    async fn resolve(&self, reference: &str) -> Option<CatalogItem> {
        self.items
            .read()
            .ok()
            .and_then(|items| items.get(reference).cloned())
    }
}
