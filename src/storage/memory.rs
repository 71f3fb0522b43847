//! In-process backend holding coverage and items in memory.

use crate::coverage::{CoverageState, CoverageStore};
use crate::error::Result;
use crate::item::FetchedItem;
use async_trait::async_trait;
use tokio::sync::RwLock;

use super::DatasetStore;

/// Keeps coverage and the accumulated dataset in memory
///
/// Nothing survives the process; useful for tests and for hosts that persist
/// state themselves.
#[derive(Debug, Default)]
pub struct MemoryStore {
    coverage: RwLock<CoverageState>,
    items: RwLock<Vec<FetchedItem>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-seeded with coverage from an earlier run
    pub fn with_coverage(state: CoverageState) -> Self {
        Self {
            coverage: RwLock::new(state),
            items: RwLock::new(Vec::new()),
        }
    }
}

#[async_trait]
impl CoverageStore for MemoryStore {
    async fn load(&self) -> CoverageState {
        self.coverage.read().await.clone()
    }

    async fn save(&self, state: &CoverageState) -> Result<()> {
        self.coverage.write().await.extend_from(state);
        Ok(())
    }
}

#[async_trait]
impl DatasetStore for MemoryStore {
    async fn load_all(&self) -> Result<Vec<FetchedItem>> {
        Ok(self.items.read().await.clone())
    }

    async fn append(&self, items: Vec<FetchedItem>) -> Result<usize> {
        let mut accumulated = self.items.write().await;
        accumulated.extend(items);
        Ok(accumulated.len())
    }
}
