//! Persistence ports and backends
//!
//! The crawler only sees two ports: [`CoverageStore`] for the covered-cell
//! map and [`DatasetStore`] for the accumulated item list. Backends:
//! - [`JsonFileStore`] - one JSON document per record in a state directory
//! - [`Database`](crate::db::Database) - SQLite via sqlx
//! - [`MemoryStore`] - process-local, for tests and embedding

use crate::config::{PersistenceConfig, StorageBackend};
use crate::coverage::CoverageStore;
use crate::db::Database;
use crate::error::Result;
use crate::item::FetchedItem;
use async_trait::async_trait;
use std::sync::Arc;

mod json;
mod memory;

pub use json::JsonFileStore;
pub use memory::MemoryStore;

/// Durable, append-only list of every item kept by earlier runs
#[async_trait]
pub trait DatasetStore: Send + Sync {
    /// Read the whole accumulated list
    async fn load_all(&self) -> Result<Vec<FetchedItem>>;

    /// Append `items` to the list, returning the new total length
    async fn append(&self, items: Vec<FetchedItem>) -> Result<usize>;
}

/// Coverage and dataset stores backed by the same storage
pub struct Stores {
    /// Covered-cell map
    pub coverage: Arc<dyn CoverageStore>,
    /// Accumulated items
    pub dataset: Arc<dyn DatasetStore>,
}

/// Open the backend selected in `config`
pub async fn open(config: &PersistenceConfig) -> Result<Stores> {
    match config.backend {
        StorageBackend::Json => {
            let store = Arc::new(JsonFileStore::new(&config.state_dir));
            tracing::debug!(dir = %config.state_dir.display(), "Using JSON file storage");
            Ok(Stores {
                coverage: store.clone(),
                dataset: store,
            })
        }
        StorageBackend::Sqlite => {
            let db = Arc::new(Database::new(&config.database_path).await?);
            tracing::debug!(path = %config.database_path.display(), "Using SQLite storage");
            Ok(Stores {
                coverage: db.clone(),
                dataset: db,
            })
        }
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::coverage::CoverageState;
    use crate::grid::CellKey;

    async fn exercise(stores: Stores) {
        assert!(stores.coverage.load().await.is_empty());

        let mut state = CoverageState::new();
        state.mark_covered(CellKey::from_stored("1,2"));
        stores.coverage.save(&state).await.unwrap();
        assert_eq!(stores.coverage.load().await, state);

        // Saving a state that lacks a stored key keeps that key covered
        let mut other = CoverageState::new();
        other.mark_covered(CellKey::from_stored("3,4"));
        stores.coverage.save(&other).await.unwrap();
        let loaded = stores.coverage.load().await;
        assert_eq!(loaded.len(), 2);
        assert!(loaded.is_covered(&CellKey::from_stored("1,2")));

        let item = FetchedItem::sanitize(serde_json::json!({"id": 1})).unwrap();
        assert_eq!(stores.dataset.append(vec![item]).await.unwrap(), 1);
        assert_eq!(stores.dataset.load_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_memory_backend() {
        let store = Arc::new(MemoryStore::new());
        exercise(Stores {
            coverage: store.clone(),
            dataset: store,
        })
        .await;
    }

    #[tokio::test]
    async fn test_open_json_backend() {
        let dir = tempfile::tempdir().unwrap();
        let config = PersistenceConfig {
            backend: StorageBackend::Json,
            state_dir: dir.path().join("state"),
            ..Default::default()
        };
        exercise(open(&config).await.unwrap()).await;
    }

    #[tokio::test]
    async fn test_open_sqlite_backend() {
        let dir = tempfile::tempdir().unwrap();
        let config = PersistenceConfig {
            backend: StorageBackend::Sqlite,
            database_path: dir.path().join("crawl.db"),
            ..Default::default()
        };
        exercise(open(&config).await.unwrap()).await;
    }
}
