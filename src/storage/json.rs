//! JSON file backend: one document per record inside a state directory.

use crate::coverage::{CoverageState, CoverageStore};
use crate::error::Result;
use crate::item::FetchedItem;
use crate::merge;
use async_trait::async_trait;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

use super::DatasetStore;

/// Coverage record file name; the suffix is the record schema version
const COVERAGE_FILE: &str = "coverage.v1.json";

/// Accumulated dataset file name
const DATASET_FILE: &str = "dataset.v1.json";

/// Stores coverage and the accumulated dataset as JSON files
///
/// Writes go to a temporary sibling first and are renamed into place, so a
/// crash mid-write leaves the previous document intact.
#[derive(Debug)]
pub struct JsonFileStore {
    dir: PathBuf,
    // Serialize read-modify-write cycles on each file
    coverage_lock: Mutex<()>,
    dataset_lock: Mutex<()>,
}

impl JsonFileStore {
    /// Create a store rooted at `dir`; the directory is created on first write
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            coverage_lock: Mutex::new(()),
            dataset_lock: Mutex::new(()),
        }
    }

    /// Path of the coverage record
    pub fn coverage_path(&self) -> PathBuf {
        self.dir.join(COVERAGE_FILE)
    }

    /// Path of the accumulated dataset record
    pub fn dataset_path(&self) -> PathBuf {
        self.dir.join(DATASET_FILE)
    }

    async fn write_atomic<T: Serialize + ?Sized>(&self, path: &Path, value: &T) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let bytes = serde_json::to_vec(value)?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }

    /// Read the coverage record; `None` when missing or unreadable
    async fn read_coverage(&self) -> Option<CoverageState> {
        let path = self.coverage_path();
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Could not read coverage, starting empty");
                return None;
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(state) => Some(state),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Corrupt coverage record, starting empty");
                None
            }
        }
    }

    async fn read_dataset(&self) -> Result<Vec<FetchedItem>> {
        match tokio::fs::read(self.dataset_path()).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl CoverageStore for JsonFileStore {
    async fn load(&self) -> CoverageState {
        self.read_coverage().await.unwrap_or_default()
    }

    async fn save(&self, state: &CoverageState) -> Result<()> {
        let _guard = self.coverage_lock.lock().await;
        // Union with what is on disk so a failed load never unmarks cells
        let mut merged = self.read_coverage().await.unwrap_or_default();
        merged.extend_from(state);
        self.write_atomic(&self.coverage_path(), &merged).await
    }
}

#[async_trait]
impl DatasetStore for JsonFileStore {
    async fn load_all(&self) -> Result<Vec<FetchedItem>> {
        let _guard = self.dataset_lock.lock().await;
        self.read_dataset().await
    }

    async fn append(&self, items: Vec<FetchedItem>) -> Result<usize> {
        let _guard = self.dataset_lock.lock().await;
        let accumulated = merge::append(self.read_dataset().await?, items);
        self.write_atomic(&self.dataset_path(), &accumulated).await?;
        Ok(accumulated.len())
    }
}
