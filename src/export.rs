//! GeoJSON export and export sinks
//!
//! Items become `Point` features at `[longitude, latitude]` with the full
//! item as properties. Where the bytes end up is decided by an [`ExportSink`].

use crate::error::Result;
use crate::item::FetchedItem;
use async_trait::async_trait;
use serde_json::{Value, json};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

/// Destination for exported documents
#[async_trait]
pub trait ExportSink: Send + Sync {
    /// Store `bytes` under `suggested_name`, replacing any previous export of that name
    async fn write(&self, bytes: Vec<u8>, suggested_name: &str) -> Result<()>;
}

/// Build a GeoJSON `FeatureCollection` from items
///
/// Items whose coordinates cannot be read get a `null` geometry.
pub fn feature_collection(items: &[FetchedItem]) -> Value {
    let features: Vec<Value> = items
        .iter()
        .map(|item| {
            let geometry = match (item.longitude(), item.latitude()) {
                (Some(lon), Some(lat)) => json!({
                    "type": "Point",
                    "coordinates": [lon, lat],
                }),
                _ => Value::Null,
            };
            json!({
                "type": "Feature",
                "geometry": geometry,
                "properties": item.fields(),
            })
        })
        .collect();

    json!({
        "type": "FeatureCollection",
        "features": features,
    })
}

/// Render items as pretty-printed GeoJSON bytes
pub fn to_geojson_bytes(items: &[FetchedItem]) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec_pretty(&feature_collection(items))?)
}

/// File name for a single run's export, e.g. `campsites_step1_run.geojson`
pub fn run_export_name(prefix: &str, step: f64) -> String {
    format!("{prefix}_step{step}_run.geojson")
}

/// File name for the full accumulated export, e.g. `campsites_all.geojson`
pub fn all_export_name(prefix: &str) -> String {
    format!("{prefix}_all.geojson")
}

/// Writes exports as files inside a directory
#[derive(Clone, Debug)]
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    /// Create a sink writing into `dir`; the directory is created on first write
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    /// Directory exports are written to
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl ExportSink for DirectorySink {
    async fn write(&self, bytes: Vec<u8>, suggested_name: &str) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        // Keep only the final component so a name cannot escape the directory
        let name = Path::new(suggested_name)
            .file_name()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("export.geojson"));
        let path = self.dir.join(name);
        tokio::fs::write(&path, bytes).await?;
        tracing::info!(path = %path.display(), "Wrote export");
        Ok(())
    }
}

/// Keeps exports in memory, newest last
#[derive(Debug, Default)]
pub struct MemorySink {
    written: Mutex<Vec<(String, Vec<u8>)>>,
}

impl MemorySink {
    /// Create an empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Every export written so far, as `(name, bytes)`
    pub async fn exports(&self) -> Vec<(String, Vec<u8>)> {
        self.written.lock().await.clone()
    }
}

#[async_trait]
impl ExportSink for MemorySink {
    async fn write(&self, bytes: Vec<u8>, suggested_name: &str) -> Result<()> {
        self.written
            .lock()
            .await
            .push((suggested_name.to_string(), bytes));
        Ok(())
    }
}
