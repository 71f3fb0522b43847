//! Configuration types for gridcrawl

use crate::error::{Error, Result};
use crate::grid::GridRegion;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration for a crawler
///
/// Every field has a default, so an empty JSON object is a valid config.
/// Sub-configs are nested under their own keys:
/// - [`region`](GridRegion) - bounding box and step of the grid
/// - [`pool`](PoolConfig) - concurrency, pacing and per-run budget
/// - [`retry`](RetryConfig) - retry count, backoff and request timeout
/// - [`source`](SourceConfig) - remote endpoint and query templates
/// - [`persistence`](PersistenceConfig) - where coverage, data and exports live
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Grid bounding box and step
    #[serde(default)]
    pub region: GridRegion,

    /// Worker pool settings
    #[serde(default)]
    pub pool: PoolConfig,

    /// Retry behavior for cell fetches
    #[serde(default)]
    pub retry: RetryConfig,

    /// Remote data source
    #[serde(default)]
    pub source: SourceConfig,

    /// Storage locations and backend selection
    #[serde(default)]
    pub persistence: PersistenceConfig,
}

impl Config {
    /// Load a configuration from a JSON file and validate it
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that all settings are usable
    pub fn validate(&self) -> Result<()> {
        self.region.validate()?;

        if self.pool.concurrency == 0 {
            return Err(Error::config("pool.concurrency", "must be at least 1"));
        }
        if self.pool.max_cells_per_run == 0 {
            return Err(Error::config("pool.max_cells_per_run", "must be at least 1"));
        }
        if !(0.0..=1.0).contains(&self.retry.jitter_ratio) {
            return Err(Error::config(
                "retry.jitter_ratio",
                format!("must be within [0, 1], got {}", self.retry.jitter_ratio),
            ));
        }
        if self.retry.request_timeout.is_zero() {
            return Err(Error::config("retry.request_timeout_secs", "must be non-zero"));
        }
        url::Url::parse(&self.source.base_url).map_err(|e| {
            Error::config(
                "source.base_url",
                format!("invalid URL '{}': {}", self.source.base_url, e),
            )
        })?;
        if self.persistence.export_prefix.trim().is_empty() {
            return Err(Error::config("persistence.export_prefix", "must not be empty"));
        }

        Ok(())
    }
}

/// Worker pool configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Number of concurrent fetch workers (default: 3)
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Pause each worker takes after every task (default: 300ms)
    #[serde(
        default = "default_inter_task_delay",
        rename = "inter_task_delay_ms",
        with = "millis_serde"
    )]
    pub inter_task_delay: Duration,

    /// Maximum number of cells fetched in one run (default: 300)
    #[serde(default = "default_max_cells_per_run")]
    pub max_cells_per_run: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            inter_task_delay: default_inter_task_delay(),
            max_cells_per_run: default_max_cells_per_run(),
        }
    }
}

/// Retry behavior configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Retries after the first attempt (default: 2, so 3 attempts total)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Backoff before the first retry; doubles on each further retry (default: 7s)
    #[serde(
        default = "default_base_delay",
        rename = "base_delay_ms",
        with = "millis_serde"
    )]
    pub base_delay: Duration,

    /// Upper bound of the uniform jitter, as a fraction of the backoff (default: 0.3)
    #[serde(default = "default_jitter_ratio")]
    pub jitter_ratio: f64,

    /// Per-request timeout (default: 5 seconds)
    #[serde(
        default = "default_request_timeout",
        rename = "request_timeout_secs",
        with = "duration_serde"
    )]
    pub request_timeout: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay: default_base_delay(),
            jitter_ratio: default_jitter_ratio(),
            request_timeout: default_request_timeout(),
        }
    }
}

/// A single query parameter whose value is rendered per cell
///
/// `{lat}` and `{lon}` in `value` are replaced by the cell's coordinates.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryParam {
    /// Parameter name
    pub name: String,
    /// Value template
    pub value: String,
}

impl QueryParam {
    /// Create a new query parameter template
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Remote data source configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Endpoint queried for every cell
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Query parameters appended to `base_url`
    #[serde(default = "default_query")]
    pub query: Vec<QueryParam>,

    /// User-Agent header sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            query: default_query(),
            user_agent: default_user_agent(),
        }
    }
}

/// Storage backend selection
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    /// JSON files in `state_dir` (default)
    #[default]
    Json,
    /// SQLite database at `database_path`
    Sqlite,
}

/// Data storage configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Which backend holds coverage and the accumulated dataset
    #[serde(default)]
    pub backend: StorageBackend,

    /// Directory for the JSON backend (default: "./gridcrawl-state")
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,

    /// SQLite database path for the sqlite backend (default: "./gridcrawl.db")
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// Directory GeoJSON exports are written to (default: "./exports")
    #[serde(default = "default_export_dir")]
    pub export_dir: PathBuf,

    /// File name prefix for exports (default: "gridcrawl")
    #[serde(default = "default_export_prefix")]
    pub export_prefix: String,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            state_dir: default_state_dir(),
            database_path: default_database_path(),
            export_dir: default_export_dir(),
            export_prefix: default_export_prefix(),
        }
    }
}

fn default_concurrency() -> usize {
    3
}

fn default_inter_task_delay() -> Duration {
    Duration::from_millis(300)
}

fn default_max_cells_per_run() -> usize {
    300
}

fn default_max_retries() -> u32 {
    2
}

fn default_base_delay() -> Duration {
    Duration::from_millis(7000)
}

fn default_jitter_ratio() -> f64 {
    0.3
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_base_url() -> String {
    "http://localhost/api/search".to_string()
}

fn default_query() -> Vec<QueryParam> {
    vec![
        QueryParam::new("location", "({lat}, {lon})"),
        QueryParam::new("coordinates", "({lat}, {lon})"),
        QueryParam::new("advancedSearch", "{}"),
    ]
}

fn default_user_agent() -> String {
    concat!("gridcrawl/", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_state_dir() -> PathBuf {
    PathBuf::from("./gridcrawl-state")
}

fn default_database_path() -> PathBuf {
    PathBuf::from("./gridcrawl.db")
}

fn default_export_dir() -> PathBuf {
    PathBuf::from("./exports")
}

fn default_export_prefix() -> String {
    "gridcrawl".to_string()
}

// Duration serialization helper (whole seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// Duration serialization helper (milliseconds)
mod millis_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_reference_constants() {
        let config = Config::default();
        assert_eq!(config.region.lat_min, -40.0);
        assert_eq!(config.region.lat_max, -10.0);
        assert_eq!(config.region.lon_min, 110.0);
        assert_eq!(config.region.lon_max, 154.0);
        assert_eq!(config.region.step, 1.0);
        assert_eq!(config.pool.concurrency, 3);
        assert_eq!(config.pool.inter_task_delay, Duration::from_millis(300));
        assert_eq!(config.pool.max_cells_per_run, 300);
        assert_eq!(config.retry.max_retries, 2);
        assert_eq!(config.retry.base_delay, Duration::from_millis(7000));
        assert_eq!(config.retry.request_timeout, Duration::from_secs(5));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_json_uses_defaults() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config.pool.concurrency, 3);
        assert_eq!(config.persistence.backend, StorageBackend::Json);
        assert_eq!(config.source.query.len(), 3);
    }

    #[test]
    fn test_partial_json_overrides() {
        let json = r#"{
            "region": { "lat_min": 0, "lat_max": 1, "lon_min": 0, "lon_max": 1, "step": 0.5 },
            "pool": { "concurrency": 8, "inter_task_delay_ms": 50 },
            "retry": { "base_delay_ms": 250, "request_timeout_secs": 10 },
            "persistence": { "backend": "sqlite" }
        }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.region.step, 0.5);
        assert_eq!(config.pool.concurrency, 8);
        assert_eq!(config.pool.inter_task_delay, Duration::from_millis(50));
        assert_eq!(config.pool.max_cells_per_run, 300);
        assert_eq!(config.retry.base_delay, Duration::from_millis(250));
        assert_eq!(config.retry.request_timeout, Duration::from_secs(10));
        assert_eq!(config.persistence.backend, StorageBackend::Sqlite);
    }

    #[test]
    fn test_validate_rejects_zero_concurrency() {
        let mut config = Config::default();
        config.pool.concurrency = 0;
        match config.validate() {
            Err(Error::Config { key, .. }) => assert_eq!(key.as_deref(), Some("pool.concurrency")),
            other => panic!("expected config error, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_rejects_bad_url_and_jitter() {
        let mut config = Config::default();
        config.source.base_url = "not a url".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.retry.jitter_ratio = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("crawl.json");
        std::fs::write(&path, r#"{ "pool": { "max_cells_per_run": 10 } }"#).unwrap();

        let config = Config::from_json_file(&path).unwrap();
        assert_eq!(config.pool.max_cells_per_run, 10);
    }

    #[test]
    fn test_from_json_file_rejects_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("crawl.json");
        std::fs::write(&path, r#"{ "region": { "step": -1 } }"#).unwrap();

        assert!(matches!(
            Config::from_json_file(&path),
            Err(Error::Config { .. })
        ));
    }
}
