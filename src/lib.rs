//! # gridcrawl
//!
//! Incremental crawler that sweeps a latitude/longitude grid against a
//! point-query search endpoint, one bounded batch of cells per run.
//!
//! ## Design Philosophy
//!
//! gridcrawl is designed to be:
//! - **Resumable** - Coverage is persisted, so each run picks up where the last stopped
//! - **Polite** - Bounded concurrency, pacing between requests and a per-run budget
//! - **Failure-isolated** - A failing cell stays uncovered and is retried next run
//! - **Library-first** - Storage, transport and export are pluggable traits
//!
//! ## Quick Start
//!
//! ```no_run
//! use gridcrawl::{Config, Crawler, GridRegion};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = Config::default();
//!     config.region = GridRegion::new(-44.0, -10.0, 112.0, 154.0, 1.0);
//!     config.source.base_url = "https://example.com/api/search".to_string();
//!
//!     let crawler = Crawler::from_config(config).await?;
//!
//!     // Subscribe to events
//!     let mut events = crawler.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let summary = crawler.run_incremental().await?;
//!     println!("{}", summary.progress);
//!     crawler.export_all().await?;
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types
pub mod config;
/// Coverage state, batch selection and progress
pub mod coverage;
/// Incremental run orchestration
pub mod crawler;
/// SQLite persistence backend
pub mod db;
/// Error types
pub mod error;
/// GeoJSON export
pub mod export;
/// Per-cell HTTP fetching
pub mod fetcher;
/// Grid geometry and cell keys
pub mod grid;
/// Fetched items and sanitization
pub mod item;
/// Deduplication of fetched items
pub mod merge;
/// Bounded-concurrency task pool
pub mod pool;
/// Retry logic with exponential backoff
pub mod retry;
/// Persistence ports and file/memory backends
pub mod storage;
/// Core types and events
pub mod types;

// Re-export commonly used types
pub use config::{
    Config, PersistenceConfig, PoolConfig, QueryParam, RetryConfig, SourceConfig, StorageBackend,
};
pub use coverage::{CoverageState, CoverageStore, Progress};
pub use crawler::Crawler;
pub use db::Database;
pub use error::{DatabaseError, Error, Result};
pub use export::{DirectorySink, ExportSink, MemorySink};
pub use fetcher::{CellFetcher, HttpCellFetcher, RequestBuilder, TemplateRequestBuilder};
pub use grid::{CellKey, GridCell, GridRegion};
pub use item::FetchedItem;
pub use storage::{DatasetStore, JsonFileStore, MemoryStore};
pub use types::{Event, RunSummary};

/// Run one incremental pass, abandoning it if a termination signal arrives first.
///
/// Coverage is only written at the end of a run, so an interrupted run leaves
/// no trace and its cells are fetched again next time. Returns `Ok(None)` when
/// interrupted.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use gridcrawl::{Config, Crawler, run_with_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let crawler = Crawler::from_config(Config::default()).await?;
///
///     match run_with_shutdown(&crawler).await? {
///         Some(summary) => println!("{}", summary.progress),
///         None => println!("interrupted, nothing persisted"),
///     }
///
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(crawler: &Crawler) -> Result<Option<RunSummary>> {
    run_until(crawler, wait_for_signal()).await
}

/// Run one incremental pass unless `shutdown` resolves first
async fn run_until<S>(crawler: &Crawler, shutdown: S) -> Result<Option<RunSummary>>
where
    S: std::future::Future<Output = ()>,
{
    tokio::select! {
        result = crawler.run_incremental() => result.map(Some),
        _ = shutdown => {
            tracing::warn!("Run interrupted before persisting; covered cells will be refetched");
            Ok(None)
        }
    }
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Set up signal handlers - these may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                ctrl_c_or_never().await;
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                ctrl_c_or_never().await;
            }
        }
    }
}

/// Wait for Ctrl+C, or forever if Ctrl+C cannot be listened for
async fn ctrl_c_or_never() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    ctrl_c_or_never().await;
}
