//! The incremental crawl entry point
//!
//! One call to [`Crawler::run_incremental`] performs a whole run:
//!
//! 1. load coverage
//! 2. select the next batch of uncovered cells
//! 3. fetch every cell on the worker pool
//! 4. mark successfully fetched cells covered (in memory)
//! 5. merge and deduplicate the run's items
//! 6. export the run as GeoJSON
//! 7. append the run's items to the accumulated dataset
//! 8. persist coverage
//!
//! Coverage is written once, at the very end. If the process dies mid-run, or
//! a persistence step fails, none of the run's cells are recorded and they are
//! fetched again next time.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::broadcast;

use crate::config::Config;
use crate::coverage::{self, CoverageStore, Progress, RunBatch};
use crate::error::Result;
use crate::export::{self, DirectorySink, ExportSink};
use crate::fetcher::{CellFetcher, HttpCellFetcher};
use crate::item::FetchedItem;
use crate::merge;
use crate::pool::run_pool;
use crate::storage::{self, DatasetStore};
use crate::types::{Event, RunSummary};

/// Buffered events per subscriber before the slowest one starts lagging
const EVENT_CHANNEL_CAPACITY: usize = 1000;

/// Incremental grid crawler (cloneable - all fields are Arc-wrapped)
#[derive(Clone)]
pub struct Crawler {
    config: Arc<Config>,
    fetcher: Arc<dyn CellFetcher>,
    coverage: Arc<dyn CoverageStore>,
    dataset: Arc<dyn DatasetStore>,
    export: Arc<dyn ExportSink>,
    event_tx: broadcast::Sender<Event>,
}

impl Crawler {
    /// Assemble a crawler from explicit collaborators
    ///
    /// # Errors
    /// Returns a configuration error if `config` does not validate
    pub fn new(
        config: Config,
        fetcher: Arc<dyn CellFetcher>,
        coverage: Arc<dyn CoverageStore>,
        dataset: Arc<dyn DatasetStore>,
        export: Arc<dyn ExportSink>,
    ) -> Result<Self> {
        config.validate()?;
        let (event_tx, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Ok(Self {
            config: Arc::new(config),
            fetcher,
            coverage,
            dataset,
            export,
            event_tx,
        })
    }

    /// Build a crawler with the HTTP fetcher, the configured storage backend
    /// and a directory export sink
    pub async fn from_config(config: Config) -> Result<Self> {
        config.validate()?;
        let fetcher = HttpCellFetcher::from_config(&config.source, config.retry.clone())?;
        let stores = storage::open(&config.persistence).await?;
        let export = DirectorySink::new(&config.persistence.export_dir);

        Self::new(
            config,
            Arc::new(fetcher),
            stores.coverage,
            stores.dataset,
            Arc::new(export),
        )
    }

    /// Subscribe to run events
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Get the current configuration
    pub fn config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }

    /// Cells the next run would fetch, without fetching them
    pub async fn plan(&self) -> RunBatch {
        let state = self.coverage.load().await;
        coverage::next_batch(
            &self.config.region,
            &state,
            self.config.pool.max_cells_per_run,
        )
    }

    /// Coverage progress for the configured region
    pub async fn progress(&self) -> Progress {
        let state = self.coverage.load().await;
        let progress = coverage::progress(&self.config.region, &state);
        tracing::info!(
            total = progress.total,
            covered = progress.covered,
            left = progress.left,
            pct = progress.pct,
            "Coverage progress"
        );
        progress
    }

    /// Perform one incremental run
    ///
    /// Per-cell failures never fail the run; the cell simply stays uncovered.
    ///
    /// # Errors
    /// Returns an error when appending to the dataset or saving coverage fails.
    /// In that case no coverage from this run is persisted.
    pub async fn run_incremental(&self) -> Result<RunSummary> {
        let started_at = Utc::now();
        let region = &self.config.region;
        let pool_config = &self.config.pool;

        let mut state = self.coverage.load().await;
        let batch = coverage::next_batch(region, &state, pool_config.max_cells_per_run);

        if batch.is_empty() {
            tracing::info!("All cells covered for current bounds/step");
            self.emit_event(Event::AllCovered);
            return Ok(RunSummary {
                planned: 0,
                fetched: 0,
                failed: 0,
                unique_items: 0,
                accumulated_items: 0,
                progress: coverage::progress(region, &state),
                started_at,
                finished_at: Utc::now(),
            });
        }

        tracing::info!(
            planned = batch.len(),
            cap = pool_config.max_cells_per_run,
            concurrency = pool_config.concurrency,
            "Starting run"
        );
        self.emit_event(Event::RunStarted {
            planned: batch.len(),
            cap: pool_config.max_cells_per_run,
        });

        let tasks: Vec<_> = batch
            .iter()
            .map(|entry| {
                let fetcher = &self.fetcher;
                let event_tx = &self.event_tx;
                move || async move {
                    match fetcher.fetch(&entry.cell).await {
                        Ok(items) => {
                            event_tx
                                .send(Event::CellFetched {
                                    key: entry.key.clone(),
                                    items: items.len(),
                                })
                                .ok();
                            Ok(items)
                        }
                        Err(e) => {
                            event_tx
                                .send(Event::CellFailed {
                                    key: entry.key.clone(),
                                    error: e.to_string(),
                                })
                                .ok();
                            Err(e)
                        }
                    }
                }
            })
            .collect();

        let output = run_pool(
            &tasks,
            pool_config.concurrency,
            pool_config.inter_task_delay,
        )
        .await;

        let mut fetched = 0;
        for (index, entry) in batch.iter().enumerate() {
            if output.succeeded(index) {
                state.mark_covered(entry.key.clone());
                fetched += 1;
            }
        }
        let failed = output.failures.len();

        let items = merge::merge(output.results).into_items();
        let unique_items = items.len();
        tracing::info!(unique_items, fetched, failed, "Merged run results");

        self.export_run(&items).await;

        let accumulated_items = self.dataset.append(items).await?;
        self.coverage.save(&state).await?;

        let summary = RunSummary {
            planned: batch.len(),
            fetched,
            failed,
            unique_items,
            accumulated_items,
            progress: coverage::progress(region, &state),
            started_at,
            finished_at: Utc::now(),
        };

        tracing::info!(
            planned = summary.planned,
            fetched = summary.fetched,
            failed = summary.failed,
            accumulated = summary.accumulated_items,
            pct = summary.progress.pct,
            "Run complete"
        );
        self.emit_event(Event::RunCompleted {
            summary: summary.clone(),
        });

        Ok(summary)
    }

    /// Export the entire accumulated dataset, returning the number of items written
    pub async fn export_all(&self) -> Result<usize> {
        let items = self.dataset.load_all().await?;
        let bytes = export::to_geojson_bytes(&items)?;
        let name = export::all_export_name(&self.config.persistence.export_prefix);
        self.export.write(bytes, &name).await?;
        Ok(items.len())
    }

    /// Write this run's items through the export sink
    ///
    /// A failed export is logged and does not abort the run; `export_all`
    /// can regenerate the data from the accumulated dataset.
    async fn export_run(&self, items: &[FetchedItem]) {
        let name = export::run_export_name(
            &self.config.persistence.export_prefix,
            self.config.region.step,
        );
        let result = match export::to_geojson_bytes(items) {
            Ok(bytes) => self.export.write(bytes, &name).await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            tracing::warn!(name = %name, error = %e, "Failed to export run");
        }
    }

    /// Emit an event to all subscribers
    ///
    /// If there are no active subscribers, the event is silently dropped.
    fn emit_event(&self, event: Event) {
        self.event_tx.send(event).ok();
    }
}
