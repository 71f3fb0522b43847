//! Core types for gridcrawl: run events and run summaries

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::coverage::Progress;
use crate::grid::CellKey;

/// Event emitted during a crawl run
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A run selected its batch and is about to dispatch fetches
    RunStarted {
        /// Cells selected for this run
        planned: usize,
        /// Per-run cap the batch was bounded by
        cap: usize,
    },

    /// A cell was fetched successfully
    CellFetched {
        /// Cell key
        key: CellKey,
        /// Items returned for the cell, after sanitization
        items: usize,
    },

    /// A cell failed after exhausting its retries; it stays uncovered
    CellFailed {
        /// Cell key
        key: CellKey,
        /// Error message
        error: String,
    },

    /// A run finished and its coverage was persisted
    RunCompleted {
        /// Summary of the run
        summary: RunSummary,
    },

    /// Every cell of the region is already covered
    AllCovered,
}

/// Outcome of one incremental run
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Cells selected for the run
    pub planned: usize,
    /// Cells fetched successfully and now marked covered
    pub fetched: usize,
    /// Cells whose fetch failed and remain uncovered
    pub failed: usize,
    /// Distinct items found in this run
    pub unique_items: usize,
    /// Size of the accumulated dataset after appending
    pub accumulated_items: usize,
    /// Coverage after the run
    pub progress: Progress,
    /// When the run started
    pub started_at: DateTime<Utc>,
    /// When the run finished
    pub finished_at: DateTime<Utc>,
}

impl RunSummary {
    /// Whether the run found nothing left to fetch
    pub fn is_noop(&self) -> bool {
        self.planned == 0
    }
}
