//! Coverage tracking: which cells have been fetched, and what to fetch next
//!
//! [`CoverageState`] is loaded once per run, marked in memory as cells
//! complete, and written back once at the end through a [`CoverageStore`].
//! Marks are never removed.

use crate::error::Result;
use crate::grid::{CellKey, GridCell, GridRegion};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Set of covered cells, persisted as `{ "covered": { "<key>": true } }`
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverageState {
    #[serde(default)]
    covered: BTreeMap<CellKey, bool>,
}

impl CoverageState {
    /// Create an empty state
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `key` has been fetched in this or an earlier run
    pub fn is_covered(&self, key: &CellKey) -> bool {
        self.covered.get(key).copied().unwrap_or(false)
    }

    /// Mark `key` as covered; marking twice is a no-op
    pub fn mark_covered(&mut self, key: CellKey) {
        self.covered.insert(key, true);
    }

    /// Number of covered keys, regardless of region
    pub fn len(&self) -> usize {
        self.covered.values().filter(|v| **v).count()
    }

    /// True when nothing has been covered yet
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Mark every key covered in `other` as covered here too
    pub fn extend_from(&mut self, other: &CoverageState) {
        for key in other.keys() {
            self.mark_covered(key.clone());
        }
    }

    /// Covered keys in sorted order
    pub fn keys(&self) -> impl Iterator<Item = &CellKey> {
        self.covered.iter().filter(|(_, v)| **v).map(|(k, _)| k)
    }
}

/// Durable storage for [`CoverageState`]
#[async_trait]
pub trait CoverageStore: Send + Sync {
    /// Read the persisted state
    ///
    /// Missing or unreadable storage yields an empty state; this never fails.
    async fn load(&self) -> CoverageState;

    /// Persist every key of `state` as covered
    ///
    /// Keys already stored stay covered even when `state` lacks them.
    async fn save(&self, state: &CoverageState) -> Result<()>;
}

/// A cell selected for the current run
#[derive(Clone, Debug, PartialEq)]
pub struct BatchEntry {
    /// Cell coordinate
    pub cell: GridCell,
    /// Canonical key of the cell
    pub key: CellKey,
}

/// Ordered cells selected for one run
pub type RunBatch = Vec<BatchEntry>;

/// Select the first `limit` uncovered cells in enumeration order
///
/// Stops walking the grid as soon as the batch is full, so large grids are
/// never materialized.
pub fn next_batch(region: &GridRegion, state: &CoverageState, limit: usize) -> RunBatch {
    let mut batch = RunBatch::new();
    if limit == 0 {
        return batch;
    }

    for cell in region.cells() {
        let key = region.key_of(&cell);
        if state.is_covered(&key) {
            continue;
        }
        batch.push(BatchEntry { cell, key });
        if batch.len() >= limit {
            break;
        }
    }
    batch
}

/// Coverage progress for a region
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    /// Cells in the grid
    pub total: usize,
    /// Grid cells already covered
    pub covered: usize,
    /// Grid cells still to fetch
    pub left: usize,
    /// Covered share in percent, rounded to two decimals
    pub pct: f64,
}

impl fmt::Display for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "covered={}, total={}, left={}, pct={:.2}",
            self.covered, self.total, self.left, self.pct
        )
    }
}

/// Compute progress of `state` over the cells of `region`
///
/// Keys left over from a different region or step are not counted.
pub fn progress(region: &GridRegion, state: &CoverageState) -> Progress {
    let total = region.total_cells();
    let covered = region
        .cells()
        .filter(|cell| state.is_covered(&region.key_of(cell)))
        .count();
    let pct = if total == 0 {
        0.0
    } else {
        (covered as f64 / total as f64 * 10_000.0).round() / 100.0
    };

    Progress {
        total,
        covered,
        left: total - covered,
        pct,
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn unit_square() -> GridRegion {
        GridRegion::new(0.0, 1.0, 0.0, 1.0, 1.0)
    }

    fn cells(batch: &RunBatch) -> Vec<(f64, f64)> {
        batch.iter().map(|e| (e.cell.lat, e.cell.lon)).collect()
    }

    #[test]
    fn test_two_by_two_scenario() {
        let region = unit_square();
        let mut state = CoverageState::new();

        let first = next_batch(&region, &state, 2);
        assert_eq!(cells(&first), vec![(0.0, 0.0), (0.0, 1.0)]);
        for entry in first {
            state.mark_covered(entry.key);
        }

        // Round-trip through the persisted record
        let json = serde_json::to_string(&state).unwrap();
        let mut state: CoverageState = serde_json::from_str(&json).unwrap();

        let second = next_batch(&region, &state, 2);
        assert_eq!(cells(&second), vec![(1.0, 0.0), (1.0, 1.0)]);
        for entry in second {
            state.mark_covered(entry.key);
        }

        assert!(next_batch(&region, &state, 2).is_empty());

        let report = progress(&region, &state);
        assert_eq!(report.covered, 4);
        assert_eq!(report.total, 4);
        assert_eq!(report.left, 0);
        assert_eq!(format!("{:.2}", report.pct), "100.00");
        assert_eq!(report.to_string(), "covered=4, total=4, left=0, pct=100.00");
    }

    #[test]
    fn test_batch_bound() {
        let region = GridRegion::new(0.0, 9.0, 0.0, 9.0, 1.0);
        let state = CoverageState::new();
        assert_eq!(next_batch(&region, &state, 7).len(), 7);
        assert_eq!(next_batch(&region, &state, 1000).len(), 100);
        assert!(next_batch(&region, &state, 0).is_empty());
    }

    #[test]
    fn test_covered_cells_never_return() {
        let region = GridRegion::new(0.0, 4.0, 0.0, 4.0, 1.0);
        let mut state = CoverageState::new();
        let mut seen = Vec::new();

        loop {
            let batch = next_batch(&region, &state, 3);
            if batch.is_empty() {
                break;
            }
            assert!(batch.len() <= 3);
            for entry in batch {
                assert!(!seen.contains(&entry.key), "{} returned twice", entry.key);
                seen.push(entry.key.clone());
                state.mark_covered(entry.key);
            }
        }
        assert_eq!(seen.len(), 25);
    }

    #[test]
    fn test_mark_covered_is_idempotent() {
        let region = unit_square();
        let key = region.cell_key(0.0, 0.0);
        let mut state = CoverageState::new();
        state.mark_covered(key.clone());
        state.mark_covered(key.clone());
        assert_eq!(state.len(), 1);
        assert!(state.is_covered(&key));
    }

    #[test]
    fn test_record_shape() {
        let region = unit_square();
        let mut state = CoverageState::new();
        state.mark_covered(region.cell_key(1.0, 0.0));
        assert_eq!(
            serde_json::to_value(&state).unwrap(),
            serde_json::json!({"covered": {"1,0": true}})
        );
    }

    #[test]
    fn test_record_without_covered_field_is_empty() {
        let state: CoverageState = serde_json::from_str(r#"{"other": 1}"#).unwrap();
        assert!(state.is_empty());
    }

    #[test]
    fn test_false_markers_are_not_covered() {
        let state: CoverageState =
            serde_json::from_str(r#"{"covered": {"0,0": false, "0,1": true}}"#).unwrap();
        let region = unit_square();
        assert!(!state.is_covered(&region.cell_key(0.0, 0.0)));
        assert_eq!(state.len(), 1);
        assert_eq!(next_batch(&region, &state, 10).len(), 3);
    }

    #[test]
    fn test_progress_ignores_foreign_keys() {
        let region = unit_square();
        let mut state = CoverageState::new();
        state.mark_covered(region.cell_key(0.0, 0.0));
        state.mark_covered(CellKey::from_stored("55,55"));

        let report = progress(&region, &state);
        assert_eq!(report.covered, 1);
        assert_eq!(report.left, 3);
        assert_eq!(report.pct, 25.0);
    }

    #[test]
    fn test_progress_rounds_to_two_decimals() {
        let region = GridRegion::new(0.0, 2.0, 0.0, 0.0, 1.0);
        let mut state = CoverageState::new();
        state.mark_covered(region.cell_key(0.0, 0.0));
        assert_eq!(progress(&region, &state).pct, 33.33);
    }
}
