//! Deduplication of fetched items and append-only accumulation

use crate::item::FetchedItem;
use std::collections::HashMap;

/// Items keyed by their identifier, one authoritative record per id
#[derive(Clone, Debug, Default)]
pub struct MergedDataset {
    by_id: HashMap<String, FetchedItem>,
}

impl MergedDataset {
    /// Create an empty dataset
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one observation into the dataset
    ///
    /// The observation replaces the current record when it has at least as
    /// many populated fields, so on a tie the most recent observation wins.
    /// Returns `false` when the item has no identifier and was discarded.
    pub fn observe(&mut self, item: FetchedItem) -> bool {
        let Some(id) = item.id() else {
            return false;
        };

        match self.by_id.get(&id) {
            Some(current) if current.populated_fields() > item.populated_fields() => {}
            _ => {
                self.by_id.insert(id, item);
            }
        }
        true
    }

    /// Record currently held for `id`
    pub fn get(&self, id: &str) -> Option<&FetchedItem> {
        self.by_id.get(id)
    }

    /// Number of distinct identifiers
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    /// True when no item has been retained
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Retained items, ordered by identifier
    pub fn into_items(self) -> Vec<FetchedItem> {
        let mut entries: Vec<_> = self.by_id.into_iter().collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries.into_iter().map(|(_, item)| item).collect()
    }
}

/// Merge every task's results into a deduplicated dataset
pub fn merge<I, R>(results: I) -> MergedDataset
where
    I: IntoIterator<Item = R>,
    R: IntoIterator<Item = FetchedItem>,
{
    let mut dataset = MergedDataset::new();
    let mut discarded = 0usize;
    for item in results.into_iter().flatten() {
        if !dataset.observe(item) {
            discarded += 1;
        }
    }
    if discarded > 0 {
        tracing::debug!(discarded, "Dropped items without an id");
    }
    dataset
}

/// Append new items to the accumulated list
///
/// No deduplication against earlier runs takes place.
pub fn append(mut existing: Vec<FetchedItem>, new_items: Vec<FetchedItem>) -> Vec<FetchedItem> {
    existing.extend(new_items);
    existing
}
