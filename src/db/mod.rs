//! SQLite storage backend
//!
//! Persists coverage and the accumulated dataset through sqlx.
//!
//! ## Submodules
//!
//! Methods on [`Database`] are organized by domain:
//! - [`migrations`] - Database lifecycle, schema migrations
//! - [`coverage`] - Covered-cell map, implements [`CoverageStore`](crate::coverage::CoverageStore)
//! - [`items`] - Append-only item log, implements [`DatasetStore`](crate::storage::DatasetStore)

use sqlx::sqlite::SqlitePool;

mod coverage;
mod items;
mod migrations;

/// Database handle for gridcrawl
#[derive(Debug)]
pub struct Database {
    pool: SqlitePool,
}
