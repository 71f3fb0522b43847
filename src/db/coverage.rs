//! Covered-cell persistence.

use crate::coverage::{CoverageState, CoverageStore};
use crate::error::DatabaseError;
use crate::grid::CellKey;
use crate::{Error, Result};
use async_trait::async_trait;
use sqlx::Row;

use super::Database;

impl Database {
    /// Read every covered cell key
    ///
    /// Rows whose key cannot be decoded are skipped with a warning so one bad
    /// row does not hide the rest.
    pub async fn load_coverage(&self) -> Result<CoverageState> {
        let rows = sqlx::query("SELECT cell_key FROM covered_cells")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to load coverage: {}",
                    e
                )))
            })?;

        let mut state = CoverageState::new();
        for row in rows {
            match row.try_get::<String, _>("cell_key") {
                Ok(key) => state.mark_covered(CellKey::from_stored(key)),
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping undecodable covered cell row");
                }
            }
        }
        Ok(state)
    }

    /// Record every key of `state` as covered in one transaction
    ///
    /// Keys already stored keep their original `covered_at`. Nothing is ever
    /// removed, so a partial or failed load can never unmark a cell.
    pub async fn record_coverage(&self, state: &CoverageState) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to begin coverage transaction: {}",
                e
            )))
        })?;

        let now = chrono::Utc::now().timestamp();
        for key in state.keys() {
            sqlx::query("INSERT OR IGNORE INTO covered_cells (cell_key, covered_at) VALUES (?, ?)")
                .bind(key.as_str())
                .bind(now)
                .execute(&mut *tx)
                .await
                .map_err(|e| {
                    Error::Database(DatabaseError::QueryFailed(format!(
                        "Failed to insert covered cell {}: {}",
                        key, e
                    )))
                })?;
        }

        tx.commit().await.map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to commit coverage: {}",
                e
            )))
        })?;

        Ok(())
    }

    /// When `key` was first recorded as covered, as a Unix timestamp
    pub async fn covered_at(&self, key: &CellKey) -> Result<Option<i64>> {
        sqlx::query_scalar::<_, i64>("SELECT covered_at FROM covered_cells WHERE cell_key = ?")
            .bind(key.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to read covered_at for {}: {}",
                    key, e
                )))
            })
    }
}

#[async_trait]
impl CoverageStore for Database {
    async fn load(&self) -> CoverageState {
        match self.load_coverage().await {
            Ok(state) => state,
            Err(e) => {
                tracing::warn!(error = %e, "Could not load coverage, starting empty");
                CoverageState::new()
            }
        }
    }

    async fn save(&self, state: &CoverageState) -> Result<()> {
        self.record_coverage(state).await
    }
}
