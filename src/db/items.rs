//! Append-only item log.

use crate::error::DatabaseError;
use crate::item::FetchedItem;
use crate::storage::DatasetStore;
use crate::{Error, Result};
use async_trait::async_trait;

use super::Database;

impl Database {
    /// Append items in one transaction, returning the new total count
    pub async fn append_items(&self, items: &[FetchedItem]) -> Result<usize> {
        let mut tx = self.pool.begin().await.map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to begin append transaction: {}",
                e
            )))
        })?;

        let now = chrono::Utc::now().timestamp();
        for item in items {
            let body = serde_json::to_string(item)?;
            sqlx::query("INSERT INTO items (item_id, body, appended_at) VALUES (?, ?, ?)")
                .bind(item.id())
                .bind(body)
                .bind(now)
                .execute(&mut *tx)
                .await
                .map_err(|e| {
                    Error::Database(DatabaseError::QueryFailed(format!(
                        "Failed to append item: {}",
                        e
                    )))
                })?;
        }

        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM items")
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to count items: {}",
                    e
                )))
            })?;

        tx.commit().await.map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to commit appended items: {}",
                e
            )))
        })?;

        Ok(usize::try_from(total).unwrap_or(0))
    }

    /// Read every stored item in append order
    pub async fn load_items(&self) -> Result<Vec<FetchedItem>> {
        let bodies: Vec<String> = sqlx::query_scalar("SELECT body FROM items ORDER BY seq")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to load items: {}",
                    e
                )))
            })?;

        bodies
            .iter()
            .map(|body| serde_json::from_str(body).map_err(Error::from))
            .collect()
    }

    /// Number of stored items, duplicates included
    pub async fn item_count(&self) -> Result<usize> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM items")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to count items: {}",
                    e
                )))
            })?;

        Ok(usize::try_from(total).unwrap_or(0))
    }

    /// Number of distinct item ids stored
    pub async fn distinct_item_count(&self) -> Result<usize> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(DISTINCT item_id) FROM items")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to count distinct items: {}",
                    e
                )))
            })?;

        Ok(usize::try_from(total).unwrap_or(0))
    }
}

#[async_trait]
impl DatasetStore for Database {
    async fn load_all(&self) -> Result<Vec<FetchedItem>> {
        self.load_items().await
    }

    async fn append(&self, items: Vec<FetchedItem>) -> Result<usize> {
        self.append_items(&items).await
    }
}
