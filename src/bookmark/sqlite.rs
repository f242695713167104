use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Pool, Row, Sqlite};

use super::BookmarkStore;
use crate::error::StoreError;
use crate::types::Sequence;

/// SQLite-backed [`BookmarkStore`], schema-identical to [`super::postgres::PgBookmarkStore`].
pub struct SqliteBookmarkStore {
    pool: Pool<Sqlite>,
    table: String,
}

impl SqliteBookmarkStore {
    pub async fn new(pool: Pool<Sqlite>) -> Result<Self, StoreError> {
        let store = Self {
            pool,
            table: "bookmarks".to_string(),
        };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS {} (
                name TEXT PRIMARY KEY,
                value BIGINT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            self.table
        ))
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl BookmarkStore for SqliteBookmarkStore {
    async fn bookmark_for(&self, name: &str) -> Result<Sequence, StoreError> {
        let row = sqlx::query(&format!("SELECT value FROM {} WHERE name = $1", self.table))
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(row.try_get("value")?),
            None => Ok(0),
        }
    }

    async fn save(&self, name: &str, sequence: Sequence) -> Result<(), StoreError> {
        let now = Utc::now().to_rfc3339();

        sqlx::query(&format!(
            "INSERT INTO {} (name, value, created_at, updated_at) VALUES ($1, $2, $3, $3)
             ON CONFLICT (name) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            self.table
        ))
        .bind(name)
        .bind(sequence)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
