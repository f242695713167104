use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Pool, Postgres, Row};

use super::BookmarkStore;
use crate::error::StoreError;
use crate::types::Sequence;

/// Postgres-backed [`BookmarkStore`]. One table shared by every consumer, keyed by `name`.
pub struct PgBookmarkStore {
    pool: Pool<Postgres>,
    table: String,
}

impl PgBookmarkStore {
    pub async fn new(pool: Pool<Postgres>) -> Result<Self, StoreError> {
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
                name VARCHAR(160) PRIMARY KEY,
                value BIGINT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            )",
            self.table
        ))
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl BookmarkStore for PgBookmarkStore {
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
        let now = Utc::now();

        sqlx::query(&format!(
            "INSERT INTO {} (name, value, created_at, updated_at) VALUES ($1, $2, $3, $3)
             ON CONFLICT (name) DO UPDATE SET value = EXCLUDED.value, updated_at = EXCLUDED.updated_at",
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
