//! PostgreSQL store
//!
//! One row per economy in `economy_documents`. The version column carries
//! the compare-and-swap.

use async_trait::async_trait;
use sqlx::PgPool;

use crate::aggregate::Economy;

use super::{AggregateStore, StoreError};

/// Row id of the economy served by this process
pub const DEFAULT_DOCUMENT_ID: &str = "merlyn";

#[derive(Debug, Clone)]
pub struct PgAggregateStore {
    pool: PgPool,
    document_id: String,
}

impl PgAggregateStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            document_id: DEFAULT_DOCUMENT_ID.to_string(),
        }
    }

    async fn current_version(&self) -> Result<i64, StoreError> {
        let version: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT version FROM economy_documents WHERE id = $1
            "#,
        )
        .bind(&self.document_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(version.unwrap_or(0))
    }
}

#[async_trait]
impl AggregateStore for PgAggregateStore {
    async fn load(&self) -> Result<Economy, StoreError> {
        let row: Option<(i64, serde_json::Value)> = sqlx::query_as(
            r#"
            SELECT version, document FROM economy_documents WHERE id = $1
            "#,
        )
        .bind(&self.document_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some((version, document)) => {
                let mut economy: Economy = serde_json::from_value(document)?;
                economy.set_version(version);
                Ok(economy)
            }
            None => Ok(Economy::default()),
        }
    }

    async fn save(&self, economy: &Economy) -> Result<i64, StoreError> {
        let document = serde_json::to_value(economy)?;
        let expected = economy.version();

        let saved: Option<i64> = if expected == 0 {
            sqlx::query_scalar(
                r#"
                INSERT INTO economy_documents (id, version, document, updated_at)
                VALUES ($1, 1, $2, NOW())
                ON CONFLICT (id) DO NOTHING
                RETURNING version
                "#,
            )
            .bind(&self.document_id)
            .bind(&document)
            .fetch_optional(&self.pool)
            .await?
        } else {
            sqlx::query_scalar(
                r#"
                UPDATE economy_documents
                SET document = $2, version = version + 1, updated_at = NOW()
                WHERE id = $1 AND version = $3
                RETURNING version
                "#,
            )
            .bind(&self.document_id)
            .bind(&document)
            .bind(expected)
            .fetch_optional(&self.pool)
            .await?
        };

        match saved {
            Some(version) => Ok(version),
            None => Err(StoreError::ConcurrencyConflict {
                expected,
                actual: self.current_version().await?,
            }),
        }
    }
}
