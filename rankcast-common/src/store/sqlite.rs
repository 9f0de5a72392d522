//! SQLite-backed distribution store
//!
//! One row per (year, category) in the `distributions` table; the general
//! dataset uses category `''`. Each save is a single upsert that bumps the
//! row's revision.

use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};
use std::path::Path;
use tracing::{debug, info, warn};

use super::{CanonicalArtifact, DistributionStore, StoreReceipt, StoredPayload};
use crate::model::{Category, DistributionKey};
use crate::{Error, Result};

/// Distribution store in a SQLite database
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if necessary) the database at `db_path`
    pub async fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect(&db_url)
            .await?;

        // Readers keep going while an upload commits
        sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;
        sqlx::query("PRAGMA busy_timeout = 5000").execute(&pool).await?;

        info!("Opened distribution database: {}", db_path.display());
        Self::with_pool(pool).await
    }

    /// Private in-memory database (single connection so all queries share it)
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        Self::with_pool(pool).await
    }

    /// Wrap an existing pool, creating the table if needed
    pub async fn with_pool(pool: SqlitePool) -> Result<Self> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS distributions (
                year INTEGER NOT NULL,
                category TEXT NOT NULL DEFAULT '',
                payload TEXT NOT NULL,
                revision INTEGER NOT NULL,
                stored_at TEXT NOT NULL,
                PRIMARY KEY (year, category)
            )
            "#,
        )
        .execute(&pool)
        .await?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    fn location(key: &DistributionKey) -> String {
        format!("sqlite:distributions/{}", key)
    }
}

#[async_trait]
impl DistributionStore for SqliteStore {
    fn describe(&self) -> String {
        "sqlite store".to_string()
    }

    async fn load(&self, key: &DistributionKey) -> Result<Option<StoredPayload>> {
        let row = sqlx::query(
            "SELECT payload, revision FROM distributions WHERE year = ? AND category = ?",
        )
        .bind(key.year)
        .bind(key.category.code())
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let text: String = row.try_get("payload")?;
        let revision: i64 = row.try_get("revision")?;
        let payload = serde_json::from_str(&text).map_err(|e| {
            warn!(%key, "Unreadable distribution row: {}", e);
            Error::Normalization { discarded: 0 }
        })?;

        debug!(%key, revision, "Loaded distribution row");
        Ok(Some(StoredPayload {
            payload,
            revision: revision as u64,
        }))
    }

    async fn revision(&self, key: &DistributionKey) -> Result<Option<u64>> {
        let revision: Option<i64> = sqlx::query_scalar(
            "SELECT revision FROM distributions WHERE year = ? AND category = ?",
        )
        .bind(key.year)
        .bind(key.category.code())
        .fetch_optional(&self.pool)
        .await?;
        Ok(revision.map(|r| r as u64))
    }

    async fn save(&self, key: &DistributionKey, artifact: &CanonicalArtifact) -> Result<StoreReceipt> {
        let payload = serde_json::to_string(artifact)?;

        let revision: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO distributions (year, category, payload, revision, stored_at)
            VALUES (?, ?, ?, 1, ?)
            ON CONFLICT (year, category) DO UPDATE SET
                payload = excluded.payload,
                revision = distributions.revision + 1,
                stored_at = excluded.stored_at
            RETURNING revision
            "#,
        )
        .bind(key.year)
        .bind(key.category.code())
        .bind(&payload)
        .bind(&artifact.stored_at)
        .fetch_one(&self.pool)
        .await?;

        info!(%key, revision, "Saved distribution row");
        Ok(StoreReceipt {
            location: Self::location(key),
            revision: revision as u64,
        })
    }

    async fn delete(&self, key: &DistributionKey) -> Result<bool> {
        let result = sqlx::query("DELETE FROM distributions WHERE year = ? AND category = ?")
            .bind(key.year)
            .bind(key.category.code())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list(&self) -> Result<Vec<DistributionKey>> {
        let rows: Vec<(i64, String)> =
            sqlx::query_as("SELECT year, category FROM distributions ORDER BY year, category")
                .fetch_all(&self.pool)
                .await?;

        let mut keys: Vec<DistributionKey> = rows
            .into_iter()
            .filter_map(|(year, code)| {
                let year = i32::try_from(year).ok()?;
                let category = Category::parse(&code).ok()?;
                DistributionKey::new(year, category).ok()
            })
            .collect();
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Bucket, Distribution};
    use chrono::Utc;

    fn key(year: i32, category: &str) -> DistributionKey {
        DistributionKey::new(year, Category::parse(category).unwrap()).unwrap()
    }

    fn artifact(key: &DistributionKey, count: u64) -> CanonicalArtifact {
        let d = Distribution::from_buckets(key.clone(), vec![Bucket::new(650, count)], None);
        CanonicalArtifact::from_distribution(&d, Utc::now())
    }

    #[tokio::test]
    async fn test_revisions_increase_per_key() {
        let store = SqliteStore::in_memory().await.unwrap();
        let general = key(2024, "");
        let obc = key(2024, "OBC");

        assert_eq!(store.save(&general, &artifact(&general, 1)).await.unwrap().revision, 1);
        assert_eq!(store.save(&general, &artifact(&general, 2)).await.unwrap().revision, 2);
        assert_eq!(store.save(&obc, &artifact(&obc, 3)).await.unwrap().revision, 1);

        let loaded = store.load(&general).await.unwrap().unwrap();
        assert_eq!(loaded.revision, 2);
        assert_eq!(loaded.payload["buckets"][0]["count"], 2);
        assert_eq!(store.revision(&obc).await.unwrap(), Some(1));
    }

    #[tokio::test]
    async fn test_list_and_delete() {
        let store = SqliteStore::in_memory().await.unwrap();
        for k in [key(2024, "SC"), key(2023, ""), key(2024, "")] {
            store.save(&k, &artifact(&k, 1)).await.unwrap();
        }
        assert_eq!(
            store.list().await.unwrap(),
            vec![key(2023, ""), key(2024, ""), key(2024, "SC")]
        );

        assert!(store.delete(&key(2024, "SC")).await.unwrap());
        assert!(!store.delete(&key(2024, "SC")).await.unwrap());
        assert!(store.load(&key(2024, "SC")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_location_names_key() {
        let store = SqliteStore::in_memory().await.unwrap();
        let k = key(2025, "ews");
        let receipt = store.save(&k, &artifact(&k, 1)).await.unwrap();
        assert_eq!(receipt.location, "sqlite:distributions/2025/EWS");
    }
}
