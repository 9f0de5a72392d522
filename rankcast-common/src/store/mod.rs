//! Backing stores for canonical distribution artifacts
//!
//! One artifact per (year, category). The store is the durable source of
//! truth; the cache only ever holds what was read from here. A missing
//! category artifact is not an error: it is the signal to fall back to the
//! general dataset.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use crate::config::{StoreBackend, TomlConfig};
use crate::model::{Bucket, Distribution, DistributionKey};
use crate::Result;

mod file;
#[cfg(feature = "sqlx")]
mod sqlite;
mod watch;

pub use file::{ArtifactFormat, FileStore};
pub use watch::{key_for_path, DirectoryWatcher};
#[cfg(feature = "sqlx")]
pub use sqlite::SqliteStore;

/// Raw artifact as read from the store
#[derive(Debug, Clone, PartialEq)]
pub struct StoredPayload {
    pub payload: Value,
    pub revision: u64,
}

/// Where and at which revision a save landed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoreReceipt {
    pub location: String,
    pub revision: u64,
}

/// Canonical on-store representation of a distribution
#[derive(Debug, Clone, Serialize)]
pub struct CanonicalArtifact {
    pub year: i32,
    pub category: String,
    pub stored_at: String,
    /// Only written when the total was supplied explicitly
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_candidates: Option<u64>,
    pub buckets: Vec<Bucket>,
}

impl CanonicalArtifact {
    pub fn from_distribution(distribution: &Distribution, stored_at: DateTime<Utc>) -> Self {
        Self {
            year: distribution.year(),
            category: distribution.category().to_string(),
            stored_at: stored_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            total_candidates: distribution
                .total_is_explicit()
                .then(|| distribution.total_candidates()),
            buckets: distribution.buckets().to_vec(),
        }
    }
}

/// Durable storage of distribution artifacts
#[async_trait]
pub trait DistributionStore: Send + Sync {
    /// Human-readable location for logs
    fn describe(&self) -> String;

    /// Artifact for `key`, or `None` if it does not exist
    async fn load(&self, key: &DistributionKey) -> Result<Option<StoredPayload>>;

    /// Current revision for `key` without reading the artifact
    async fn revision(&self, key: &DistributionKey) -> Result<Option<u64>>;

    /// Replace the artifact for `key` atomically
    async fn save(&self, key: &DistributionKey, artifact: &CanonicalArtifact) -> Result<StoreReceipt>;

    /// Remove the artifact for `key`; `false` if there was none
    async fn delete(&self, key: &DistributionKey) -> Result<bool>;

    /// Every stored key, sorted
    async fn list(&self) -> Result<Vec<DistributionKey>>;
}

/// Open the store selected by `config` under `data_dir`
pub async fn open_store(config: &TomlConfig, data_dir: &Path) -> Result<Arc<dyn DistributionStore>> {
    let store: Arc<dyn DistributionStore> = match config.store {
        StoreBackend::File => Arc::new(FileStore::open(data_dir).await?),
        #[cfg(feature = "sqlx")]
        StoreBackend::Sqlite => Arc::new(SqliteStore::open(&config.sqlite_path(data_dir)).await?),
        #[cfg(not(feature = "sqlx"))]
        StoreBackend::Sqlite => {
            return Err(crate::Error::Config(
                "SQLite store requested but built without the sqlx feature".to_string(),
            ))
        }
    };
    info!("Using {}", store.describe());
    Ok(store)
}
