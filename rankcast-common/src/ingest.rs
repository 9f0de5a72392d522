//! Admin ingestion gate
//!
//! The only path by which a stored distribution is created, replaced or
//! removed. An upload is validated in full, normalized, written durably, and
//! only then is the cache told to drop the stale entry.

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

use crate::cache::Invalidate;
use crate::model::{validate_year, Category, DistributionKey};
use crate::normalize::normalize;
use crate::store::{CanonicalArtifact, DistributionStore};
use crate::validate::validate_upload;
use crate::{Error, Result};

/// Result of a successful ingestion
#[derive(Debug, Clone, Serialize)]
pub struct IngestReceipt {
    pub ok: bool,
    pub year: i32,
    pub category: Category,
    pub stored_path: String,
    pub revision: u64,
    pub bucket_count: usize,
    pub total_candidates: u64,
}

/// Validates uploads and replaces stored distributions
#[derive(Clone)]
pub struct IngestionGate {
    store: Arc<dyn DistributionStore>,
    invalidator: Arc<dyn Invalidate>,
}

impl IngestionGate {
    pub fn new(store: Arc<dyn DistributionStore>, invalidator: Arc<dyn Invalidate>) -> Self {
        Self { store, invalidator }
    }

    /// Validate `payload` and store it as the distribution for (year, category).
    ///
    /// When `category` is `None` the scope comes from the payload's own
    /// `category` field (or defaults to general). Since the caller did not
    /// name the scope, every cache entry is invalidated rather than one key.
    pub async fn ingest(
        &self,
        year: i32,
        category: Option<&str>,
        payload: &Value,
    ) -> Result<IngestReceipt> {
        validate_year(year)?;
        let requested = category.map(Category::parse).transpose()?;

        let envelope = validate_upload(payload, year, requested.as_ref())?;
        let scope_stated = requested.is_some();
        let category = requested
            .or(envelope.category)
            .unwrap_or(Category::General);
        let key = DistributionKey::new(year, category)?;

        let distribution = normalize(payload)?.into_distribution(key.clone());
        let artifact = CanonicalArtifact::from_distribution(&distribution, Utc::now());

        // Nothing is invalidated unless the write is durable
        let receipt = self.store.save(&key, &artifact).await?;

        if scope_stated {
            self.invalidator.invalidate(&key).await;
        } else {
            self.invalidator.invalidate_all().await;
        }

        info!(
            %key,
            revision = receipt.revision,
            buckets = distribution.buckets().len(),
            total = distribution.total_candidates(),
            "Distribution ingested"
        );

        Ok(IngestReceipt {
            ok: true,
            year,
            category: key.category,
            stored_path: receipt.location,
            revision: receipt.revision,
            bucket_count: distribution.buckets().len(),
            total_candidates: distribution.total_candidates(),
        })
    }

    /// Remove the stored distribution for (year, category)
    pub async fn delete(&self, year: i32, category: Option<&str>) -> Result<DistributionKey> {
        let key = DistributionKey::new(year, Category::from_option(category)?)?;
        if !self.store.delete(&key).await? {
            return Err(Error::DistributionNotFound {
                year,
                category: key.category,
            });
        }
        self.invalidator.invalidate(&key).await;
        info!(%key, "Distribution deleted");
        Ok(key)
    }
}
