//! Distribution repository
//!
//! Resolves (year, category) to a cached distribution, reading through to the
//! backing store on a miss. Category requests fall back to the general dataset
//! of the same year; the year itself is never substituted.

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::cache::{CacheEntry, DistributionCache};
use crate::model::{validate_year, Category, Distribution, DistributionKey, MatchedDataset};
use crate::normalize::normalize;
use crate::store::DistributionStore;
use crate::{Error, Result};

/// Loads retried when the store changes underneath a load
const MAX_LOAD_ATTEMPTS: usize = 3;

/// Outcome of a fallback lookup
#[derive(Debug, Clone)]
pub struct Resolved {
    pub entry: Arc<CacheEntry>,
    pub matched: MatchedDataset,
}

impl Resolved {
    pub fn distribution(&self) -> &Distribution {
        &self.entry.distribution
    }
}

/// Read-through access to stored distributions
#[derive(Clone)]
pub struct DistributionRepository {
    store: Arc<dyn DistributionStore>,
    cache: Arc<DistributionCache>,
}

impl DistributionRepository {
    pub fn new(store: Arc<dyn DistributionStore>, cache: Arc<DistributionCache>) -> Self {
        Self { store, cache }
    }

    pub fn cache(&self) -> &Arc<DistributionCache> {
        &self.cache
    }

    pub fn store(&self) -> &Arc<dyn DistributionStore> {
        &self.store
    }

    /// Resolve with category → general fallback.
    ///
    /// A store failure on the category tier is returned as-is rather than
    /// answered from the general dataset.
    pub async fn resolve(&self, year: i32, category: &Category) -> Result<Resolved> {
        validate_year(year)?;

        if !category.is_general() {
            let key = DistributionKey::new(year, category.clone())?;
            if let Some(entry) = self.fetch(&key).await? {
                return Ok(Resolved {
                    entry,
                    matched: MatchedDataset::Category,
                });
            }
            debug!(%key, "No category dataset, falling back to general");
        }

        let general = DistributionKey::general(year)?;
        match self.fetch(&general).await? {
            Some(entry) => Ok(Resolved {
                entry,
                matched: MatchedDataset::General,
            }),
            None => Err(Error::DistributionNotFound {
                year,
                category: category.clone(),
            }),
        }
    }

    /// Cached entry for exactly `key`, loading it on a miss.
    ///
    /// `Ok(None)` means the store has no artifact for `key`. Absence is
    /// never cached.
    pub async fn fetch(&self, key: &DistributionKey) -> Result<Option<Arc<CacheEntry>>> {
        if let Some(entry) = self.cache.get(key).await {
            return Ok(Some(entry));
        }

        let store = Arc::clone(&self.store);
        let cache = Arc::clone(&self.cache);
        let key = key.clone();

        // Detached: a caller that stops waiting does not cancel the load
        tokio::spawn(async move { load_into_cache(store.as_ref(), &cache, &key).await })
            .await
            .map_err(|e| Error::Internal(format!("Distribution load task failed: {}", e)))?
    }

    /// Every key the backing store holds
    pub async fn available(&self) -> Result<Vec<DistributionKey>> {
        self.store.list().await
    }

    /// Load every stored distribution into the cache.
    ///
    /// Unloadable artifacts are logged and skipped. Returns the number loaded.
    pub async fn warm(&self) -> Result<usize> {
        let keys = self.store.list().await?;
        let mut loaded = 0;
        for key in &keys {
            match self.fetch(key).await {
                Ok(Some(entry)) => {
                    loaded += 1;
                    info!(
                        %key,
                        buckets = entry.distribution.buckets().len(),
                        total = entry.distribution.total_candidates(),
                        "Loaded distribution"
                    );
                }
                Ok(None) => {}
                Err(e) => warn!(%key, "Failed to load distribution: {}", e),
            }
        }
        info!(loaded, stored = keys.len(), "Distribution cache warmed");
        Ok(loaded)
    }
}

async fn load_into_cache(
    store: &dyn DistributionStore,
    cache: &DistributionCache,
    key: &DistributionKey,
) -> Result<Option<Arc<CacheEntry>>> {
    for attempt in 1..=MAX_LOAD_ATTEMPTS {
        let ticket = cache.ticket(key).await;

        let Some(stored) = store.load(key).await? else {
            return Ok(None);
        };

        let normalized = normalize(&stored.payload)?;
        if normalized.discarded > 0 {
            warn!(%key, discarded = normalized.discarded, "Stored distribution has unusable entries");
        }
        let distribution = Arc::new(normalized.into_distribution(key.clone()));

        // A write that landed during the load makes this read stale
        let current = store.revision(key).await?;
        if current != Some(stored.revision) {
            debug!(%key, attempt, "Store revision moved during load, retrying");
            continue;
        }

        match cache.populate(ticket, distribution, stored.revision).await {
            Some(entry) => return Ok(Some(entry)),
            None => debug!(%key, attempt, "Invalidated during load, retrying"),
        }
    }

    Err(Error::Store(format!(
        "Distribution {} kept changing during load",
        key
    )))
}
