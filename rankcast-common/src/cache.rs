//! Distribution cache
//!
//! Holds parsed distributions keyed by (year, category). Entries are immutable
//! `Arc<CacheEntry>` values: a replacement is built completely before it is
//! swapped into the map, so readers only ever see a whole entry. Entries live
//! until explicitly invalidated; there is no time-based expiry.
//!
//! Population is guarded by invalidation epochs. A loader takes a
//! [`PopulateTicket`] before reading the backing store; if the key (or the
//! whole cache) is invalidated before the loader publishes, the publish is
//! rejected and the stale result never becomes visible.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::model::{Distribution, DistributionKey};

/// Invalidation capability handed to the ingestion gate
#[async_trait]
pub trait Invalidate: Send + Sync {
    /// Drop the entry for exactly one (year, category)
    async fn invalidate(&self, key: &DistributionKey);

    /// Drop every entry
    async fn invalidate_all(&self);
}

/// One cached distribution
#[derive(Debug)]
pub struct CacheEntry {
    pub key: DistributionKey,
    pub distribution: Arc<Distribution>,
    /// Cache-assigned, strictly increasing across all populations
    pub version: u64,
    /// Backing store revision the distribution was loaded from
    pub revision: u64,
    pub loaded_at: DateTime<Utc>,
}

/// Epoch snapshot taken before a load begins
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PopulateTicket {
    key_epoch: u64,
    global_epoch: u64,
}

/// Counters exposed through the admin API
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub populations: u64,
    pub rejected_populations: u64,
    pub invalidations: u64,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<DistributionKey, Arc<CacheEntry>>,
    epochs: HashMap<DistributionKey, u64>,
    global_epoch: u64,
}

impl CacheState {
    fn ticket(&self, key: &DistributionKey) -> PopulateTicket {
        PopulateTicket {
            key_epoch: self.epochs.get(key).copied().unwrap_or(0),
            global_epoch: self.global_epoch,
        }
    }
}

/// Shared cache of normalized distributions
///
/// Constructed once at startup and shared by `Arc` with the repository and
/// the ingestion gate.
pub struct DistributionCache {
    state: RwLock<CacheState>,
    next_version: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    populations: AtomicU64,
    rejected_populations: AtomicU64,
    invalidations: AtomicU64,
}

impl DistributionCache {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(CacheState::default()),
            next_version: AtomicU64::new(1),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            populations: AtomicU64::new(0),
            rejected_populations: AtomicU64::new(0),
            invalidations: AtomicU64::new(0),
        }
    }

    /// Current entry for `key`, or `None` on a miss
    pub async fn get(&self, key: &DistributionKey) -> Option<Arc<CacheEntry>> {
        let entry = self.state.read().await.entries.get(key).cloned();
        let counter = if entry.is_some() { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);
        entry
    }

    /// Snapshot the invalidation epochs for `key` before loading it
    pub async fn ticket(&self, key: &DistributionKey) -> PopulateTicket {
        self.state.read().await.ticket(key)
    }

    /// Publish a freshly loaded distribution.
    ///
    /// Returns `None` when `key` was invalidated after `ticket` was taken.
    pub async fn populate(
        &self,
        ticket: PopulateTicket,
        distribution: Arc<Distribution>,
        revision: u64,
    ) -> Option<Arc<CacheEntry>> {
        let key = distribution.key().clone();
        let entry = Arc::new(CacheEntry {
            key: key.clone(),
            distribution,
            version: self.next_version.fetch_add(1, Ordering::Relaxed),
            revision,
            loaded_at: Utc::now(),
        });

        let mut state = self.state.write().await;
        if state.ticket(&key) != ticket {
            drop(state);
            self.rejected_populations.fetch_add(1, Ordering::Relaxed);
            debug!(%key, "Rejected population of invalidated key");
            return None;
        }
        state.entries.insert(key.clone(), Arc::clone(&entry));
        drop(state);

        self.populations.fetch_add(1, Ordering::Relaxed);
        debug!(%key, version = entry.version, revision, "Cache populated");
        Some(entry)
    }

    /// Cached keys, sorted
    pub async fn keys(&self) -> Vec<DistributionKey> {
        let mut keys: Vec<_> = self.state.read().await.entries.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.len().await,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            populations: self.populations.load(Ordering::Relaxed),
            rejected_populations: self.rejected_populations.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
        }
    }
}

impl Default for DistributionCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Invalidate for DistributionCache {
    async fn invalidate(&self, key: &DistributionKey) {
        let mut state = self.state.write().await;
        let removed = state.entries.remove(key).is_some();
        *state.epochs.entry(key.clone()).or_insert(0) += 1;
        drop(state);

        self.invalidations.fetch_add(1, Ordering::Relaxed);
        info!(%key, removed, "Cache entry invalidated");
    }

    async fn invalidate_all(&self) {
        let mut state = self.state.write().await;
        let removed = state.entries.len();
        state.entries.clear();
        state.global_epoch += 1;
        drop(state);

        self.invalidations.fetch_add(1, Ordering::Relaxed);
        info!(removed, "All cache entries invalidated");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Bucket, Category};

    fn key(year: i32, category: &str) -> DistributionKey {
        DistributionKey::new(year, Category::parse(category).unwrap()).unwrap()
    }

    fn distribution(key: &DistributionKey, count: u64) -> Arc<Distribution> {
        Arc::new(Distribution::from_buckets(
            key.clone(),
            vec![Bucket::new(700, count)],
            None,
        ))
    }

    #[tokio::test]
    async fn test_miss_then_hit() {
        let cache = DistributionCache::new();
        let k = key(2024, "");
        assert!(cache.get(&k).await.is_none());

        let ticket = cache.ticket(&k).await;
        let entry = cache.populate(ticket, distribution(&k, 10), 1).await.unwrap();
        let hit = cache.get(&k).await.unwrap();
        assert!(Arc::ptr_eq(&entry, &hit));

        let stats = cache.stats().await;
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.populations, 1);
        assert_eq!(stats.entries, 1);
    }

    #[tokio::test]
    async fn test_versions_increase() {
        let cache = DistributionCache::new();
        let k = key(2024, "");
        let first = cache.populate(cache.ticket(&k).await, distribution(&k, 1), 1).await.unwrap();
        let second = cache.populate(cache.ticket(&k).await, distribution(&k, 2), 2).await.unwrap();
        assert!(second.version > first.version);
        assert_eq!(cache.get(&k).await.unwrap().distribution.total_candidates(), 2);
    }

    #[tokio::test]
    async fn test_reader_keeps_old_entry_across_replacement() {
        let cache = DistributionCache::new();
        let k = key(2024, "");
        cache.populate(cache.ticket(&k).await, distribution(&k, 1), 1).await;
        let held = cache.get(&k).await.unwrap();

        cache.invalidate(&k).await;
        cache.populate(cache.ticket(&k).await, distribution(&k, 99), 2).await;

        assert_eq!(held.distribution.total_candidates(), 1);
        assert_eq!(cache.get(&k).await.unwrap().distribution.total_candidates(), 99);
    }

    #[tokio::test]
    async fn test_invalidation_rejects_in_flight_population() {
        let cache = DistributionCache::new();
        let k = key(2024, "OBC");

        let stale_ticket = cache.ticket(&k).await;
        cache.invalidate(&k).await;
        assert!(cache.populate(stale_ticket, distribution(&k, 1), 1).await.is_none());
        assert!(cache.get(&k).await.is_none());
        assert_eq!(cache.stats().await.rejected_populations, 1);

        let fresh = cache.ticket(&k).await;
        assert!(cache.populate(fresh, distribution(&k, 1), 2).await.is_some());
    }

    #[tokio::test]
    async fn test_invalidate_all_rejects_in_flight_population() {
        let cache = DistributionCache::new();
        let k = key(2024, "");
        let stale_ticket = cache.ticket(&k).await;
        cache.invalidate_all().await;
        assert!(cache.populate(stale_ticket, distribution(&k, 1), 1).await.is_none());
    }

    #[tokio::test]
    async fn test_category_and_general_keys_are_independent() {
        let cache = DistributionCache::new();
        let general = key(2024, "");
        let obc = key(2024, "OBC");
        cache.populate(cache.ticket(&general).await, distribution(&general, 1), 1).await;
        cache.populate(cache.ticket(&obc).await, distribution(&obc, 2), 1).await;

        cache.invalidate(&obc).await;
        assert!(cache.get(&general).await.is_some());
        assert!(cache.get(&obc).await.is_none());

        cache.populate(cache.ticket(&obc).await, distribution(&obc, 2), 2).await;
        cache.invalidate(&general).await;
        assert!(cache.get(&obc).await.is_some());
        assert!(cache.get(&general).await.is_none());

        // Invalidating one key leaves the other key's tickets valid
        let obc_ticket = cache.ticket(&obc).await;
        cache.invalidate(&general).await;
        assert!(cache.populate(obc_ticket, distribution(&obc, 3), 3).await.is_some());
    }

    #[tokio::test]
    async fn test_invalidate_all_clears_everything() {
        let cache = DistributionCache::new();
        for year in [2022, 2023, 2024] {
            let k = key(year, "");
            cache.populate(cache.ticket(&k).await, distribution(&k, 1), 1).await;
        }
        assert_eq!(cache.keys().await.len(), 3);
        cache.invalidate_all().await;
        assert!(cache.is_empty().await);
    }
}
