//! Bounded, per-user search result cache.
//!
//! Reads use `peek` so the eviction order stays insertion/refresh order: once
//! the capacity is exceeded the entry written longest ago goes first. Every
//! write also purges entries older than the TTL.

use std::sync::{Arc, Mutex};

use lru::LruCache;
use metrics::counter;
use tokio::time::Instant;
use tracing::debug;

use crate::domain::search::SearchResultItem;

use super::config::SearchCacheConfig;
use super::keys::SearchKey;
use super::lock::mutex_lock;

const SOURCE: &str = "cache::search";

pub(crate) const METRIC_SEARCH_CACHE_HIT: &str = "marquee_search_cache_hit_total";
pub(crate) const METRIC_SEARCH_CACHE_MISS: &str = "marquee_search_cache_miss_total";
pub(crate) const METRIC_SEARCH_CACHE_EVICT: &str = "marquee_search_cache_evict_total";

#[derive(Debug, Clone)]
struct SearchCacheEntry {
    results: Arc<[SearchResultItem]>,
    stored_at: Instant,
}

pub struct SearchCache {
    config: SearchCacheConfig,
    entries: Mutex<LruCache<SearchKey, SearchCacheEntry>>,
}

impl SearchCache {
    pub fn new(config: SearchCacheConfig) -> Self {
        let entries = Mutex::new(LruCache::new(config.capacity_non_zero()));
        Self { config, entries }
    }

    pub fn config(&self) -> &SearchCacheConfig {
        &self.config
    }

    fn is_fresh(&self, entry: &SearchCacheEntry, now: Instant) -> bool {
        now.saturating_duration_since(entry.stored_at) < self.config.ttl
    }

    pub fn get(&self, key: &SearchKey) -> Option<Arc<[SearchResultItem]>> {
        let now = Instant::now();
        let mut entries = mutex_lock(&self.entries, SOURCE, "get");
        let lookup = entries
            .peek(key)
            .map(|entry| self.is_fresh(entry, now).then(|| Arc::clone(&entry.results)));
        let hit = match lookup {
            Some(Some(results)) => Some(results),
            Some(None) => {
                entries.pop(key);
                None
            }
            None => None,
        };
        drop(entries);

        if hit.is_some() {
            counter!(METRIC_SEARCH_CACHE_HIT).increment(1);
        } else {
            counter!(METRIC_SEARCH_CACHE_MISS).increment(1);
        }
        hit
    }

    /// Stores `results` for `key`, refreshing its timestamp if already present.
    pub fn insert(&self, key: SearchKey, results: Arc<[SearchResultItem]>) {
        let now = Instant::now();
        let mut entries = mutex_lock(&self.entries, SOURCE, "insert");

        let expired: Vec<SearchKey> = entries
            .iter()
            .filter(|(_, entry)| !self.is_fresh(entry, now))
            .map(|(key, _)| key.clone())
            .collect();
        for stale in &expired {
            entries.pop(stale);
        }

        let evicted = entries
            .push(
                key.clone(),
                SearchCacheEntry {
                    results,
                    stored_at: now,
                },
            )
            .filter(|(previous, _)| *previous != key);
        drop(entries);

        if let Some((evicted, _)) = evicted {
            counter!(METRIC_SEARCH_CACHE_EVICT).increment(1);
            debug!(
                target_module = SOURCE,
                username = evicted.username(),
                query = evicted.query(),
                "Evicted oldest search cache entry"
            );
        }
        if !expired.is_empty() {
            debug!(target_module = SOURCE, purged = expired.len(), "Purged expired search cache entries");
        }
    }

    pub fn contains(&self, key: &SearchKey) -> bool {
        mutex_lock(&self.entries, SOURCE, "contains").contains(key)
    }

    pub fn len(&self) -> usize {
        mutex_lock(&self.entries, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        mutex_lock(&self.entries, SOURCE, "clear").clear();
    }
}
