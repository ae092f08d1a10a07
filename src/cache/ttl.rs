//! Namespaced, versioned TTL cache over a [`CacheStorage`] backend.
//!
//! Entries are stored as `{"data": .., "timestamp": <unix ms>, "version": ".."}`.
//! An entry is served only while its version matches and it is younger than the
//! caller-supplied expiry. Payloads that fail to decode are removed and reported
//! as a miss.

use std::{collections::BTreeMap, sync::Arc, time::Duration};

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use time::OffsetDateTime;
use tracing::{debug, warn};

use super::config::CacheConfig;
use super::storage::CacheStorage;

const SOURCE: &str = "cache::ttl";

#[derive(Debug, Serialize, Deserialize)]
pub struct CacheEnvelope<T> {
    pub data: T,
    pub timestamp: i64,
    pub version: String,
}

#[derive(Deserialize)]
struct EnvelopeHeader {
    timestamp: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub total_items: usize,
    /// Sum of serialized payload lengths in bytes.
    pub total_size: usize,
    pub by_prefix: BTreeMap<String, usize>,
}

pub(crate) fn now_ms() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

fn duration_ms(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

/// Groups a namespaced key by its first `-`/`_` delimited segment.
fn prefix_group(namespace: &str, key: &str) -> String {
    let rest = key.strip_prefix(namespace).unwrap_or(key);
    rest.split(['-', '_'])
        .next()
        .unwrap_or_default()
        .to_string()
}

pub struct TtlCache {
    config: CacheConfig,
    storage: Arc<dyn CacheStorage>,
}

impl TtlCache {
    pub fn new(config: CacheConfig, storage: Arc<dyn CacheStorage>) -> Self {
        Self { config, storage }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    fn storage_key(&self, key: &str) -> String {
        format!("{}{key}", self.config.namespace)
    }

    fn namespaced_keys(&self, op: &'static str) -> Vec<String> {
        match self.storage.keys() {
            Ok(keys) => keys
                .into_iter()
                .filter(|key| key.starts_with(&self.config.namespace))
                .collect(),
            Err(err) => {
                warn!(target_module = SOURCE, op, error = %err, "Failed to list cache keys");
                Vec::new()
            }
        }
    }

    fn discard(&self, storage_key: &str, op: &'static str) -> bool {
        match self.storage.remove_item(storage_key) {
            Ok(()) => true,
            Err(err) => {
                warn!(target_module = SOURCE, op, key = storage_key, error = %err, "Failed to remove cache entry");
                false
            }
        }
    }

    /// Returns the stored value while it is current and younger than `expire`.
    pub fn get<T: DeserializeOwned>(&self, key: &str, expire: Duration) -> Option<T> {
        let storage_key = self.storage_key(key);
        let raw = match self.storage.get_item(&storage_key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(err) => {
                warn!(target_module = SOURCE, op = "get", key = %storage_key, error = %err, "Cache read failed");
                return None;
            }
        };

        let envelope: CacheEnvelope<T> = match serde_json::from_str(&raw) {
            Ok(envelope) => envelope,
            Err(err) => {
                warn!(target_module = SOURCE, op = "get", key = %storage_key, error = %err, "Dropping corrupt cache entry");
                self.discard(&storage_key, "get.corrupt");
                return None;
            }
        };

        let age = now_ms().saturating_sub(envelope.timestamp);
        if envelope.version == self.config.version && age < duration_ms(expire) {
            return Some(envelope.data);
        }

        debug!(
            target_module = SOURCE,
            key = %storage_key,
            age_ms = age,
            version = %envelope.version,
            "Cache entry stale"
        );
        if self.storage.is_persistent() {
            self.discard(&storage_key, "get.stale");
        }
        None
    }

    /// Overwrites `key` with `data` stamped now. Returns false when the backend
    /// rejects the write.
    pub fn set<T: Serialize>(&self, key: &str, data: &T) -> bool {
        let storage_key = self.storage_key(key);
        let envelope = CacheEnvelope {
            data,
            timestamp: now_ms(),
            version: self.config.version.clone(),
        };
        let payload = match serde_json::to_string(&envelope) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(target_module = SOURCE, op = "set", key = %storage_key, error = %err, "Failed to encode cache entry");
                return false;
            }
        };
        match self.storage.set_item(&storage_key, &payload) {
            Ok(()) => true,
            Err(err) => {
                warn!(target_module = SOURCE, op = "set", key = %storage_key, error = %err, "Cache write failed");
                false
            }
        }
    }

    pub fn remove(&self, key: &str) {
        self.discard(&self.storage_key(key), "remove");
    }

    /// Removes every entry in this namespace. Returns the number removed.
    pub fn clear(&self) -> usize {
        self.namespaced_keys("clear")
            .iter()
            .filter(|key| self.discard(key, "clear"))
            .count()
    }

    /// Removes entries older than `max_age` as well as undecodable ones.
    pub fn clean_expired(&self, max_age: Duration) -> usize {
        let now = now_ms();
        let max_age = duration_ms(max_age);
        let mut removed = 0;
        for key in self.namespaced_keys("clean_expired") {
            let raw = match self.storage.get_item(&key) {
                Ok(Some(raw)) => raw,
                Ok(None) => continue,
                Err(err) => {
                    warn!(target_module = SOURCE, op = "clean_expired", key = %key, error = %err, "Cache read failed");
                    continue;
                }
            };
            let expired = match serde_json::from_str::<EnvelopeHeader>(&raw) {
                Ok(header) => now.saturating_sub(header.timestamp) > max_age,
                Err(_) => true,
            };
            if expired && self.discard(&key, "clean_expired") {
                removed += 1;
            }
        }
        if removed > 0 {
            debug!(target_module = SOURCE, removed, "Cleaned expired cache entries");
        }
        removed
    }

    /// Presence check only; validity is not evaluated.
    pub fn has(&self, key: &str) -> bool {
        matches!(self.storage.get_item(&self.storage_key(key)), Ok(Some(_)))
    }

    pub fn stats(&self) -> CacheStats {
        let mut stats = CacheStats::default();
        for key in self.namespaced_keys("stats") {
            let Ok(Some(raw)) = self.storage.get_item(&key) else {
                continue;
            };
            stats.total_items += 1;
            stats.total_size += raw.len();
            *stats
                .by_prefix
                .entry(prefix_group(&self.config.namespace, &key))
                .or_default() += 1;
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use serde_json::json;

    use super::*;
    use crate::cache::storage::{FileStorage, MemoryStorage, StorageError};

    const HOUR: Duration = Duration::from_secs(3600);

    fn memory_cache(namespace: &str) -> (TtlCache, Arc<MemoryStorage>) {
        let storage = Arc::new(MemoryStorage::new());
        let cache = TtlCache::new(CacheConfig::new(namespace, "1.0.0"), storage.clone());
        (cache, storage)
    }

    fn envelope(data: serde_json::Value, age: Duration, version: &str) -> String {
        json!({
            "data": data,
            "timestamp": now_ms() - duration_ms(age),
            "version": version,
        })
        .to_string()
    }

    #[test]
    fn set_then_get_returns_value() {
        let (cache, storage) = memory_cache("douban-");
        assert!(cache.set("lists-a", &vec![1, 2, 3]));
        assert_eq!(cache.get::<Vec<u32>>("lists-a", HOUR), Some(vec![1, 2, 3]));
        assert!(storage.get_item("douban-lists-a").unwrap().is_some());
    }

    #[test]
    fn expired_and_mismatched_versions_miss() {
        let (cache, storage) = memory_cache("douban-");
        storage
            .set_item("douban-old", &envelope(json!(1), Duration::from_secs(7200), "1.0.0"))
            .unwrap();
        storage
            .set_item("douban-v0", &envelope(json!(1), Duration::ZERO, "0.9.0"))
            .unwrap();

        assert_eq!(cache.get::<u32>("old", HOUR), None);
        assert_eq!(cache.get::<u32>("v0", HOUR), None);
        // Non-persistent backends keep stale entries around for `clean_expired`.
        assert!(cache.has("old"));
    }

    #[test]
    fn persistent_backend_drops_stale_entries_on_read() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(FileStorage::open(dir.path()).unwrap());
        let cache = TtlCache::new(CacheConfig::default(), storage.clone());
        storage
            .set_item("douban-old", &envelope(json!("x"), Duration::from_secs(7200), "1.0.0"))
            .unwrap();

        assert_eq!(cache.get::<String>("old", HOUR), None);
        assert!(!cache.has("old"));
    }

    #[test]
    fn persistent_backend_caches_multi_filter_recommendations() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(FileStorage::open(dir.path()).unwrap());
        let cache = TtlCache::new(CacheConfig::default(), storage);
        let key = "recommends-category=喜剧&format=电视剧&kind=tv&label=&limit=25\
                   &platform=&region=华语&sort=U&start=0&year=2020年代";

        assert!(cache.set(key, &vec!["item"]));

        assert_eq!(cache.get::<Vec<String>>(key, HOUR), Some(vec!["item".to_string()]));
        assert_eq!(cache.stats().by_prefix.get("recommends"), Some(&1));
    }

    #[test]
    fn corrupt_entries_self_heal() {
        let (cache, storage) = memory_cache("douban-");
        storage.set_item("douban-bad", "{not json").unwrap();
        storage
            .set_item("douban-shape", &envelope(json!("text"), Duration::ZERO, "1.0.0"))
            .unwrap();

        assert_eq!(cache.get::<u32>("bad", HOUR), None);
        assert!(!cache.has("bad"));
        assert_eq!(cache.get::<u32>("shape", HOUR), None);
        assert!(!cache.has("shape"));
    }

    #[test]
    fn clear_is_scoped_to_namespace() {
        let storage = Arc::new(MemoryStorage::new());
        let douban = TtlCache::new(CacheConfig::new("douban-", "1.0.0"), storage.clone());
        let bangumi = TtlCache::new(CacheConfig::new("bangumi-", "1.0.0"), storage.clone());
        douban.set("a", &1);
        douban.set("b", &2);
        bangumi.set("a", &3);

        assert_eq!(douban.clear(), 2);
        assert!(!douban.has("a"));
        assert_eq!(bangumi.get::<u32>("a", HOUR), Some(3));
    }

    #[test]
    fn clean_expired_counts_old_and_corrupt_entries() {
        let (cache, storage) = memory_cache("douban-");
        storage
            .set_item("douban-old", &envelope(json!(1), Duration::from_secs(90), "1.0.0"))
            .unwrap();
        storage.set_item("douban-bad", "garbage").unwrap();
        storage.set_item("other-old", "garbage").unwrap();
        cache.set("fresh", &1);

        assert_eq!(cache.clean_expired(Duration::from_secs(60)), 2);
        assert!(cache.has("fresh"));
        assert!(storage.get_item("other-old").unwrap().is_some());
    }

    #[test]
    fn stats_group_by_view_prefix() {
        let (cache, _storage) = memory_cache("douban-");
        cache.set("lists-tag=a&", &1);
        cache.set("lists-tag=b&", &2);
        cache.set("details_id=1&", &3);

        let stats = cache.stats();
        assert_eq!(stats.total_items, 3);
        assert!(stats.total_size > 0);
        let expected: BTreeMap<String, usize> =
            [("lists".to_string(), 2), ("details".to_string(), 1)].into_iter().collect();
        assert_eq!(stats.by_prefix, expected);
    }

    struct ReadOnlyStorage;

    impl CacheStorage for ReadOnlyStorage {
        fn get_item(&self, _key: &str) -> Result<Option<String>, StorageError> {
            Ok(None)
        }

        fn set_item(&self, key: &str, _value: &str) -> Result<(), StorageError> {
            Err(StorageError::Io {
                key: key.to_string(),
                source: std::io::Error::other("quota exceeded"),
            })
        }

        fn remove_item(&self, _key: &str) -> Result<(), StorageError> {
            Ok(())
        }

        fn keys(&self) -> Result<Vec<String>, StorageError> {
            Ok(Vec::new())
        }

        fn is_persistent(&self) -> bool {
            true
        }
    }

    #[test]
    fn rejected_writes_report_false() {
        let cache = TtlCache::new(CacheConfig::default(), Arc::new(ReadOnlyStorage));
        assert!(!cache.set("a", &HashMap::<String, u32>::new()));
        assert_eq!(cache.get::<u32>("a", HOUR), None);
    }
}
