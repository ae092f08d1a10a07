//! Cache configuration.
//!
//! Both caches are constructed from explicit configuration; nothing here is global.

use std::{num::NonZeroUsize, time::Duration};

const DEFAULT_NAMESPACE: &str = "douban-";
const DEFAULT_VERSION: &str = "1.0.0";
const DEFAULT_TTL_SECS: u64 = 2 * 60 * 60;
const DEFAULT_SEARCH_CAPACITY: usize = 100;
const DEFAULT_SEARCH_TTL_SECS: u64 = 5 * 60;

/// Configuration for a namespaced, versioned [`TtlCache`](super::TtlCache).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Prefix applied to every key; bulk operations only touch keys carrying it.
    pub namespace: String,
    /// Entries written under another version are treated as absent.
    pub version: String,
    /// Expiry used by callers that have no view-specific TTL.
    pub default_ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            version: DEFAULT_VERSION.to_string(),
            default_ttl: Duration::from_secs(DEFAULT_TTL_SECS),
        }
    }
}

impl CacheConfig {
    pub fn new(namespace: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            version: version.into(),
            ..Self::default()
        }
    }

    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }
}

/// Configuration for the per-user search result cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchCacheConfig {
    /// Maximum number of entries kept.
    pub capacity: usize,
    /// Fixed freshness window.
    pub ttl: Duration,
}

impl Default for SearchCacheConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_SEARCH_CAPACITY,
            ttl: Duration::from_secs(DEFAULT_SEARCH_TTL_SECS),
        }
    }
}

impl SearchCacheConfig {
    /// Returns the capacity as NonZeroUsize, clamping to 1 if zero.
    pub fn capacity_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.capacity).unwrap_or(NonZeroUsize::MIN)
    }
}
