//! Marquee cache system
//!
//! - [`TtlCache`]: namespaced, versioned entries with caller-supplied expiry,
//!   backed by a [`CacheStorage`] (in-memory or one file per key).
//! - [`SearchCache`]: bounded per-user search results with a fixed TTL.
//!
//! Both are constructed explicitly and handed to the services that own them.

mod config;
mod keys;
mod lock;
mod search;
mod storage;
mod ttl;

pub use config::{CacheConfig, SearchCacheConfig};
pub use keys::{SearchKey, metadata_key, normalize_query};
pub use search::SearchCache;
pub(crate) use search::{METRIC_SEARCH_CACHE_EVICT, METRIC_SEARCH_CACHE_HIT, METRIC_SEARCH_CACHE_MISS};
pub use storage::{CacheStorage, FileStorage, MemoryStorage, StorageError};
pub use ttl::{CacheEnvelope, CacheStats, TtlCache};
