//! Metadata retrieval: catalog listings, recommendations and details from the
//! film metadata provider, plus the anime airing calendar.
//!
//! Every view follows the same path: cache check, proxy routing, HTTP call
//! (with backoff for the low-volume lookups), normalization, cache write. On
//! failure listing-class views also emit a notification.

mod normalize;
mod requests;

use std::{fmt, sync::Arc, time::Duration};

use metrics::counter;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

use crate::{
    cache::{CacheConfig, CacheStats, CacheStorage, TtlCache, metadata_key},
    domain::{
        metadata::{
            AnimeSubject, CalendarDay, CategoryQuery, MetadataDetail, MetadataResult,
            RecommendQuery, TagListQuery,
        },
        proxy::{ProviderEndpoints, ProxyConfig, ProxyError},
    },
};

use super::{
    notify::ErrorNotifier,
    ports::{FetchError, FetchedBody, UpstreamFetch},
    retry::{RetryPolicy, retry_with_backoff},
};

pub(crate) const METRIC_METADATA_CACHE_HIT: &str = "marquee_metadata_cache_hit_total";
pub(crate) const METRIC_METADATA_CACHE_MISS: &str = "marquee_metadata_cache_miss_total";
pub(crate) const METRIC_METADATA_FAILURE: &str = "marquee_metadata_failure_total";

pub const DOUBAN_NAMESPACE: &str = "douban-";
pub const ANIME_NAMESPACE: &str = "bangumi-";
const IMAGE_HOST: &str = "doubanio.com";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum View {
    Categories,
    Lists,
    Recommends,
    Details,
    AnimeCalendar,
    AnimeSubject,
}

impl View {
    /// First segment of the cache key; also the metric label.
    pub fn cache_prefix(self) -> &'static str {
        match self {
            View::Categories => "categories",
            View::Lists => "lists",
            View::Recommends => "recommends",
            View::Details => "details",
            View::AnimeCalendar => "calendar",
            View::AnimeSubject => "subject",
        }
    }

    /// Only the low-volume lookups are retried.
    fn retries(self) -> bool {
        matches!(self, View::Details | View::AnimeCalendar | View::AnimeSubject)
    }

    fn notifies(self) -> bool {
        matches!(
            self,
            View::Categories | View::Lists | View::Recommends | View::AnimeCalendar
        )
    }

    fn is_anime(self) -> bool {
        matches!(self, View::AnimeCalendar | View::AnimeSubject)
    }

    fn failure_message(self) -> &'static str {
        match self {
            View::Categories => "Failed to load douban categories",
            View::Lists => "Failed to load douban list",
            View::Recommends => "Failed to load douban recommendations",
            View::Details => "Failed to load douban details",
            View::AnimeCalendar => "Failed to load anime calendar",
            View::AnimeSubject => "Failed to load anime details",
        }
    }
}

impl fmt::Display for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.cache_prefix())
    }
}

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("{view} request failed")]
    Fetch {
        view: View,
        #[source]
        source: FetchError,
    },
    #[error("{view} payload could not be normalized")]
    Malformed {
        view: View,
        #[source]
        source: serde_json::Error,
    },
    #[error(transparent)]
    Proxy(#[from] ProxyError),
    #[error("image host `{0}` is not relayed")]
    ImageHost(String),
}

impl MetadataError {
    /// Upstream HTTP status, when the provider answered at all.
    pub fn upstream_status(&self) -> Option<u16> {
        match self {
            MetadataError::Fetch { source, .. } => source.status(),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            MetadataError::Fetch {
                source: FetchError::Timeout { .. },
                ..
            }
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetadataTtls {
    pub details: Duration,
    pub listings: Duration,
    pub anime: Duration,
}

impl Default for MetadataTtls {
    fn default() -> Self {
        Self {
            details: Duration::from_secs(4 * 60 * 60),
            listings: Duration::from_secs(2 * 60 * 60),
            anime: Duration::from_secs(60 * 60),
        }
    }
}

impl MetadataTtls {
    pub fn for_view(&self, view: View) -> Duration {
        match view {
            View::Details => self.details,
            View::Categories | View::Lists | View::Recommends => self.listings,
            View::AnimeCalendar | View::AnimeSubject => self.anime,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MetadataSettings {
    pub request_timeout: Duration,
    pub retry: RetryPolicy,
    pub ttls: MetadataTtls,
    pub cache_version: String,
    pub anime_base: Url,
}

impl MetadataSettings {
    pub fn new(anime_base: Url) -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            retry: RetryPolicy::default(),
            ttls: MetadataTtls::default(),
            cache_version: CacheConfig::default().version,
            anime_base,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetadataCacheStats {
    pub douban: CacheStats,
    pub bangumi: CacheStats,
}

pub struct MetadataClient {
    fetch: Arc<dyn UpstreamFetch>,
    douban_cache: TtlCache,
    anime_cache: TtlCache,
    notifier: Arc<dyn ErrorNotifier>,
    endpoints: ProviderEndpoints,
    settings: MetadataSettings,
}

impl MetadataClient {
    pub fn new(
        fetch: Arc<dyn UpstreamFetch>,
        storage: Arc<dyn CacheStorage>,
        notifier: Arc<dyn ErrorNotifier>,
        endpoints: ProviderEndpoints,
        settings: MetadataSettings,
    ) -> Self {
        let douban_cache = TtlCache::new(
            CacheConfig::new(DOUBAN_NAMESPACE, settings.cache_version.clone())
                .with_default_ttl(settings.ttls.listings),
            Arc::clone(&storage),
        );
        let anime_cache = TtlCache::new(
            CacheConfig::new(ANIME_NAMESPACE, settings.cache_version.clone())
                .with_default_ttl(settings.ttls.anime),
            storage,
        );
        Self {
            fetch,
            douban_cache,
            anime_cache,
            notifier,
            endpoints,
            settings,
        }
    }

    pub fn settings(&self) -> &MetadataSettings {
        &self.settings
    }

    pub async fn categories(
        &self,
        query: &CategoryQuery,
        proxy: &ProxyConfig,
    ) -> Result<MetadataResult, MetadataError> {
        let request = requests::categories(query);
        self.load_provider_view(request, proxy, normalize::categories)
            .await
    }

    pub async fn tag_list(
        &self,
        query: &TagListQuery,
        proxy: &ProxyConfig,
    ) -> Result<MetadataResult, MetadataError> {
        let request = requests::tag_list(query);
        self.load_provider_view(request, proxy, normalize::tag_list)
            .await
    }

    pub async fn recommendations(
        &self,
        query: &RecommendQuery,
        proxy: &ProxyConfig,
    ) -> Result<MetadataResult, MetadataError> {
        let request = requests::recommendations(query);
        self.load_provider_view(request, proxy, normalize::recommendations)
            .await
    }

    /// Detail lookups always go straight from the server to the provider origin.
    pub async fn detail(&self, id: &str) -> Result<MetadataDetail, MetadataError> {
        let request = requests::detail(id);
        self.load_provider_view(request, &ProxyConfig::direct(), normalize::detail)
            .await
    }

    pub async fn anime_calendar(&self) -> Result<Vec<CalendarDay>, MetadataError> {
        self.load(
            View::AnimeCalendar,
            "calendar",
            || self.anime_url("calendar"),
            normalize::calendar,
        )
        .await
    }

    pub async fn anime_subject(&self, id: u64) -> Result<AnimeSubject, MetadataError> {
        let cache_key = metadata_key("details", &[("id", id.to_string())]);
        self.load(
            View::AnimeSubject,
            &cache_key,
            || self.anime_url(&format!("subject/{id}")),
            serde_json::from_value,
        )
        .await
    }

    /// Relays a provider image; other hosts are refused.
    pub async fn fetch_image(&self, raw: &str) -> Result<FetchedBody, MetadataError> {
        let url = Url::parse(raw).map_err(|_| MetadataError::ImageHost(raw.to_string()))?;
        let host = url.host_str().unwrap_or_default();
        let allowed = host == IMAGE_HOST || host.ends_with(&format!(".{IMAGE_HOST}"));
        if !allowed {
            return Err(MetadataError::ImageHost(host.to_string()));
        }
        self.fetch
            .get_bytes(url, self.settings.request_timeout)
            .await
            .map_err(|source| MetadataError::Fetch {
                view: View::Details,
                source,
            })
    }

    pub fn cache_stats(&self) -> MetadataCacheStats {
        MetadataCacheStats {
            douban: self.douban_cache.stats(),
            bangumi: self.anime_cache.stats(),
        }
    }

    pub fn clear_cache(&self) -> usize {
        let removed = self.douban_cache.clear() + self.anime_cache.clear();
        info!(removed, "metadata cache cleared");
        removed
    }

    pub fn clean_expired(&self, max_age: Duration) -> usize {
        self.douban_cache.clean_expired(max_age) + self.anime_cache.clean_expired(max_age)
    }

    fn anime_url(&self, path: &str) -> Result<Url, MetadataError> {
        self.settings.anime_base.join(path).map_err(|source| {
            MetadataError::Proxy(ProxyError::InvalidUrl {
                url: format!("{}{path}", self.settings.anime_base),
                source,
            })
        })
    }

    async fn load_provider_view<T, N>(
        &self,
        request: requests::ViewRequest,
        proxy: &ProxyConfig,
        normalize: N,
    ) -> Result<T, MetadataError>
    where
        T: Serialize + DeserializeOwned,
        N: FnOnce(Value) -> Result<T, serde_json::Error>,
    {
        let requests::ViewRequest {
            view,
            host,
            path,
            query,
            cache_key,
        } = request;
        self.load(
            view,
            &cache_key,
            || {
                proxy
                    .request_url(&self.endpoints, host, &path, &query)
                    .map_err(MetadataError::from)
            },
            normalize,
        )
        .await
    }

    async fn load<T, U, N>(
        &self,
        view: View,
        cache_key: &str,
        target: U,
        normalize: N,
    ) -> Result<T, MetadataError>
    where
        T: Serialize + DeserializeOwned,
        U: FnOnce() -> Result<Url, MetadataError>,
        N: FnOnce(Value) -> Result<T, serde_json::Error>,
    {
        let cache = if view.is_anime() {
            &self.anime_cache
        } else {
            &self.douban_cache
        };

        if let Some(hit) = cache.get::<T>(cache_key, self.settings.ttls.for_view(view)) {
            counter!(METRIC_METADATA_CACHE_HIT, "view" => view.cache_prefix()).increment(1);
            debug!(%view, cache_key, "metadata cache hit");
            return Ok(hit);
        }
        counter!(METRIC_METADATA_CACHE_MISS, "view" => view.cache_prefix()).increment(1);

        match self.fetch_view(view, target, normalize).await {
            Ok(value) => {
                cache.set(cache_key, &value);
                Ok(value)
            }
            Err(err) => {
                counter!(METRIC_METADATA_FAILURE, "view" => view.cache_prefix()).increment(1);
                warn!(%view, cache_key, error = %err, "metadata request failed");
                if view.notifies() {
                    self.notifier.notify(view.failure_message());
                }
                Err(err)
            }
        }
    }

    async fn fetch_view<T, U, N>(&self, view: View, target: U, normalize: N) -> Result<T, MetadataError>
    where
        U: FnOnce() -> Result<Url, MetadataError>,
        N: FnOnce(Value) -> Result<T, serde_json::Error>,
    {
        let url = target()?;
        let policy = if view.retries() {
            self.settings.retry
        } else {
            RetryPolicy::none()
        };
        let timeout = self.settings.request_timeout;

        let payload = retry_with_backoff(policy, view.cache_prefix(), || {
            self.fetch.get_json(url.clone(), timeout)
        })
        .await
        .map_err(|source| MetadataError::Fetch { view, source })?;

        normalize(payload).map_err(|source| MetadataError::Malformed { view, source })
    }
}
