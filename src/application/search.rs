//! Federated search: fan a query out to every entitled source, tolerate the
//! ones that fail or stall, filter, and cache the merged list per caller.

use std::{sync::Arc, time::Duration};

use futures::future::join_all;
use metrics::{counter, histogram};
use thiserror::Error;
use tokio::time::{Instant, timeout};
use tracing::{debug, info, warn};

use crate::{
    cache::{SearchCache, SearchKey},
    domain::{
        identity::Identity,
        search::SearchResultItem,
        source::{SiteConfig, SourceDescriptor},
    },
};

use super::{
    filter::ContentFilter,
    ports::{CatalogError, SearchAdapter, SiteConfigProvider, SourceCatalog},
};

pub(crate) const METRIC_SOURCE_FAILURE: &str = "marquee_search_source_failure_total";
pub(crate) const METRIC_SEARCH_MS: &str = "marquee_search_ms";

/// Per-source deadline: `base + step * index`, so later-listed sources get
/// slightly more slack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutSchedule {
    pub base: Duration,
    pub step: Duration,
}

impl Default for TimeoutSchedule {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(15_000),
            step: Duration::from_millis(1_000),
        }
    }
}

impl TimeoutSchedule {
    pub fn for_index(&self, index: usize) -> Duration {
        let index = u32::try_from(index).unwrap_or(u32::MAX);
        self.base.saturating_add(self.step.saturating_mul(index))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Miss,
    /// Empty query: neither sources nor the cache were consulted.
    Bypass,
}

impl CacheStatus {
    /// Value of the `X-Cache` diagnostic header, if one applies.
    pub fn header_value(self) -> Option<&'static str> {
        match self {
            CacheStatus::Hit => Some("HIT"),
            CacheStatus::Miss => Some("MISS"),
            CacheStatus::Bypass => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub results: Arc<[SearchResultItem]>,
    pub cache: CacheStatus,
}

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("failed to resolve sources for `{username}`")]
    Sources {
        username: String,
        #[source]
        source: CatalogError,
    },
    #[error("failed to load site configuration")]
    SiteConfig(#[source] CatalogError),
}

#[derive(Clone)]
pub struct SearchService {
    catalog: Arc<dyn SourceCatalog>,
    site: Arc<dyn SiteConfigProvider>,
    adapter: Arc<dyn SearchAdapter>,
    cache: Arc<SearchCache>,
    filter: Arc<ContentFilter>,
    timeouts: TimeoutSchedule,
}

impl SearchService {
    pub fn new(
        catalog: Arc<dyn SourceCatalog>,
        site: Arc<dyn SiteConfigProvider>,
        adapter: Arc<dyn SearchAdapter>,
        cache: Arc<SearchCache>,
        filter: ContentFilter,
        timeouts: TimeoutSchedule,
    ) -> Self {
        Self {
            catalog,
            site,
            adapter,
            cache,
            filter: Arc::new(filter),
            timeouts,
        }
    }

    pub fn cache(&self) -> &SearchCache {
        &self.cache
    }

    pub fn timeouts(&self) -> TimeoutSchedule {
        self.timeouts
    }

    pub async fn site_config(&self) -> Result<SiteConfig, SearchError> {
        self.site.site_config().await.map_err(SearchError::SiteConfig)
    }

    pub async fn search(
        &self,
        identity: &Identity,
        query: &str,
    ) -> Result<SearchOutcome, SearchError> {
        if query.trim().is_empty() {
            return Ok(SearchOutcome {
                results: Arc::from(Vec::new()),
                cache: CacheStatus::Bypass,
            });
        }

        let key = SearchKey::new(identity, query);
        if let Some(results) = self.cache.get(&key) {
            debug!(username = identity.username(), query = key.query(), "search cache hit");
            return Ok(SearchOutcome {
                results,
                cache: CacheStatus::Hit,
            });
        }

        let site = self.site_config().await?;
        let sources = self
            .catalog
            .available_sources(identity)
            .await
            .map_err(|source| SearchError::Sources {
                username: identity.username().to_string(),
                source,
            })?;

        let started = Instant::now();
        let merged = self.fan_out(&sources, query, &site).await;
        let results = if site.disable_content_filter {
            merged
        } else {
            self.filter.apply(merged)
        };
        histogram!(METRIC_SEARCH_MS).record(started.elapsed().as_secs_f64() * 1000.0);

        info!(
            username = identity.username(),
            query = key.query(),
            sources = sources.len(),
            results = results.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "federated search completed"
        );

        let results: Arc<[SearchResultItem]> = Arc::from(results);
        self.cache.insert(key, Arc::clone(&results));
        Ok(SearchOutcome {
            results,
            cache: CacheStatus::Miss,
        })
    }

    /// Runs every source concurrently and concatenates the survivors in source order.
    async fn fan_out(
        &self,
        sources: &[SourceDescriptor],
        query: &str,
        site: &SiteConfig,
    ) -> Vec<SearchResultItem> {
        let calls = sources.iter().enumerate().map(|(index, source)| {
            let deadline = self.timeouts.for_index(index);
            async move {
                match timeout(
                    deadline,
                    self.adapter.search(source, query, site.downstream_max_page),
                )
                .await
                {
                    Ok(Ok(items)) => items,
                    Ok(Err(err)) => {
                        counter!(METRIC_SOURCE_FAILURE, "reason" => "error").increment(1);
                        warn!(source = %source.key, error = %err, "source search failed");
                        Vec::new()
                    }
                    Err(_) => {
                        counter!(METRIC_SOURCE_FAILURE, "reason" => "timeout").increment(1);
                        warn!(
                            source = %source.key,
                            timeout_ms = deadline.as_millis() as u64,
                            "source search timed out"
                        );
                        Vec::new()
                    }
                }
            }
        });

        join_all(calls).await.into_iter().flatten().collect()
    }
}
