//! Traits for the collaborators the application services depend on.

use std::{num::NonZeroU32, time::Duration};

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;
use thiserror::Error;
use url::Url;

use crate::domain::{
    identity::Identity,
    proxy::{ImageProxyStrategy, ProxyPreference, ProxyStrategy},
    search::SearchResultItem,
    source::{SiteConfig, SourceDescriptor},
};

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog unavailable: {0}")]
    Unavailable(String),
}

/// Entitlement: which sources a caller may search.
#[async_trait]
pub trait SourceCatalog: Send + Sync {
    /// Enabled sources visible to `identity`, in configured order.
    async fn available_sources(
        &self,
        identity: &Identity,
    ) -> Result<Vec<SourceDescriptor>, CatalogError>;
}

#[async_trait]
pub trait SiteConfigProvider: Send + Sync {
    async fn site_config(&self) -> Result<SiteConfig, CatalogError>;
}

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("source `{source_key}` request failed: {message}")]
    Request { source_key: String, message: String },
    #[error("source `{source_key}` returned an unreadable payload: {message}")]
    Payload { source_key: String, message: String },
}

/// Downstream search against one source. The caller imposes the timeout.
#[async_trait]
pub trait SearchAdapter: Send + Sync {
    async fn search(
        &self,
        source: &SourceDescriptor,
        query: &str,
        max_page: NonZeroU32,
    ) -> Result<Vec<SearchResultItem>, AdapterError>;
}

/// Proxy choices a caller has saved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserPreferences {
    pub proxy: ProxyPreference<ProxyStrategy>,
    pub image_proxy: ProxyPreference<ImageProxyStrategy>,
}

pub trait IdentityResolver: Send + Sync {
    fn authenticate(&self, token: &str) -> Option<Identity>;

    fn preferences(&self, identity: &Identity) -> UserPreferences;
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} timed out")]
    Timeout { url: String },
    #[error("{url} responded with status {status}")]
    Status { url: String, status: u16 },
    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },
    #[error("response from {url} could not be decoded: {message}")]
    Decode { url: String, message: String },
}

impl FetchError {
    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FetchedBody {
    pub content_type: Option<String>,
    pub body: Bytes,
}

/// Outbound HTTP used by the metadata client and the image relay.
#[async_trait]
pub trait UpstreamFetch: Send + Sync {
    async fn get_json(&self, url: Url, timeout: Duration) -> Result<Value, FetchError>;

    async fn get_bytes(&self, url: Url, timeout: Duration) -> Result<FetchedBody, FetchError>;
}
