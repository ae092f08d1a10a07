//! Upstream search sources and the site-level switches that shape a search.

use std::num::NonZeroU32;

use serde::{Deserialize, Serialize};

/// One configured upstream search provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDescriptor {
    /// Unique identifier, used for attribution and entitlement.
    pub key: String,
    /// Display name.
    pub name: String,
    /// Search endpoint template.
    pub api: String,
    /// Optional per-source detail endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(default)]
    pub disabled: bool,
}

impl SourceDescriptor {
    pub fn is_enabled(&self) -> bool {
        !self.disabled
    }
}

/// Site configuration read at request time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteConfig {
    /// Upper bound on pages a well-behaved adapter fetches per source.
    pub downstream_max_page: NonZeroU32,
    /// Skips the content denylist when set.
    pub disable_content_filter: bool,
    /// Seconds advertised in the search response caching headers.
    pub response_cache_seconds: u64,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            downstream_max_page: NonZeroU32::new(5).unwrap_or(NonZeroU32::MIN),
            disable_content_filter: false,
            response_cache_seconds: 7200,
        }
    }
}
