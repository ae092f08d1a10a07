//! Proxy strategies for reaching the metadata provider and its image hosts.
//!
//! Resolution is pure: a strategy tag and a proxy URL are each taken from the
//! highest-precedence layer that sets them (explicit override, stored user
//! preference, runtime default), falling back to the primary CDN mirror.

use std::{fmt, net::IpAddr, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::{Host, Url, form_urlencoded};

pub const CORS_PROXY_ZWEI_BASE: &str = "https://ciao-cors.is-an.org/";
pub const CORS_ANYWHERE_BASE: &str = "https://cors-anywhere.com/";
pub const IMAGE_RELAY_PATH: &str = "/api/image-proxy";

const IMAGE_HOST_SUFFIX: &str = ".doubanio.com";
const IMAGE_HOST_IMG3: &str = "img3.doubanio.com";
const IMAGE_HOST_TENCENT: &str = "img.doubanio.cmliussss.net";
const IMAGE_HOST_ALI: &str = "img.doubanio.cmliussss.com";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProxyError {
    #[error("unknown proxy strategy `{0}`")]
    UnknownStrategy(String),
    #[error("custom proxy strategy requires a proxy url")]
    MissingCustomUrl,
    #[error("relay url `{url}` is not allowed: {reason}")]
    UntrustedRelay { url: String, reason: &'static str },
    #[error("invalid url `{url}`: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
}

fn parse_url(raw: &str) -> Result<Url, ProxyError> {
    Url::parse(raw).map_err(|source| ProxyError::InvalidUrl {
        url: raw.to_string(),
        source,
    })
}

fn is_internal_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_unspecified()
                || v4.is_broadcast()
                || v4.is_documentation()
        }
        IpAddr::V6(v6) => {
            v6.is_loopback()
                || v6.is_unspecified()
                || v6.is_unique_local()
                || v6.is_unicast_link_local()
                || v6.to_ipv4_mapped().is_some_and(|v4| is_internal_ip(IpAddr::V4(v4)))
        }
    }
}

/// Checks a relay URL supplied by a request rather than by configuration.
///
/// The server fetches through the relay, so only https relays on public hosts
/// are accepted. Host names are not resolved here.
pub fn check_caller_relay(raw: &str) -> Result<(), ProxyError> {
    let untrusted = |reason| ProxyError::UntrustedRelay {
        url: raw.to_string(),
        reason,
    };
    let url = parse_url(raw)?;
    if url.scheme() != "https" {
        return Err(untrusted("scheme must be https"));
    }
    let internal = match url.host() {
        None => return Err(untrusted("host is missing")),
        Some(Host::Ipv4(v4)) => is_internal_ip(IpAddr::V4(v4)),
        Some(Host::Ipv6(v6)) => is_internal_ip(IpAddr::V6(v6)),
        Some(Host::Domain(domain)) => {
            let domain = domain.trim_end_matches('.').to_ascii_lowercase();
            domain == "localhost" || domain.ends_with(".localhost")
        }
    };
    if internal {
        return Err(untrusted("host is not public"));
    }
    Ok(())
}

fn encode_component(raw: &str) -> String {
    form_urlencoded::byte_serialize(raw.as_bytes()).collect()
}

/// How metadata API calls reach the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ProxyStrategy {
    Direct,
    CorsProxyZwei,
    #[default]
    CdnTencent,
    CdnAli,
    CorsAnywhere,
    Custom,
}

impl ProxyStrategy {
    pub const ALL: [ProxyStrategy; 6] = [
        ProxyStrategy::Direct,
        ProxyStrategy::CorsProxyZwei,
        ProxyStrategy::CdnTencent,
        ProxyStrategy::CdnAli,
        ProxyStrategy::CorsAnywhere,
        ProxyStrategy::Custom,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ProxyStrategy::Direct => "direct",
            ProxyStrategy::CorsProxyZwei => "cors-proxy-zwei",
            ProxyStrategy::CdnTencent => "cmliussss-cdn-tencent",
            ProxyStrategy::CdnAli => "cmliussss-cdn-ali",
            ProxyStrategy::CorsAnywhere => "cors-anywhere",
            ProxyStrategy::Custom => "custom",
        }
    }

    /// Relay base the target is appended to, if any.
    fn relay_base(self) -> Option<&'static str> {
        match self {
            ProxyStrategy::CorsProxyZwei => Some(CORS_PROXY_ZWEI_BASE),
            ProxyStrategy::CorsAnywhere => Some(CORS_ANYWHERE_BASE),
            _ => None,
        }
    }
}

impl fmt::Display for ProxyStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProxyStrategy {
    type Err = ProxyError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|strategy| strategy.as_str() == value)
            .ok_or_else(|| ProxyError::UnknownStrategy(value.to_string()))
    }
}

impl TryFrom<String> for ProxyStrategy {
    type Error = ProxyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ProxyStrategy> for String {
    fn from(value: ProxyStrategy) -> Self {
        value.as_str().to_string()
    }
}

/// How poster URLs are rewritten before reaching the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ImageProxyStrategy {
    Direct,
    Server,
    Img3,
    #[default]
    CdnTencent,
    CdnAli,
    Custom,
}

impl ImageProxyStrategy {
    pub const ALL: [ImageProxyStrategy; 6] = [
        ImageProxyStrategy::Direct,
        ImageProxyStrategy::Server,
        ImageProxyStrategy::Img3,
        ImageProxyStrategy::CdnTencent,
        ImageProxyStrategy::CdnAli,
        ImageProxyStrategy::Custom,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ImageProxyStrategy::Direct => "direct",
            ImageProxyStrategy::Server => "server",
            ImageProxyStrategy::Img3 => "img3",
            ImageProxyStrategy::CdnTencent => "cmliussss-cdn-tencent",
            ImageProxyStrategy::CdnAli => "cmliussss-cdn-ali",
            ImageProxyStrategy::Custom => "custom",
        }
    }
}

impl fmt::Display for ImageProxyStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImageProxyStrategy {
    type Err = ProxyError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|strategy| strategy.as_str() == value)
            .ok_or_else(|| ProxyError::UnknownStrategy(value.to_string()))
    }
}

impl TryFrom<String> for ImageProxyStrategy {
    type Error = ProxyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ImageProxyStrategy> for String {
    fn from(value: ImageProxyStrategy) -> Self {
        value.as_str().to_string()
    }
}

/// One precedence layer. Unset fields defer to the next layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyPreference<S> {
    pub strategy: Option<S>,
    pub url: Option<String>,
}

impl<S> Default for ProxyPreference<S> {
    fn default() -> Self {
        Self {
            strategy: None,
            url: None,
        }
    }
}

impl<S> ProxyPreference<S> {
    pub fn new(strategy: Option<S>, url: Option<String>) -> Self {
        Self { strategy, url }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyLayers<S> {
    pub explicit: ProxyPreference<S>,
    pub stored: ProxyPreference<S>,
    pub runtime: ProxyPreference<S>,
}

impl<S> Default for ProxyLayers<S> {
    fn default() -> Self {
        Self {
            explicit: ProxyPreference::default(),
            stored: ProxyPreference::default(),
            runtime: ProxyPreference::default(),
        }
    }
}

fn layered<S: Copy + Default + PartialEq>(
    layers: &ProxyLayers<S>,
    custom: S,
) -> Result<(S, String), ProxyError> {
    let order = [&layers.explicit, &layers.stored, &layers.runtime];
    let strategy = order
        .iter()
        .find_map(|layer| layer.strategy)
        .unwrap_or_default();
    let url = order
        .iter()
        .filter_map(|layer| layer.url.as_deref())
        .map(str::trim)
        .find(|url| !url.is_empty())
        .unwrap_or_default()
        .to_string();

    if strategy == custom && url.is_empty() {
        return Err(ProxyError::MissingCustomUrl);
    }
    Ok((strategy, url))
}

/// Resolved proxy configuration for metadata API calls.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProxyConfig {
    pub strategy: ProxyStrategy,
    /// Only consulted by [`ProxyStrategy::Custom`].
    pub url: String,
}

pub fn resolve_proxy(layers: &ProxyLayers<ProxyStrategy>) -> Result<ProxyConfig, ProxyError> {
    let (strategy, url) = layered(layers, ProxyStrategy::Custom)?;
    Ok(ProxyConfig { strategy, url })
}

impl ProxyConfig {
    pub fn direct() -> Self {
        Self {
            strategy: ProxyStrategy::Direct,
            url: String::new(),
        }
    }

    /// Builds the provider URL for `host` and routes it through this strategy.
    pub fn request_url(
        &self,
        endpoints: &ProviderEndpoints,
        host: UpstreamHost,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Url, ProxyError> {
        let target = endpoints.target(host, self.strategy, path, query)?;
        self.wrap(target)
    }

    /// Wraps an already host-substituted target in the configured relay.
    pub fn wrap(&self, target: Url) -> Result<Url, ProxyError> {
        let base = match self.strategy {
            ProxyStrategy::Direct | ProxyStrategy::CdnTencent | ProxyStrategy::CdnAli => {
                return Ok(target);
            }
            ProxyStrategy::Custom => self.url.as_str(),
            relay => relay.relay_base().unwrap_or_default(),
        };
        if base.is_empty() {
            return Err(ProxyError::MissingCustomUrl);
        }

        // cors-anywhere takes the raw target as its path.
        let wrapped = if base == CORS_ANYWHERE_BASE {
            format!("{base}{target}")
        } else {
            format!("{base}{}", encode_component(target.as_str()))
        };
        parse_url(&wrapped)
    }
}

/// Which provider host a view lives on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpstreamHost {
    /// Mobile API host (`/rexxar/api/v2/...`).
    Mobile,
    /// Web host (`/j/search_subjects`).
    Movie,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostMirrors {
    pub origin: Url,
    pub tencent: Url,
    pub ali: Url,
}

impl HostMirrors {
    pub fn parse(origin: &str, tencent: &str, ali: &str) -> Result<Self, ProxyError> {
        Ok(Self {
            origin: parse_url(origin)?,
            tencent: parse_url(tencent)?,
            ali: parse_url(ali)?,
        })
    }
}

/// Base URLs per provider host and mirror.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderEndpoints {
    pub mobile: HostMirrors,
    pub movie: HostMirrors,
}

impl ProviderEndpoints {
    pub fn douban() -> Result<Self, ProxyError> {
        Ok(Self {
            mobile: HostMirrors::parse(
                "https://m.douban.com/",
                "https://m.douban.cmliussss.net/",
                "https://m.douban.cmliussss.com/",
            )?,
            movie: HostMirrors::parse(
                "https://movie.douban.com/",
                "https://movie.douban.cmliussss.net/",
                "https://movie.douban.cmliussss.com/",
            )?,
        })
    }

    pub fn base(&self, host: UpstreamHost, strategy: ProxyStrategy) -> &Url {
        let mirrors = match host {
            UpstreamHost::Mobile => &self.mobile,
            UpstreamHost::Movie => &self.movie,
        };
        match strategy {
            ProxyStrategy::CdnTencent => &mirrors.tencent,
            ProxyStrategy::CdnAli => &mirrors.ali,
            _ => &mirrors.origin,
        }
    }

    /// Target URL with the strategy's host substituted; path and query are untouched.
    pub fn target(
        &self,
        host: UpstreamHost,
        strategy: ProxyStrategy,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Url, ProxyError> {
        let base = self.base(host, strategy);
        let mut url = base.join(path.trim_start_matches('/')).map_err(|source| {
            ProxyError::InvalidUrl {
                url: format!("{base}{path}"),
                source,
            }
        })?;
        if !query.is_empty() {
            url.query_pairs_mut()
                .extend_pairs(query.iter().map(|(k, v)| (*k, v.as_str())));
        }
        Ok(url)
    }
}

/// Resolved image proxy configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ImageProxyConfig {
    pub strategy: ImageProxyStrategy,
    pub url: String,
}

pub fn resolve_image_proxy(
    layers: &ProxyLayers<ImageProxyStrategy>,
) -> Result<ImageProxyConfig, ProxyError> {
    let (strategy, url) = layered(layers, ImageProxyStrategy::Custom)?;
    Ok(ImageProxyConfig { strategy, url })
}

/// True for `img<digits>.doubanio.com` hosts.
pub fn is_provider_image_host(host: &str) -> bool {
    host.strip_suffix(IMAGE_HOST_SUFFIX)
        .and_then(|prefix| prefix.strip_prefix("img"))
        .is_some_and(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
}

impl ImageProxyConfig {
    /// Rewrites provider image URLs; anything else is returned unchanged.
    pub fn rewrite_image_url(&self, raw: &str) -> String {
        let Ok(mut url) = Url::parse(raw) else {
            return raw.to_string();
        };
        if !url.host_str().is_some_and(is_provider_image_host) {
            return raw.to_string();
        }

        let replacement = match self.strategy {
            ImageProxyStrategy::Direct => return raw.to_string(),
            ImageProxyStrategy::Server => {
                return format!("{IMAGE_RELAY_PATH}?url={}", encode_component(raw));
            }
            ImageProxyStrategy::Custom => {
                return format!("{}{}", self.url, encode_component(raw));
            }
            ImageProxyStrategy::Img3 => IMAGE_HOST_IMG3,
            ImageProxyStrategy::CdnTencent => IMAGE_HOST_TENCENT,
            ImageProxyStrategy::CdnAli => IMAGE_HOST_ALI,
        };
        match url.set_host(Some(replacement)) {
            Ok(()) => url.into(),
            Err(_) => raw.to_string(),
        }
    }
}
