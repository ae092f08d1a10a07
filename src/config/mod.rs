//! Configuration layer: typed settings with layered precedence (file → env → CLI).

mod cli;

use std::{
    collections::HashSet,
    net::SocketAddr,
    num::NonZeroU32,
    path::PathBuf,
    str::FromStr,
    time::Duration,
};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

use crate::{
    application::{
        filter::{ContentFilter, DEFAULT_DENYLIST},
        metadata::{MetadataSettings as ClientSettings, MetadataTtls},
        retry::RetryPolicy,
        search::TimeoutSchedule,
    },
    cache::SearchCacheConfig,
    domain::{
        proxy::{ImageProxyStrategy, ProxyPreference, ProxyStrategy},
        source::{SiteConfig, SourceDescriptor},
    },
};

pub use cli::{CliArgs, Command, ServeArgs, ServeOverrides, SourcesArgs};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "marquee";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_SEARCH_TIMEOUT_BASE_MS: u64 = 15_000;
const DEFAULT_SEARCH_TIMEOUT_STEP_MS: u64 = 1_000;
const DEFAULT_SEARCH_CACHE_CAPACITY: u64 = 100;
const DEFAULT_SEARCH_CACHE_TTL_SECS: u64 = 5 * 60;
const DEFAULT_RESPONSE_CACHE_SECS: u64 = 7_200;
const DEFAULT_SEARCH_MAX_PAGE: u64 = 5;
const DEFAULT_METADATA_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_METADATA_RETRY_ATTEMPTS: u64 = 3;
const DEFAULT_METADATA_RETRY_BASE_MS: u64 = 1_000;
const DEFAULT_METADATA_CACHE_VERSION: &str = "1.0.0";
const DEFAULT_METADATA_SWEEP_SECS: u64 = 10 * 60;
const DEFAULT_METADATA_MAX_AGE_SECS: u64 = 60 * 24 * 60 * 60;
const DEFAULT_DETAIL_TTL_SECS: u64 = 4 * 60 * 60;
const DEFAULT_LISTING_TTL_SECS: u64 = 2 * 60 * 60;
const DEFAULT_ANIME_TTL_SECS: u64 = 60 * 60;
pub(crate) const DEFAULT_ANIME_BASE: &str = "https://api.bgm.tv/";

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub search: SearchSettings,
    pub metadata: MetadataSettings,
    pub sources: Vec<SourceDescriptor>,
    pub users: Vec<UserSettings>,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    pub graceful_shutdown: Duration,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct SearchSettings {
    pub timeouts: TimeoutSchedule,
    pub cache: SearchCacheConfig,
    pub response_cache_seconds: u64,
    pub denylist: Vec<String>,
    pub disable_content_filter: bool,
    pub max_page: NonZeroU32,
}

impl SearchSettings {
    pub fn site_config(&self) -> SiteConfig {
        SiteConfig {
            downstream_max_page: self.max_page,
            disable_content_filter: self.disable_content_filter,
            response_cache_seconds: self.response_cache_seconds,
        }
    }

    pub fn content_filter(&self) -> ContentFilter {
        ContentFilter::new(self.denylist.iter().cloned())
    }
}

#[derive(Debug, Clone)]
pub struct MetadataSettings {
    /// Deployment-wide default, consulted after the caller's stored preference.
    pub proxy: ProxyPreference<ProxyStrategy>,
    pub image_proxy: ProxyPreference<ImageProxyStrategy>,
    /// Persistent cache directory; entries live in memory when unset.
    pub cache_dir: Option<PathBuf>,
    pub cache_version: String,
    pub request_timeout: Duration,
    pub retry: RetryPolicy,
    pub ttls: MetadataTtls,
    pub sweep_interval: Duration,
    pub max_age: Duration,
    pub anime_base: Url,
}

impl MetadataSettings {
    pub fn client_settings(&self) -> ClientSettings {
        ClientSettings {
            request_timeout: self.request_timeout,
            retry: self.retry,
            ttls: self.ttls,
            cache_version: self.cache_version.clone(),
            anime_base: self.anime_base.clone(),
        }
    }
}

/// A configured caller: bearer token, optional source allowlist and saved proxy choices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserSettings {
    pub username: String,
    pub token: String,
    /// Visible source keys; `None` means every enabled source.
    pub sources: Option<Vec<String>>,
    pub proxy: ProxyPreference<ProxyStrategy>,
    pub image_proxy: ProxyPreference<ImageProxyStrategy>,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix("MARQUEE").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::Sources(_)) | None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    search: RawSearchSettings,
    metadata: RawMetadataSettings,
    sources: Vec<RawSource>,
    users: Vec<RawUser>,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(seconds) = overrides.server_graceful_shutdown_seconds {
            self.server.graceful_shutdown_seconds = Some(seconds);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(base) = overrides.search_timeout_base_ms {
            self.search.timeout_base_ms = Some(base);
        }
        if let Some(step) = overrides.search_timeout_step_ms {
            self.search.timeout_step_ms = Some(step);
        }
        if let Some(capacity) = overrides.search_cache_capacity {
            self.search.cache_capacity = Some(capacity);
        }
        if let Some(max_page) = overrides.search_max_page {
            self.search.max_page = Some(max_page);
        }
        if let Some(disable) = overrides.search_disable_content_filter {
            self.search.disable_content_filter = Some(disable);
        }
        if let Some(proxy) = overrides.metadata_proxy.as_ref() {
            self.metadata.proxy = Some(proxy.clone());
        }
        if let Some(url) = overrides.metadata_proxy_url.as_ref() {
            self.metadata.proxy_url = Some(url.clone());
        }
        if let Some(proxy) = overrides.metadata_image_proxy.as_ref() {
            self.metadata.image_proxy = Some(proxy.clone());
        }
        if let Some(dir) = overrides.metadata_cache_dir.as_ref() {
            self.metadata.cache_dir = Some(dir.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            search,
            metadata,
            sources,
            users,
        } = raw;

        let server = build_server_settings(server)?;
        let logging = build_logging_settings(logging)?;
        let search = build_search_settings(search)?;
        let metadata = build_metadata_settings(metadata)?;
        let sources = build_sources(sources)?;
        let users = build_users(users, &sources)?;

        Ok(Self {
            server,
            logging,
            search,
            metadata,
            sources,
            users,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());

    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }

    let addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("server.addr", reason))?;

    let graceful_secs = server
        .graceful_shutdown_seconds
        .unwrap_or(DEFAULT_GRACEFUL_SHUTDOWN_SECS);
    if graceful_secs == 0 {
        return Err(LoadError::invalid(
            "server.graceful_shutdown_seconds",
            "must be greater than zero",
        ));
    }

    Ok(ServerSettings {
        addr,
        graceful_shutdown: Duration::from_secs(graceful_secs),
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_search_settings(search: RawSearchSettings) -> Result<SearchSettings, LoadError> {
    let base_ms = search
        .timeout_base_ms
        .unwrap_or(DEFAULT_SEARCH_TIMEOUT_BASE_MS);
    if base_ms == 0 {
        return Err(LoadError::invalid(
            "search.timeout_base_ms",
            "must be greater than zero",
        ));
    }
    let step_ms = search
        .timeout_step_ms
        .unwrap_or(DEFAULT_SEARCH_TIMEOUT_STEP_MS);

    let capacity = search
        .cache_capacity
        .unwrap_or(DEFAULT_SEARCH_CACHE_CAPACITY);
    let capacity = non_zero_u32(capacity, "search.cache_capacity")?;
    let ttl_secs = search
        .cache_ttl_seconds
        .unwrap_or(DEFAULT_SEARCH_CACHE_TTL_SECS);
    if ttl_secs == 0 {
        return Err(LoadError::invalid(
            "search.cache_ttl_seconds",
            "must be greater than zero",
        ));
    }

    let max_page = non_zero_u32(
        search.max_page.unwrap_or(DEFAULT_SEARCH_MAX_PAGE),
        "search.max_page",
    )?;

    let denylist = match search.denylist {
        Some(words) => words,
        None => DEFAULT_DENYLIST.iter().map(|word| word.to_string()).collect(),
    };

    Ok(SearchSettings {
        timeouts: TimeoutSchedule {
            base: Duration::from_millis(base_ms),
            step: Duration::from_millis(step_ms),
        },
        cache: SearchCacheConfig {
            capacity: capacity.get() as usize,
            ttl: Duration::from_secs(ttl_secs),
        },
        response_cache_seconds: search
            .response_cache_seconds
            .unwrap_or(DEFAULT_RESPONSE_CACHE_SECS),
        denylist,
        disable_content_filter: search.disable_content_filter.unwrap_or(false),
        max_page,
    })
}

fn build_metadata_settings(metadata: RawMetadataSettings) -> Result<MetadataSettings, LoadError> {
    let proxy = ProxyPreference::new(
        parse_tag::<ProxyStrategy>(metadata.proxy.as_deref(), "metadata.proxy")?,
        non_blank(metadata.proxy_url),
    );
    let image_proxy = ProxyPreference::new(
        parse_tag::<ImageProxyStrategy>(metadata.image_proxy.as_deref(), "metadata.image_proxy")?,
        non_blank(metadata.image_proxy_url),
    );

    let cache_dir = metadata
        .cache_dir
        .filter(|dir| !dir.as_os_str().is_empty());
    let cache_version = non_blank(metadata.cache_version)
        .unwrap_or_else(|| DEFAULT_METADATA_CACHE_VERSION.to_string());

    let timeout_ms = metadata
        .request_timeout_ms
        .unwrap_or(DEFAULT_METADATA_TIMEOUT_MS);
    if timeout_ms == 0 {
        return Err(LoadError::invalid(
            "metadata.request_timeout_ms",
            "must be greater than zero",
        ));
    }

    let retry = RetryPolicy {
        max_attempts: non_zero_u32(
            metadata
                .retry_attempts
                .unwrap_or(DEFAULT_METADATA_RETRY_ATTEMPTS),
            "metadata.retry_attempts",
        )?,
        base_delay: Duration::from_millis(
            metadata
                .retry_base_delay_ms
                .unwrap_or(DEFAULT_METADATA_RETRY_BASE_MS),
        ),
    };

    let ttls = MetadataTtls {
        details: positive_secs(
            metadata.detail_ttl_seconds,
            DEFAULT_DETAIL_TTL_SECS,
            "metadata.detail_ttl_seconds",
        )?,
        listings: positive_secs(
            metadata.listing_ttl_seconds,
            DEFAULT_LISTING_TTL_SECS,
            "metadata.listing_ttl_seconds",
        )?,
        anime: positive_secs(
            metadata.anime_ttl_seconds,
            DEFAULT_ANIME_TTL_SECS,
            "metadata.anime_ttl_seconds",
        )?,
    };

    let sweep_interval = positive_secs(
        metadata.sweep_interval_seconds,
        DEFAULT_METADATA_SWEEP_SECS,
        "metadata.sweep_interval_seconds",
    )?;
    let max_age = positive_secs(
        metadata.max_age_seconds,
        DEFAULT_METADATA_MAX_AGE_SECS,
        "metadata.max_age_seconds",
    )?;

    let anime_base = metadata
        .anime_base_url
        .unwrap_or_else(|| DEFAULT_ANIME_BASE.to_string());
    let anime_base = Url::parse(&anime_base)
        .map_err(|err| LoadError::invalid("metadata.anime_base_url", err.to_string()))?;

    Ok(MetadataSettings {
        proxy,
        image_proxy,
        cache_dir,
        cache_version,
        request_timeout: Duration::from_millis(timeout_ms),
        retry,
        ttls,
        sweep_interval,
        max_age,
        anime_base,
    })
}

fn build_sources(sources: Vec<RawSource>) -> Result<Vec<SourceDescriptor>, LoadError> {
    let mut seen = HashSet::new();
    sources
        .into_iter()
        .map(|source| {
            let key = source.key.trim().to_string();
            if key.is_empty() {
                return Err(LoadError::invalid("sources.key", "must not be empty"));
            }
            if !seen.insert(key.clone()) {
                return Err(LoadError::invalid(
                    "sources.key",
                    format!("duplicate source key `{key}`"),
                ));
            }
            Url::parse(source.api.trim()).map_err(|err| {
                LoadError::invalid("sources.api", format!("source `{key}`: {err}"))
            })?;
            let name = non_blank(source.name).unwrap_or_else(|| key.clone());
            Ok(SourceDescriptor {
                key,
                name,
                api: source.api.trim().to_string(),
                detail: non_blank(source.detail),
                disabled: source.disabled,
            })
        })
        .collect()
}

fn build_users(
    users: Vec<RawUser>,
    sources: &[SourceDescriptor],
) -> Result<Vec<UserSettings>, LoadError> {
    let mut seen = HashSet::new();
    users
        .into_iter()
        .map(|user| {
            let username = user.username.trim().to_string();
            if username.is_empty() {
                return Err(LoadError::invalid("users.username", "must not be empty"));
            }
            if !seen.insert(username.clone()) {
                return Err(LoadError::invalid(
                    "users.username",
                    format!("duplicate user `{username}`"),
                ));
            }
            if user.token.trim().is_empty() {
                return Err(LoadError::invalid(
                    "users.token",
                    format!("user `{username}` has no token"),
                ));
            }
            if let Some(unknown) = user.sources.iter().flatten().find(|key| {
                !sources.iter().any(|source| &source.key == *key)
            }) {
                return Err(LoadError::invalid(
                    "users.sources",
                    format!("user `{username}` references unknown source `{unknown}`"),
                ));
            }

            Ok(UserSettings {
                proxy: ProxyPreference::new(
                    parse_tag::<ProxyStrategy>(user.proxy.as_deref(), "users.proxy")?,
                    non_blank(user.proxy_url),
                ),
                image_proxy: ProxyPreference::new(
                    parse_tag::<ImageProxyStrategy>(user.image_proxy.as_deref(), "users.image_proxy")?,
                    non_blank(user.image_proxy_url),
                ),
                username,
                token: user.token.trim().to_string(),
                sources: user.sources,
            })
        })
        .collect()
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
    graceful_shutdown_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSearchSettings {
    timeout_base_ms: Option<u64>,
    timeout_step_ms: Option<u64>,
    cache_capacity: Option<u64>,
    cache_ttl_seconds: Option<u64>,
    response_cache_seconds: Option<u64>,
    max_page: Option<u64>,
    denylist: Option<Vec<String>>,
    disable_content_filter: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawMetadataSettings {
    proxy: Option<String>,
    proxy_url: Option<String>,
    image_proxy: Option<String>,
    image_proxy_url: Option<String>,
    cache_dir: Option<PathBuf>,
    cache_version: Option<String>,
    request_timeout_ms: Option<u64>,
    retry_attempts: Option<u64>,
    retry_base_delay_ms: Option<u64>,
    detail_ttl_seconds: Option<u64>,
    listing_ttl_seconds: Option<u64>,
    anime_ttl_seconds: Option<u64>,
    sweep_interval_seconds: Option<u64>,
    max_age_seconds: Option<u64>,
    anime_base_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSource {
    key: String,
    name: Option<String>,
    api: String,
    detail: Option<String>,
    disabled: bool,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawUser {
    username: String,
    token: String,
    sources: Option<Vec<String>>,
    proxy: Option<String>,
    proxy_url: Option<String>,
    image_proxy: Option<String>,
    image_proxy_url: Option<String>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    let value_u32: u32 = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for u32"))?;
    NonZeroU32::new(value_u32).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

fn positive_secs(value: Option<u64>, default: u64, key: &'static str) -> Result<Duration, LoadError> {
    match value.unwrap_or(default) {
        0 => Err(LoadError::invalid(key, "must be greater than zero")),
        secs => Ok(Duration::from_secs(secs)),
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

fn parse_tag<S>(value: Option<&str>, key: &'static str) -> Result<Option<S>, LoadError>
where
    S: FromStr,
    S::Err: std::fmt::Display,
{
    match value.map(str::trim).filter(|tag| !tag.is_empty()) {
        Some(tag) => tag
            .parse()
            .map(Some)
            .map_err(|err: S::Err| LoadError::invalid(key, err.to_string())),
        None => Ok(None),
    }
}
