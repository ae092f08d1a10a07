use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};

/// Command-line arguments for the marquee binary.
#[derive(Debug, Parser)]
#[command(name = "marquee", version, about = "Federated film/TV search server")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "MARQUEE_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the HTTP service.
    Serve(Box<ServeArgs>),
    /// Print the configured search sources and exit.
    Sources(SourcesArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct SourcesArgs {
    /// Include disabled sources.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub all: bool,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the graceful shutdown timeout.
    #[arg(long = "server-graceful-shutdown-seconds", value_name = "SECONDS")]
    pub server_graceful_shutdown_seconds: Option<u64>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override the first source's search timeout.
    #[arg(long = "search-timeout-base-ms", value_name = "MILLIS")]
    pub search_timeout_base_ms: Option<u64>,

    /// Override the extra timeout granted per source position.
    #[arg(long = "search-timeout-step-ms", value_name = "MILLIS")]
    pub search_timeout_step_ms: Option<u64>,

    /// Override the search cache capacity.
    #[arg(long = "search-cache-capacity", value_name = "COUNT")]
    pub search_cache_capacity: Option<u64>,

    /// Override the highest page fetched from each source.
    #[arg(long = "search-max-page", value_name = "COUNT")]
    pub search_max_page: Option<u64>,

    /// Toggle the content denylist off.
    #[arg(
        long = "search-disable-content-filter",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub search_disable_content_filter: Option<bool>,

    /// Override the deployment-wide metadata proxy strategy.
    #[arg(long = "metadata-proxy", value_name = "STRATEGY")]
    pub metadata_proxy: Option<String>,

    /// Override the deployment-wide metadata proxy URL.
    #[arg(long = "metadata-proxy-url", value_name = "URL")]
    pub metadata_proxy_url: Option<String>,

    /// Override the deployment-wide image proxy strategy.
    #[arg(long = "metadata-image-proxy", value_name = "STRATEGY")]
    pub metadata_image_proxy: Option<String>,

    /// Override the directory that persists metadata cache entries.
    #[arg(long = "metadata-cache-dir", value_name = "PATH")]
    pub metadata_cache_dir: Option<PathBuf>,
}
