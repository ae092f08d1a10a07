use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::{
    application::{
        metadata::{METRIC_METADATA_CACHE_HIT, METRIC_METADATA_CACHE_MISS, METRIC_METADATA_FAILURE},
        search::{METRIC_SEARCH_MS, METRIC_SOURCE_FAILURE},
    },
    cache::{METRIC_SEARCH_CACHE_EVICT, METRIC_SEARCH_CACHE_HIT, METRIC_SEARCH_CACHE_MISS},
    config::{LogFormat, LoggingSettings},
};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Outbound HTTP crates log every connection at debug; keep them at warn
/// unless `RUST_LOG` asks otherwise.
const QUIET_DEPENDENCIES: &[&str] = &["hyper_util=warn", "reqwest=warn", "rustls=warn"];

/// Installs the process-wide subscriber: env filter, span-trace capture and
/// either JSON or compact lines.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let output = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(false).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter(logging))
        .with(ErrorLayer::default())
        .with(output)
        .try_init()
        .map_err(|err| InfraError::telemetry(format!("tracing subscriber already set: {err}")))
}

fn env_filter(logging: &LoggingSettings) -> EnvFilter {
    let mut filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();
    if std::env::var_os(EnvFilter::DEFAULT_ENV).is_none() {
        for directive in QUIET_DEPENDENCIES {
            if let Ok(directive) = directive.parse() {
                filter = filter.add_directive(directive);
            }
        }
    }
    filter
}

pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            METRIC_SEARCH_CACHE_HIT,
            Unit::Count,
            "Total number of search cache hits."
        );
        describe_counter!(
            METRIC_SEARCH_CACHE_MISS,
            Unit::Count,
            "Total number of search cache misses, including expired entries."
        );
        describe_counter!(
            METRIC_SEARCH_CACHE_EVICT,
            Unit::Count,
            "Total number of search cache evictions due to capacity."
        );
        describe_counter!(
            METRIC_SOURCE_FAILURE,
            Unit::Count,
            "Total number of upstream sources that failed or timed out during a search."
        );
        describe_histogram!(
            METRIC_SEARCH_MS,
            Unit::Milliseconds,
            "Federated search latency on cache misses in milliseconds."
        );
        describe_counter!(
            METRIC_METADATA_CACHE_HIT,
            Unit::Count,
            "Total number of metadata cache hits, labelled by view."
        );
        describe_counter!(
            METRIC_METADATA_CACHE_MISS,
            Unit::Count,
            "Total number of metadata cache misses, labelled by view."
        );
        describe_counter!(
            METRIC_METADATA_FAILURE,
            Unit::Count,
            "Total number of metadata requests that failed after retries, labelled by view."
        );
    });
}
