use std::{process, sync::Arc, time::Duration};

use marquee::{
    application::{
        error::AppError,
        metadata::MetadataClient,
        notify::BroadcastNotifier,
        search::SearchService,
    },
    cache::{CacheStorage, FileStorage, MemoryStorage, SearchCache},
    config,
    domain::proxy::ProviderEndpoints,
    infra::{
        catalog::ConfiguredCatalog,
        downstream::HttpSearchAdapter,
        error::InfraError,
        fetch::{BROWSER_USER_AGENT, ReqwestFetcher},
        http::{self, AppState},
        telemetry,
    },
};
use tokio::{sync::broadcast::error::RecvError, sync::oneshot, task::JoinHandle};
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Sources(args) => {
            print_sources(&settings, args.all);
            Ok(())
        }
    }
}

fn print_sources(settings: &config::Settings, include_disabled: bool) {
    for source in settings
        .sources
        .iter()
        .filter(|source| include_disabled || source.is_enabled())
    {
        let status = if source.is_enabled() { "" } else { " (disabled)" };
        println!("{}\t{}\t{}{status}", source.key, source.name, source.api);
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let storage = open_metadata_storage(&settings.metadata)?;
    let notifier = BroadcastNotifier::default();
    let notification_handle = spawn_notification_logger(&notifier);

    let fetcher = ReqwestFetcher::new()?;
    let endpoints = ProviderEndpoints::douban()?;
    let metadata = Arc::new(MetadataClient::new(
        Arc::new(fetcher),
        storage,
        Arc::new(notifier),
        endpoints,
        settings.metadata.client_settings(),
    ));

    let downstream_client = reqwest::Client::builder()
        .user_agent(BROWSER_USER_AGENT)
        .build()
        .map_err(|err| InfraError::http_client(err.to_string()))?;
    let catalog = Arc::new(ConfiguredCatalog::new(
        settings.sources.clone(),
        settings.users.clone(),
        settings.search.site_config(),
    ));
    let search = Arc::new(SearchService::new(
        catalog.clone(),
        catalog.clone(),
        Arc::new(HttpSearchAdapter::new(downstream_client)),
        Arc::new(SearchCache::new(settings.search.cache.clone())),
        settings.search.content_filter(),
        settings.search.timeouts,
    ));

    let sweep_handle = spawn_cache_sweeper(
        metadata.clone(),
        settings.metadata.sweep_interval,
        settings.metadata.max_age,
    );

    let state = AppState {
        search,
        metadata,
        identities: catalog,
        proxy_defaults: settings.metadata.proxy.clone(),
        image_proxy_defaults: settings.metadata.image_proxy.clone(),
    };

    let result = serve_http(&settings.server, state).await;

    sweep_handle.abort();
    let _ = sweep_handle.await;
    notification_handle.abort();
    let _ = notification_handle.await;

    result
}

fn open_metadata_storage(
    metadata: &config::MetadataSettings,
) -> Result<Arc<dyn CacheStorage>, AppError> {
    match metadata.cache_dir.as_ref() {
        Some(dir) => {
            let storage = FileStorage::open(dir).map_err(InfraError::from)?;
            info!(dir = %dir.display(), "metadata cache persisted on disk");
            Ok(Arc::new(storage))
        }
        None => Ok(Arc::new(MemoryStorage::new())),
    }
}

fn spawn_notification_logger(notifier: &BroadcastNotifier) -> JoinHandle<()> {
    let mut receiver = notifier.subscribe();
    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(message) => warn!(notification = %message, "metadata failure"),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "notification logger lagged behind")
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

fn spawn_cache_sweeper(
    metadata: Arc<MetadataClient>,
    every: Duration,
    max_age: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        // The first tick fires immediately, which doubles as the startup sweep.
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            let client = metadata.clone();
            match tokio::task::spawn_blocking(move || client.clean_expired(max_age)).await {
                Ok(removed) => info!(removed, "metadata cache sweep finished"),
                Err(err) => error!(error = %err, "metadata cache sweep panicked"),
            }
        }
    })
}

async fn serve_http(server: &config::ServerSettings, state: AppState) -> Result<(), AppError> {
    let router = http::build_router(state);
    let listener = tokio::net::TcpListener::bind(server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    info!(addr = %server.addr, "listening");

    let (drain_tx, drain_rx) = oneshot::channel::<()>();
    let mut handle = tokio::spawn(async move {
        axum::serve(listener, router.into_make_service())
            .with_graceful_shutdown(async {
                let _ = drain_rx.await;
            })
            .await
    });

    tokio::select! {
        joined = &mut handle => return server_outcome(joined),
        () = shutdown_signal() => {}
    }

    info!(grace_secs = server.graceful_shutdown.as_secs(), "shutting down");
    let _ = drain_tx.send(());
    match tokio::time::timeout(server.graceful_shutdown, &mut handle).await {
        Ok(joined) => server_outcome(joined),
        Err(_) => {
            warn!("graceful shutdown timed out; dropping open connections");
            handle.abort();
            Ok(())
        }
    }
}

fn server_outcome(
    joined: Result<std::io::Result<()>, tokio::task::JoinError>,
) -> Result<(), AppError> {
    match joined {
        Ok(result) => result.map_err(|err| AppError::from(InfraError::from(err))),
        Err(err) => Err(AppError::unexpected(format!("server task failed: {err}"))),
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
