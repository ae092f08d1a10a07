//! axum HTTP surface: search, metadata views, cache administration and the image relay.

pub mod error;
pub mod metadata;
pub mod middleware;
pub mod search;

use std::sync::Arc;

use axum::{
    Router,
    http::StatusCode,
    middleware as axum_middleware,
    routing::{delete, get},
};

use crate::{
    application::{metadata::MetadataClient, ports::IdentityResolver, search::SearchService},
    domain::proxy::{ImageProxyStrategy, ProxyPreference, ProxyStrategy},
};

pub use error::ApiError;
pub use middleware::{AUTH_TOKEN_HEADER, RequestContext};

#[derive(Clone)]
pub struct AppState {
    pub search: Arc<SearchService>,
    pub metadata: Arc<MetadataClient>,
    pub identities: Arc<dyn IdentityResolver>,
    /// Deployment-wide proxy default, consulted after the caller's own preference.
    pub proxy_defaults: ProxyPreference<ProxyStrategy>,
    pub image_proxy_defaults: ProxyPreference<ImageProxyStrategy>,
}

pub fn build_router(state: AppState) -> Router {
    let authenticated = Router::new()
        .route("/api/search", get(search::search))
        .route("/api/douban/categories", get(metadata::categories))
        .route("/api/douban/list", get(metadata::tag_list))
        .route("/api/douban/recommends", get(metadata::recommendations))
        .route("/api/douban/details", get(metadata::detail))
        .route("/api/bangumi/calendar", get(metadata::anime_calendar))
        .route("/api/bangumi/subjects/{id}", get(metadata::anime_subject))
        .route("/api/cache/stats", get(metadata::cache_stats))
        .route("/api/cache", delete(metadata::clear_cache))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_identity,
        ));

    Router::new()
        .merge(authenticated)
        .route("/api/image-proxy", get(metadata::image_proxy))
        .route("/_health", get(health))
        .with_state(state)
        .layer(axum_middleware::from_fn(middleware::log_responses))
        .layer(axum_middleware::from_fn(middleware::set_request_context))
}

async fn health() -> StatusCode {
    StatusCode::NO_CONTENT
}
