//! Metadata views, anime calendar, cache administration and the image relay.

use axum::{
    Json,
    body::Body,
    extract::{Extension, Path, Query, State},
    http::{
        HeaderValue, StatusCode,
        header::{CACHE_CONTROL, CONTENT_TYPE},
    },
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use crate::{
    application::{error::AppError, metadata::MetadataCacheStats},
    domain::{
        identity::Identity,
        metadata::{
            AnimeSubject, CalendarDay, CategoryQuery, MetadataDetail, MetadataResult,
            RecommendQuery, TagListQuery,
        },
        proxy::{
            ImageProxyConfig, ImageProxyStrategy, ProxyConfig, ProxyLayers, ProxyPreference,
            ProxyStrategy, check_caller_relay, resolve_image_proxy, resolve_proxy,
        },
    },
};

use super::{AppState, error::ApiError};

const SOURCE: &str = "infra::http::metadata";
const IMAGE_CACHE_CONTROL: &str = "public, max-age=86400";
const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

fn api_error(error: impl Into<AppError>) -> ApiError {
    ApiError::from_app(SOURCE, error.into())
}

/// Per-request proxy override; wins over the caller's stored preference.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ProxyOverride {
    pub proxy: Option<String>,
    pub proxy_url: Option<String>,
    pub image_proxy: Option<String>,
    pub image_proxy_url: Option<String>,
}

impl ProxyOverride {
    fn api_proxy(&self, state: &AppState, identity: &Identity) -> Result<ProxyConfig, AppError> {
        let strategy = self
            .proxy
            .as_deref()
            .map(str::parse::<ProxyStrategy>)
            .transpose()?;
        let explicit_url = self.proxy_url.as_deref().filter(|url| !url.is_empty());
        if let Some(url) = explicit_url {
            check_caller_relay(url)?;
        }
        let layers = ProxyLayers {
            explicit: ProxyPreference::new(strategy, self.proxy_url.clone()),
            stored: state.identities.preferences(identity).proxy,
            runtime: state.proxy_defaults.clone(),
        };
        Ok(resolve_proxy(&layers)?)
    }

    fn image_proxy(
        &self,
        state: &AppState,
        identity: &Identity,
    ) -> Result<ImageProxyConfig, AppError> {
        let strategy = self
            .image_proxy
            .as_deref()
            .map(str::parse::<ImageProxyStrategy>)
            .transpose()?;
        let layers = ProxyLayers {
            explicit: ProxyPreference::new(strategy, self.image_proxy_url.clone()),
            stored: state.identities.preferences(identity).image_proxy,
            runtime: state.image_proxy_defaults.clone(),
        };
        Ok(resolve_image_proxy(&layers)?)
    }
}

fn rewrite_posters(mut result: MetadataResult, images: &ImageProxyConfig) -> MetadataResult {
    for item in &mut result.list {
        item.poster = images.rewrite_image_url(&item.poster);
    }
    result
}

async fn listing<F, Fut>(
    state: &AppState,
    identity: &Identity,
    overrides: &ProxyOverride,
    load: F,
) -> Result<Json<MetadataResult>, ApiError>
where
    F: FnOnce(ProxyConfig) -> Fut,
    Fut: Future<Output = Result<MetadataResult, crate::application::metadata::MetadataError>>,
{
    let proxy = overrides.api_proxy(state, identity).map_err(api_error)?;
    let images = overrides.image_proxy(state, identity).map_err(api_error)?;
    let result = load(proxy).await.map_err(api_error)?;
    Ok(Json(rewrite_posters(result, &images)))
}

pub async fn categories(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Query(query): Query<CategoryQuery>,
    Query(overrides): Query<ProxyOverride>,
) -> Result<Json<MetadataResult>, ApiError> {
    let metadata = &state.metadata;
    listing(&state, &identity, &overrides, |proxy| async move {
        metadata.categories(&query, &proxy).await
    })
    .await
}

pub async fn tag_list(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Query(query): Query<TagListQuery>,
    Query(overrides): Query<ProxyOverride>,
) -> Result<Json<MetadataResult>, ApiError> {
    let metadata = &state.metadata;
    listing(&state, &identity, &overrides, |proxy| async move {
        metadata.tag_list(&query, &proxy).await
    })
    .await
}

pub async fn recommendations(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Query(query): Query<RecommendQuery>,
    Query(overrides): Query<ProxyOverride>,
) -> Result<Json<MetadataResult>, ApiError> {
    let metadata = &state.metadata;
    listing(&state, &identity, &overrides, |proxy| async move {
        metadata.recommendations(&query, &proxy).await
    })
    .await
}

#[derive(Debug, Deserialize)]
pub struct DetailParams {
    pub id: String,
}

pub async fn detail(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Query(params): Query<DetailParams>,
    Query(overrides): Query<ProxyOverride>,
) -> Result<Json<MetadataDetail>, ApiError> {
    let id = params.id.trim();
    if id.is_empty() || !id.bytes().all(|b| b.is_ascii_digit()) {
        return Err(api_error(AppError::validation(format!(
            "detail id must be numeric, got `{id}`"
        ))));
    }
    let images = overrides.image_proxy(&state, &identity).map_err(api_error)?;
    let mut detail = state.metadata.detail(id).await.map_err(api_error)?;
    detail.poster = images.rewrite_image_url(&detail.poster);
    Ok(Json(detail))
}

pub async fn anime_calendar(
    State(state): State<AppState>,
) -> Result<Json<Vec<CalendarDay>>, ApiError> {
    let days = state.metadata.anime_calendar().await.map_err(api_error)?;
    Ok(Json(days))
}

pub async fn anime_subject(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<AnimeSubject>, ApiError> {
    let subject = state.metadata.anime_subject(id).await.map_err(api_error)?;
    Ok(Json(subject))
}

pub async fn cache_stats(State(state): State<AppState>) -> Json<MetadataCacheStats> {
    Json(state.metadata.cache_stats())
}

#[derive(Debug, Serialize)]
pub struct ClearedCache {
    pub removed: usize,
}

pub async fn clear_cache(State(state): State<AppState>) -> Json<ClearedCache> {
    Json(ClearedCache {
        removed: state.metadata.clear_cache(),
    })
}

#[derive(Debug, Deserialize)]
pub struct ImageParams {
    pub url: String,
}

pub async fn image_proxy(
    State(state): State<AppState>,
    Query(params): Query<ImageParams>,
) -> Result<Response, ApiError> {
    let fetched = state
        .metadata
        .fetch_image(&params.url)
        .await
        .map_err(api_error)?;

    let content_type = fetched
        .content_type
        .as_deref()
        .and_then(|value| HeaderValue::from_str(value).ok())
        .unwrap_or_else(|| HeaderValue::from_static(FALLBACK_CONTENT_TYPE));
    let mut response = (StatusCode::OK, Body::from(fetched.body)).into_response();
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, content_type);
    headers.insert(CACHE_CONTROL, HeaderValue::from_static(IMAGE_CACHE_CONTROL));
    Ok(response)
}
