use axum::{
    Json,
    extract::{Extension, Query, State},
    http::{HeaderMap, HeaderName, HeaderValue, header::CACHE_CONTROL},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use crate::{
    application::error::AppError,
    domain::{identity::Identity, search::SearchResultItem},
};

use super::{AppState, error::ApiError};

const SOURCE: &str = "infra::http::search";

pub const X_CACHE: &str = "x-cache";
const CDN_CACHE_CONTROL: &str = "cdn-cache-control";
const VERCEL_CDN_CACHE_CONTROL: &str = "vercel-cdn-cache-control";
const NETLIFY_VARY: &str = "netlify-vary";

#[derive(Debug, Default, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub q: Option<String>,
}

#[derive(Serialize)]
struct SearchResponse<'a> {
    results: &'a [SearchResultItem],
}

pub async fn search(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Query(params): Query<SearchParams>,
) -> Result<Response, ApiError> {
    let query = params.q.unwrap_or_default();
    let outcome = state
        .search
        .search(&identity, &query)
        .await
        .map_err(|err| ApiError::from_app(SOURCE, AppError::from(err)))?;
    let site = state
        .search
        .site_config()
        .await
        .map_err(|err| ApiError::from_app(SOURCE, AppError::from(err)))?;

    let mut response = Json(SearchResponse {
        results: &outcome.results,
    })
    .into_response();
    let headers = response.headers_mut();
    apply_cache_headers(headers, site.response_cache_seconds);
    if let Some(value) = outcome.cache.header_value() {
        headers.insert(HeaderName::from_static(X_CACHE), HeaderValue::from_static(value));
    }
    Ok(response)
}

fn apply_cache_headers(headers: &mut HeaderMap, seconds: u64) {
    let pairs = [
        (
            CACHE_CONTROL,
            format!("public, max-age={seconds}, s-maxage={seconds}"),
        ),
        (
            HeaderName::from_static(CDN_CACHE_CONTROL),
            format!("public, s-maxage={seconds}"),
        ),
        (
            HeaderName::from_static(VERCEL_CDN_CACHE_CONTROL),
            format!("public, s-maxage={seconds}"),
        ),
        (HeaderName::from_static(NETLIFY_VARY), "query".to_string()),
    ];
    for (name, value) in pairs {
        if let Ok(value) = HeaderValue::from_str(&value) {
            headers.insert(name, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_headers_share_one_lifetime() {
        let mut headers = HeaderMap::new();
        apply_cache_headers(&mut headers, 600);
        assert_eq!(headers[CACHE_CONTROL], "public, max-age=600, s-maxage=600");
        assert_eq!(headers["cdn-cache-control"], "public, s-maxage=600");
        assert_eq!(headers["vercel-cdn-cache-control"], "public, s-maxage=600");
        assert_eq!(headers["netlify-vary"], "query");
    }
}
