use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode, header::AUTHORIZATION, header::CACHE_CONTROL},
    response::Response,
};
use bytes::Bytes;
use marquee::application::filter::ContentFilter;
use marquee::application::metadata::{MetadataClient, MetadataSettings};
use marquee::application::notify::NoopNotifier;
use marquee::application::ports::{
    AdapterError, FetchError, FetchedBody, SearchAdapter, UpstreamFetch,
};
use marquee::application::search::{SearchService, TimeoutSchedule};
use marquee::cache::{MemoryStorage, SearchCache, SearchCacheConfig};
use marquee::config::UserSettings;
use marquee::domain::proxy::{ImageProxyStrategy, ProviderEndpoints, ProxyPreference};
use marquee::domain::search::SearchResultItem;
use marquee::domain::source::{SiteConfig, SourceDescriptor};
use marquee::infra::catalog::ConfiguredCatalog;
use marquee::infra::http::{AUTH_TOKEN_HEADER, AppState, build_router};
use serde_json::{Map, Value, json};
use tower::ServiceExt;
use url::Url;

const TOKEN: &str = "alice-secret";

struct EchoAdapter;

#[async_trait]
impl SearchAdapter for EchoAdapter {
    async fn search(
        &self,
        source: &SourceDescriptor,
        query: &str,
        _max_page: NonZeroU32,
    ) -> Result<Vec<SearchResultItem>, AdapterError> {
        Ok(vec![SearchResultItem {
            id: "1".to_string(),
            title: query.to_string(),
            poster: String::new(),
            episodes: vec!["https://cdn.example/1.m3u8".to_string()],
            episodes_titles: vec!["1".to_string()],
            source: source.key.clone(),
            source_name: source.name.clone(),
            year: "2024".to_string(),
            desc: String::new(),
            type_name: "电影".to_string(),
            douban_id: None,
            extra: Map::new(),
        }])
    }
}

struct CannedFetch;

#[async_trait]
impl UpstreamFetch for CannedFetch {
    async fn get_json(&self, url: Url, _timeout: Duration) -> Result<Value, FetchError> {
        if url.path().ends_with("/recent_hot/movie") {
            return Ok(json!({
                "items": [{
                    "id": "1",
                    "title": "Poster Movie",
                    "pic": {"normal": "https://img2.doubanio.com/view/photo/p1.jpg"}
                }]
            }));
        }
        Err(FetchError::Status {
            url: url.to_string(),
            status: 404,
        })
    }

    async fn get_bytes(&self, _url: Url, _timeout: Duration) -> Result<FetchedBody, FetchError> {
        Ok(FetchedBody {
            content_type: None,
            body: Bytes::from_static(b"img"),
        })
    }
}

fn app() -> Router {
    let catalog = Arc::new(ConfiguredCatalog::new(
        vec![SourceDescriptor {
            key: "a".to_string(),
            name: "Source A".to_string(),
            api: "https://a.example/api.php/provide/vod".to_string(),
            detail: None,
            disabled: false,
        }],
        vec![UserSettings {
            username: "alice".to_string(),
            token: TOKEN.to_string(),
            sources: None,
            proxy: ProxyPreference::default(),
            image_proxy: ProxyPreference::new(Some(ImageProxyStrategy::Server), None),
        }],
        SiteConfig {
            response_cache_seconds: 600,
            ..SiteConfig::default()
        },
    ));
    let search = SearchService::new(
        catalog.clone(),
        catalog.clone(),
        Arc::new(EchoAdapter),
        Arc::new(SearchCache::new(SearchCacheConfig::default())),
        ContentFilter::default(),
        TimeoutSchedule::default(),
    );
    let metadata = MetadataClient::new(
        Arc::new(CannedFetch),
        Arc::new(MemoryStorage::new()),
        Arc::new(NoopNotifier),
        ProviderEndpoints::douban().unwrap(),
        MetadataSettings::new(Url::parse("https://api.bgm.tv/").unwrap()),
    );

    build_router(AppState {
        search: Arc::new(search),
        metadata: Arc::new(metadata),
        identities: catalog,
        proxy_defaults: ProxyPreference::default(),
        image_proxy_defaults: ProxyPreference::default(),
    })
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

fn authed(uri: &str) -> Request<Body> {
    Request::builder()
        .method(Method::GET)
        .uri(uri)
        .header(AUTHORIZATION, format!("Bearer {TOKEN}"))
        .body(Body::empty())
        .unwrap()
}

async fn json_body(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn search_requires_a_token() {
    let response = app().oneshot(get("/api/search?q=matrix")).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(response).await, json!({"error": "Unauthorized"}));
}

#[tokio::test]
async fn wrong_token_is_rejected() {
    let request = Request::builder()
        .uri("/api/search?q=matrix")
        .header(AUTHORIZATION, "Bearer nope")
        .body(Body::empty())
        .unwrap();

    let response = app().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn search_reports_cache_state_and_cdn_headers() {
    let app = app();

    let first = app.clone().oneshot(authed("/api/search?q=Matrix")).await.unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(first.headers()["x-cache"], "MISS");
    assert_eq!(
        first.headers()[CACHE_CONTROL],
        "public, max-age=600, s-maxage=600"
    );
    assert_eq!(first.headers()["cdn-cache-control"], "public, s-maxage=600");
    assert_eq!(first.headers()["netlify-vary"], "query");
    let body = json_body(first).await;
    assert_eq!(body["results"][0]["title"], "Matrix");
    assert_eq!(body["results"][0]["source_name"], "Source A");

    let second = app
        .clone()
        .oneshot(authed("/api/search?q=matrix"))
        .await
        .unwrap();
    assert_eq!(second.headers()["x-cache"], "HIT");
}

#[tokio::test]
async fn token_header_is_accepted() {
    let request = Request::builder()
        .uri("/api/search?q=matrix")
        .header(AUTH_TOKEN_HEADER, TOKEN)
        .body(Body::empty())
        .unwrap();

    let response = app().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn empty_query_returns_no_results_without_x_cache() {
    let response = app().oneshot(authed("/api/search")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get("x-cache").is_none());
    assert!(response.headers().contains_key(CACHE_CONTROL));
    assert_eq!(json_body(response).await, json!({"results": []}));
}

#[tokio::test]
async fn categories_apply_the_stored_image_preference() {
    let response = app()
        .oneshot(authed(
            "/api/douban/categories?kind=movie&category=%E7%83%AD%E9%97%A8&type=%E5%85%A8%E9%83%A8",
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["code"], 200);
    assert_eq!(
        body["list"][0]["poster"],
        "/api/image-proxy?url=https%3A%2F%2Fimg2.doubanio.com%2Fview%2Fphoto%2Fp1.jpg"
    );
}

#[tokio::test]
async fn explicit_image_override_wins() {
    let response = app()
        .oneshot(authed(
            "/api/douban/categories?kind=movie&category=x&type=y&image_proxy=direct",
        ))
        .await
        .unwrap();

    let body = json_body(response).await;
    assert_eq!(
        body["list"][0]["poster"],
        "https://img2.doubanio.com/view/photo/p1.jpg"
    );
}

#[tokio::test]
async fn unknown_proxy_tag_is_a_bad_request() {
    let response = app()
        .oneshot(authed(
            "/api/douban/categories?kind=movie&category=x&type=y&proxy=teleport",
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        json_body(response).await,
        json!({"error": "Invalid proxy configuration"})
    );
}

#[tokio::test]
async fn caller_supplied_relay_must_be_public() {
    let app = app();

    for relay in ["http%3A%2F%2F10.0.0.1%2F%3Furl%3D", "https%3A%2F%2F127.0.0.1%2F"] {
        let response = app
            .clone()
            .oneshot(authed(&format!(
                "/api/douban/categories?kind=movie&category=x&type=y&proxy=custom&proxy_url={relay}"
            )))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            json_body(response).await,
            json!({"error": "Invalid proxy configuration"})
        );
    }
}

#[tokio::test]
async fn detail_requires_a_numeric_id() {
    let response = app()
        .oneshot(authed("/api/douban/details?id=abc"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn upstream_not_found_is_passed_through() {
    let response = app()
        .oneshot(authed("/api/douban/details?id=404"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(response).await, json!({"error": "Resource not found"}));
}

#[tokio::test]
async fn image_relay_is_public_but_host_restricted() {
    let app = app();

    let ok = app
        .clone()
        .oneshot(get(
            "/api/image-proxy?url=https%3A%2F%2Fimg1.doubanio.com%2Fp.jpg",
        ))
        .await
        .unwrap();
    assert_eq!(ok.status(), StatusCode::OK);
    assert_eq!(ok.headers()["content-type"], "application/octet-stream");
    assert_eq!(ok.headers()[CACHE_CONTROL], "public, max-age=86400");

    let refused = app
        .clone()
        .oneshot(get("/api/image-proxy?url=https%3A%2F%2Fevil.example%2Fp.jpg"))
        .await
        .unwrap();
    assert_eq!(refused.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn cache_administration_round_trip() {
    let app = app();

    app.clone()
        .oneshot(authed("/api/douban/categories?kind=movie&category=x&type=y"))
        .await
        .unwrap();

    let stats = app.clone().oneshot(authed("/api/cache/stats")).await.unwrap();
    assert_eq!(stats.status(), StatusCode::OK);
    assert_eq!(json_body(stats).await["douban"]["total_items"], 1);

    let clear = Request::builder()
        .method(Method::DELETE)
        .uri("/api/cache")
        .header(AUTHORIZATION, format!("Bearer {TOKEN}"))
        .body(Body::empty())
        .unwrap();
    let cleared = app.clone().oneshot(clear).await.unwrap();
    assert_eq!(json_body(cleared).await, json!({"removed": 1}));
}

#[tokio::test]
async fn health_needs_no_identity() {
    let response = app().oneshot(get("/_health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}
