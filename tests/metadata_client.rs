use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use marquee::application::metadata::{MetadataClient, MetadataError, MetadataSettings};
use marquee::application::notify::{BroadcastNotifier, ErrorNotifier, NoopNotifier};
use marquee::application::ports::{FetchError, FetchedBody, UpstreamFetch};
use marquee::cache::{CacheStorage, FileStorage, MemoryStorage};
use marquee::domain::metadata::{CategoryQuery, MediaKind, TagListQuery};
use marquee::domain::proxy::{ProviderEndpoints, ProxyConfig, ProxyStrategy};
use serde_json::{Value, json};
use url::Url;

/// Replays queued responses in order; an empty queue answers with `fallback`.
struct ReplayFetch {
    responses: Mutex<VecDeque<Result<Value, FetchError>>>,
    fallback: Value,
    requested: Mutex<Vec<Url>>,
}

impl ReplayFetch {
    fn answering(fallback: Value) -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            fallback,
            requested: Mutex::new(Vec::new()),
        }
    }

    fn then(self, response: Result<Value, FetchError>) -> Self {
        self.responses.lock().unwrap().push_back(response);
        self
    }

    fn requested(&self) -> Vec<Url> {
        self.requested.lock().unwrap().clone()
    }
}

#[async_trait]
impl UpstreamFetch for ReplayFetch {
    async fn get_json(&self, url: Url, _timeout: Duration) -> Result<Value, FetchError> {
        self.requested.lock().unwrap().push(url);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(self.fallback.clone()))
    }

    async fn get_bytes(&self, url: Url, _timeout: Duration) -> Result<FetchedBody, FetchError> {
        self.requested.lock().unwrap().push(url);
        Ok(FetchedBody {
            content_type: Some("image/jpeg".to_string()),
            body: Bytes::from_static(b"\xff\xd8\xff"),
        })
    }
}

fn status(code: u16) -> FetchError {
    FetchError::Status {
        url: "https://m.douban.com/".to_string(),
        status: code,
    }
}

fn settings() -> MetadataSettings {
    MetadataSettings::new(Url::parse("https://api.bgm.tv/").unwrap())
}

fn client_with(
    fetch: Arc<ReplayFetch>,
    storage: Arc<dyn CacheStorage>,
    notifier: Arc<dyn ErrorNotifier>,
) -> MetadataClient {
    MetadataClient::new(
        fetch,
        storage,
        notifier,
        ProviderEndpoints::douban().unwrap(),
        settings(),
    )
}

fn client(fetch: Arc<ReplayFetch>) -> MetadataClient {
    client_with(fetch, Arc::new(MemoryStorage::new()), Arc::new(NoopNotifier))
}

fn category_payload() -> Value {
    json!({
        "items": [{
            "id": "35267208",
            "title": "Hot Movie",
            "card_subtitle": "2023 / 美国 / 剧情",
            "pic": {"normal": "https://img1.doubanio.com/view/photo/m/public/p1.jpg"},
            "rating": {"value": 8.5}
        }]
    })
}

fn category_query() -> CategoryQuery {
    CategoryQuery {
        kind: MediaKind::Movie,
        category: "热门".to_string(),
        kind_type: "全部".to_string(),
        limit: 20,
        start: 0,
    }
}

fn param(url: &Url, name: &str) -> Option<String> {
    url.query_pairs()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
}

#[tokio::test]
async fn categories_go_through_the_cdn_mirror_and_are_cached() {
    let fetch = Arc::new(ReplayFetch::answering(category_payload()));
    let client = client(fetch.clone());
    let proxy = ProxyConfig::default();

    let first = client.categories(&category_query(), &proxy).await.unwrap();
    let second = client.categories(&category_query(), &proxy).await.unwrap();

    assert!(first.is_success());
    assert_eq!(first.list.len(), 1);
    assert_eq!(first.list[0].rate, "8.5");
    assert_eq!(first.list[0].year, "2023");
    assert_eq!(first, second);

    let requested = fetch.requested();
    assert_eq!(requested.len(), 1);
    assert_eq!(requested[0].host_str(), Some("m.douban.cmliussss.net"));
    assert_eq!(
        requested[0].path(),
        "/rexxar/api/v2/subject/recent_hot/movie"
    );
    assert_eq!(param(&requested[0], "category").as_deref(), Some("热门"));
    assert_eq!(param(&requested[0], "limit").as_deref(), Some("20"));
}

#[tokio::test]
async fn custom_relay_wraps_the_origin_url() {
    let fetch = Arc::new(ReplayFetch::answering(json!({"subjects": []})));
    let client = client(fetch.clone());
    let proxy = ProxyConfig {
        strategy: ProxyStrategy::Custom,
        url: "https://relay.example/?url=".to_string(),
    };
    let query = TagListQuery {
        tag: "热门".to_string(),
        kind_type: "movie".to_string(),
        limit: 16,
        start: 0,
    };

    client.tag_list(&query, &proxy).await.unwrap();

    let requested = fetch.requested();
    assert_eq!(requested[0].host_str(), Some("relay.example"));
    let target = param(&requested[0], "url").expect("wrapped target");
    assert!(target.starts_with("https://movie.douban.com/j/search_subjects?"));
}

#[tokio::test(start_paused = true)]
async fn detail_retries_server_errors_and_goes_direct() {
    let fetch = Arc::new(
        ReplayFetch::answering(json!({}))
            .then(Err(status(503)))
            .then(Ok(json!({
                "id": "1292052",
                "title": "The Shawshank Redemption",
                "year": "1994",
                "directors": [{"name": "Frank Darabont"}],
                "durations": ["142分钟"]
            }))),
    );
    let client = client(fetch.clone());

    let detail = client.detail("1292052").await.unwrap();

    assert_eq!(detail.title, "The Shawshank Redemption");
    assert_eq!(detail.directors, ["Frank Darabont"]);
    assert_eq!(detail.episode_length, Some(142));
    let requested = fetch.requested();
    assert_eq!(requested.len(), 2);
    assert!(
        requested
            .iter()
            .all(|url| url.as_str() == "https://m.douban.com/rexxar/api/v2/subject/1292052")
    );
}

#[tokio::test(start_paused = true)]
async fn detail_gives_up_after_three_attempts() {
    let fetch = Arc::new(
        ReplayFetch::answering(json!({}))
            .then(Err(status(502)))
            .then(Err(status(502)))
            .then(Err(status(502))),
    );
    let client = client(fetch.clone());

    let err = client.detail("1").await.unwrap_err();

    assert_eq!(err.upstream_status(), Some(502));
    assert_eq!(fetch.requested().len(), 3);
}

#[tokio::test]
async fn client_errors_are_not_retried() {
    let fetch = Arc::new(ReplayFetch::answering(json!({})).then(Err(status(404))));
    let client = client(fetch.clone());

    let err = client.detail("404").await.unwrap_err();

    assert_eq!(err.upstream_status(), Some(404));
    assert_eq!(fetch.requested().len(), 1);
}

#[tokio::test]
async fn listing_failures_notify_once_without_retry() {
    let fetch = Arc::new(ReplayFetch::answering(json!({})).then(Err(status(500))));
    let notifier = BroadcastNotifier::default();
    let mut notifications = notifier.subscribe();
    let client = client_with(
        fetch.clone(),
        Arc::new(MemoryStorage::new()),
        Arc::new(notifier),
    );
    let query = TagListQuery {
        tag: "热门".to_string(),
        kind_type: "tv".to_string(),
        limit: 16,
        start: 0,
    };

    let result = client.tag_list(&query, &ProxyConfig::direct()).await;

    assert!(result.is_err());
    assert_eq!(fetch.requested().len(), 1);
    assert_eq!(notifications.try_recv().unwrap(), "Failed to load douban list");
    assert!(notifications.try_recv().is_err());
}

#[tokio::test]
async fn detail_failures_stay_quiet() {
    let fetch = Arc::new(ReplayFetch::answering(json!({})).then(Err(status(404))));
    let notifier = BroadcastNotifier::default();
    let mut notifications = notifier.subscribe();
    let client = client_with(fetch, Arc::new(MemoryStorage::new()), Arc::new(notifier));

    assert!(client.detail("1").await.is_err());
    assert!(notifications.try_recv().is_err());
}

#[tokio::test]
async fn failed_views_are_not_cached() {
    let fetch = Arc::new(
        ReplayFetch::answering(category_payload()).then(Err(FetchError::Decode {
            url: "https://m.douban.com/".to_string(),
            message: "expected value".to_string(),
        })),
    );
    let client = client(fetch.clone());
    let proxy = ProxyConfig::direct();

    assert!(client.categories(&category_query(), &proxy).await.is_err());
    assert!(client.categories(&category_query(), &proxy).await.is_ok());
    assert_eq!(fetch.requested().len(), 2);
}

#[tokio::test]
async fn file_storage_survives_a_restart() {
    let dir = tempfile::tempdir().unwrap();
    let proxy = ProxyConfig::direct();

    let first_fetch = Arc::new(ReplayFetch::answering(category_payload()));
    let first = client_with(
        first_fetch.clone(),
        Arc::new(FileStorage::open(dir.path()).unwrap()),
        Arc::new(NoopNotifier),
    );
    first.categories(&category_query(), &proxy).await.unwrap();
    drop(first);

    let second_fetch = Arc::new(ReplayFetch::answering(json!({"items": []})));
    let second = client_with(
        second_fetch.clone(),
        Arc::new(FileStorage::open(dir.path()).unwrap()),
        Arc::new(NoopNotifier),
    );
    let cached = second.categories(&category_query(), &proxy).await.unwrap();

    assert_eq!(cached.list.len(), 1);
    assert_eq!(first_fetch.requested().len(), 1);
    assert!(second_fetch.requested().is_empty());
}

#[tokio::test]
async fn anime_views_use_their_own_namespace() {
    let calendar = json!([{
        "weekday": {"en": "Mon", "cn": "星期一", "id": 1},
        "items": [
            {"id": 400602, "name": "Frieren", "name_cn": "葬送的芙莉莲", "images": {"large": "https://lain.bgm.tv/l.jpg"}},
            {"id": 1, "name": "No Art", "images": null}
        ]
    }]);
    let fetch = Arc::new(ReplayFetch::answering(calendar));
    let client = client(fetch.clone());

    let days = client.anime_calendar().await.unwrap();

    assert_eq!(days.len(), 1);
    assert_eq!(days[0].items.len(), 1);
    assert_eq!(days[0].items[0].name_cn, "葬送的芙莉莲");
    assert_eq!(fetch.requested()[0].as_str(), "https://api.bgm.tv/calendar");

    let stats = client.cache_stats();
    assert_eq!(stats.bangumi.total_items, 1);
    assert_eq!(stats.douban.total_items, 0);
}

#[tokio::test]
async fn clearing_removes_both_namespaces() {
    let fetch = Arc::new(
        ReplayFetch::answering(category_payload())
            .then(Ok(json!({"id": 400602, "name": "Frieren"}))),
    );
    let client = client(fetch);

    client.anime_subject(400602).await.unwrap();
    client
        .categories(&category_query(), &ProxyConfig::direct())
        .await
        .unwrap();
    assert_eq!(client.cache_stats().douban.total_items, 1);
    assert_eq!(client.cache_stats().bangumi.total_items, 1);

    assert_eq!(client.clear_cache(), 2);
    let stats = client.cache_stats();
    assert_eq!(stats.douban.total_items, 0);
    assert_eq!(stats.bangumi.total_items, 0);
}

#[tokio::test]
async fn image_relay_only_accepts_provider_hosts() {
    let fetch = Arc::new(ReplayFetch::answering(json!({})));
    let client = client(fetch.clone());

    let image = client
        .fetch_image("https://img3.doubanio.com/view/photo/p1.jpg")
        .await
        .unwrap();
    assert_eq!(image.content_type.as_deref(), Some("image/jpeg"));

    let err = client
        .fetch_image("https://evil.example/p1.jpg")
        .await
        .unwrap_err();
    assert!(matches!(err, MetadataError::ImageHost(host) if host == "evil.example"));
    assert_eq!(fetch.requested().len(), 1);
}
