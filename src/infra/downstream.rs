//! Downstream search against Apple-CMS style `?ac=videolist` endpoints.

use std::num::NonZeroU32;

use async_trait::async_trait;
use futures::future::join_all;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};
use url::Url;

use crate::{
    application::ports::{AdapterError, SearchAdapter},
    domain::{search::SearchResultItem, source::SourceDescriptor},
};

const SOURCE: &str = "infra::downstream";
const GROUP_SEPARATOR: &str = "$$$";
const EPISODE_SEPARATOR: char = '#';
const TITLE_SEPARATOR: char = '$';

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct VideoListPage {
    #[serde(deserialize_with = "lenient_u32")]
    pagecount: u32,
    #[serde(deserialize_with = "lenient_list")]
    list: Vec<VideoEntry>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct VideoEntry {
    #[serde(deserialize_with = "lenient_string")]
    vod_id: String,
    #[serde(deserialize_with = "lenient_string")]
    vod_name: String,
    #[serde(deserialize_with = "lenient_string")]
    vod_pic: String,
    #[serde(deserialize_with = "lenient_string")]
    vod_play_url: String,
    #[serde(deserialize_with = "lenient_string")]
    vod_year: String,
    #[serde(deserialize_with = "lenient_string")]
    vod_content: String,
    #[serde(deserialize_with = "lenient_string")]
    type_name: String,
    #[serde(deserialize_with = "lenient_string")]
    vod_douban_id: String,
    #[serde(deserialize_with = "lenient_string")]
    vod_remarks: String,
    #[serde(deserialize_with = "lenient_string")]
    vod_class: String,
}

fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(value) => value,
        Value::Number(value) => value.to_string(),
        _ => String::new(),
    })
}

fn lenient_list<'de, D>(deserializer: D) -> Result<Vec<VideoEntry>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<Vec<VideoEntry>>::deserialize(deserializer)?.unwrap_or_default())
}

fn lenient_u32<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(value) => value
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .unwrap_or(0),
        Value::String(value) => value.trim().parse().unwrap_or(0),
        _ => 0,
    })
}

/// Playable episodes from the play group with the most links.
fn parse_episodes(play_url: &str) -> (Vec<String>, Vec<String>) {
    play_url
        .split(GROUP_SEPARATOR)
        .map(|group| {
            group
                .split(EPISODE_SEPARATOR)
                .filter_map(|episode| {
                    let (title, link) = match episode.split_once(TITLE_SEPARATOR) {
                        Some((title, link)) => (title.trim(), link.trim()),
                        None => ("", episode.trim()),
                    };
                    (link.starts_with("http://") || link.starts_with("https://"))
                        .then(|| (title.to_string(), link.to_string()))
                })
                .collect::<Vec<_>>()
        })
        .max_by_key(Vec::len)
        .unwrap_or_default()
        .into_iter()
        .enumerate()
        .map(|(index, (title, link))| {
            let title = if title.is_empty() {
                (index + 1).to_string()
            } else {
                title
            };
            (link, title)
        })
        .unzip()
}

fn strip_tags(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut in_tag = false;
    for ch in raw.chars() {
        match ch {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => out.push(ch),
            _ => {}
        }
    }
    out.replace("&nbsp;", " ").trim().to_string()
}

fn year_of(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.len() >= 4 && trimmed.as_bytes()[..4].iter().all(u8::is_ascii_digit) {
        trimmed[..4].to_string()
    } else {
        "unknown".to_string()
    }
}

fn normalize(source: &SourceDescriptor, entry: VideoEntry) -> Option<SearchResultItem> {
    let (episodes, episodes_titles) = parse_episodes(&entry.vod_play_url);
    if episodes.is_empty() {
        return None;
    }

    let mut extra = Map::new();
    if !entry.vod_remarks.is_empty() {
        extra.insert("remarks".to_string(), Value::from(entry.vod_remarks));
    }
    if !entry.vod_class.is_empty() {
        extra.insert("class".to_string(), Value::from(entry.vod_class));
    }

    Some(SearchResultItem {
        id: entry.vod_id,
        title: entry.vod_name.trim().to_string(),
        poster: entry.vod_pic,
        episodes,
        episodes_titles,
        source: source.key.clone(),
        source_name: source.name.clone(),
        year: year_of(&entry.vod_year),
        desc: strip_tags(&entry.vod_content),
        type_name: entry.type_name,
        douban_id: entry.vod_douban_id.parse().ok().filter(|id| *id != 0),
        extra,
    })
}

pub(crate) fn search_url(
    source: &SourceDescriptor,
    query: &str,
    page: u32,
) -> Result<Url, AdapterError> {
    let mut url = Url::parse(&source.api).map_err(|err| AdapterError::Request {
        source_key: source.key.clone(),
        message: format!("invalid api url `{}`: {err}", source.api),
    })?;
    {
        let mut pairs = url.query_pairs_mut();
        pairs.append_pair("ac", "videolist").append_pair("wd", query);
        if page > 1 {
            pairs.append_pair("pg", &page.to_string());
        }
    }
    Ok(url)
}

#[derive(Debug, Clone)]
pub struct HttpSearchAdapter {
    client: Client,
}

impl HttpSearchAdapter {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn fetch_page(
        &self,
        source: &SourceDescriptor,
        query: &str,
        page: u32,
    ) -> Result<VideoListPage, AdapterError> {
        let url = search_url(source, query, page)?;
        let request_error = |err: reqwest::Error| AdapterError::Request {
            source_key: source.key.clone(),
            message: err.to_string(),
        };
        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(request_error)?;
        let bytes = response.bytes().await.map_err(request_error)?;
        serde_json::from_slice(&bytes).map_err(|err| AdapterError::Payload {
            source_key: source.key.clone(),
            message: err.to_string(),
        })
    }
}

#[async_trait]
impl SearchAdapter for HttpSearchAdapter {
    async fn search(
        &self,
        source: &SourceDescriptor,
        query: &str,
        max_page: NonZeroU32,
    ) -> Result<Vec<SearchResultItem>, AdapterError> {
        let first = self.fetch_page(source, query, 1).await?;
        let last_page = first.pagecount.min(max_page.get());
        let mut entries = first.list;

        // Later pages are best effort; the first page already answered.
        let rest = join_all((2..=last_page).map(|page| self.fetch_page(source, query, page))).await;
        for (offset, page) in rest.into_iter().enumerate() {
            match page {
                Ok(page) => entries.extend(page.list),
                Err(err) => warn!(
                    target_module = SOURCE,
                    source = %source.key,
                    page = offset + 2,
                    error = %err,
                    "additional page failed"
                ),
            }
        }

        let items: Vec<_> = entries
            .into_iter()
            .filter_map(|entry| normalize(source, entry))
            .collect();
        debug!(
            target_module = SOURCE,
            source = %source.key,
            pages = last_page.max(1),
            items = items.len(),
            "downstream search finished"
        );
        Ok(items)
    }
}
