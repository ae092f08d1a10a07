//! Normalized search results produced by the downstream adapters.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A search hit from one source, normalized by its adapter.
///
/// Fields the engine does not interpret travel in `extra` and are serialized
/// back at the top level of the item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResultItem {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub poster: String,
    #[serde(default)]
    pub episodes: Vec<String>,
    #[serde(default)]
    pub episodes_titles: Vec<String>,
    /// Key of the source this item came from.
    pub source: String,
    pub source_name: String,
    #[serde(default)]
    pub year: String,
    #[serde(default)]
    pub desc: String,
    /// Upstream category label; the content denylist matches against it.
    #[serde(default)]
    pub type_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub douban_id: Option<u64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SearchResultItem {
    pub fn content_kind(&self) -> ContentKind {
        ContentKind::classify(&self.type_name, &self.title)
    }
}

/// Coarse classification of a search hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContentKind {
    Movie,
    Tv,
    ShortDrama,
    Unknown,
}

const SHORT_DRAMA_TYPES: &[&str] = &[
    "短剧",
    "微电影",
    "微剧",
    "小剧场",
    "竖屏短剧",
    "网络微电影",
    "short drama",
    "short film",
    "mini drama",
    "micro drama",
    "vertical drama",
];

const SHORT_DRAMA_TITLE_KEYWORDS: &[&str] = &["短剧", "竖屏", "微电影", "小剧场"];

impl ContentKind {
    /// Classify from the upstream `type_name`, falling back to title keywords for short dramas.
    pub fn classify(type_name: &str, title: &str) -> Self {
        let type_lower = type_name.to_lowercase();
        let title_lower = title.to_lowercase();

        let short_by_type = !type_lower.is_empty()
            && SHORT_DRAMA_TYPES
                .iter()
                .any(|candidate| type_lower.contains(candidate));
        let short_by_title = SHORT_DRAMA_TITLE_KEYWORDS
            .iter()
            .any(|keyword| title_lower.contains(keyword));
        if short_by_type || short_by_title {
            return Self::ShortDrama;
        }

        if type_lower.is_empty() {
            return Self::Unknown;
        }
        if type_lower.contains("电影") || type_lower.contains("movie") {
            return Self::Movie;
        }
        if ["电视剧", "连续剧", "tv", "剧集"]
            .iter()
            .any(|marker| type_lower.contains(marker))
        {
            return Self::Tv;
        }
        Self::Unknown
    }
}
