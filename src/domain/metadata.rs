//! Canonical shapes for third-party catalog metadata and the queries that select it.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::error::DomainError;

pub const SUCCESS_CODE: u16 = 200;
const DEFAULT_PAGE_LIMIT: u32 = 20;

/// A catalog entry normalized across every upstream listing shape.
///
/// Optional upstream fields normalize to an empty string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataItem {
    pub id: String,
    pub title: String,
    pub poster: String,
    pub rate: String,
    pub year: String,
}

/// Envelope returned by listing views.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataResult {
    pub code: u16,
    pub message: String,
    pub list: Vec<MetadataItem>,
}

impl MetadataResult {
    pub fn success(list: Vec<MetadataItem>) -> Self {
        Self {
            code: SUCCESS_CODE,
            message: "ok".to_string(),
            list,
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == SUCCESS_CODE
    }
}

/// Detail record for a single catalog item.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetadataDetail {
    pub id: String,
    pub title: String,
    pub poster: String,
    pub rate: String,
    pub year: String,
    #[serde(default)]
    pub directors: Vec<String>,
    #[serde(default)]
    pub screenwriters: Vec<String>,
    #[serde(default)]
    pub cast: Vec<String>,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub countries: Vec<String>,
    #[serde(default)]
    pub languages: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub episodes: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub episode_length: Option<u32>,
    #[serde(default)]
    pub first_aired: String,
    #[serde(default)]
    pub plot_summary: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Movie,
    Tv,
}

impl MediaKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MediaKind::Movie => "movie",
            MediaKind::Tv => "tv",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaKind {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "movie" => Ok(MediaKind::Movie),
            "tv" => Ok(MediaKind::Tv),
            other => Err(DomainError::UnknownMediaKind(other.to_string())),
        }
    }
}

fn default_limit() -> u32 {
    DEFAULT_PAGE_LIMIT
}

/// Recent-hot listing for one category.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CategoryQuery {
    pub kind: MediaKind,
    pub category: String,
    #[serde(rename = "type")]
    pub kind_type: String,
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default)]
    pub start: u32,
}

/// Tag-based listing.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TagListQuery {
    pub tag: String,
    #[serde(rename = "type")]
    pub kind_type: String,
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default)]
    pub start: u32,
}

/// Recommendation feed with multi-dimensional filters.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RecommendQuery {
    pub kind: MediaKind,
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default)]
    pub start: u32,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub year: Option<String>,
    #[serde(default)]
    pub platform: Option<String>,
    #[serde(default)]
    pub sort: Option<String>,
}

/// Value meaning "no filter" for every recommendation dimension.
pub const FILTER_ALL: &str = "all";
/// Sort value meaning "provider default ordering".
pub const SORT_DEFAULT: &str = "T";

/// Recommendation filters after `"all"` / default-sort collapse to unset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecommendFilters {
    pub category: Option<String>,
    pub format: Option<String>,
    pub label: Option<String>,
    pub region: Option<String>,
    pub year: Option<String>,
    pub platform: Option<String>,
    pub sort: Option<String>,
}

fn collapse(value: &Option<String>, sentinel: &str) -> Option<String> {
    value
        .as_deref()
        .filter(|v| !v.is_empty() && *v != sentinel)
        .map(str::to_string)
}

impl RecommendQuery {
    pub fn filters(&self) -> RecommendFilters {
        RecommendFilters {
            category: collapse(&self.category, FILTER_ALL),
            format: collapse(&self.format, FILTER_ALL),
            label: collapse(&self.label, FILTER_ALL),
            region: collapse(&self.region, FILTER_ALL),
            year: collapse(&self.year, FILTER_ALL),
            platform: collapse(&self.platform, FILTER_ALL),
            sort: collapse(&self.sort, SORT_DEFAULT),
        }
    }
}

impl RecommendFilters {
    /// The `selected_categories` JSON object the provider expects.
    pub fn selected_categories(&self) -> Map<String, Value> {
        let mut selected = Map::new();
        selected.insert(
            "类型".to_string(),
            Value::from(self.category.clone().unwrap_or_default()),
        );
        if let Some(format) = &self.format {
            selected.insert("形式".to_string(), Value::from(format.clone()));
        }
        if let Some(region) = &self.region {
            selected.insert("地区".to_string(), Value::from(region.clone()));
        }
        selected
    }

    /// Tag list in provider order; `format` only stands in when no category is set.
    pub fn tags(&self) -> Vec<&str> {
        let mut tags = Vec::new();
        match (&self.category, &self.format) {
            (Some(category), _) => tags.push(category.as_str()),
            (None, Some(format)) => tags.push(format.as_str()),
            (None, None) => {}
        }
        for value in [&self.label, &self.region, &self.year, &self.platform]
            .into_iter()
            .flatten()
        {
            tags.push(value.as_str());
        }
        tags
    }
}

/// One weekday of the anime airing calendar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarDay {
    pub weekday: CalendarWeekday,
    #[serde(default)]
    pub items: Vec<AnimeSubject>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarWeekday {
    pub en: String,
    #[serde(default)]
    pub cn: String,
    #[serde(default)]
    pub id: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnimeSubject {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub name_cn: String,
    #[serde(default)]
    pub air_date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<AnimeRating>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub images: Option<AnimeImages>,
    /// Provider fields passed through untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnimeRating {
    #[serde(default)]
    pub score: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnimeImages {
    pub large: String,
    pub common: String,
    pub medium: String,
    pub small: String,
    pub grid: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recommend(category: &str, format: &str, sort: &str) -> RecommendQuery {
        RecommendQuery {
            kind: MediaKind::Tv,
            limit: 20,
            start: 0,
            category: Some(category.to_string()),
            format: Some(format.to_string()),
            label: Some("all".to_string()),
            region: Some("华语".to_string()),
            year: Some("all".to_string()),
            platform: None,
            sort: Some(sort.to_string()),
        }
    }

    #[test]
    fn all_and_default_sort_collapse_to_unset() {
        let filters = recommend("all", "all", "T").filters();
        assert_eq!(filters.category, None);
        assert_eq!(filters.format, None);
        assert_eq!(filters.label, None);
        assert_eq!(filters.year, None);
        assert_eq!(filters.sort, None);
        assert_eq!(filters.region.as_deref(), Some("华语"));
        assert_eq!(filters.tags(), vec!["华语"]);
    }

    #[test]
    fn format_stands_in_for_missing_category() {
        let filters = recommend("all", "电视剧", "U").filters();
        assert_eq!(filters.tags(), vec!["电视剧", "华语"]);
        assert_eq!(filters.sort.as_deref(), Some("U"));

        let selected = filters.selected_categories();
        assert_eq!(selected["类型"], "");
        assert_eq!(selected["形式"], "电视剧");
        assert_eq!(selected["地区"], "华语");
    }

    #[test]
    fn category_takes_precedence_over_format_in_tags() {
        let filters = recommend("喜剧", "综艺", "T").filters();
        assert_eq!(filters.tags(), vec!["喜剧", "华语"]);
    }

    #[test]
    fn media_kind_rejects_unknown_values() {
        assert_eq!("tv".parse::<MediaKind>().unwrap(), MediaKind::Tv);
        assert!("anime".parse::<MediaKind>().is_err());
    }
}
