//! Provider request parameters and cache keys per view.

use serde_json::Value;

use crate::{
    cache::metadata_key,
    domain::{
        metadata::{CategoryQuery, RecommendQuery, TagListQuery},
        proxy::UpstreamHost,
    },
};

use super::View;

/// Everything needed to serve one view: where to fetch and what to cache it as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ViewRequest {
    pub view: View,
    pub host: UpstreamHost,
    pub path: String,
    pub query: Vec<(&'static str, String)>,
    pub cache_key: String,
}

pub(crate) fn categories(query: &CategoryQuery) -> ViewRequest {
    let cache_key = metadata_key(
        View::Categories.cache_prefix(),
        &[
            ("kind", query.kind.to_string()),
            ("category", query.category.clone()),
            ("type", query.kind_type.clone()),
            ("pageLimit", query.limit.to_string()),
            ("pageStart", query.start.to_string()),
        ],
    );
    ViewRequest {
        view: View::Categories,
        host: UpstreamHost::Mobile,
        path: format!("rexxar/api/v2/subject/recent_hot/{}", query.kind),
        query: vec![
            ("start", query.start.to_string()),
            ("limit", query.limit.to_string()),
            ("category", query.category.clone()),
            ("type", query.kind_type.clone()),
        ],
        cache_key,
    }
}

pub(crate) fn tag_list(query: &TagListQuery) -> ViewRequest {
    let cache_key = metadata_key(
        View::Lists.cache_prefix(),
        &[
            ("tag", query.tag.clone()),
            ("type", query.kind_type.clone()),
            ("pageLimit", query.limit.to_string()),
            ("pageStart", query.start.to_string()),
        ],
    );
    ViewRequest {
        view: View::Lists,
        host: UpstreamHost::Movie,
        path: "j/search_subjects".to_string(),
        query: vec![
            ("type", query.kind_type.clone()),
            ("tag", query.tag.clone()),
            ("sort", "recommend".to_string()),
            ("page_limit", query.limit.to_string()),
            ("page_start", query.start.to_string()),
        ],
        cache_key,
    }
}

/// Filters valued `"all"` (and the default sort) are dropped before the
/// provider query is composed. The cache key keeps the raw values.
pub(crate) fn recommendations(query: &RecommendQuery) -> ViewRequest {
    let raw = |value: &Option<String>| value.clone().unwrap_or_default();
    let cache_key = metadata_key(
        View::Recommends.cache_prefix(),
        &[
            ("kind", query.kind.to_string()),
            ("pageLimit", query.limit.to_string()),
            ("pageStart", query.start.to_string()),
            ("category", raw(&query.category)),
            ("format", raw(&query.format)),
            ("label", raw(&query.label)),
            ("region", raw(&query.region)),
            ("year", raw(&query.year)),
            ("platform", raw(&query.platform)),
            ("sort", raw(&query.sort)),
        ],
    );

    let filters = query.filters();
    let mut params = vec![
        ("refresh", "0".to_string()),
        ("start", query.start.to_string()),
        ("count", query.limit.to_string()),
        (
            "selected_categories",
            Value::Object(filters.selected_categories()).to_string(),
        ),
        ("uncollect", "false".to_string()),
        ("score_range", "0,10".to_string()),
        ("tags", filters.tags().join(",")),
    ];
    if let Some(sort) = filters.sort {
        params.push(("sort", sort));
    }

    ViewRequest {
        view: View::Recommends,
        host: UpstreamHost::Mobile,
        path: format!("rexxar/api/v2/{}/recommend", query.kind),
        query: params,
        cache_key,
    }
}

pub(crate) fn detail(id: &str) -> ViewRequest {
    ViewRequest {
        view: View::Details,
        host: UpstreamHost::Mobile,
        path: format!("rexxar/api/v2/subject/{id}"),
        query: Vec::new(),
        cache_key: metadata_key(View::Details.cache_prefix(), &[("id", id.to_string())]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::metadata::MediaKind;

    fn param<'a>(request: &'a ViewRequest, name: &str) -> Option<&'a str> {
        request
            .query
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value.as_str())
    }

    #[test]
    fn recommendation_query_collapses_all() {
        let query = RecommendQuery {
            kind: MediaKind::Movie,
            limit: 25,
            start: 50,
            category: Some("all".into()),
            format: None,
            label: Some("all".into()),
            region: Some("美国".into()),
            year: Some("2020年代".into()),
            platform: Some("all".into()),
            sort: Some("T".into()),
        };
        let request = recommendations(&query);

        assert_eq!(request.path, "rexxar/api/v2/movie/recommend");
        assert_eq!(param(&request, "count"), Some("25"));
        assert_eq!(param(&request, "start"), Some("50"));
        assert_eq!(param(&request, "tags"), Some("美国,2020年代"));
        let selected: Value =
            serde_json::from_str(param(&request, "selected_categories").unwrap()).unwrap();
        assert_eq!(selected, serde_json::json!({"类型": "", "地区": "美国"}));
        assert_eq!(param(&request, "sort"), None);
        assert!(request.cache_key.starts_with("recommends-category=all&"));
        assert!(request.cache_key.contains("sort=T"));
    }

    #[test]
    fn category_key_is_order_independent_of_params() {
        let query = CategoryQuery {
            kind: MediaKind::Tv,
            category: "tv".into(),
            kind_type: "tv_domestic".into(),
            limit: 20,
            start: 0,
        };
        let request = categories(&query);
        assert_eq!(
            request.cache_key,
            "categories-category=tv&kind=tv&pageLimit=20&pageStart=0&type=tv_domestic"
        );
        assert_eq!(request.path, "rexxar/api/v2/subject/recent_hot/tv");
        assert_eq!(request.host, UpstreamHost::Mobile);
    }

    #[test]
    fn tag_list_targets_movie_host() {
        let request = tag_list(&TagListQuery {
            tag: "热门".into(),
            kind_type: "movie".into(),
            limit: 16,
            start: 32,
        });
        assert_eq!(request.host, UpstreamHost::Movie);
        assert_eq!(param(&request, "sort"), Some("recommend"));
        assert_eq!(param(&request, "page_start"), Some("32"));
        assert_eq!(request.cache_key, "lists-pageLimit=16&pageStart=32&tag=热门&type=movie");
    }
}
