use crate::domain::search::SearchResultItem;

/// Category keywords hidden from search results unless the site disables filtering.
pub const DEFAULT_DENYLIST: &[&str] = &[
    "伦理片",
    "福利",
    "里番动漫",
    "门事件",
    "萝莉少女",
    "制服诱惑",
    "国产传媒",
    "cosplay",
    "黑丝诱惑",
    "无码",
    "日本无码",
    "有码",
    "日本有码",
    "SWAG",
    "网红主播",
    "色情片",
    "同性片",
    "福利视频",
    "福利片",
];

/// Drops items whose `type_name` contains a denylisted keyword.
///
/// Matching is a case-sensitive substring test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentFilter {
    keywords: Vec<String>,
}

impl Default for ContentFilter {
    fn default() -> Self {
        Self::new(DEFAULT_DENYLIST.iter().map(|word| word.to_string()))
    }
}

impl ContentFilter {
    pub fn new(keywords: impl IntoIterator<Item = String>) -> Self {
        Self {
            keywords: keywords.into_iter().filter(|word| !word.is_empty()).collect(),
        }
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    pub fn is_blocked(&self, item: &SearchResultItem) -> bool {
        self.keywords
            .iter()
            .any(|word| item.type_name.contains(word.as_str()))
    }

    pub fn apply(&self, mut items: Vec<SearchResultItem>) -> Vec<SearchResultItem> {
        items.retain(|item| !self.is_blocked(item));
        items
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(title: &str, type_name: &str) -> SearchResultItem {
        serde_json::from_value(serde_json::json!({
            "id": title,
            "title": title,
            "source": "a",
            "source_name": "A",
            "type_name": type_name,
        }))
        .unwrap()
    }

    #[test]
    fn drops_items_with_denylisted_type() {
        let filter = ContentFilter::new(["伦理".to_string()]);
        let kept = filter.apply(vec![item("a", "伦理片"), item("b", "电影")]);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].title, "b");
    }

    #[test]
    fn filtering_is_idempotent() {
        let filter = ContentFilter::default();
        let once = filter.apply(vec![item("a", "福利片"), item("b", "动作片"), item("c", "")]);
        let twice = filter.apply(once.clone());
        assert_eq!(once, twice);
    }

    #[test]
    fn match_is_case_sensitive() {
        let filter = ContentFilter::new(["SWAG".to_string()]);
        assert!(filter.is_blocked(&item("a", "SWAG直播")));
        assert!(!filter.is_blocked(&item("b", "swag")));
    }

    #[test]
    fn empty_keywords_are_ignored() {
        let filter = ContentFilter::new([String::new()]);
        assert!(filter.keywords().is_empty());
        assert!(!filter.is_blocked(&item("a", "电影")));
    }
}
