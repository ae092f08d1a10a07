//! Cache key definitions.
//!
//! `SearchKey` partitions search results per caller; `metadata_key` builds the
//! stable string keys of the metadata cache.

use crate::domain::identity::Identity;

/// Search cache key: caller plus the lowercased, trimmed query.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SearchKey {
    username: String,
    query: String,
}

impl SearchKey {
    pub fn new(identity: &Identity, query: &str) -> Self {
        Self {
            username: identity.username().to_string(),
            query: normalize_query(query),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn query(&self) -> &str {
        &self.query
    }
}

pub fn normalize_query(query: &str) -> String {
    query.trim().to_lowercase()
}

/// `view-k1=v1&k2=v2` with parameters sorted by name.
pub fn metadata_key(view: &str, params: &[(&str, String)]) -> String {
    let mut sorted: Vec<_> = params.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(b.0));
    let joined = sorted
        .into_iter()
        .map(|(name, value)| format!("{name}={value}"))
        .collect::<Vec<_>>()
        .join("&");
    format!("{view}-{joined}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_key_normalizes_query() {
        let alice = Identity::new("alice").unwrap();
        assert_eq!(
            SearchKey::new(&alice, "  Test Movie "),
            SearchKey::new(&alice, "test movie")
        );
        assert_eq!(SearchKey::new(&alice, "X").query(), "x");
    }

    #[test]
    fn search_key_partitions_by_identity() {
        let alice = Identity::new("alice").unwrap();
        let bob = Identity::new("bob").unwrap();
        assert_ne!(SearchKey::new(&alice, "test"), SearchKey::new(&bob, "test"));
    }

    #[test]
    fn metadata_key_sorts_parameters() {
        let forward = metadata_key(
            "lists",
            &[("type", "movie".to_string()), ("tag", "热门".to_string())],
        );
        let reverse = metadata_key(
            "lists",
            &[("tag", "热门".to_string()), ("type", "movie".to_string())],
        );
        assert_eq!(forward, "lists-tag=热门&type=movie");
        assert_eq!(forward, reverse);
    }
}
