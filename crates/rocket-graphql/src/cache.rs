//! Response cache keyed by operation identity.

use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use parking_lot::RwLock;

/// Whether a fetch may be answered from cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CachePolicy {
    /// Return a cached response when present, otherwise fetch and store.
    #[default]
    UseCacheElseFetch,
    /// Always fetch and overwrite the cached response.
    FetchIgnoringCache,
}

/// Identity of an operation: name, query text and canonical variables.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    operation_name: String,
    query_hash: u64,
    variables: String,
}

impl CacheKey {
    /// Build the identity of an operation invocation.
    ///
    /// Object keys serialize in sorted order, so equal variables always
    /// produce equal keys.
    #[must_use]
    pub fn new(operation_name: &str, query: &str, variables: &serde_json::Value) -> Self {
        let mut hasher = DefaultHasher::new();
        query.hash(&mut hasher);
        Self {
            operation_name: operation_name.to_string(),
            query_hash: hasher.finish(),
            variables: variables.to_string(),
        }
    }

    /// Operation name.
    #[must_use]
    pub fn operation_name(&self) -> &str {
        &self.operation_name
    }
}

/// A cached response payload.
#[derive(Debug, Clone)]
pub struct CachedResponse {
    /// The `data` member of the response.
    pub data: serde_json::Value,
    /// Extensions returned with it.
    pub extensions: Option<serde_json::Value>,
}

/// Thread-safe response cache.
#[derive(Debug, Default)]
pub struct ResponseCache {
    entries: RwLock<HashMap<CacheKey, CachedResponse>>,
}

impl ResponseCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a cached response.
    #[must_use]
    pub fn get(&self, key: &CacheKey) -> Option<CachedResponse> {
        self.entries.read().get(key).cloned()
    }

    /// Store or overwrite a response.
    pub fn insert(
        &self,
        key: CacheKey,
        data: serde_json::Value,
        extensions: Option<serde_json::Value>,
    ) {
        self.entries.write().insert(
            key,
            CachedResponse { data, extensions },
        );
    }

    /// Remove one entry. Returns `true` if it existed.
    pub fn invalidate(&self, key: &CacheKey) -> bool {
        self.entries.write().remove(key).is_some()
    }

    /// Remove everything.
    pub fn clear(&self) {
        self.entries.write().clear();
    }

    /// Number of cached entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns `true` if nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    const QUERY: &str = "query LaunchDetails($launchId: ID!) { launch(id: $launchId) { id } }";

    #[test]
    fn key_ignores_variable_order() {
        let a = CacheKey::new("Q", QUERY, &json!({"a": 1, "b": 2}));
        let b = CacheKey::new("Q", QUERY, &json!({"b": 2, "a": 1}));
        assert_eq!(a, b);
    }

    #[test]
    fn key_distinguishes_variables_and_query() {
        let a = CacheKey::new("Q", QUERY, &json!({"launchId": "1"}));
        let b = CacheKey::new("Q", QUERY, &json!({"launchId": "2"}));
        let c = CacheKey::new("Q", "query Other { x }", &json!({"launchId": "1"}));
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn insert_get_invalidate() {
        let cache = ResponseCache::new();
        let key = CacheKey::new("LaunchDetails", QUERY, &json!({"launchId": "1"}));
        assert!(cache.get(&key).is_none());

        cache.insert(key.clone(), json!({"launch": {"id": "1"}}), None);
        assert_eq!(cache.get(&key).unwrap().data["launch"]["id"], "1");

        cache.insert(key.clone(), json!({"launch": {"id": "1b"}}), None);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&key).unwrap().data["launch"]["id"], "1b");

        assert!(cache.invalidate(&key));
        assert!(!cache.invalidate(&key));
        assert!(cache.is_empty());
    }

    #[test]
    fn clear_drops_every_operation() {
        let cache = ResponseCache::new();
        for id in ["1", "2", "3"] {
            cache.insert(
                CacheKey::new("LaunchDetails", QUERY, &json!({ "launchId": id })),
                json!({}),
                None,
            );
        }
        cache.insert(CacheKey::new("LaunchList", "q", &json!({})), json!({}), None);

        assert_eq!(cache.len(), 4);
        cache.clear();
        assert!(cache.is_empty());
    }
}
