//! Time-bounded in-memory cache for successful read responses.
//!
//! Repeated reads of the same endpoint within the TTL are served from
//! memory instead of hitting the network. The cache is process-local
//! and volatile — nothing is persisted, and nothing invalidates entries
//! except age. Writes elsewhere do not evict matching reads; staleness
//! inside the TTL window is accepted behavior, not a bug.
//!
//! # Keying
//!
//! [`cache_key`] is a pure function of method, path, and query
//! parameters. Query pairs are sorted before serialization so two
//! logically identical requests always map to the same key, regardless
//! of the order the caller built the query in.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, trace};

/// Default entry lifetime for ordinary reads.
pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

/// Derives the cache key for a request.
///
/// Pure function of method, path, and query parameters — no hidden
/// state. Pairs are sorted by key then value, so
/// `?page=2&sort=price` and `?sort=price&page=2` collide as intended.
pub fn cache_key(method: &str, path: &str, query: &[(String, String)]) -> String {
    if query.is_empty() {
        return format!("{method} {path}");
    }
    let mut pairs = query.to_vec();
    pairs.sort();
    let serialized = pairs
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");
    format!("{method} {path}?{serialized}")
}

/// One cached payload and when it was stored.
struct CacheEntry {
    payload: Value,
    created_at: Instant,
}

/// An in-memory, TTL-bounded store of successful read responses.
///
/// One instance per client; all requests share it. Expired entries are
/// evicted lazily on the next lookup — there is no background sweeper
/// and no explicit invalidation API.
///
/// Uses `tokio::time::Instant` so tests can drive expiry with a paused
/// clock instead of sleeping.
pub struct ResponseCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl ResponseCache {
    /// Creates a cache with the given entry lifetime.
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Looks up a non-expired entry.
    ///
    /// An entry at or past its TTL is removed and treated as a miss —
    /// it must never be served, only re-fetched by the caller.
    pub fn get(&self, key: &str) -> Option<Value> {
        let mut entries = self.entries.lock().expect("cache lock poisoned");
        let entry = entries.get(key)?;
        if entry.created_at.elapsed() >= self.ttl {
            trace!(key, "cache entry expired, evicting");
            entries.remove(key);
            return None;
        }
        debug!(key, "cache hit");
        Some(entry.payload.clone())
    }

    /// Stores a payload under `key`, timestamped now. Replaces any
    /// previous entry and restarts its lifetime.
    pub fn put(&self, key: &str, payload: Value) {
        debug!(key, "caching response");
        self.entries.lock().expect("cache lock poisoned").insert(
            key.to_string(),
            CacheEntry {
                payload,
                created_at: Instant::now(),
            },
        );
    }

    /// Number of stored entries, expired ones included (eviction is lazy).
    pub fn len(&self) -> usize {
        self.entries.lock().expect("cache lock poisoned").len()
    }

    /// Returns `true` if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    //! Key derivation tests. Expiry timing lives in `tests/response_cache.rs`
    //! where the paused tokio clock is available.

    use super::*;

    fn pairs(raw: &[(&str, &str)]) -> Vec<(String, String)> {
        raw.iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_cache_key_without_query() {
        assert_eq!(cache_key("GET", "/items/42", &[]), "GET /items/42");
    }

    #[test]
    fn test_cache_key_includes_query() {
        let key = cache_key("GET", "/items", &pairs(&[("page", "2")]));
        assert_eq!(key, "GET /items?page=2");
    }

    #[test]
    fn test_cache_key_is_order_insensitive() {
        // Two logically identical requests must map to the same key.
        let a = cache_key("GET", "/items", &pairs(&[("a", "1"), ("b", "2")]));
        let b = cache_key("GET", "/items", &pairs(&[("b", "2"), ("a", "1")]));
        assert_eq!(a, b);
    }

    #[test]
    fn test_cache_key_distinguishes_method() {
        let get = cache_key("GET", "/items", &[]);
        let post = cache_key("POST", "/items", &[]);
        assert_ne!(get, post);
    }

    #[test]
    fn test_cache_key_distinguishes_query_values() {
        let a = cache_key("GET", "/items", &pairs(&[("page", "1")]));
        let b = cache_key("GET", "/items", &pairs(&[("page", "2")]));
        assert_ne!(a, b);
    }

    #[test]
    fn test_cache_key_is_deterministic() {
        let q = pairs(&[("q", "bike"), ("sort", "price")]);
        assert_eq!(cache_key("GET", "/search", &q), cache_key("GET", "/search", &q));
    }
}
