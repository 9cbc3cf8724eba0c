//! Response cache for idempotent upstream calls

use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use lru::LruCache;
use parking_lot::Mutex;
use reqwest::Method;
use serde_json::Value;

/// Cache key derived from everything that shapes the upstream response
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// Full request identity; also what shows up in logs
    pub identifier: String,
}

impl CacheKey {
    /// Build a key from `(api_name, method, url, sorted query, body for POST/PUT)`
    pub fn for_request(
        api_name: &str,
        method: &Method,
        url: &str,
        query: &[(String, String)],
        body: Option<&Value>,
    ) -> Self {
        let mut parts = vec![api_name.to_string(), method.as_str().to_string(), url.to_string()];

        if !query.is_empty() {
            let mut sorted: Vec<&(String, String)> = query.iter().collect();
            sorted.sort();
            let encoded = sorted
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect::<Vec<_>>()
                .join("&");
            parts.push(encoded);
        }

        if let Some(body) = body {
            if *method == Method::POST || *method == Method::PUT {
                // serde_json maps are ordered, so this is stable
                parts.push(body.to_string());
            }
        }

        Self {
            identifier: format!("api_cache:{}", parts.join(":")),
        }
    }
}

#[derive(Debug, Clone)]
struct CachedResponse {
    value: Value,
    expires_at: Instant,
}

/// Bounded LRU of JSON responses with per-entry TTL
#[derive(Debug)]
pub struct ResponseCache {
    entries: Mutex<LruCache<String, CachedResponse>>,
}

impl ResponseCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Fresh value for a key; expired entries are evicted on read
    pub fn get(&self, key: &CacheKey) -> Option<Value> {
        let mut entries = self.entries.lock();
        match entries.get(&key.identifier) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.value.clone()),
            Some(_) => {
                entries.pop(&key.identifier);
                None
            }
            None => None,
        }
    }

    pub fn insert(&self, key: &CacheKey, value: Value, ttl: Duration) {
        if ttl.is_zero() {
            return;
        }
        self.entries.lock().put(
            key.identifier.clone(),
            CachedResponse {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
