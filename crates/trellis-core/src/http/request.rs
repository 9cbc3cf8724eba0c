//! Outbound request description

use std::time::Duration;

use reqwest::Method;
use serde_json::Value;

/// A single upstream call, independent of which endpoint serves it
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    /// Path relative to the endpoint's base URL
    pub path: String,
    pub query: Vec<(String, String)>,
    /// Sent as a JSON body when present
    pub body: Option<Value>,
    pub headers: Vec<(String, String)>,
    /// Overrides the client's default timeout
    pub timeout: Option<Duration>,
    /// `None` caches GET only
    pub cache: Option<bool>,
    /// Overrides the client's cache TTL
    pub cache_ttl: Option<Duration>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            headers: Vec::new(),
            timeout: None,
            cache: None,
            cache_ttl: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::POST, path).body(body)
    }

    pub fn put(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::PUT, path).body(body)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Opt in or out of the response cache
    pub fn cached(mut self, cached: bool) -> Self {
        self.cache = Some(cached);
        self
    }

    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = Some(ttl);
        self
    }

    /// Whether the response may be served from or stored in the cache
    pub fn is_cacheable(&self) -> bool {
        self.cache.unwrap_or(self.method == Method::GET)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_cacheability_defaults() {
        assert!(ApiRequest::get("/species").is_cacheable());
        assert!(!ApiRequest::get("/species").cached(false).is_cacheable());
        assert!(!ApiRequest::post("/identify", json!({})).is_cacheable());
        assert!(ApiRequest::post("/identify", json!({})).cached(true).is_cacheable());
    }

    #[test]
    fn test_builder_collects_parts() {
        let req = ApiRequest::get("/forecast")
            .query("q", "lyon")
            .header("X-Trace", "1")
            .timeout(Duration::from_secs(2));
        assert_eq!(req.query, vec![("q".to_string(), "lyon".to_string())]);
        assert_eq!(req.headers.len(), 1);
        assert_eq!(req.timeout, Some(Duration::from_secs(2)));
        assert!(req.body.is_none());
    }
}
