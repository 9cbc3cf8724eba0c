//! Resilient HTTP client for a single upstream API

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use chrono::Utc;
use parking_lot::Mutex;
use reqwest::header::{ACCEPT, RETRY_AFTER, USER_AGENT};
use reqwest::{Method, Response};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use super::auth::AuthScheme;
use super::cache::{CacheKey, ResponseCache};
use super::request::ApiRequest;
use super::types::{ApiClientConfig, ApiHealth, ClientStats, ErrorRecord, HealthStatus};
use crate::error::{TrellisError, TrellisResult, UnifiedError};
use crate::recovery::backoff::{BackoffStrategy, ExponentialBackoff};

const MAX_ERROR_HISTORY: usize = 100;
const MAX_ERROR_BODY: usize = 500;
const DEFAULT_RETRY_AFTER_SECS: u64 = 60;
const HEALTH_PATHS: [&str; 4] = ["/", "/health", "/status", "/ping"];
const HEALTH_TIMEOUT: Duration = Duration::from_secs(10);
const MINUTE: Duration = Duration::from_secs(60);
const HOUR: Duration = Duration::from_secs(3600);

#[derive(Debug)]
struct ClientState {
    stats: ClientStats,
    minute_window: VecDeque<Instant>,
    hour_count: u32,
    hour_resets_at: Instant,
    errors: VecDeque<ErrorRecord>,
}

impl ClientState {
    fn prune_minute(&mut self, now: Instant) {
        while let Some(front) = self.minute_window.front() {
            if now.saturating_duration_since(*front) >= MINUTE {
                self.minute_window.pop_front();
            } else {
                break;
            }
        }
    }
}

/// HTTP client for one upstream API.
///
/// Adds per-request timeouts, transport-level retry with backoff, a TTL
/// response cache, provider-specific credential placement, a client-side
/// request quota and request statistics on top of `reqwest`.
#[derive(Debug)]
pub struct ApiClient {
    api_name: String,
    base_url: String,
    api_key: Option<String>,
    auth: AuthScheme,
    config: ApiClientConfig,
    http: reqwest::Client,
    cache: ResponseCache,
    state: Mutex<ClientState>,
    cancel: CancellationToken,
}

impl ApiClient {
    pub fn new(
        api_name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: Option<String>,
        config: ApiClientConfig,
    ) -> TrellisResult<Self> {
        let api_name = api_name.into();
        let base_url = base_url.into().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(TrellisError::invalid_field(
                "base_url",
                format!("base URL for {} is empty", api_name),
            ));
        }

        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .pool_max_idle_per_host(5)
            .build()
            .map_err(|e| {
                TrellisError::config_with_context(
                    format!("failed to build HTTP client: {}", e),
                    format!("initializing client for {}", api_name),
                )
            })?;

        let state = ClientState {
            stats: ClientStats {
                api_name: api_name.clone(),
                rate_limit_per_minute: config.rate_limit_per_minute,
                rate_limit_per_hour: config.rate_limit_per_hour,
                ..Default::default()
            },
            minute_window: VecDeque::new(),
            hour_count: 0,
            hour_resets_at: Instant::now() + HOUR,
            errors: VecDeque::new(),
        };

        tracing::info!(api = %api_name, base_url = %base_url, "API client initialized");

        Ok(Self {
            auth: AuthScheme::for_api(&api_name),
            cache: ResponseCache::new(config.cache_capacity),
            api_name,
            base_url,
            api_key,
            config,
            http,
            state: Mutex::new(state),
            cancel: CancellationToken::new(),
        })
    }

    /// Use an external token to interrupt retry backoff sleeps
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn api_name(&self) -> &str {
        &self.api_name
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn config(&self) -> &ApiClientConfig {
        &self.config
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    fn url_for(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Send a request, serving cacheable ones from the response cache
    #[instrument(skip(self, request), fields(api = %self.api_name, method = %request.method, path = %request.path))]
    pub async fn execute(&self, request: &ApiRequest) -> TrellisResult<Value> {
        let url = self.url_for(&request.path);
        let cache_key = (self.config.enable_caching && request.is_cacheable()).then(|| {
            CacheKey::for_request(
                &self.api_name,
                &request.method,
                &url,
                &request.query,
                request.body.as_ref(),
            )
        });

        if let Some(key) = &cache_key {
            if let Some(hit) = self.cache.get(key) {
                self.state.lock().stats.cache_hits += 1;
                tracing::debug!(api = %self.api_name, key = %key.identifier, "cache hit");
                return Ok(hit);
            }
            self.state.lock().stats.cache_misses += 1;
        }

        let value = self.send_with_retry(request, &url).await?;

        if let Some(key) = &cache_key {
            let ttl = request.cache_ttl.unwrap_or(self.config.cache_ttl);
            self.cache.insert(key, value.clone(), ttl);
        }
        Ok(value)
    }

    pub async fn get(&self, path: &str) -> TrellisResult<Value> {
        self.execute(&ApiRequest::get(path)).await
    }

    pub async fn post(&self, path: &str, body: Value) -> TrellisResult<Value> {
        self.execute(&ApiRequest::post(path, body)).await
    }

    pub async fn put(&self, path: &str, body: Value) -> TrellisResult<Value> {
        self.execute(&ApiRequest::put(path, body)).await
    }

    pub async fn delete(&self, path: &str) -> TrellisResult<Value> {
        self.execute(&ApiRequest::delete(path)).await
    }

    async fn send_with_retry(&self, request: &ApiRequest, url: &str) -> TrellisResult<Value> {
        let max_attempts = self.config.max_retries.max(1);
        let mut backoff = ExponentialBackoff::with_config(self.config.backoff.clone());
        let mut attempt = 1;

        loop {
            let error = match self.send_once(request, url).await {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            let transport = matches!(
                error,
                TrellisError::ApiTimeout { .. } | TrellisError::ApiConnection { .. }
            );
            if !transport || attempt >= max_attempts {
                return Err(error);
            }

            let delay = backoff.next_delay();
            tracing::warn!(
                api = %self.api_name,
                attempt,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "transport error, retrying"
            );
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    tracing::debug!(api = %self.api_name, "retry cancelled");
                    return Err(error);
                }
                _ = tokio::time::sleep(delay) => {}
            }
            attempt += 1;
        }
    }

    async fn send_once(&self, request: &ApiRequest, url: &str) -> TrellisResult<Value> {
        if let Err(e) = self.check_quota() {
            tracing::warn!(api = %self.api_name, error = %e, "client quota reached, request not sent");
            self.push_error(&e, &request.method, url);
            return Err(e);
        }

        let mut builder = self
            .http
            .request(request.method.clone(), url)
            .timeout(request.timeout.unwrap_or(self.config.timeout))
            .header(USER_AGENT, self.config.user_agent.as_str())
            .header(ACCEPT, "application/json");
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        if let Some(key) = &self.api_key {
            builder = self.auth.apply(builder, key);
        }

        let started = Instant::now();
        let sent = builder.send().await;
        let elapsed = started.elapsed();

        let outcome = match sent {
            Ok(response) => {
                self.record_response_time(elapsed);
                self.translate(response).await
            }
            Err(e) => {
                self.record_attempt();
                Err(self.transport_error(e, &request.method, url, elapsed))
            }
        };

        match &outcome {
            Ok(_) => {
                self.state.lock().stats.successful_requests += 1;
                tracing::info!(
                    api = %self.api_name,
                    method = %request.method,
                    url,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "API request succeeded"
                );
            }
            Err(e) => self.record_error(e, &request.method, url),
        }
        outcome
    }

    fn transport_error(&self, e: reqwest::Error, method: &Method, url: &str, elapsed: Duration) -> TrellisError {
        if e.is_timeout() {
            TrellisError::timeout(
                &self.api_name,
                format!("{} {} timed out after {}ms", method, url, elapsed.as_millis()),
            )
        } else if e.is_builder() {
            TrellisError::invalid_input(format!("invalid request for {}: {}", self.api_name, e))
        } else {
            TrellisError::connection(&self.api_name, format!("{} {}: {}", method, url, e))
        }
    }

    async fn translate(&self, response: Response) -> TrellisResult<Value> {
        let status = response.status().as_u16();
        let api = self.api_name.as_str();

        match status {
            200..=299 => {
                let text = response.text().await.map_err(|e| {
                    TrellisError::connection(api, format!("failed reading response body: {}", e))
                })?;
                Ok(serde_json::from_str(&text).unwrap_or_else(|_| json!({ "raw_response": text })))
            }
            401 => Err(TrellisError::authentication(api, status, "authentication failed")),
            403 => Err(TrellisError::authentication(api, status, "access forbidden")),
            429 => {
                let retry_after = response
                    .headers()
                    .get(RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.trim().parse::<u64>().ok())
                    .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
                Err(TrellisError::rate_limited(
                    api,
                    format!("upstream rate limit hit, retry after {}s", retry_after),
                    Some(Duration::from_secs(retry_after)),
                ))
            }
            402 | 509 => Err(TrellisError::quota_exceeded(api, status, "API quota exceeded")),
            _ => {
                let body = response.text().await.unwrap_or_default();
                let body: String = body.chars().take(MAX_ERROR_BODY).collect();
                let kind = match status {
                    400..=499 => "client error",
                    500..=599 => "server error",
                    _ => "unexpected status",
                };
                Err(TrellisError::external_api_status(
                    api,
                    status,
                    format!("{} ({}): {}", kind, status, body),
                ))
            }
        }
    }

    fn check_quota(&self) -> TrellisResult<()> {
        let now = Instant::now();
        let mut state = self.state.lock();
        state.prune_minute(now);

        let per_minute = self.config.rate_limit_per_minute;
        if per_minute > 0 && state.minute_window.len() >= per_minute as usize {
            let oldest = state.minute_window.front().copied().unwrap_or(now);
            let wait = MINUTE.saturating_sub(now.saturating_duration_since(oldest));
            state.stats.rate_limit_hits += 1;
            return Err(TrellisError::rate_limited(
                &self.api_name,
                format!("client limit of {} requests per minute reached", per_minute),
                Some(wait.max(Duration::from_secs(1))),
            ));
        }

        if now >= state.hour_resets_at {
            state.hour_count = 0;
            state.hour_resets_at = now + HOUR;
        }
        let per_hour = self.config.rate_limit_per_hour;
        if per_hour > 0 && state.hour_count >= per_hour {
            let wait = state.hour_resets_at.saturating_duration_since(now);
            state.stats.rate_limit_hits += 1;
            return Err(TrellisError::rate_limited(
                &self.api_name,
                format!("client limit of {} requests per hour reached", per_hour),
                Some(wait.max(Duration::from_secs(1))),
            ));
        }

        state.minute_window.push_back(now);
        state.hour_count += 1;
        Ok(())
    }

    fn record_attempt(&self) {
        let mut state = self.state.lock();
        state.stats.total_requests += 1;
        state.stats.last_request_time = Some(Utc::now());
    }

    fn record_response_time(&self, elapsed: Duration) {
        let ms = elapsed.as_secs_f64() * 1000.0;
        let mut state = self.state.lock();
        state.stats.total_requests += 1;
        state.stats.last_request_time = Some(Utc::now());
        let avg = &mut state.stats.average_response_time_ms;
        *avg = if *avg == 0.0 { ms } else { *avg * 0.7 + ms * 0.3 };
    }

    fn record_error(&self, error: &TrellisError, method: &Method, url: &str) {
        tracing::error!(
            api = %self.api_name,
            code = error.error_code(),
            method = %method,
            url,
            error = %error,
            "API request failed"
        );
        self.state.lock().stats.failed_requests += 1;
        self.push_error(error, method, url);
    }

    fn push_error(&self, error: &TrellisError, method: &Method, url: &str) {
        let record = ErrorRecord {
            timestamp: Utc::now(),
            error_code: error.error_code().to_string(),
            message: error.to_string(),
            method: method.to_string(),
            url: url.to_string(),
            api_name: self.api_name.clone(),
        };
        let mut state = self.state.lock();
        if state.errors.len() == MAX_ERROR_HISTORY {
            state.errors.pop_front();
        }
        state.errors.push_back(record);
    }

    /// Snapshot of the request counters
    pub fn stats(&self) -> ClientStats {
        let now = Instant::now();
        let mut state = self.state.lock();
        state.prune_minute(now);
        if now >= state.hour_resets_at {
            state.hour_count = 0;
            state.hour_resets_at = now + HOUR;
        }

        let mut stats = state.stats.clone();
        stats.error_rate = stats.failed_requests as f64 / stats.total_requests.max(1) as f64 * 100.0;
        let lookups = stats.cache_hits + stats.cache_misses;
        stats.cache_hit_rate = stats.cache_hits as f64 / lookups.max(1) as f64 * 100.0;
        stats.current_minute_usage = state.minute_window.len() as u32;
        stats.current_hour_usage = state.hour_count;
        stats
    }

    /// Most recent failures, newest first
    pub fn recent_errors(&self, limit: usize) -> Vec<ErrorRecord> {
        self.state.lock().errors.iter().rev().take(limit).cloned().collect()
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
        tracing::debug!(api = %self.api_name, "response cache cleared");
    }

    /// Probe conventional health paths in order; the first 2xx wins
    pub async fn health_check(&self) -> ApiHealth {
        let started = Instant::now();
        for path in HEALTH_PATHS {
            let probe = ApiRequest::get(path).timeout(HEALTH_TIMEOUT).cached(false);
            if self.send_once(&probe, &self.url_for(path)).await.is_ok() {
                return ApiHealth {
                    endpoint_tested: Some(path.to_string()),
                    response_time_ms: Some(started.elapsed().as_secs_f64() * 1000.0),
                    ..ApiHealth::new(&self.api_name, HealthStatus::Healthy)
                };
            }
        }
        ApiHealth::new(&self.api_name, HealthStatus::Unknown)
            .with_message("no standard health endpoint answered")
    }
}
