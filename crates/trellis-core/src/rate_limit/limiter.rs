//! Sliding-window log limiter

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;
use tracing::instrument;

use super::store::{CounterStore, MemoryCounterStore, WindowCount};
use super::types::{UsageInfo, WindowResult};
use crate::error::TrellisResult;

/// Store reachability report
#[derive(Debug, Clone, Serialize)]
pub struct LimiterHealth {
    pub status: &'static str,
    pub store_reachable: bool,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Counts requests per key over a sliding window.
///
/// Each check is a single store operation, so concurrent callers against
/// the same key never over-admit. Store failures fail open.
#[derive(Clone)]
pub struct SlidingWindowLimiter {
    store: Arc<dyn CounterStore>,
}

impl std::fmt::Debug for SlidingWindowLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlidingWindowLimiter").finish_non_exhaustive()
    }
}

fn millis_to_utc(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).single().unwrap_or_else(Utc::now)
}

fn window_ms(window: Duration) -> i64 {
    i64::try_from(window.as_millis()).unwrap_or(i64::MAX)
}

/// Oldest surviving entry plus the window, or now plus the window when empty
fn reset_time(counted: &WindowCount, now_ms: i64, window: Duration) -> DateTime<Utc> {
    let base = counted.oldest_ms.unwrap_or(now_ms);
    millis_to_utc(base.saturating_add(window_ms(window)))
}

impl SlidingWindowLimiter {
    pub fn new(store: Arc<dyn CounterStore>) -> Self {
        Self { store }
    }

    /// Limiter over a fresh [`MemoryCounterStore`]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryCounterStore::new()))
    }

    /// Record a request if the window has room.
    ///
    /// Never fails: a store error admits the request with `degraded` set.
    pub async fn check_and_increment(&self, key: &str, limit: u32, window: Duration) -> WindowResult {
        match self.try_check_and_increment(key, limit, window).await {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(
                    key,
                    error = %e,
                    "counter store unavailable, allowing request"
                );
                let now_ms = Utc::now().timestamp_millis();
                WindowResult {
                    allowed: true,
                    current_count: 0,
                    remaining: u64::from(limit),
                    reset_time: millis_to_utc(now_ms.saturating_add(window_ms(window))),
                    degraded: true,
                }
            }
        }
    }

    /// Record a request if the window has room, surfacing store errors
    #[instrument(skip(self), level = "debug")]
    pub async fn try_check_and_increment(
        &self,
        key: &str,
        limit: u32,
        window: Duration,
    ) -> TrellisResult<WindowResult> {
        let now_ms = Utc::now().timestamp_millis();
        let counted = self
            .store
            .add_if_below(key, now_ms, window, u64::from(limit))
            .await?;

        if !counted.added {
            tracing::debug!(key, limit, count = counted.count, "sliding window exhausted");
        }

        Ok(WindowResult {
            allowed: counted.added,
            current_count: counted.count,
            remaining: u64::from(limit).saturating_sub(counted.count),
            reset_time: reset_time(&counted, now_ms, window),
            degraded: false,
        })
    }

    /// Append an entry regardless of the limit
    pub async fn record(&self, key: &str, window: Duration) -> TrellisResult<WindowCount> {
        let now_ms = Utc::now().timestamp_millis();
        self.store.add(key, now_ms, window).await
    }

    /// Current usage of a key without recording a request
    pub async fn usage(&self, key: &str, window: Duration) -> TrellisResult<UsageInfo> {
        let now_ms = Utc::now().timestamp_millis();
        let counted = self.store.count(key, now_ms, window).await?;
        Ok(UsageInfo {
            key: key.to_string(),
            current_count: counted.count,
            oldest: counted.oldest_ms.map(millis_to_utc),
            reset_time: reset_time(&counted, now_ms, window),
        })
    }

    /// Forget every entry for a key
    pub async fn reset(&self, key: &str) -> TrellisResult<bool> {
        let existed = self.store.clear(key).await?;
        tracing::info!(key, existed, "rate limit reset");
        Ok(existed)
    }

    /// Ping the store
    pub async fn health_check(&self) -> LimiterHealth {
        match self.store.ping().await {
            Ok(()) => LimiterHealth {
                status: "healthy",
                store_reachable: true,
                error: None,
                timestamp: Utc::now(),
            },
            Err(e) => {
                tracing::error!(error = %e, "rate limiter health check failed");
                LimiterHealth {
                    status: "unhealthy",
                    store_reachable: false,
                    error: Some(e.to_string()),
                    timestamp: Utc::now(),
                }
            }
        }
    }
}
