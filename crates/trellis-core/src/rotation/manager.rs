//! Rotation manager and the failover loop

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tracing::instrument;

use super::state::ApiEndpoint;
use super::types::RotationStrategy;
use crate::error::{TrellisError, TrellisResult, UnifiedError};
use crate::http::ApiRequest;
use crate::recovery::circuit_breaker::{CircuitBreakerConfig, CircuitBreakerRegistry};

#[derive(Debug, Default)]
pub(super) struct Counters {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub failover_count: u64,
    pub endpoints_used: BTreeMap<String, u64>,
    pub average_response_time_ms: f64,
}

/// Fails over between interchangeable upstreams of one category.
///
/// Each endpoint is gated by its own circuit breaker, taken from the injected
/// registry under `"{category}.{endpoint}"`.
#[derive(Debug)]
pub struct RotationManager {
    pub(super) category: String,
    pub(super) strategy: RotationStrategy,
    /// Sorted by ascending priority
    pub(super) endpoints: RwLock<Vec<Arc<ApiEndpoint>>>,
    pub(super) registry: Arc<CircuitBreakerRegistry>,
    pub(super) breaker_config: Option<CircuitBreakerConfig>,
    pub(super) cursor: AtomicUsize,
    pub(super) counters: Mutex<Counters>,
}

impl RotationManager {
    pub fn new(
        category: impl Into<String>,
        strategy: RotationStrategy,
        registry: Arc<CircuitBreakerRegistry>,
    ) -> Self {
        Self {
            category: category.into(),
            strategy,
            endpoints: RwLock::new(Vec::new()),
            registry,
            breaker_config: None,
            cursor: AtomicUsize::new(0),
            counters: Mutex::new(Counters::default()),
        }
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn strategy(&self) -> RotationStrategy {
        self.strategy
    }

    pub fn registry(&self) -> &Arc<CircuitBreakerRegistry> {
        &self.registry
    }

    /// Send `request` to endpoints in strategy order until one succeeds.
    ///
    /// `max_attempts` defaults to the number of configured endpoints.
    /// Non-retryable errors abort the rotation and are returned as is.
    #[instrument(skip(self, request), fields(category = %self.category, path = %request.path))]
    pub async fn call_with_rotation(
        &self,
        request: &ApiRequest,
        max_attempts: Option<usize>,
    ) -> TrellisResult<Value> {
        let snapshot: Vec<Arc<ApiEndpoint>> = self.endpoints.read().clone();
        let max_attempts = max_attempts.unwrap_or(snapshot.len());
        let order = self.strategy.order(&snapshot, &self.cursor);

        let mut attempts: u32 = 0;
        let mut last_error = None;

        for endpoint in order {
            if attempts as usize >= max_attempts {
                break;
            }
            if !endpoint.is_enabled() {
                continue;
            }
            attempts += 1;
            self.count_attempt(&endpoint.name);

            let started = Instant::now();
            let result = endpoint
                .breaker
                .call(|| endpoint.caller.call(request))
                .await
                .map_err(TrellisError::from);
            let elapsed = started.elapsed();

            match result {
                Ok(value) => {
                    endpoint.record_outcome(elapsed, true);
                    self.count_success(elapsed);
                    tracing::info!(
                        category = %self.category,
                        endpoint = %endpoint.name,
                        attempt = attempts,
                        max_attempts,
                        elapsed_ms = elapsed.as_millis() as u64,
                        "rotation call succeeded"
                    );
                    return Ok(value);
                }
                Err(error) => {
                    endpoint.record_outcome(elapsed, false);
                    tracing::warn!(
                        category = %self.category,
                        endpoint = %endpoint.name,
                        attempt = attempts,
                        max_attempts,
                        code = error.error_code(),
                        error = %error,
                        "endpoint failed"
                    );
                    if !error.is_retryable() {
                        self.counters.lock().failed_requests += 1;
                        return Err(error);
                    }
                    self.counters.lock().failover_count += 1;
                    last_error = Some(error);
                }
            }
        }

        self.counters.lock().failed_requests += 1;
        let error = TrellisError::rotation_exhausted(&self.category, attempts, last_error);
        tracing::error!(category = %self.category, attempts, error = %error, "rotation exhausted");
        Err(error)
    }

    fn count_attempt(&self, endpoint: &str) {
        let mut counters = self.counters.lock();
        counters.total_requests += 1;
        *counters.endpoints_used.entry(endpoint.to_string()).or_insert(0) += 1;
    }

    fn count_success(&self, elapsed: Duration) {
        let ms = elapsed.as_secs_f64() * 1000.0;
        let mut counters = self.counters.lock();
        counters.successful_requests += 1;
        counters.average_response_time_ms = if counters.average_response_time_ms == 0.0 {
            ms
        } else {
            counters.average_response_time_ms * 0.7 + ms * 0.3
        };
    }
}
