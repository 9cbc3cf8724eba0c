//! Internal state tracking for endpoints

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use super::caller::ApiCaller;
use crate::recovery::circuit_breaker::{CircuitBreaker, CircuitState};

const MIN_SUCCESS_RATE: f64 = 0.1;

/// Rolling performance figures for one endpoint
#[derive(Debug, Clone, Copy)]
pub(super) struct Performance {
    pub success_rate: f64,
    pub avg_response_time_ms: f64,
    pub last_used_at: Option<DateTime<Utc>>,
}

impl Default for Performance {
    fn default() -> Self {
        Self {
            success_rate: 1.0,
            avg_response_time_ms: 0.0,
            last_used_at: None,
        }
    }
}

/// An upstream in rotation, with its circuit and performance state
pub(super) struct ApiEndpoint {
    pub name: String,
    pub priority: u32,
    pub weight: f64,
    pub caller: Arc<dyn ApiCaller>,
    pub breaker: Arc<CircuitBreaker>,
    enabled: AtomicBool,
    performance: Mutex<Performance>,
}

impl ApiEndpoint {
    pub fn new(
        caller: Arc<dyn ApiCaller>,
        breaker: Arc<CircuitBreaker>,
        priority: u32,
        weight: f64,
    ) -> Self {
        Self {
            name: caller.name().to_string(),
            priority,
            weight,
            caller,
            breaker,
            enabled: AtomicBool::new(true),
            performance: Mutex::new(Performance::default()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    pub fn performance(&self) -> Performance {
        *self.performance.lock()
    }

    pub fn circuit_state(&self) -> CircuitState {
        self.breaker.state()
    }

    /// Fold one call outcome into the moving averages
    pub fn record_outcome(&self, elapsed: Duration, success: bool) {
        let ms = elapsed.as_secs_f64() * 1000.0;
        let mut perf = self.performance.lock();
        perf.last_used_at = Some(Utc::now());
        perf.avg_response_time_ms = if perf.avg_response_time_ms == 0.0 {
            ms
        } else {
            perf.avg_response_time_ms * 0.7 + ms * 0.3
        };
        let signal = if success { 1.0 } else { 0.0 };
        perf.success_rate = (perf.success_rate * 0.9 + signal * 0.1).max(MIN_SUCCESS_RATE);
    }

    pub fn reset_performance(&self) {
        *self.performance.lock() = Performance::default();
    }
}

impl std::fmt::Debug for ApiEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiEndpoint")
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("weight", &self.weight)
            .field("enabled", &self.is_enabled())
            .field("performance", &self.performance())
            .finish()
    }
}
