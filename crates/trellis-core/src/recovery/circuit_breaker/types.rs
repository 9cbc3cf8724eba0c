//! Circuit breaker types and configuration

use crate::error::{FailureType, TrellisError, TrellisResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Circuit is closed, operations proceed normally
    Closed,
    /// Circuit is open, operations are rejected
    Open,
    /// Circuit is half-open, limited operations allowed to test recovery
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Configuration for circuit breaker behavior
///
/// # Example
/// ```
/// use trellis_core::recovery::circuit_breaker::CircuitBreakerConfig;
/// use std::time::Duration;
///
/// let config = CircuitBreakerConfig::for_api()
///     .with_recovery_timeout(Duration::from_secs(30))
///     .with_half_open_max_calls(1);
/// assert_eq!(config.minimum_calls_threshold, 5);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit regardless of rates
    pub failure_threshold: u32,
    /// Failure rate within the window that opens the circuit
    pub failure_rate_threshold: f64,
    /// Sliding window used for rate calculations
    #[serde(with = "humantime_serde")]
    pub failure_window: Duration,
    /// Time to wait before transitioning from open to half-open
    #[serde(with = "humantime_serde")]
    pub recovery_timeout: Duration,
    /// Probe calls admitted while half-open; this many successes close it
    pub half_open_max_calls: u32,
    /// Calls slower than this count as slow
    #[serde(with = "humantime_serde")]
    pub slow_call_threshold: Duration,
    /// Slow call rate within the window that opens the circuit
    pub slow_call_rate_threshold: f64,
    /// Calls required in the window before rates are evaluated
    pub minimum_calls_threshold: u32,
    /// Failure kinds that count toward tripping
    pub retryable_error_types: BTreeSet<FailureType>,
    /// Upper bound on a single guarded call
    #[serde(with = "humantime_serde")]
    pub call_timeout: Option<Duration>,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            failure_rate_threshold: 0.5,
            failure_window: Duration::from_secs(60),
            recovery_timeout: Duration::from_secs(60),
            half_open_max_calls: 3,
            slow_call_threshold: Duration::from_secs(10),
            slow_call_rate_threshold: 0.5,
            minimum_calls_threshold: 10,
            retryable_error_types: FailureType::ALL.into_iter().collect(),
            call_timeout: None,
        }
    }
}

impl CircuitBreakerConfig {
    /// Config tuned for third-party HTTP APIs
    pub fn for_api() -> Self {
        Self {
            minimum_calls_threshold: 5,
            ..Default::default()
        }
    }

    /// Config tuned for database calls
    pub fn for_database() -> Self {
        Self {
            failure_threshold: 3,
            failure_rate_threshold: 0.3,
            failure_window: Duration::from_secs(30),
            recovery_timeout: Duration::from_secs(30),
            half_open_max_calls: 2,
            slow_call_threshold: Duration::from_secs(5),
            slow_call_rate_threshold: 0.5,
            minimum_calls_threshold: 3,
            ..Default::default()
        }
    }

    /// Set the consecutive failure threshold
    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    /// Set the recovery timeout
    pub fn with_recovery_timeout(mut self, timeout: Duration) -> Self {
        self.recovery_timeout = timeout;
        self
    }

    /// Set the number of half-open probes
    pub fn with_half_open_max_calls(mut self, calls: u32) -> Self {
        self.half_open_max_calls = calls;
        self
    }

    /// Set the minimum calls before rates are evaluated
    pub fn with_minimum_calls(mut self, calls: u32) -> Self {
        self.minimum_calls_threshold = calls;
        self
    }

    /// Set the per-call timeout
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }

    /// Restrict which failure kinds count toward tripping
    pub fn with_retryable_types(mut self, types: impl IntoIterator<Item = FailureType>) -> Self {
        self.retryable_error_types = types.into_iter().collect();
        self
    }

    /// Raise zero probe and failure thresholds to 1
    pub(crate) fn clamped(mut self, circuit: &str) -> Self {
        if self.half_open_max_calls == 0 || self.failure_threshold == 0 {
            tracing::warn!(
                circuit,
                half_open_max_calls = self.half_open_max_calls,
                failure_threshold = self.failure_threshold,
                "zero circuit breaker threshold raised to 1"
            );
            self.half_open_max_calls = self.half_open_max_calls.max(1);
            self.failure_threshold = self.failure_threshold.max(1);
        }
        self
    }

    /// Check invariants that serde cannot express
    pub fn validate(&self) -> TrellisResult<()> {
        let invalid = |message: String| Err(TrellisError::config_with_context(message, "circuit_breaker"));
        let in_unit = |v: f64| v > 0.0 && v <= 1.0;
        if !in_unit(self.failure_rate_threshold) {
            return invalid(format!(
                "failure_rate_threshold must be in (0, 1], got {}",
                self.failure_rate_threshold
            ));
        }
        if !in_unit(self.slow_call_rate_threshold) {
            return invalid(format!(
                "slow_call_rate_threshold must be in (0, 1], got {}",
                self.slow_call_rate_threshold
            ));
        }
        if self.half_open_max_calls == 0 {
            return invalid("half_open_max_calls must be greater than 0".to_string());
        }
        if self.failure_threshold == 0 {
            return invalid("failure_threshold must be greater than 0".to_string());
        }
        if self.failure_window.is_zero() {
            return invalid("failure_window must be non-zero".to_string());
        }
        Ok(())
    }
}

/// Error from circuit breaker operations
#[derive(Debug)]
pub enum CircuitBreakerError<E> {
    /// Circuit rejected the call without invoking it
    Open {
        circuit: String,
        state: CircuitState,
        last_failure: Option<DateTime<Utc>>,
    },
    /// Call exceeded the configured call timeout
    Timeout { circuit: String, timeout: Duration },
    /// Operation failed; the original error is returned untouched
    OperationFailed(E),
}

impl<E> CircuitBreakerError<E> {
    /// Whether the call was rejected before reaching the operation
    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Open { .. })
    }
}

impl<E: fmt::Display> fmt::Display for CircuitBreakerError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open {
                circuit,
                state,
                last_failure,
            } => {
                write!(f, "Circuit breaker '{}' is {}", circuit, state)?;
                if let Some(at) = last_failure {
                    write!(f, ". Last failure: {}", at.to_rfc3339())?;
                }
                Ok(())
            }
            Self::Timeout { circuit, timeout } => write!(
                f,
                "Call through circuit breaker '{}' timed out after {}ms",
                circuit,
                timeout.as_millis()
            ),
            Self::OperationFailed(e) => write!(f, "Operation failed: {}", e),
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for CircuitBreakerError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::OperationFailed(e) => Some(e),
            _ => None,
        }
    }
}

/// A classified failure kept in the breaker's failure log
#[derive(Debug, Clone, Serialize)]
pub struct FailureRecord {
    pub timestamp: DateTime<Utc>,
    pub failure_type: FailureType,
    pub message: String,
    #[serde(with = "humantime_serde")]
    pub response_time: Option<Duration>,
    pub status_code: Option<u16>,
}

/// A recorded state change
#[derive(Debug, Clone, Serialize)]
pub struct StateTransition {
    pub from: CircuitState,
    pub to: CircuitState,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

/// Point-in-time view of a circuit, computed from the windowed call log
#[derive(Debug, Clone, Serialize)]
pub struct CircuitMetricsSnapshot {
    pub name: String,
    pub state: CircuitState,
    /// Failed share of calls in the window (0.0 - 1.0)
    pub failure_rate: f64,
    /// Slow share of calls in the window (0.0 - 1.0)
    pub slow_call_rate: f64,
    pub recent_call_count: usize,
    #[serde(with = "humantime_serde")]
    pub avg_response_time: Duration,
    pub recent_failure_count: usize,
    pub half_open_calls: u32,
    pub half_open_successes: u32,
    pub consecutive_failures: u32,
    pub last_failure_time: Option<DateTime<Utc>>,
    pub last_state_change: DateTime<Utc>,
}

impl CircuitMetricsSnapshot {
    /// Whether the circuit is accepting traffic normally
    pub fn is_healthy(&self) -> bool {
        self.state == CircuitState::Closed
    }
}
