//! Circuit breaker implementation

use std::fmt::Display;
use std::future::Future;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use super::metrics::BreakerMetrics;
use super::types::{
    CircuitBreakerConfig, CircuitBreakerError, CircuitMetricsSnapshot, CircuitState,
    FailureRecord, StateTransition,
};
use crate::error::{ClassifyFailure, FailureType};

/// Mutable breaker state, guarded by a single lock per circuit
#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    /// Bumped on every transition so stale probes cannot affect a new epoch
    generation: u64,
    last_failure_time: Option<DateTime<Utc>>,
    last_state_change: Instant,
    last_state_change_at: DateTime<Utc>,
    half_open_call_count: u32,
    half_open_success_count: u32,
    consecutive_failures: u32,
    metrics: BreakerMetrics,
}

/// Ticket handed out when a call is admitted
#[derive(Debug, Clone, Copy)]
struct Admission {
    probe: bool,
    generation: u64,
}

/// Circuit breaker for protecting against failing dependencies
#[derive(Debug)]
pub struct CircuitBreaker {
    /// Circuit name (for logging and metrics)
    name: String,
    /// Configuration
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    /// Create a new circuit breaker with default config
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_config(name, CircuitBreakerConfig::default())
    }

    /// Create a new circuit breaker with custom config.
    ///
    /// Zero probe or failure thresholds are raised to 1.
    pub fn with_config(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        let name = name.into();
        let config = config.clamped(&name);
        tracing::debug!(circuit = %name, "circuit breaker initialized in closed state");
        Self {
            name,
            config,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                generation: 0,
                last_failure_time: None,
                last_state_change: Instant::now(),
                last_state_change_at: Utc::now(),
                half_open_call_count: 0,
                half_open_success_count: 0,
                consecutive_failures: 0,
                metrics: BreakerMetrics::default(),
            }),
        }
    }

    /// Get the circuit name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the configuration
    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Current state.
    ///
    /// An open circuit whose recovery timeout has elapsed still reports
    /// `Open`; the move to half-open happens on the next call attempt.
    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Execute an operation with circuit breaker protection
    pub async fn call<T, E, F, Fut>(&self, operation: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: ClassifyFailure + Display,
    {
        let admission = self.acquire::<E>()?;
        let mut guard = ProbeGuard {
            breaker: self,
            admission,
            armed: true,
        };

        let started = Instant::now();
        let outcome = match self.config.call_timeout {
            Some(limit) => tokio::time::timeout(limit, operation()).await.ok(),
            None => Some(operation().await),
        };
        let elapsed = started.elapsed();
        guard.armed = false;

        match outcome {
            None => {
                let limit = self.config.call_timeout.unwrap_or(elapsed);
                self.on_failure(
                    admission,
                    FailureType::Timeout,
                    format!("call exceeded {}ms", limit.as_millis()),
                    Some(elapsed),
                    None,
                );
                Err(CircuitBreakerError::Timeout {
                    circuit: self.name.clone(),
                    timeout: limit,
                })
            }
            Some(Ok(value)) => {
                self.on_success(admission, elapsed);
                Ok(value)
            }
            Some(Err(error)) => {
                match error.failure_type() {
                    Some(kind) if self.config.retryable_error_types.contains(&kind) => {
                        self.on_failure(
                            admission,
                            kind,
                            error.to_string(),
                            Some(elapsed),
                            error.status_code(),
                        );
                    }
                    kind => self.on_unexpected(admission, kind, &error),
                }
                Err(CircuitBreakerError::OperationFailed(error))
            }
        }
    }

    /// Record a successful operation performed outside [`call`](Self::call)
    pub fn record_success(&self, response_time: Duration) {
        let mut inner = self.inner.lock();
        let admission = Admission {
            probe: inner.state == CircuitState::HalfOpen,
            generation: inner.generation,
        };
        self.apply_success(&mut inner, admission, response_time);
    }

    /// Record a failed operation performed outside [`call`](Self::call)
    pub fn record_failure(&self, failure_type: FailureType, message: impl Into<String>) {
        let mut inner = self.inner.lock();
        let admission = Admission {
            probe: inner.state == CircuitState::HalfOpen,
            generation: inner.generation,
        };
        self.apply_failure(&mut inner, admission, failure_type, message.into(), None, None);
    }

    /// Get a metrics snapshot computed from the failure window
    pub fn metrics(&self) -> CircuitMetricsSnapshot {
        let inner = self.inner.lock();
        let window = self.config.failure_window;
        CircuitMetricsSnapshot {
            name: self.name.clone(),
            state: inner.state,
            failure_rate: inner.metrics.failure_rate(window),
            slow_call_rate: inner
                .metrics
                .slow_call_rate(window, self.config.slow_call_threshold),
            recent_call_count: inner.metrics.call_count(window),
            avg_response_time: inner.metrics.avg_response_time(window),
            recent_failure_count: inner.metrics.recent_failure_count(window),
            half_open_calls: inner.half_open_call_count,
            half_open_successes: inner.half_open_success_count,
            consecutive_failures: inner.consecutive_failures,
            last_failure_time: inner.last_failure_time,
            last_state_change: inner.last_state_change_at,
        }
    }

    /// Most recent classified failures, newest first
    pub fn recent_failures(&self, limit: usize) -> Vec<FailureRecord> {
        self.inner.lock().metrics.failures(limit)
    }

    /// Most recent state transitions, newest first
    pub fn state_changes(&self, limit: usize) -> Vec<StateTransition> {
        self.inner.lock().metrics.transitions(limit)
    }

    /// Manually open the circuit
    pub fn force_open(&self, reason: &str) {
        let mut inner = self.inner.lock();
        self.transition(&mut inner, CircuitState::Open, reason);
    }

    /// Manually close the circuit
    pub fn force_close(&self, reason: &str) {
        let mut inner = self.inner.lock();
        self.transition(&mut inner, CircuitState::Closed, reason);
    }

    /// Manually move the circuit to half-open
    pub fn force_half_open(&self, reason: &str) {
        let mut inner = self.inner.lock();
        self.transition(&mut inner, CircuitState::HalfOpen, reason);
    }

    /// Clear call, failure and transition logs without changing state
    pub fn reset_metrics(&self) {
        let mut inner = self.inner.lock();
        inner.metrics.clear();
        inner.consecutive_failures = 0;
        inner.last_failure_time = None;
        tracing::info!(circuit = %self.name, "circuit breaker metrics reset");
    }

    fn acquire<E>(&self) -> Result<Admission, CircuitBreakerError<E>> {
        let mut inner = self.inner.lock();

        if inner.state == CircuitState::Open
            && inner.last_state_change.elapsed() >= self.config.recovery_timeout
        {
            self.transition(&mut inner, CircuitState::HalfOpen, "recovery timeout elapsed");
        }

        match inner.state {
            CircuitState::Closed => Ok(Admission {
                probe: false,
                generation: inner.generation,
            }),
            CircuitState::Open => Err(self.rejection(&inner)),
            CircuitState::HalfOpen => {
                if inner.half_open_call_count >= self.config.half_open_max_calls {
                    tracing::debug!(
                        circuit = %self.name,
                        probes = inner.half_open_call_count,
                        "half-open probe slots exhausted"
                    );
                    return Err(self.rejection(&inner));
                }
                inner.half_open_call_count += 1;
                Ok(Admission {
                    probe: true,
                    generation: inner.generation,
                })
            }
        }
    }

    fn rejection<E>(&self, inner: &BreakerInner) -> CircuitBreakerError<E> {
        CircuitBreakerError::Open {
            circuit: self.name.clone(),
            state: inner.state,
            last_failure: inner.last_failure_time,
        }
    }

    fn on_success(&self, admission: Admission, response_time: Duration) {
        let mut inner = self.inner.lock();
        self.apply_success(&mut inner, admission, response_time);
    }

    fn on_failure(
        &self,
        admission: Admission,
        failure_type: FailureType,
        message: String,
        response_time: Option<Duration>,
        status_code: Option<u16>,
    ) {
        let mut inner = self.inner.lock();
        self.apply_failure(
            &mut inner,
            admission,
            failure_type,
            message,
            response_time,
            status_code,
        );
    }

    fn on_unexpected<E: Display>(&self, admission: Admission, kind: Option<FailureType>, error: &E) {
        tracing::debug!(
            circuit = %self.name,
            failure_type = ?kind,
            error = %error,
            "error not counted toward circuit state"
        );
        if !admission.probe {
            return;
        }
        let mut inner = self.inner.lock();
        if inner.state == CircuitState::HalfOpen && inner.generation == admission.generation {
            inner.half_open_call_count = inner.half_open_call_count.saturating_sub(1);
        }
    }

    fn apply_success(&self, inner: &mut BreakerInner, admission: Admission, response_time: Duration) {
        inner.metrics.record_call(true, response_time);
        inner.consecutive_failures = 0;

        match inner.state {
            CircuitState::HalfOpen if admission.probe && inner.generation == admission.generation => {
                inner.half_open_success_count += 1;
                if inner.half_open_success_count >= self.config.half_open_max_calls {
                    self.transition(inner, CircuitState::Closed, "recovery verified");
                }
            }
            CircuitState::Closed => {
                if let Some(reason) = self.trip_reason(inner) {
                    self.transition(inner, CircuitState::Open, &reason);
                }
            }
            _ => {}
        }
    }

    fn apply_failure(
        &self,
        inner: &mut BreakerInner,
        admission: Admission,
        failure_type: FailureType,
        message: String,
        response_time: Option<Duration>,
        status_code: Option<u16>,
    ) {
        let now = Utc::now();
        inner
            .metrics
            .record_call(false, response_time.unwrap_or(Duration::ZERO));
        inner.metrics.record_failure(FailureRecord {
            timestamp: now,
            failure_type,
            message,
            response_time,
            status_code,
        });
        inner.last_failure_time = Some(now);
        inner.consecutive_failures += 1;

        match inner.state {
            CircuitState::HalfOpen if admission.generation == inner.generation => {
                let reason = format!("failure during recovery probe: {}", failure_type);
                self.transition(inner, CircuitState::Open, &reason);
            }
            CircuitState::Closed => {
                if let Some(reason) = self.trip_reason(inner) {
                    self.transition(inner, CircuitState::Open, &reason);
                }
            }
            _ => {}
        }
    }

    fn trip_reason(&self, inner: &BreakerInner) -> Option<String> {
        if inner.consecutive_failures >= self.config.failure_threshold {
            return Some(format!(
                "{} consecutive failures",
                inner.consecutive_failures
            ));
        }

        let window = self.config.failure_window;
        let calls = inner.metrics.call_count(window);
        if calls < self.config.minimum_calls_threshold as usize {
            return None;
        }

        let failure_rate = inner.metrics.failure_rate(window);
        if failure_rate >= self.config.failure_rate_threshold {
            return Some(format!(
                "failure rate {:.0}% over {} calls",
                failure_rate * 100.0,
                calls
            ));
        }

        let slow_rate = inner
            .metrics
            .slow_call_rate(window, self.config.slow_call_threshold);
        if slow_rate >= self.config.slow_call_rate_threshold {
            return Some(format!(
                "slow call rate {:.0}% over {} calls",
                slow_rate * 100.0,
                calls
            ));
        }

        None
    }

    fn transition(&self, inner: &mut BreakerInner, to: CircuitState, reason: &str) {
        let from = inner.state;
        inner.state = to;
        inner.generation += 1;
        inner.last_state_change = Instant::now();
        inner.last_state_change_at = Utc::now();
        inner.half_open_call_count = 0;
        inner.half_open_success_count = 0;
        if to == CircuitState::Closed {
            // Rates restart from the close; the failure log is kept for inspection
            inner.consecutive_failures = 0;
            inner.metrics.clear_calls();
        }
        inner.metrics.record_transition(StateTransition {
            from,
            to,
            reason: reason.to_string(),
            timestamp: inner.last_state_change_at,
        });

        match to {
            CircuitState::Open => tracing::warn!(
                circuit = %self.name,
                from = %from,
                reason,
                "circuit breaker opened"
            ),
            _ => tracing::info!(
                circuit = %self.name,
                from = %from,
                to = %to,
                reason,
                "circuit breaker state changed"
            ),
        }
    }
}

/// Reconciles a half-open probe whose future is dropped before completing
struct ProbeGuard<'a> {
    breaker: &'a CircuitBreaker,
    admission: Admission,
    armed: bool,
}

impl Drop for ProbeGuard<'_> {
    fn drop(&mut self) {
        if !self.armed || !self.admission.probe {
            return;
        }
        tracing::warn!(
            circuit = %self.breaker.name,
            "half-open probe abandoned before completion"
        );
        self.breaker.on_failure(
            self.admission,
            FailureType::Timeout,
            "half-open probe abandoned".to_string(),
            None,
            None,
        );
    }
}
