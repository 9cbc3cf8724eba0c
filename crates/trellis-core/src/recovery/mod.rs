//! Failure recovery primitives
//!
//! - Backoff strategies used by the HTTP client's retry loop
//! - Circuit breaker pattern for failing dependencies

pub mod backoff;
pub mod circuit_breaker;

pub use backoff::{BackoffConfig, BackoffStrategy, ExponentialBackoff};
pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, CircuitBreakerRegistry,
    CircuitMetricsSnapshot, CircuitState, RegistryHealth,
};
