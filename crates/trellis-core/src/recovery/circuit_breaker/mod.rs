//! Circuit breaker pattern for fault tolerance
//!
//! Prevents cascading failures by temporarily disabling failing operations.
//! Trip decisions combine a consecutive-failure counter with failure-rate and
//! slow-call-rate checks over a sliding window.

mod breaker;
mod metrics;
mod registry;
mod types;


// Re-export all public items
pub use breaker::CircuitBreaker;
pub use registry::{CircuitBreakerRegistry, RegistryHealth};
pub use types::{
    CircuitBreakerConfig, CircuitBreakerError, CircuitMetricsSnapshot, CircuitState,
    FailureRecord, StateTransition,
};
