//! Trellis Core Library
//!
//! Resilience primitives for calling external APIs: circuit breakers with a
//! named registry, a sliding-window rate limiter with burst and tiered
//! limits, a resilient HTTP client, and rotation managers that fail over
//! between interchangeable upstreams.

pub mod config;
pub mod error;
pub mod http;
pub mod rate_limit;
pub mod recovery;
pub mod rotation;

// Re-export commonly used types
pub use config::{LogFormat, LoggingConfig, TrellisConfig};
pub use error::{ClassifyFailure, FailureType, TrellisError, TrellisResult, UnifiedError};
pub use http::{ApiClient, ApiClientConfig, ApiHealth, ApiRequest, ClientStats, HealthStatus};
pub use rate_limit::{
    CallerTier, CounterStore, MemoryCounterStore, RateLimitDecision, RateLimitPolicy,
    RateLimitPolicyConfig, RateSpec, RequestContext, SlidingWindowLimiter,
};
pub use recovery::{
    BackoffConfig, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError,
    CircuitBreakerRegistry, CircuitMetricsSnapshot, CircuitState, ExponentialBackoff,
};
pub use rotation::{
    ApiCaller, EndpointConfig, RotationGroupConfig, RotationManager, RotationStats,
    RotationStrategy,
};
