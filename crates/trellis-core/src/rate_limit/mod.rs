//! Sliding-window rate limiting
//!
//! [`SlidingWindowLimiter`] counts requests per key in a [`CounterStore`];
//! [`RateLimitPolicy`] layers caller tiers, endpoint overrides, burst
//! allowance and per-feature limits on top and produces
//! [`RateLimitDecision`]s with response headers and a 429 body.

mod limiter;
mod matcher;
mod policy;
mod store;
mod types;


pub use limiter::{LimiterHealth, SlidingWindowLimiter};
pub use policy::{EndpointLimit, RateLimitPolicy, RateLimitPolicyConfig};
pub(crate) use policy::validate_config;
pub use store::{CounterStore, MemoryCounterStore, WindowCount};
pub use types::{
    CallerTier, RateLimitDecision, RateSpec, RequestContext, Subject, UsageInfo, WindowResult,
};
