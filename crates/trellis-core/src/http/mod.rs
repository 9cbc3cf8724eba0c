//! Upstream HTTP access
//!
//! [`ApiClient`] wraps one upstream API with timeouts, transport retries,
//! a response cache and a client-side request quota. Upstream statuses are
//! translated into [`TrellisError`](crate::error::TrellisError) variants so
//! circuit breakers and rotation can classify them.

mod auth;
mod cache;
mod client;
mod request;
mod types;


pub use auth::AuthScheme;
pub use cache::{CacheKey, ResponseCache};
pub use client::ApiClient;
pub use request::ApiRequest;
pub use types::{ApiClientConfig, ApiHealth, ClientStats, ErrorRecord, HealthStatus};
