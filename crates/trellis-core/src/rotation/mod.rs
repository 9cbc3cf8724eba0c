//! API rotation
//!
//! A [`RotationManager`] holds interchangeable upstreams for one category
//! (plant identification, weather, ...) and fails over between them on
//! retryable errors. Every endpoint sits behind its own circuit breaker.

mod builder;
mod caller;
mod manager;
mod operations;
mod state;
mod strategy;
mod types;

#[cfg(test)]
mod tests;

pub use builder::RotationManagerBuilder;
pub use caller::ApiCaller;
pub use manager::RotationManager;
pub use types::{EndpointConfig, EndpointStatus, RotationGroupConfig, RotationStats, RotationStrategy};
