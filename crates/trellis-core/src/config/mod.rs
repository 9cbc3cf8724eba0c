//! Configuration management for Trellis
//!
//! A single [`TrellisConfig`] file (TOML, YAML or JSON) carries the logging
//! setup, the default circuit breaker settings, the rate limit policy and
//! the rotation groups.

mod file_loader;
mod logging_config;
mod model;
mod validation;

pub use file_loader::{load_and_validate, load_from_file};
pub use logging_config::{LogFormat, LoggingConfig};
pub use model::TrellisConfig;
pub use validation::ConfigValidator;
