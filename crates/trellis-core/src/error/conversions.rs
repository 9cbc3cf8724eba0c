//! From trait implementations for TrellisError conversions

use super::types::TrellisError;
use crate::recovery::circuit_breaker::CircuitBreakerError;

impl From<std::io::Error> for TrellisError {
    fn from(error: std::io::Error) -> Self {
        Self::config(format!("IO error: {}", error))
    }
}

impl From<serde_json::Error> for TrellisError {
    fn from(error: serde_json::Error) -> Self {
        Self::config(format!("JSON error: {}", error))
    }
}

impl From<toml::de::Error> for TrellisError {
    fn from(error: toml::de::Error) -> Self {
        Self::config(format!("TOML error: {}", error))
    }
}

impl From<serde_yaml::Error> for TrellisError {
    fn from(error: serde_yaml::Error) -> Self {
        Self::config(format!("YAML error: {}", error))
    }
}

impl From<regex::Error> for TrellisError {
    fn from(error: regex::Error) -> Self {
        Self::config(format!("Invalid pattern: {}", error))
    }
}

/// Flatten breaker outcomes back into the unified taxonomy.
///
/// The breaker never wraps an operation error, so `OperationFailed` yields
/// the original error unchanged.
impl From<CircuitBreakerError<TrellisError>> for TrellisError {
    fn from(error: CircuitBreakerError<TrellisError>) -> Self {
        match error {
            CircuitBreakerError::Open {
                circuit,
                state,
                last_failure,
            } => Self::CircuitOpen {
                circuit,
                state,
                last_failure,
            },
            CircuitBreakerError::Timeout { circuit, timeout } => Self::timeout(
                circuit,
                format!("call exceeded {}ms", timeout.as_millis()),
            ),
            CircuitBreakerError::OperationFailed(e) => e,
        }
    }
}
