//! Core error types and traits for Trellis

use crate::recovery::circuit_breaker::CircuitState;
use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;

/// Result type alias for Trellis operations
pub type TrellisResult<T> = Result<T, TrellisError>;

/// Unified error trait implemented by every Trellis error.
///
/// Gives callers a stable code, an HTTP status for user-facing responses,
/// and the retry decision used by the rotation manager.
pub trait UnifiedError: std::error::Error + Send + Sync {
    /// Get the error code for programmatic handling
    fn error_code(&self) -> &str;

    /// Get the human-readable error message
    fn message(&self) -> String;

    /// HTTP status a server should answer with
    fn http_status(&self) -> u16;

    /// Check if another endpoint may succeed where this one failed
    fn is_retryable(&self) -> bool {
        false
    }
}

/// Main error type for Trellis
///
/// Variants map one-to-one onto the failure taxonomy the resilience layer
/// reasons about. Each carries enough context to build a response body.
#[derive(Error, Debug, Clone)]
pub enum TrellisError {
    /// Circuit is open or half-open with no probe slots left
    #[error("Circuit breaker '{circuit}' is {state}")]
    CircuitOpen {
        circuit: String,
        state: CircuitState,
        last_failure: Option<DateTime<Utc>>,
    },

    /// A sliding window, burst window or upstream quota window is exhausted
    #[error("Rate limit exceeded for {scope}: {message}")]
    RateLimitExceeded {
        scope: String,
        message: String,
        retry_after: Option<Duration>,
        reset_time: Option<DateTime<Utc>>,
    },

    /// Upstream did not answer in time
    #[error("Timeout calling {api}: {message}")]
    ApiTimeout { api: String, message: String },

    /// Upstream could not be reached
    #[error("Connection to {api} failed: {message}")]
    ApiConnection { api: String, message: String },

    /// Credentials were rejected (401/403)
    #[error("Authentication failed for {api} ({status}): {message}")]
    ApiAuthentication {
        api: String,
        status: u16,
        message: String,
    },

    /// Upstream quota exhausted (402/509)
    #[error("API quota exceeded for {api} ({status}): {message}")]
    QuotaExceeded {
        api: String,
        status: u16,
        message: String,
    },

    /// Generic upstream failure
    #[error("External API error from {api}: {message}")]
    ExternalApi {
        api: String,
        status: Option<u16>,
        message: String,
    },

    /// Every eligible endpoint failed
    #[error("All endpoints failed for {category} after {attempts} attempts{}", last_error_suffix(.last_error))]
    RotationExhausted {
        category: String,
        attempts: u32,
        last_error: Option<Box<TrellisError>>,
    },

    /// Configuration related errors
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        context: Option<String>,
    },

    /// Shared counter store failures
    #[error("Counter store error: {message}")]
    Store { message: String },

    /// Invalid input errors
    #[error("Invalid input: {message}")]
    InvalidInput {
        message: String,
        field: Option<String>,
    },
}

fn last_error_suffix(last_error: &Option<Box<TrellisError>>) -> String {
    match last_error {
        Some(e) => format!(". Last error: {}", e),
        None => String::new(),
    }
}
