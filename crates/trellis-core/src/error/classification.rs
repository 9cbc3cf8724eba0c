//! Failure classification for circuit breaking
//!
//! Maps concrete errors onto the closed [`FailureType`] set so trip policy
//! stays exhaustive and statically checked.

use super::types::TrellisError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of upstream failure observed by a circuit breaker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureType {
    /// Upstream did not answer in time
    Timeout,
    /// Upstream could not be reached
    ConnectionError,
    /// 4xx other than 429
    HttpError,
    /// 429 or an equivalent throttle signal
    RateLimit,
    /// 5xx
    ServiceUnavailable,
    /// Upstream failure with no better description
    Unknown,
}

impl FailureType {
    /// All failure types, in declaration order
    pub const ALL: [FailureType; 6] = [
        FailureType::Timeout,
        FailureType::ConnectionError,
        FailureType::HttpError,
        FailureType::RateLimit,
        FailureType::ServiceUnavailable,
        FailureType::Unknown,
    ];

    /// Classify an HTTP status code
    pub fn from_status(status: u16) -> Self {
        match status {
            429 => Self::RateLimit,
            s if s >= 500 => Self::ServiceUnavailable,
            _ => Self::HttpError,
        }
    }

    /// Stable snake_case name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::ConnectionError => "connection_error",
            Self::HttpError => "http_error",
            Self::RateLimit => "rate_limit",
            Self::ServiceUnavailable => "service_unavailable",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for FailureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can tell a circuit breaker what kind of failure they are.
///
/// Returning `None` marks the error as unexpected: it propagates to the
/// caller but never moves the breaker's state machine.
pub trait ClassifyFailure {
    /// Failure kind, or `None` when the error says nothing about upstream health
    fn failure_type(&self) -> Option<FailureType>;

    /// HTTP status attached to the failure, if any
    fn status_code(&self) -> Option<u16> {
        None
    }
}

impl ClassifyFailure for TrellisError {
    fn failure_type(&self) -> Option<FailureType> {
        match self {
            Self::ApiTimeout { .. } => Some(FailureType::Timeout),
            Self::ApiConnection { .. } => Some(FailureType::ConnectionError),
            Self::RateLimitExceeded { .. } => Some(FailureType::RateLimit),
            Self::QuotaExceeded { status, .. } => Some(FailureType::from_status(*status)),
            Self::ExternalApi {
                status: Some(status),
                ..
            } => Some(FailureType::from_status(*status)),
            Self::ExternalApi { status: None, .. } => Some(FailureType::Unknown),
            // Credentials, local misconfiguration and our own fail-fast
            // signals are not evidence about the dependency.
            Self::ApiAuthentication { .. }
            | Self::CircuitOpen { .. }
            | Self::RotationExhausted { .. }
            | Self::Config { .. }
            | Self::Store { .. }
            | Self::InvalidInput { .. } => None,
        }
    }

    fn status_code(&self) -> Option<u16> {
        match self {
            Self::ApiAuthentication { status, .. } | Self::QuotaExceeded { status, .. } => {
                Some(*status)
            }
            Self::ExternalApi { status, .. } => *status,
            Self::RateLimitExceeded { .. } => Some(429),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(FailureType::from_status(429), FailureType::RateLimit);
        assert_eq!(FailureType::from_status(500), FailureType::ServiceUnavailable);
        assert_eq!(FailureType::from_status(503), FailureType::ServiceUnavailable);
        assert_eq!(FailureType::from_status(509), FailureType::ServiceUnavailable);
        assert_eq!(FailureType::from_status(404), FailureType::HttpError);
        assert_eq!(FailureType::from_status(402), FailureType::HttpError);
    }

    #[test]
    fn test_classify_transport_errors() {
        let timeout = TrellisError::timeout("weather", "deadline elapsed");
        assert_eq!(timeout.failure_type(), Some(FailureType::Timeout));

        let conn = TrellisError::connection("weather", "connection refused");
        assert_eq!(conn.failure_type(), Some(FailureType::ConnectionError));
    }

    #[test]
    fn test_classify_http_errors() {
        let server = TrellisError::external_api_status("plantnet", 502, "bad gateway");
        assert_eq!(server.failure_type(), Some(FailureType::ServiceUnavailable));
        assert_eq!(server.status_code(), Some(502));

        let client = TrellisError::external_api_status("plantnet", 404, "missing");
        assert_eq!(client.failure_type(), Some(FailureType::HttpError));

        let bare = TrellisError::external_api("plantnet", "garbled response");
        assert_eq!(bare.failure_type(), Some(FailureType::Unknown));
    }

    #[test]
    fn test_auth_and_local_errors_are_unclassified() {
        let auth = TrellisError::authentication("openai", 401, "bad key");
        assert_eq!(auth.failure_type(), None);
        assert_eq!(auth.status_code(), Some(401));

        assert_eq!(TrellisError::config("broken").failure_type(), None);
        assert_eq!(TrellisError::store("down").failure_type(), None);
    }

    #[test]
    fn test_failure_type_serde_names() {
        let json = serde_json::to_string(&FailureType::ServiceUnavailable).unwrap();
        assert_eq!(json, "\"service_unavailable\"");
        let parsed: FailureType = serde_json::from_str("\"connection_error\"").unwrap();
        assert_eq!(parsed, FailureType::ConnectionError);
        assert_eq!(FailureType::RateLimit.to_string(), "rate_limit");
    }
}
