//! UnifiedError trait implementation for TrellisError

use super::types::{TrellisError, UnifiedError};
use chrono::Utc;
use serde_json::{Value, json};

impl UnifiedError for TrellisError {
    fn error_code(&self) -> &str {
        match self {
            Self::CircuitOpen { .. } => "CIRCUIT_OPEN",
            Self::RateLimitExceeded { .. } => "RATE_LIMIT_EXCEEDED",
            Self::ApiTimeout { .. } => "API_TIMEOUT",
            Self::ApiConnection { .. } => "API_CONNECTION_ERROR",
            Self::ApiAuthentication { .. } => "API_AUTHENTICATION_FAILED",
            Self::QuotaExceeded { .. } => "API_QUOTA_EXCEEDED",
            Self::ExternalApi { .. } => "EXTERNAL_API_ERROR",
            Self::RotationExhausted { .. } => "ROTATION_EXHAUSTED",
            Self::Config { .. } => "CONFIG_ERROR",
            Self::Store { .. } => "COUNTER_STORE_ERROR",
            Self::InvalidInput { .. } => "INVALID_INPUT",
        }
    }

    fn message(&self) -> String {
        self.to_string()
    }

    fn http_status(&self) -> u16 {
        match self {
            Self::CircuitOpen { .. } | Self::RotationExhausted { .. } => 503,
            Self::RateLimitExceeded { .. } | Self::QuotaExceeded { .. } => 429,
            Self::ApiTimeout { .. } => 504,
            Self::ApiConnection { .. } | Self::ExternalApi { .. } => 502,
            Self::ApiAuthentication { status, .. } => *status,
            Self::InvalidInput { .. } => 400,
            Self::Config { .. } | Self::Store { .. } => 500,
        }
    }

    fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::CircuitOpen { .. }
                | Self::RateLimitExceeded { .. }
                | Self::ApiTimeout { .. }
                | Self::ApiConnection { .. }
                | Self::QuotaExceeded { .. }
                | Self::ExternalApi { .. }
        )
    }
}

impl TrellisError {
    /// Seconds a client should wait before retrying, when known
    pub fn retry_after_seconds(&self) -> Option<u64> {
        match self {
            Self::RateLimitExceeded {
                retry_after: Some(after),
                ..
            } => Some(after.as_secs().max(1)),
            _ => None,
        }
    }

    /// JSON error envelope for HTTP responses
    pub fn to_response_body(&self) -> Value {
        let mut details = serde_json::Map::new();
        match self {
            Self::CircuitOpen {
                circuit,
                state,
                last_failure,
            } => {
                details.insert("circuit".into(), json!(circuit));
                details.insert("state".into(), json!(state));
                details.insert(
                    "last_failure".into(),
                    json!(last_failure.map(|t| t.to_rfc3339())),
                );
            }
            Self::RotationExhausted {
                category, attempts, ..
            } => {
                details.insert("category".into(), json!(category));
                details.insert("attempts".into(), json!(attempts));
            }
            _ => {}
        }
        if let Some(after) = self.retry_after_seconds() {
            details.insert("retry_after_seconds".into(), json!(after));
        }

        json!({
            "error": {
                "code": self.error_code(),
                "message": self.message(),
                "details": Value::Object(details),
                "timestamp": Utc::now().to_rfc3339(),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recovery::circuit_breaker::CircuitState;
    use std::time::Duration;

    #[test]
    fn test_http_status_mapping() {
        let open = TrellisError::CircuitOpen {
            circuit: "plantnet".into(),
            state: CircuitState::Open,
            last_failure: None,
        };
        assert_eq!(open.http_status(), 503);
        assert_eq!(TrellisError::timeout("a", "b").http_status(), 504);
        assert_eq!(TrellisError::connection("a", "b").http_status(), 502);
        assert_eq!(TrellisError::authentication("a", 403, "b").http_status(), 403);
        assert_eq!(TrellisError::rotation_exhausted("ai", 3, None).http_status(), 503);
        assert_eq!(
            TrellisError::rate_limited("user:1", "slow down", None).http_status(),
            429
        );
    }

    #[test]
    fn test_retryable_taxonomy() {
        assert!(TrellisError::external_api_status("a", 500, "x").is_retryable());
        assert!(TrellisError::quota_exceeded("a", 402, "x").is_retryable());
        assert!(TrellisError::rate_limited("a", "x", None).is_retryable());
        assert!(!TrellisError::authentication("a", 401, "x").is_retryable());
        assert!(!TrellisError::config("x").is_retryable());
        assert!(!TrellisError::rotation_exhausted("ai", 2, None).is_retryable());
    }

    #[test]
    fn test_rotation_exhausted_message_includes_last_error() {
        let last = TrellisError::external_api_status("openai", 503, "overloaded");
        let err = TrellisError::rotation_exhausted("ai", 2, Some(last));
        let text = err.to_string();
        assert!(text.contains("after 2 attempts"));
        assert!(text.contains("overloaded"));
    }

    #[test]
    fn test_response_body_shape() {
        let err = TrellisError::rate_limited("ip:1.2.3.4", "too many", Some(Duration::from_secs(12)));
        let body = err.to_response_body();
        assert_eq!(body["error"]["code"], "RATE_LIMIT_EXCEEDED");
        assert_eq!(body["error"]["details"]["retry_after_seconds"], 12);
        assert!(body["error"]["timestamp"].is_string());
    }
}
