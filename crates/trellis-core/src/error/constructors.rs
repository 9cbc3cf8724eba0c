//! Constructor methods for TrellisError

use super::types::TrellisError;
use chrono::{DateTime, Utc};
use std::time::Duration;

impl TrellisError {
    /// Create a new configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            context: None,
        }
    }

    /// Create a configuration error with context
    pub fn config_with_context(message: impl Into<String>, context: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            context: Some(context.into()),
        }
    }

    /// Create a rate limit error
    pub fn rate_limited(
        scope: impl Into<String>,
        message: impl Into<String>,
        retry_after: Option<Duration>,
    ) -> Self {
        Self::RateLimitExceeded {
            scope: scope.into(),
            message: message.into(),
            retry_after,
            reset_time: None,
        }
    }

    /// Create a rate limit error that knows when the window frees up
    pub fn rate_limited_until(
        scope: impl Into<String>,
        message: impl Into<String>,
        reset_time: DateTime<Utc>,
    ) -> Self {
        let retry_after = (reset_time - Utc::now())
            .to_std()
            .unwrap_or(Duration::ZERO)
            .max(Duration::from_secs(1));
        Self::RateLimitExceeded {
            scope: scope.into(),
            message: message.into(),
            retry_after: Some(retry_after),
            reset_time: Some(reset_time),
        }
    }

    /// Create a timeout error
    pub fn timeout(api: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ApiTimeout {
            api: api.into(),
            message: message.into(),
        }
    }

    /// Create a connection error
    pub fn connection(api: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ApiConnection {
            api: api.into(),
            message: message.into(),
        }
    }

    /// Create an authentication error
    pub fn authentication(api: impl Into<String>, status: u16, message: impl Into<String>) -> Self {
        Self::ApiAuthentication {
            api: api.into(),
            status,
            message: message.into(),
        }
    }

    /// Create a quota error
    pub fn quota_exceeded(api: impl Into<String>, status: u16, message: impl Into<String>) -> Self {
        Self::QuotaExceeded {
            api: api.into(),
            status,
            message: message.into(),
        }
    }

    /// Create an external API error without a status code
    pub fn external_api(api: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ExternalApi {
            api: api.into(),
            status: None,
            message: message.into(),
        }
    }

    /// Create an external API error for an HTTP status
    pub fn external_api_status(
        api: impl Into<String>,
        status: u16,
        message: impl Into<String>,
    ) -> Self {
        Self::ExternalApi {
            api: api.into(),
            status: Some(status),
            message: message.into(),
        }
    }

    /// Create a rotation exhaustion error
    pub fn rotation_exhausted(
        category: impl Into<String>,
        attempts: u32,
        last_error: Option<TrellisError>,
    ) -> Self {
        Self::RotationExhausted {
            category: category.into(),
            attempts,
            last_error: last_error.map(Box::new),
        }
    }

    /// Create a counter store error
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store {
            message: message.into(),
        }
    }

    /// Create an invalid input error
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
            field: None,
        }
    }

    /// Create an invalid input error for a specific field
    pub fn invalid_field(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
            field: Some(field.into()),
        }
    }
}
