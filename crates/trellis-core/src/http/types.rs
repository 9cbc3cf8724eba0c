//! Client configuration and reporting types

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::recovery::backoff::BackoffConfig;

/// Tunables for one [`ApiClient`](super::ApiClient)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiClientConfig {
    /// Default per-request timeout
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// Attempts for a request that keeps failing at the transport level,
    /// the first one included. HTTP error statuses are never retried.
    pub max_retries: u32,
    /// Delay between transport retries
    pub backoff: BackoffConfig,
    pub enable_caching: bool,
    #[serde(with = "humantime_serde")]
    pub cache_ttl: Duration,
    pub cache_capacity: usize,
    /// Client-side request budget per rolling minute; 0 disables
    pub rate_limit_per_minute: u32,
    /// Client-side request budget per hour; 0 disables
    pub rate_limit_per_hour: u32,
    pub user_agent: String,
}

impl Default for ApiClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_retries: 3,
            backoff: BackoffConfig::default(),
            enable_caching: true,
            cache_ttl: Duration::from_secs(300),
            cache_capacity: 1000,
            rate_limit_per_minute: 60,
            rate_limit_per_hour: 1000,
            user_agent: concat!("trellis/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// Point-in-time client counters
#[derive(Debug, Clone, Default, Serialize)]
pub struct ClientStats {
    pub api_name: String,
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    /// EMA weighted 0.7 old / 0.3 new
    pub average_response_time_ms: f64,
    pub last_request_time: Option<DateTime<Utc>>,
    pub rate_limit_hits: u64,
    /// Percentage of sent requests that failed
    pub error_rate: f64,
    /// Percentage of cache lookups that hit
    pub cache_hit_rate: f64,
    pub rate_limit_per_minute: u32,
    pub rate_limit_per_hour: u32,
    pub current_minute_usage: u32,
    pub current_hour_usage: u32,
}

/// One failed request, kept for diagnostics
#[derive(Debug, Clone, Serialize)]
pub struct ErrorRecord {
    pub timestamp: DateTime<Utc>,
    pub error_code: String,
    pub message: String,
    pub method: String,
    pub url: String,
    pub api_name: String,
}

/// Outcome of probing an upstream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
    /// No conventional health path answered
    Unknown,
    /// Endpoint switched off by an operator
    Disabled,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Unhealthy => write!(f, "unhealthy"),
            Self::Unknown => write!(f, "unknown"),
            Self::Disabled => write!(f, "disabled"),
        }
    }
}

/// Health probe report
#[derive(Debug, Clone, Serialize)]
pub struct ApiHealth {
    pub api_name: String,
    pub status: HealthStatus,
    pub endpoint_tested: Option<String>,
    pub response_time_ms: Option<f64>,
    pub message: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ApiHealth {
    pub fn new(api_name: impl Into<String>, status: HealthStatus) -> Self {
        Self {
            api_name: api_name.into(),
            status,
            endpoint_tested: None,
            response_time_ms: None,
            message: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}
