//! Rotation configuration and reporting types

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::http::ApiClientConfig;
use crate::recovery::circuit_breaker::CircuitMetricsSnapshot;

/// How a manager orders its endpoints for each call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RotationStrategy {
    /// Ascending priority, then `weight * success_rate` descending
    #[default]
    PriorityWeighted,
    /// Start one position later on every call
    RoundRobin,
    /// Fastest, most reliable, closed-circuit endpoints first
    PerformanceBased,
}

impl fmt::Display for RotationStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PriorityWeighted => write!(f, "priority_weighted"),
            Self::RoundRobin => write!(f, "round_robin"),
            Self::PerformanceBased => write!(f, "performance_based"),
        }
    }
}

/// One upstream in a `[[rotation]]` group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    pub name: String,
    pub base_url: String,
    /// Environment variable holding the API key
    pub api_key_env: Option<String>,
    /// Lower is tried first
    pub priority: u32,
    pub weight: f64,
    pub enabled: bool,
    pub client: ApiClientConfig,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            base_url: String::new(),
            api_key_env: None,
            priority: default_priority(),
            weight: default_weight(),
            enabled: true,
            client: ApiClientConfig::default(),
        }
    }
}

fn default_priority() -> u32 {
    1
}

fn default_weight() -> f64 {
    1.0
}

impl EndpointConfig {
    pub fn new(name: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_api_key_env(mut self, var: impl Into<String>) -> Self {
        self.api_key_env = Some(var.into());
        self
    }

    /// Read the API key from the environment, if one is configured
    pub fn resolve_api_key(&self) -> Option<String> {
        let var = self.api_key_env.as_deref()?;
        match std::env::var(var) {
            Ok(key) if !key.trim().is_empty() => Some(key),
            _ => {
                tracing::warn!(endpoint = %self.name, var, "API key variable not set, calling without a key");
                None
            }
        }
    }
}

/// A `[[rotation]]` group: one category of interchangeable upstreams
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RotationGroupConfig {
    pub category: String,
    pub strategy: RotationStrategy,
    pub endpoints: Vec<EndpointConfig>,
}

/// Per-endpoint view returned by `endpoint_status`
#[derive(Debug, Clone, Serialize)]
pub struct EndpointStatus {
    pub name: String,
    pub enabled: bool,
    pub priority: u32,
    pub weight: f64,
    pub success_rate: f64,
    pub avg_response_time_ms: f64,
    pub last_used_at: Option<DateTime<Utc>>,
    pub circuit: CircuitMetricsSnapshot,
}

/// Manager-wide counters
#[derive(Debug, Clone, Serialize)]
pub struct RotationStats {
    pub category: String,
    pub strategy: RotationStrategy,
    pub total_endpoints: usize,
    pub enabled_endpoints: usize,
    /// Endpoint attempts, failovers included
    pub total_requests: u64,
    pub successful_requests: u64,
    /// Top-level calls that ended in an error
    pub failed_requests: u64,
    pub failover_count: u64,
    /// Attempts per endpoint name
    pub endpoints_used: BTreeMap<String, u64>,
    /// EMA of successful call latency
    pub average_response_time_ms: f64,
}
