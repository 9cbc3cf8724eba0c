//! Top-level configuration model

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::logging_config::LoggingConfig;
use super::validation::ConfigValidator;
use crate::error::TrellisResult;
use crate::rate_limit::RateLimitPolicyConfig;
use crate::recovery::circuit_breaker::{CircuitBreakerConfig, CircuitBreakerRegistry};
use crate::rotation::{RotationGroupConfig, RotationManager};

/// Everything a Trellis deployment is configured with
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrellisConfig {
    pub logging: LoggingConfig,
    /// Default settings for registry-created circuits
    pub circuit_breaker: CircuitBreakerConfig,
    pub rate_limit: RateLimitPolicyConfig,
    pub rotation: Vec<RotationGroupConfig>,
}

impl TrellisConfig {
    pub fn validate(&self) -> TrellisResult<()> {
        ConfigValidator::validate(self)
    }

    pub fn rotation_group(&self, category: &str) -> Option<&RotationGroupConfig> {
        self.rotation.iter().find(|g| g.category == category)
    }

    /// Registry whose circuits default to `[circuit_breaker]`
    pub fn registry(&self) -> Arc<CircuitBreakerRegistry> {
        Arc::new(CircuitBreakerRegistry::with_config(self.circuit_breaker.clone()))
    }

    /// Build one manager per `[[rotation]]` group, all sharing `registry`
    pub fn rotation_managers(
        &self,
        registry: &Arc<CircuitBreakerRegistry>,
    ) -> TrellisResult<Vec<RotationManager>> {
        self.rotation
            .iter()
            .map(|group| RotationManager::from_config(group, registry.clone()))
            .collect()
    }
}
