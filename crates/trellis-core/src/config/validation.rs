//! Configuration validation

use std::collections::HashSet;

use super::model::TrellisConfig;
use crate::error::{TrellisError, TrellisResult};
use crate::rate_limit;
use crate::rotation::RotationGroupConfig;

/// Configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate a complete configuration
    pub fn validate(config: &TrellisConfig) -> TrellisResult<()> {
        config.logging.validate()?;
        config.circuit_breaker.validate()?;
        rate_limit::validate_config(&config.rate_limit)?;
        Self::validate_rotation(&config.rotation)?;
        Ok(())
    }

    fn validate_rotation(groups: &[RotationGroupConfig]) -> TrellisResult<()> {
        let mut categories = HashSet::new();
        for group in groups {
            if group.category.trim().is_empty() {
                return Err(TrellisError::config_with_context(
                    "rotation group has an empty category",
                    "rotation",
                ));
            }
            if !categories.insert(group.category.as_str()) {
                return Err(TrellisError::config_with_context(
                    format!("duplicate rotation category '{}'", group.category),
                    "rotation",
                ));
            }
            Self::validate_endpoints(group)?;
        }
        Ok(())
    }

    fn validate_endpoints(group: &RotationGroupConfig) -> TrellisResult<()> {
        let context = format!("rotation.{}", group.category);
        let mut names = HashSet::new();
        for endpoint in &group.endpoints {
            if endpoint.name.trim().is_empty() {
                return Err(TrellisError::config_with_context(
                    "endpoint has an empty name",
                    &context,
                ));
            }
            if !names.insert(endpoint.name.as_str()) {
                return Err(TrellisError::config_with_context(
                    format!("duplicate endpoint name '{}'", endpoint.name),
                    &context,
                ));
            }
            if endpoint.base_url.trim().is_empty() {
                return Err(TrellisError::config_with_context(
                    format!("endpoint '{}' has no base_url", endpoint.name),
                    &context,
                ));
            }
            if !endpoint.weight.is_finite() || endpoint.weight < 0.0 {
                return Err(TrellisError::config_with_context(
                    format!(
                        "endpoint '{}' weight must be >= 0, got {}",
                        endpoint.name, endpoint.weight
                    ),
                    &context,
                ));
            }
            endpoint.client.backoff.validate()?;
        }
        Ok(())
    }
}
