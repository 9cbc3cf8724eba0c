//! Builders for rotation managers

use std::sync::Arc;

use super::caller::ApiCaller;
use super::manager::RotationManager;
use super::types::{RotationGroupConfig, RotationStrategy};
use crate::error::{TrellisError, TrellisResult};
use crate::http::ApiClient;
use crate::recovery::circuit_breaker::{CircuitBreakerConfig, CircuitBreakerRegistry};

struct PendingEndpoint {
    caller: Arc<dyn ApiCaller>,
    priority: u32,
    weight: f64,
    enabled: bool,
}

/// Builder for [`RotationManager`]
pub struct RotationManagerBuilder {
    category: String,
    strategy: RotationStrategy,
    registry: Option<Arc<CircuitBreakerRegistry>>,
    breaker_config: Option<CircuitBreakerConfig>,
    endpoints: Vec<PendingEndpoint>,
}

impl RotationManagerBuilder {
    pub fn new(category: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            strategy: RotationStrategy::default(),
            registry: None,
            breaker_config: None,
            endpoints: Vec::new(),
        }
    }

    pub fn strategy(mut self, strategy: RotationStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Share circuits with the rest of the process; a private registry is used otherwise
    pub fn registry(mut self, registry: Arc<CircuitBreakerRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Breaker settings for this manager's circuits instead of the registry default
    pub fn breaker_config(mut self, config: CircuitBreakerConfig) -> Self {
        self.breaker_config = Some(config);
        self
    }

    pub fn endpoint(mut self, caller: Arc<dyn ApiCaller>, priority: u32, weight: f64) -> Self {
        self.endpoints.push(PendingEndpoint {
            caller,
            priority,
            weight,
            enabled: true,
        });
        self
    }

    /// Register an endpoint that starts switched off
    pub fn disabled_endpoint(mut self, caller: Arc<dyn ApiCaller>, priority: u32, weight: f64) -> Self {
        self.endpoints.push(PendingEndpoint {
            caller,
            priority,
            weight,
            enabled: false,
        });
        self
    }

    pub fn build(self) -> TrellisResult<RotationManager> {
        if self.category.trim().is_empty() {
            return Err(TrellisError::invalid_field("category", "rotation category is empty"));
        }
        if let Some(config) = &self.breaker_config {
            config.validate()?;
        }

        let registry = self
            .registry
            .unwrap_or_else(|| Arc::new(CircuitBreakerRegistry::new()));
        let mut manager = RotationManager::new(self.category, self.strategy, registry);
        manager.breaker_config = self.breaker_config;

        for pending in self.endpoints {
            let name = pending.caller.name().to_string();
            manager.add_endpoint(pending.caller, pending.priority, pending.weight)?;
            if !pending.enabled {
                manager.disable_endpoint(&name);
            }
        }
        Ok(manager)
    }
}

impl RotationManager {
    pub fn builder(category: impl Into<String>) -> RotationManagerBuilder {
        RotationManagerBuilder::new(category)
    }

    /// Build a manager of HTTP clients from a `[[rotation]]` group
    pub fn from_config(
        group: &RotationGroupConfig,
        registry: Arc<CircuitBreakerRegistry>,
    ) -> TrellisResult<Self> {
        let mut builder = Self::builder(&group.category)
            .strategy(group.strategy)
            .registry(registry);

        for endpoint in &group.endpoints {
            let client = ApiClient::new(
                &endpoint.name,
                &endpoint.base_url,
                endpoint.resolve_api_key(),
                endpoint.client.clone(),
            )?;
            let caller: Arc<dyn ApiCaller> = Arc::new(client);
            builder = if endpoint.enabled {
                builder.endpoint(caller, endpoint.priority, endpoint.weight)
            } else {
                builder.disabled_endpoint(caller, endpoint.priority, endpoint.weight)
            };
        }

        let manager = builder.build()?;
        tracing::info!(
            category = %manager.category(),
            strategy = %manager.strategy(),
            endpoints = manager.len(),
            "rotation manager built"
        );
        Ok(manager)
    }
}
