//! Endpoint management and reporting

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future::join_all;

use super::caller::ApiCaller;
use super::manager::{Counters, RotationManager};
use super::state::ApiEndpoint;
use super::types::{EndpointStatus, RotationStats};
use crate::error::{TrellisError, TrellisResult};
use crate::http::{ApiHealth, HealthStatus};

impl RotationManager {
    /// Add an upstream; its name comes from the caller
    pub fn add_endpoint(
        &self,
        caller: Arc<dyn ApiCaller>,
        priority: u32,
        weight: f64,
    ) -> TrellisResult<()> {
        let name = caller.name().to_string();
        if name.is_empty() {
            return Err(TrellisError::invalid_field("name", "endpoint name is empty"));
        }
        if !weight.is_finite() || weight < 0.0 {
            return Err(TrellisError::invalid_field(
                "weight",
                format!("weight for {} must be >= 0, got {}", name, weight),
            ));
        }

        let mut endpoints = self.endpoints.write();
        if endpoints.iter().any(|ep| ep.name == name) {
            return Err(TrellisError::invalid_field(
                "name",
                format!("endpoint {} already registered in {}", name, self.category),
            ));
        }

        let circuit = self.circuit_name(&name);
        let breaker = match &self.breaker_config {
            Some(config) => self.registry.get_with_config(&circuit, config.clone()),
            None => self.registry.get(&circuit),
        };
        let endpoint = Arc::new(ApiEndpoint::new(caller, breaker, priority, weight));

        let pos = endpoints
            .iter()
            .position(|ep| ep.priority > priority)
            .unwrap_or(endpoints.len());
        endpoints.insert(pos, endpoint);

        tracing::info!(category = %self.category, endpoint = %name, priority, weight, "endpoint added");
        Ok(())
    }

    /// Remove an endpoint and its circuit breaker
    pub fn remove_endpoint(&self, name: &str) -> bool {
        let mut endpoints = self.endpoints.write();
        let before = endpoints.len();
        endpoints.retain(|ep| ep.name != name);
        let removed = endpoints.len() != before;
        drop(endpoints);

        if removed {
            self.registry.remove(&self.circuit_name(name));
            tracing::info!(category = %self.category, endpoint = %name, "endpoint removed");
        }
        removed
    }

    pub fn enable_endpoint(&self, name: &str) -> bool {
        self.set_enabled(name, true)
    }

    pub fn disable_endpoint(&self, name: &str) -> bool {
        self.set_enabled(name, false)
    }

    fn set_enabled(&self, name: &str, enabled: bool) -> bool {
        match self.find(name) {
            Some(endpoint) => {
                endpoint.set_enabled(enabled);
                tracing::info!(category = %self.category, endpoint = %name, enabled, "endpoint toggled");
                true
            }
            None => false,
        }
    }

    fn find(&self, name: &str) -> Option<Arc<ApiEndpoint>> {
        self.endpoints.read().iter().find(|ep| ep.name == name).cloned()
    }

    fn circuit_name(&self, endpoint: &str) -> String {
        format!("{}.{}", self.category, endpoint)
    }

    /// Endpoint names in priority order
    pub fn endpoint_names(&self) -> Vec<String> {
        self.endpoints.read().iter().map(|ep| ep.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.endpoints.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.read().is_empty()
    }

    pub fn endpoint_status(&self, name: &str) -> Option<EndpointStatus> {
        let endpoint = self.find(name)?;
        let perf = endpoint.performance();
        Some(EndpointStatus {
            name: endpoint.name.clone(),
            enabled: endpoint.is_enabled(),
            priority: endpoint.priority,
            weight: endpoint.weight,
            success_rate: perf.success_rate,
            avg_response_time_ms: perf.avg_response_time_ms,
            last_used_at: perf.last_used_at,
            circuit: endpoint.breaker.metrics(),
        })
    }

    pub fn stats(&self) -> RotationStats {
        let (total_endpoints, enabled_endpoints) = {
            let endpoints = self.endpoints.read();
            let enabled = endpoints.iter().filter(|ep| ep.is_enabled()).count();
            (endpoints.len(), enabled)
        };
        let counters = self.counters.lock();
        RotationStats {
            category: self.category.clone(),
            strategy: self.strategy,
            total_endpoints,
            enabled_endpoints,
            total_requests: counters.total_requests,
            successful_requests: counters.successful_requests,
            failed_requests: counters.failed_requests,
            failover_count: counters.failover_count,
            endpoints_used: counters.endpoints_used.clone(),
            average_response_time_ms: counters.average_response_time_ms,
        }
    }

    /// Forget an endpoint's moving averages and circuit call history
    pub fn reset_endpoint_metrics(&self, name: &str) -> bool {
        match self.find(name) {
            Some(endpoint) => {
                endpoint.reset_performance();
                endpoint.breaker.reset_metrics();
                true
            }
            None => false,
        }
    }

    /// Zero the manager-wide counters
    pub fn reset_stats(&self) {
        *self.counters.lock() = Counters::default();
    }

    /// Probe every enabled endpoint concurrently
    pub async fn health_check_all(&self) -> BTreeMap<String, ApiHealth> {
        let snapshot: Vec<Arc<ApiEndpoint>> = self.endpoints.read().clone();
        let (enabled, disabled): (Vec<_>, Vec<_>) =
            snapshot.into_iter().partition(|ep| ep.is_enabled());

        let probes = enabled.iter().map(|ep| ep.caller.health_check());
        let mut results: BTreeMap<String, ApiHealth> = enabled
            .iter()
            .map(|ep| ep.name.clone())
            .zip(join_all(probes).await)
            .collect();

        for endpoint in disabled {
            results.insert(
                endpoint.name.clone(),
                ApiHealth::new(&endpoint.name, HealthStatus::Disabled),
            );
        }
        results
    }
}
