//! Circuit breaker registry for managing multiple circuit breakers

use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;

use super::breaker::CircuitBreaker;
use super::types::{CircuitBreakerConfig, CircuitMetricsSnapshot, CircuitState};

/// Aggregate health across every registered circuit
#[derive(Debug, Clone, Serialize)]
pub struct RegistryHealth {
    pub total: usize,
    pub healthy: usize,
    pub unhealthy: usize,
    pub healthy_names: Vec<String>,
    pub unhealthy_names: Vec<String>,
}

impl RegistryHealth {
    /// True when no circuit is open or half-open
    pub fn is_healthy(&self) -> bool {
        self.unhealthy == 0
    }
}

/// Named collection of circuit breakers.
///
/// Constructed once at startup and shared as `Arc<CircuitBreakerRegistry>`.
/// The map lock only guards insertion and removal; calls through a circuit
/// never touch it.
#[derive(Debug)]
pub struct CircuitBreakerRegistry {
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    default_config: CircuitBreakerConfig,
}

impl CircuitBreakerRegistry {
    /// Create a new registry with default config
    pub fn new() -> Self {
        Self::with_config(CircuitBreakerConfig::default())
    }

    /// Create a registry with custom default config
    pub fn with_config(config: CircuitBreakerConfig) -> Self {
        Self {
            breakers: DashMap::new(),
            default_config: config,
        }
    }

    /// Config used for circuits created without one
    pub fn default_config(&self) -> &CircuitBreakerConfig {
        &self.default_config
    }

    /// Get or create a circuit breaker
    pub fn get(&self, name: &str) -> Arc<CircuitBreaker> {
        self.get_with_config(name, self.default_config.clone())
    }

    /// Get or create with custom config.
    ///
    /// The config only applies when the circuit is created; an existing
    /// circuit keeps its original config.
    pub fn get_with_config(&self, name: &str, config: CircuitBreakerConfig) -> Arc<CircuitBreaker> {
        self.breakers
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::with_config(name, config)))
            .clone()
    }

    /// Look up a circuit without creating it
    pub fn find(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.get(name).map(|e| e.value().clone())
    }

    /// Remove a circuit; returns it if it existed
    pub fn remove(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        let removed = self.breakers.remove(name).map(|(_, cb)| cb);
        if removed.is_some() {
            tracing::info!(circuit = %name, "circuit breaker removed from registry");
        }
        removed
    }

    /// Get all circuit breaker names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.breakers.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Number of registered circuits
    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }

    /// Metrics for every circuit, sorted by name
    pub fn all_metrics(&self) -> Vec<CircuitMetricsSnapshot> {
        let mut all: Vec<CircuitMetricsSnapshot> =
            self.breakers.iter().map(|e| e.value().metrics()).collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    /// Names of circuits in the closed state
    pub fn healthy_names(&self) -> Vec<String> {
        self.names_where(|state| state == CircuitState::Closed)
    }

    /// Names of circuits that are open or half-open
    pub fn unhealthy_names(&self) -> Vec<String> {
        self.names_where(|state| state != CircuitState::Closed)
    }

    /// Aggregate health summary
    pub fn health_summary(&self) -> RegistryHealth {
        let healthy_names = self.healthy_names();
        let unhealthy_names = self.unhealthy_names();
        RegistryHealth {
            total: healthy_names.len() + unhealthy_names.len(),
            healthy: healthy_names.len(),
            unhealthy: unhealthy_names.len(),
            healthy_names,
            unhealthy_names,
        }
    }

    /// Force every circuit closed
    pub fn force_close_all(&self, reason: &str) {
        for entry in self.breakers.iter() {
            entry.value().force_close(reason);
        }
        tracing::info!(count = self.breakers.len(), reason, "forced all circuits closed");
    }

    /// Reset metrics on every circuit
    pub fn reset_all_metrics(&self) {
        for entry in self.breakers.iter() {
            entry.value().reset_metrics();
        }
    }

    fn names_where(&self, predicate: impl Fn(CircuitState) -> bool) -> Vec<String> {
        let mut names: Vec<String> = self
            .breakers
            .iter()
            .filter(|e| predicate(e.value().state()))
            .map(|e| e.key().clone())
            .collect();
        names.sort();
        names
    }
}

impl Default for CircuitBreakerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
