//! Endpoint ordering per rotation strategy

use std::cmp::Ordering as CmpOrdering;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::state::ApiEndpoint;
use super::types::RotationStrategy;
use crate::recovery::circuit_breaker::CircuitState;

const LATENCY_EPSILON_MS: f64 = 0.1;

impl RotationStrategy {
    /// Order the enabled endpoints for one top-level call.
    ///
    /// `endpoints` must already be sorted by ascending priority. Round robin
    /// advances `cursor` once per call.
    pub(super) fn order(
        &self,
        endpoints: &[Arc<ApiEndpoint>],
        cursor: &AtomicUsize,
    ) -> Vec<Arc<ApiEndpoint>> {
        let enabled: Vec<Arc<ApiEndpoint>> = endpoints
            .iter()
            .filter(|ep| ep.is_enabled())
            .cloned()
            .collect();
        if enabled.is_empty() {
            return enabled;
        }

        match self {
            Self::PriorityWeighted => priority_weighted(enabled),
            Self::RoundRobin => {
                let start = cursor.fetch_add(1, Ordering::Relaxed) % enabled.len();
                let mut ordered = enabled;
                ordered.rotate_left(start);
                ordered
            }
            Self::PerformanceBased => sort_by_score(enabled, performance_score),
        }
    }
}

fn priority_weighted(endpoints: Vec<Arc<ApiEndpoint>>) -> Vec<Arc<ApiEndpoint>> {
    let mut scored: Vec<(f64, Arc<ApiEndpoint>)> = endpoints
        .into_iter()
        .map(|ep| (ep.weight * ep.performance().success_rate, ep))
        .collect();
    // Stable, so equal scores keep insertion order
    scored.sort_by(|(sa, a), (sb, b)| {
        a.priority
            .cmp(&b.priority)
            .then_with(|| sb.partial_cmp(sa).unwrap_or(CmpOrdering::Equal))
    });
    scored.into_iter().map(|(_, ep)| ep).collect()
}

fn performance_score(endpoint: &ApiEndpoint) -> f64 {
    let perf = endpoint.performance();
    let penalty = match endpoint.circuit_state() {
        CircuitState::Open => 0.0,
        CircuitState::HalfOpen => 0.5,
        CircuitState::Closed => 1.0,
    };
    1.0 / (perf.avg_response_time_ms + LATENCY_EPSILON_MS) * perf.success_rate * penalty
}

fn sort_by_score(
    endpoints: Vec<Arc<ApiEndpoint>>,
    score: impl Fn(&ApiEndpoint) -> f64,
) -> Vec<Arc<ApiEndpoint>> {
    let mut scored: Vec<(f64, Arc<ApiEndpoint>)> =
        endpoints.into_iter().map(|ep| (score(&ep), ep)).collect();
    scored.sort_by(|(a, _), (b, _)| b.partial_cmp(a).unwrap_or(CmpOrdering::Equal));
    scored.into_iter().map(|(_, ep)| ep).collect()
}
