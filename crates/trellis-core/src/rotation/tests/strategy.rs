//! Endpoint ordering tests

use super::*;
use crate::recovery::circuit_breaker::CircuitBreakerRegistry;
use crate::rotation::{RotationManager, RotationStrategy};

async fn served_by(manager: &RotationManager) -> String {
    let value = manager.call_with_rotation(&request(), None).await.unwrap();
    value["served_by"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_priority_weighted_prefers_heavier_weight_within_priority() {
    let manager = RotationManager::builder("weather")
        .endpoint(ScriptedCaller::ok("light"), 1, 1.0)
        .endpoint(ScriptedCaller::ok("heavy"), 1, 3.0)
        .endpoint(ScriptedCaller::ok("backup"), 2, 10.0)
        .build()
        .unwrap();

    assert_eq!(served_by(&manager).await, "heavy");
}

#[tokio::test]
async fn test_priority_weighted_ties_keep_insertion_order() {
    let manager = RotationManager::builder("weather")
        .endpoint(ScriptedCaller::ok("first"), 1, 1.0)
        .endpoint(ScriptedCaller::ok("second"), 1, 1.0)
        .build()
        .unwrap();

    assert_eq!(served_by(&manager).await, "first");
    assert_eq!(manager.endpoint_names(), vec!["first", "second"]);
}

#[tokio::test]
async fn test_priority_weighted_demotes_failing_endpoint() {
    let flaky = ScriptedCaller::scripted("flaky", vec![Err(server_error("flaky"))]);
    let manager = RotationManager::builder("weather")
        .endpoint(flaky, 1, 1.0)
        .endpoint(ScriptedCaller::ok("steady"), 1, 0.95)
        .build()
        .unwrap();

    // flaky fails once: 1.0 * 0.9 drops below 0.95
    assert_eq!(served_by(&manager).await, "steady");
    assert_eq!(served_by(&manager).await, "steady");
}

#[tokio::test]
async fn test_round_robin_rotates_start() {
    let manager = RotationManager::builder("weather")
        .strategy(RotationStrategy::RoundRobin)
        .endpoint(ScriptedCaller::ok("a"), 1, 1.0)
        .endpoint(ScriptedCaller::ok("b"), 1, 1.0)
        .endpoint(ScriptedCaller::ok("c"), 1, 1.0)
        .build()
        .unwrap();

    let mut seen = Vec::new();
    for _ in 0..4 {
        seen.push(served_by(&manager).await);
    }
    assert_eq!(seen, vec!["a", "b", "c", "a"]);
}

#[tokio::test]
async fn test_round_robin_fails_over_in_ring_order() {
    let manager = RotationManager::builder("weather")
        .strategy(RotationStrategy::RoundRobin)
        .endpoint(ScriptedCaller::ok("a"), 1, 1.0)
        .endpoint(ScriptedCaller::failing("b", server_error("b")), 1, 1.0)
        .endpoint(ScriptedCaller::ok("c"), 1, 1.0)
        .build()
        .unwrap();

    assert_eq!(served_by(&manager).await, "a");
    assert_eq!(served_by(&manager).await, "c");
}

#[tokio::test]
async fn test_performance_based_prefers_faster_endpoint() {
    let manager = RotationManager::builder("weather")
        .strategy(RotationStrategy::PerformanceBased)
        .endpoint(ScriptedCaller::slow("slow", Duration::from_millis(30)), 1, 1.0)
        .endpoint(ScriptedCaller::ok("fast"), 2, 1.0)
        .build()
        .unwrap();

    // No history yet, so the tie keeps priority order
    assert_eq!(served_by(&manager).await, "slow");
    assert_eq!(served_by(&manager).await, "fast");
    assert_eq!(served_by(&manager).await, "fast");
}

#[tokio::test]
async fn test_performance_based_puts_open_circuit_last() {
    let registry = Arc::new(CircuitBreakerRegistry::new());
    let tripped = ScriptedCaller::ok("tripped");
    let manager = RotationManager::builder("weather")
        .strategy(RotationStrategy::PerformanceBased)
        .registry(registry.clone())
        .endpoint(tripped.clone(), 1, 1.0)
        .endpoint(ScriptedCaller::ok("healthy"), 2, 1.0)
        .build()
        .unwrap();

    registry.find("weather.tripped").unwrap().force_open("maintenance");
    assert_eq!(served_by(&manager).await, "healthy");
    assert_eq!(tripped.calls(), 0);
    assert_eq!(manager.stats().failover_count, 0);
}

#[test]
fn test_strategy_names() {
    assert_eq!(RotationStrategy::default(), RotationStrategy::PriorityWeighted);
    assert_eq!(RotationStrategy::RoundRobin.to_string(), "round_robin");
    let parsed: RotationStrategy = serde_json::from_str("\"performance_based\"").unwrap();
    assert_eq!(parsed, RotationStrategy::PerformanceBased);
}
