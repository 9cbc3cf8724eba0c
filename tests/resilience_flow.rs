//! End-to-end flow: inbound rate limit, then rotation across HTTP upstreams
//! guarded by circuit breakers from a shared registry.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use trellis::config::TrellisConfig;
use trellis::recovery::BackoffConfig;
use trellis::{
    ApiCaller, ApiClient, ApiClientConfig, ApiRequest, CircuitBreakerConfig,
    CircuitBreakerRegistry, CircuitState, RateLimitPolicy, RateLimitPolicyConfig, RateSpec,
    RequestContext, RotationManager, TrellisError, TrellisResult,
};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("trellis_core=debug")
        .with_test_writer()
        .try_init();
}

fn client_config() -> ApiClientConfig {
    ApiClientConfig {
        timeout: Duration::from_secs(2),
        backoff: BackoffConfig::immediate(),
        enable_caching: false,
        ..Default::default()
    }
}

fn client(name: &str, server: &MockServer) -> Arc<dyn ApiCaller> {
    Arc::new(ApiClient::new(name, server.uri(), None, client_config()).unwrap())
}

async fn failing_upstream() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/identify"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&server)
        .await;
    server
}

async fn healthy_upstream(species: &str) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/identify"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"species": species})))
        .mount(&server)
        .await;
    server
}

/// What an inbound handler does: check the caller's budget, then rotate
async fn handle(
    policy: &RateLimitPolicy,
    manager: &RotationManager,
    ctx: &RequestContext,
) -> TrellisResult<Value> {
    policy.enforce(ctx).await?;
    manager
        .call_with_rotation(&ApiRequest::get("/identify"), None)
        .await
}

#[tokio::test]
async fn test_failover_trips_breaker_and_skips_dead_upstream() {
    init_tracing();
    let primary = failing_upstream().await;
    let secondary = healthy_upstream("ficus").await;

    let registry = Arc::new(CircuitBreakerRegistry::with_config(
        CircuitBreakerConfig::default()
            .with_failure_threshold(2)
            .with_recovery_timeout(Duration::from_secs(60)),
    ));
    let manager = RotationManager::builder("plant_identification")
        .registry(registry.clone())
        .endpoint(client("primary", &primary), 1, 1.0)
        .endpoint(client("secondary", &secondary), 2, 1.0)
        .build()
        .unwrap();

    for _ in 0..4 {
        let value = manager
            .call_with_rotation(&ApiRequest::get("/identify"), None)
            .await
            .unwrap();
        assert_eq!(value["species"], "ficus");
    }

    let breaker = registry.find("plant_identification.primary").unwrap();
    assert_eq!(breaker.state(), CircuitState::Open);
    assert_eq!(primary.received_requests().await.unwrap().len(), 2);
    assert_eq!(secondary.received_requests().await.unwrap().len(), 4);

    let stats = manager.stats();
    assert_eq!(stats.successful_requests, 4);
    assert_eq!(stats.failed_requests, 0);
    assert_eq!(stats.failover_count, 4);
    assert_eq!(stats.endpoints_used["primary"], 4);

    let health = registry.health_summary();
    assert_eq!(health.unhealthy_names, vec!["plant_identification.primary".to_string()]);
}

#[tokio::test]
async fn test_rate_limit_stops_calls_before_upstream() {
    init_tracing();
    let upstream = healthy_upstream("monstera").await;
    let manager = RotationManager::builder("plant_identification")
        .endpoint(client("only", &upstream), 1, 1.0)
        .build()
        .unwrap();

    let policy = RateLimitPolicy::in_memory(RateLimitPolicyConfig {
        global: RateSpec::per_minute(3).unwrap(),
        burst_limit: 0,
        ..Default::default()
    })
    .unwrap();
    let ctx = RequestContext::new("GET", "/api/v1/identify").with_peer_addr("203.0.113.7");

    for _ in 0..3 {
        assert!(handle(&policy, &manager, &ctx).await.is_ok());
    }
    let err = handle(&policy, &manager, &ctx).await.unwrap_err();
    assert!(matches!(err, TrellisError::RateLimitExceeded { .. }));
    assert!(err.retry_after_seconds().unwrap() >= 1);

    assert_eq!(upstream.received_requests().await.unwrap().len(), 3);

    let other = RequestContext::new("GET", "/api/v1/identify").with_peer_addr("203.0.113.8");
    assert!(handle(&policy, &manager, &other).await.is_ok());
}

#[tokio::test]
async fn test_every_upstream_down_reports_exhaustion() {
    init_tracing();
    let first = failing_upstream().await;
    let second = failing_upstream().await;
    let manager = RotationManager::builder("weather")
        .endpoint(client("first", &first), 1, 1.0)
        .endpoint(client("second", &second), 1, 1.0)
        .build()
        .unwrap();

    let err = manager
        .call_with_rotation(&ApiRequest::get("/identify"), None)
        .await
        .unwrap_err();

    match err {
        TrellisError::RotationExhausted {
            attempts,
            last_error,
            ..
        } => {
            assert_eq!(attempts, 2);
            let last = last_error.expect("last error kept");
            assert!(matches!(*last, TrellisError::ExternalApi { status: Some(503), .. }));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(manager.stats().failed_requests, 1);
}

#[tokio::test]
async fn test_configured_groups_share_one_registry() {
    init_tracing();
    let plants = healthy_upstream("fern").await;
    let weather = healthy_upstream("sunny").await;

    let text = format!(
        r#"
[circuit_breaker]
failure_threshold = 3

[[rotation]]
category = "plants"
[[rotation.endpoints]]
name = "plantnet"
base_url = "{}"
[rotation.endpoints.client]
enable_caching = false

[[rotation]]
category = "weather"
strategy = "round_robin"
[[rotation.endpoints]]
name = "owm"
base_url = "{}/"
"#,
        plants.uri(),
        weather.uri()
    );
    let config: TrellisConfig = toml::from_str(&text).unwrap();
    config.validate().unwrap();

    let registry = config.registry();
    let managers = config.rotation_managers(&registry).unwrap();
    assert_eq!(managers.len(), 2);

    let plants_value = managers[0]
        .call_with_rotation(&ApiRequest::get("identify"), None)
        .await
        .unwrap();
    let weather_value = managers[1]
        .call_with_rotation(&ApiRequest::get("/identify"), None)
        .await
        .unwrap();
    assert_eq!(plants_value["species"], "fern");
    assert_eq!(weather_value["species"], "sunny");

    let mut names = registry.names();
    names.sort();
    assert_eq!(names, vec!["plants.plantnet".to_string(), "weather.owm".to_string()]);
    assert!(registry.health_summary().is_healthy());
}
