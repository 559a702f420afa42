//! Retry, circuit breaking and rate limiting seen from the outside.

use std::sync::Arc;
use std::time::Duration;

use nrdb_discovery::client::{
    CircuitBreakerConfig, CircuitState, NrdbClient, RateLimitConfig, ResilienceConfig,
    ResilientClient, RetryConfig,
};
use nrdb_discovery::context::QueryContext;
use nrdb_discovery::engine::{DiscoveryEngine, DiscoveryFilter, EngineConfig, HealthState};
use nrdb_discovery::error::{DiscoveryError, ErrorClass};
use nrdb_discovery::sampling::TimeRange;
use nrdb_discovery::testing::{generate_records, MockNrdbClient};

fn resilience() -> ResilienceConfig {
    ResilienceConfig::default()
        .with_rate_limit(RateLimitConfig::new(6000, 100))
        .with_retry(RetryConfig {
            max_attempts: 3,
            initial_interval: Duration::from_millis(100),
            max_interval: Duration::from_secs(1),
            multiplier: 2.0,
            jitter: 0.0,
        })
        .with_circuit_breaker(
            CircuitBreakerConfig::default()
                .with_failure_threshold(3)
                .with_success_threshold(2)
                .with_open_duration(Duration::from_secs(30)),
        )
}

fn unavailable() -> DiscoveryError {
    DiscoveryError::from_status(503, "service unavailable", None)
}

#[tokio::test(start_paused = true)]
async fn test_unreachable_store_retries_then_opens_circuit() {
    let mock = Arc::new(MockNrdbClient::new());
    mock.fail_always(unavailable());
    let client = ResilientClient::new(mock.clone(), resilience()).unwrap();
    let ctx = QueryContext::background();

    let started = tokio::time::Instant::now();
    let err = client.query(&ctx, "SHOW EVENT TYPES").await.unwrap_err();
    assert_eq!(err.class(), ErrorClass::Transient);
    assert_eq!(mock.call_count(), 3);
    // Two backoff waits: 100ms then 200ms.
    let waited = started.elapsed();
    assert!(waited >= Duration::from_millis(300) && waited < Duration::from_secs(1), "{waited:?}");

    for _ in 0..5 {
        let err = client.query(&ctx, "SHOW EVENT TYPES").await.unwrap_err();
        assert!(err.is_circuit_open(), "expected circuit-open, got {err}");
    }
    assert_eq!(mock.call_count(), 3, "open circuit must not reach the transport");
    assert_eq!(client.metrics().circuit_rejections, 5);
}

#[tokio::test(start_paused = true)]
async fn test_circuit_recovers_after_open_duration() {
    let range = TimeRange::last(Duration::from_secs(3600));
    let mock = Arc::new(MockNrdbClient::new().with_event_type("Transaction", generate_records(&range, 10)));
    mock.fail_always(unavailable());
    let client = ResilientClient::new(mock.clone(), resilience()).unwrap();
    let ctx = QueryContext::background();

    client.query(&ctx, "SHOW EVENT TYPES").await.unwrap_err();
    assert_eq!(client.metrics().circuit_state, CircuitState::Open);

    mock.clear_failures();
    tokio::time::advance(Duration::from_secs(31)).await;

    client.query(&ctx, "SHOW EVENT TYPES").await.unwrap();
    assert_eq!(client.metrics().circuit_state, CircuitState::HalfOpen);
    client.query(&ctx, "SHOW EVENT TYPES").await.unwrap();
    assert_eq!(client.metrics().circuit_state, CircuitState::Closed);
}

#[tokio::test(start_paused = true)]
async fn test_permanent_errors_are_not_retried() {
    let mock = Arc::new(MockNrdbClient::new());
    mock.fail_always(DiscoveryError::from_status(400, "syntax error", None));
    let client = ResilientClient::new(mock.clone(), resilience()).unwrap();

    let err = client
        .query(&QueryContext::background(), "SHOW EVENT TYPES")
        .await
        .unwrap_err();
    assert_eq!(err.class(), ErrorClass::Permanent);
    assert_eq!(mock.call_count(), 1);
    assert_eq!(client.metrics().retries, 0);
}

#[tokio::test(start_paused = true)]
async fn test_transient_blip_is_absorbed() {
    let range = TimeRange::last(Duration::from_secs(3600));
    let mock = Arc::new(MockNrdbClient::new().with_event_type("Transaction", generate_records(&range, 10)));
    mock.fail_next(2, unavailable());
    let client = ResilientClient::new(mock.clone(), resilience()).unwrap();

    let result = client
        .query(&QueryContext::background(), "SHOW EVENT TYPES")
        .await
        .unwrap();
    assert_eq!(result.strings("eventType"), vec!["Transaction"]);
    assert_eq!(mock.call_count(), 3);
    assert_eq!(client.metrics().circuit_state, CircuitState::Closed);
}

#[tokio::test(start_paused = true)]
async fn test_rate_limiter_paces_queries() {
    let range = TimeRange::last(Duration::from_secs(3600));
    let mock = Arc::new(MockNrdbClient::new().with_event_type("Transaction", generate_records(&range, 10)));
    // One query per second after a burst of two.
    let client = ResilientClient::new(
        mock.clone(),
        resilience().with_rate_limit(RateLimitConfig::new(60, 2)),
    )
    .unwrap();
    let ctx = QueryContext::background();

    let started = tokio::time::Instant::now();
    for _ in 0..5 {
        client.query(&ctx, "SHOW EVENT TYPES").await.unwrap();
    }
    assert!(started.elapsed() >= Duration::from_secs(3));
    assert!(client.metrics().rate_limit_waits >= 3);
}

#[tokio::test(start_paused = true)]
async fn test_engine_health_follows_circuit() {
    let range = TimeRange::last(Duration::from_secs(24 * 3600));
    let mock = Arc::new(MockNrdbClient::new().with_event_type("Transaction", generate_records(&range, 50)));
    let client = Arc::new(ResilientClient::new(mock.clone(), resilience()).unwrap());
    let engine = DiscoveryEngine::with_resilient_client(
        client.clone(),
        EngineConfig::default().with_max_concurrency(1),
    )
    .unwrap();
    let ctx = QueryContext::background();

    assert_eq!(engine.health().state, HealthState::Healthy);

    mock.fail_always(unavailable());
    let err = engine
        .discover_schemas(&ctx, &DiscoveryFilter::new())
        .await
        .unwrap_err();
    assert_eq!(err.class(), ErrorClass::Transient);

    let health = engine.health();
    assert_eq!(health.state, HealthState::Unhealthy);
    assert_eq!(
        health.component("remote_client").unwrap().state,
        HealthState::Unhealthy
    );
    assert!(health.component("rate_limiter").is_some());

    mock.clear_failures();
    tokio::time::advance(Duration::from_secs(31)).await;
    let outcome = engine
        .discover_schemas(&ctx, &DiscoveryFilter::new())
        .await
        .unwrap();
    assert_eq!(outcome.schemas.len(), 1);
    assert_eq!(engine.health().state, HealthState::Healthy);
}
