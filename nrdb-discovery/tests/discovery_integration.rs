//! End-to-end discovery against the in-memory store.

use std::sync::Arc;
use std::time::Duration;

use nrdb_discovery::engine::{DiscoveryEngine, DiscoveryFilter, DiscoveryHints, EngineConfig, HealthState};
use nrdb_discovery::error::{DiscoveryError, ErrorClass};
use nrdb_discovery::context::QueryContext;
use nrdb_discovery::sampling::TimeRange;
use nrdb_discovery::schema::{DataType, ProfileDepth, SemanticType};
use nrdb_discovery::testing::{generate_records_with, MockNrdbClient};
use serde_json::json;

fn window() -> TimeRange {
    TimeRange::last(Duration::from_secs(24 * 3600))
}

fn account() -> MockNrdbClient {
    let range = window();
    MockNrdbClient::new()
        .with_event_type(
            "Transaction",
            generate_records_with(&range, 600, |i| {
                json!({
                    "duration": 0.05 + (i % 40) as f64 * 0.01,
                    "appName": format!("app-{}", i % 3),
                    "sessionId": format!("session-{}", i % 120),
                    "error": i % 25 == 0,
                })
            }),
        )
        .with_event_type(
            "PageView",
            generate_records_with(&range, 400, |i| {
                json!({
                    "pageUrl": format!("https://shop.example.com/p/{}", i % 30),
                    "sessionId": format!("session-{}", i % 120),
                    "duration": 1.2 + (i % 9) as f64 * 0.1,
                })
            }),
        )
        .with_event_type(
            "SystemSample",
            generate_records_with(&range, 300, |i| {
                json!({"hostname": format!("host-{}", i % 5), "cpuPercent": (i % 100) as f64})
            }),
        )
}

fn engine_over(mock: Arc<MockNrdbClient>) -> DiscoveryEngine {
    DiscoveryEngine::new(mock, EngineConfig::default().with_max_concurrency(2)).unwrap()
}

#[tokio::test]
async fn test_lists_event_types_in_name_order() {
    let engine = engine_over(Arc::new(account()));
    let names = engine.list_event_types(&QueryContext::background()).await.unwrap();
    assert_eq!(names, vec!["PageView", "SystemSample", "Transaction"]);
}

#[tokio::test]
async fn test_second_discovery_is_served_from_cache() {
    let mock = Arc::new(account());
    let engine = engine_over(mock.clone());
    let ctx = QueryContext::background();
    let filter = DiscoveryFilter::new().exclude("System*");

    let first = engine.discover_schemas(&ctx, &filter).await.unwrap();
    assert!(!first.from_cache);
    assert_eq!(first.schemas.len(), 2);
    let calls = mock.call_count();

    let second = engine.discover_schemas(&ctx, &filter).await.unwrap();
    assert!(second.from_cache);
    assert_eq!(second.schemas, first.schemas);
    assert_eq!(mock.call_count(), calls, "cache hit must not query the store");

    let metrics = engine.metrics();
    assert_eq!(metrics.cache_hits, 1);
    assert_eq!(metrics.cache_misses, 1);

    // A different filter is a different cache entry.
    let third = engine
        .discover_schemas(&ctx, &DiscoveryFilter::new().include("PageView"))
        .await
        .unwrap();
    assert!(!third.from_cache);
    assert!(mock.call_count() > calls);
}

#[tokio::test]
async fn test_invalidation_forces_rediscovery() {
    let mock = Arc::new(account());
    let engine = engine_over(mock.clone());
    let ctx = QueryContext::background();
    let filter = DiscoveryFilter::new();

    engine.discover_schemas(&ctx, &filter).await.unwrap();
    assert_eq!(engine.invalidate_event_type("PageView"), 1);
    let again = engine.discover_schemas(&ctx, &filter).await.unwrap();
    assert!(!again.from_cache);

    assert!(engine.invalidate(&filter));
    assert!(!engine.invalidate(&filter));
    engine.discover_schemas(&ctx, &filter).await.unwrap();
    engine.clear_cache();
    assert_eq!(engine.cache_stats().total_entries, 0);
}

#[tokio::test(start_paused = true)]
async fn test_cache_entries_expire_after_ttl() {
    let mock = Arc::new(account());
    let engine = DiscoveryEngine::new(
        mock.clone(),
        EngineConfig::default().with_cache_ttl(Duration::from_secs(60)),
    )
    .unwrap();
    let ctx = QueryContext::background();
    let filter = DiscoveryFilter::new().include("Transaction");

    engine.discover_schemas(&ctx, &filter).await.unwrap();
    tokio::time::advance(Duration::from_secs(61)).await;
    let calls = mock.call_count();
    let outcome = engine.discover_schemas(&ctx, &filter).await.unwrap();
    assert!(!outcome.from_cache);
    assert!(mock.call_count() > calls);
}

#[tokio::test]
async fn test_failing_event_type_does_not_abort_discovery() {
    let mock = account();
    mock.fail_event_type("SystemSample", DiscoveryError::from_status(404, "gone", None));
    let mock = Arc::new(mock);
    let engine = engine_over(mock.clone());
    let ctx = QueryContext::background();

    let outcome = engine.discover_schemas(&ctx, &DiscoveryFilter::new()).await.unwrap();
    assert!(!outcome.is_complete());
    assert_eq!(outcome.schemas.len(), 2);
    assert_eq!(outcome.failures.len(), 1);
    assert_eq!(outcome.failures[0].event_type, "SystemSample");
    assert_eq!(outcome.failures[0].class, ErrorClass::Permanent);

    // Partial outcomes are recomputed on the next call.
    mock.clear_failures();
    let retried = engine.discover_schemas(&ctx, &DiscoveryFilter::new()).await.unwrap();
    assert!(!retried.from_cache);
    assert!(retried.is_complete());
    assert_eq!(retried.schemas.len(), 3);
}

#[tokio::test]
async fn test_schemas_describe_their_attributes() {
    let engine = engine_over(Arc::new(account()));
    let schema = engine
        .profile_schema(&QueryContext::background(), "Transaction", ProfileDepth::Full)
        .await
        .unwrap();

    let duration = schema.attribute("duration").unwrap();
    assert_eq!(duration.data_type, DataType::Numeric);
    assert_eq!(duration.semantic_type, SemanticType::Duration);
    assert_eq!(schema.attribute("error").unwrap().data_type, DataType::Boolean);
    assert_eq!(schema.data_volume.total_records, 600);
    assert!(schema.sample_count > 0);
    assert!((0.0..=1.0).contains(&schema.quality.overall_score));
    for attribute in &schema.attributes {
        assert!((0.0..=1.0).contains(&attribute.null_ratio));
    }
}

#[tokio::test]
async fn test_profile_rejects_unsafe_event_type() {
    let mock = Arc::new(account());
    let engine = engine_over(mock.clone());
    let err = engine
        .profile_schema(
            &QueryContext::background(),
            "Transaction` WHERE true",
            ProfileDepth::Standard,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DiscoveryError::Security(_)));
    assert_eq!(mock.call_count(), 0);
}

#[tokio::test]
async fn test_intelligent_discovery_ranks_by_hints() {
    let mock = Arc::new(account());
    let engine = engine_over(mock.clone());

    let result = engine
        .discover_with_intelligence(
            &QueryContext::background(),
            &DiscoveryHints::new()
                .domain("browser")
                .keyword("pageUrl")
                .with_relationships(),
        )
        .await
        .unwrap();

    assert_eq!(result.schemas[0].name, "PageView");
    assert!(result.schemas.iter().all(|s| s.name != "SystemSample"));
    assert_eq!(result.summary.event_types_considered, 3);
    assert_eq!(result.summary.schemas_discovered, 3);
    assert_eq!(result.summary.schemas_returned, result.schemas.len());
    assert!(result.summary.queries_issued > 0);
    for pair in result.insights.windows(2) {
        assert!(pair[0].importance >= pair[1].importance);
    }
    for pair in result.recommendations.windows(2) {
        assert!(pair[0].priority <= pair[1].priority);
    }
}

#[tokio::test]
async fn test_intelligent_discovery_without_hints_keeps_everything() {
    let engine = engine_over(Arc::new(account()));
    let result = engine
        .discover_with_intelligence(&QueryContext::background(), &DiscoveryHints::new().max_schemas(2))
        .await
        .unwrap();
    assert_eq!(result.schemas.len(), 2);
    assert!(result.relationships.is_empty());
    assert_eq!(result.summary.relationships_found, 0);
}

#[tokio::test]
async fn test_health_after_discovery() {
    let engine = engine_over(Arc::new(account()));
    engine
        .discover_schemas(&QueryContext::background(), &DiscoveryFilter::new())
        .await
        .unwrap();

    let health = engine.health();
    assert_eq!(health.state, HealthState::Healthy);
    assert_eq!(health.metrics.discoveries, 1);
    assert_eq!(health.metrics.schemas_discovered, 3);
    assert_eq!(health.metrics.errors, 0);
    assert!(health.component("schema_cache").unwrap().message.contains("1 active"));
}
