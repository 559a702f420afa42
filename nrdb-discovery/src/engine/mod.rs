//! Discovery orchestration.
//!
//! [`DiscoveryEngine`] ties the layers together: it lists event types,
//! profiles each one (sample, analyze, detect patterns, assess quality) on a
//! bounded worker pool, caches the resulting schema sets, ranks them against
//! caller hints and mines relationships between them.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use nrdb_discovery::client::{ClientConfig, NerdGraphClient, ResilienceConfig, ResilientClient};
//! use nrdb_discovery::context::QueryContext;
//! use nrdb_discovery::engine::{DiscoveryEngine, DiscoveryFilter, EngineConfig};
//!
//! # async fn example() -> nrdb_discovery::error::Result<()> {
//! let transport = Arc::new(NerdGraphClient::new(ClientConfig::from_env()?)?);
//! let client = Arc::new(ResilientClient::new(transport, ResilienceConfig::default())?);
//! let engine = DiscoveryEngine::with_resilient_client(client, EngineConfig::default())?;
//!
//! let outcome = engine
//!     .discover_schemas(&QueryContext::background(), &DiscoveryFilter::new().include("Transaction*"))
//!     .await?;
//! for schema in &outcome.schemas {
//!     println!("{}: {} attributes, quality {:.2}", schema.name, schema.attributes.len(), schema.quality.overall_score);
//! }
//! # Ok(())
//! # }
//! ```

mod cache;
mod config;
mod insights;
mod ranking;
mod types;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::analysis::{value_as_timestamp, AttributeAnalyzer};
use crate::client::{CircuitState, NrdbClient, QueryResult, Record, ResilientClient};
use crate::context::QueryContext;
use crate::error::{DiscoveryError, Result};
use crate::log_sampling;
use crate::nrql::{Nrql, COUNT_ALIAS};
use crate::patterns::{DetectedPattern, PatternEngine, PatternInput};
use crate::quality::{QualityAssessor, QualityReport, TIMESTAMP_ATTRIBUTE};
use crate::relationships::{Relationship, RelationshipMiner};
use crate::sampling::{
    count_records, select_strategy, DataCharacteristics, DataSample, SamplingParams, TimeRange,
};
use crate::schema::{DataVolumeProfile, ProfileDepth, QualityMetrics, Schema};
use crate::security::NrqlSecurity;

pub use cache::{CacheStats, CachedSchemas, SchemaCache};
pub use config::EngineConfig;
pub use insights::{derive_insights, recommend};
pub use ranking::{rank, rank_score, EventTypeMatcher, RelevanceTerms};
pub use types::{
    ComponentHealth, DiscoveryFilter, DiscoveryHints, DiscoveryOutcome, DiscoveryResult,
    EngineMetrics, ExecutionSummary, HealthState, HealthStatus, Insight, InsightType,
    Recommendation, SchemaFailure,
};

/// Counts queries and errors on their way to the wrapped client.
struct MeteredClient {
    inner: Arc<dyn NrdbClient>,
    queries: AtomicU64,
    errors: AtomicU64,
}

impl MeteredClient {
    fn new(inner: Arc<dyn NrdbClient>) -> Self {
        Self {
            inner,
            queries: AtomicU64::new(0),
            errors: AtomicU64::new(0),
        }
    }

    fn queries(&self) -> u64 {
        self.queries.load(Ordering::Relaxed)
    }

    fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl NrdbClient for MeteredClient {
    async fn query(&self, ctx: &QueryContext, nrql: &str) -> Result<QueryResult> {
        self.queries.fetch_add(1, Ordering::Relaxed);
        let result = self.inner.query(ctx, nrql).await;
        if result.is_err() {
            self.errors.fetch_add(1, Ordering::Relaxed);
        }
        result
    }
}

struct EngineInner {
    client: MeteredClient,
    resilient: Option<Arc<ResilientClient>>,
    config: EngineConfig,
    analyzer: AttributeAnalyzer,
    patterns: PatternEngine,
    quality: QualityAssessor,
    miner: RelationshipMiner,
    cache: SchemaCache,
    workers: Arc<Semaphore>,
    started_at: Instant,
    discoveries: AtomicU64,
    schemas_discovered: AtomicU64,
}

/// Zero-knowledge schema discovery over one account.
///
/// Cloning is cheap; clones share the client, cache and worker pool.
#[derive(Clone)]
pub struct DiscoveryEngine {
    inner: Arc<EngineInner>,
}

impl fmt::Debug for DiscoveryEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiscoveryEngine")
            .field("max_concurrency", &self.inner.config.max_concurrency)
            .field("cached_sets", &self.inner.cache.len())
            .finish_non_exhaustive()
    }
}

impl DiscoveryEngine {
    /// Engine over any client. Health reports only query and error counts
    /// for the remote side; use [`with_resilient_client`](Self::with_resilient_client)
    /// to include breaker and limiter state.
    pub fn new(client: Arc<dyn NrdbClient>, config: EngineConfig) -> Result<Self> {
        Self::build(client, None, config)
    }

    pub fn with_resilient_client(client: Arc<ResilientClient>, config: EngineConfig) -> Result<Self> {
        let transport: Arc<dyn NrdbClient> = client.clone();
        Self::build(transport, Some(client), config)
    }

    fn build(
        client: Arc<dyn NrdbClient>,
        resilient: Option<Arc<ResilientClient>>,
        config: EngineConfig,
    ) -> Result<Self> {
        config.validate()?;
        let inner = EngineInner {
            client: MeteredClient::new(client),
            resilient,
            analyzer: AttributeAnalyzer::new(config.analyzer.clone()),
            patterns: PatternEngine::new(config.patterns.clone()),
            quality: QualityAssessor::new(config.quality.clone()),
            miner: RelationshipMiner::new(config.relationships.clone()),
            cache: SchemaCache::new(config.cache_ttl, config.cache_max_entries),
            workers: Arc::new(Semaphore::new(config.max_concurrency)),
            started_at: Instant::now(),
            discoveries: AtomicU64::new(0),
            schemas_discovered: AtomicU64::new(0),
            config,
        };
        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// The discovery window ending now.
    pub fn window(&self) -> TimeRange {
        self.inner.window()
    }

    /// Event types with data in the discovery window, sorted.
    #[instrument(skip(self, ctx))]
    pub async fn list_event_types(&self, ctx: &QueryContext) -> Result<Vec<String>> {
        let result = self
            .inner
            .client
            .query(ctx, &Nrql::show_event_types(&self.window()))
            .await?;
        let mut names = result.strings("eventType");
        names.sort();
        names.dedup();
        debug!(event_types = names.len(), "Listed event types");
        Ok(names)
    }

    /// Profiles every event type accepted by `filter`.
    ///
    /// Per event type failures are collected in the outcome rather than
    /// failing the call; only cancellation of `ctx` and failure to list
    /// event types are returned as errors. Complete outcomes are cached by
    /// filter for the configured TTL.
    #[instrument(skip(self, ctx, filter), fields(include = ?filter.include))]
    pub async fn discover_schemas(
        &self,
        ctx: &QueryContext,
        filter: &DiscoveryFilter,
    ) -> Result<DiscoveryOutcome> {
        let depth = self.inner.config.default_depth;
        let key = SchemaCache::key_for(filter, depth);
        if let Some(cached) = self.inner.cache.get(&key) {
            info!(
                schemas = cached.schemas.len(),
                age_secs = cached.age.as_secs(),
                "Serving schemas from cache"
            );
            return Ok(DiscoveryOutcome {
                schemas: cached.schemas.as_ref().clone(),
                failures: Vec::new(),
                skipped: cached.skipped.as_ref().clone(),
                from_cache: true,
            });
        }

        let started = Instant::now();
        let event_types = EventTypeMatcher::new(filter).select(self.list_event_types(ctx).await?, filter.max_schemas);
        info!(event_types = event_types.len(), "Starting schema discovery");

        let range = self.window();
        let results = self
            .fan_out(ctx, &event_types, range, depth, filter.min_record_count)
            .await?;

        let mut outcome = DiscoveryOutcome::default();
        for (event_type, result) in event_types.into_iter().zip(results) {
            match result {
                Ok(Some(schema)) => outcome.schemas.push(schema),
                Ok(None) => outcome.skipped.push(event_type),
                Err(e) => {
                    warn!(event_type = %event_type, error = %e, "Schema discovery failed");
                    outcome.failures.push(SchemaFailure::new(event_type, &e));
                }
            }
        }

        self.inner.discoveries.fetch_add(1, Ordering::Relaxed);
        self.inner
            .schemas_discovered
            .fetch_add(outcome.schemas.len() as u64, Ordering::Relaxed);
        if outcome.is_complete() {
            self.inner
                .cache
                .insert(key, outcome.schemas.clone(), outcome.skipped.clone());
        }
        info!(
            schemas = outcome.schemas.len(),
            failures = outcome.failures.len(),
            skipped = outcome.skipped.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Schema discovery complete"
        );
        Ok(outcome)
    }

    /// Runs one worker per event type under the semaphore; results come back
    /// in the order of `event_types`.
    async fn fan_out(
        &self,
        ctx: &QueryContext,
        event_types: &[String],
        range: TimeRange,
        depth: ProfileDepth,
        min_records: u64,
    ) -> Result<Vec<Result<Option<Schema>>>> {
        let batch = ctx.child_with_timeout(self.inner.config.batch_timeout);
        let mut tasks = JoinSet::new();
        for (index, event_type) in event_types.iter().cloned().enumerate() {
            let inner = Arc::clone(&self.inner);
            let ctx = batch.clone();
            tasks.spawn(async move {
                let result = inner
                    .discover_one(&ctx, &event_type, range, depth, min_records)
                    .await;
                (index, result)
            });
        }

        let mut slots: Vec<Option<Result<Option<Schema>>>> = event_types.iter().map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, result)) => slots[index] = Some(result),
                Err(e) => warn!(error = %e, "Discovery worker did not complete"),
            }
        }
        // The caller's own cancellation aborts the batch; the batch timeout
        // only fails the workers it interrupted.
        ctx.check()?;

        Ok(slots
            .into_iter()
            .map(|slot| {
                slot.unwrap_or_else(|| Err(DiscoveryError::Other("discovery worker did not complete".into())))
            })
            .collect())
    }

    /// Samples and profiles one event type at `depth`.
    #[instrument(skip(self, ctx))]
    pub async fn profile_schema(
        &self,
        ctx: &QueryContext,
        event_type: &str,
        depth: ProfileDepth,
    ) -> Result<Schema> {
        NrqlSecurity::validate_identifier(event_type)?;
        let range = self.window();
        let total = count_records(ctx, &self.inner.client, event_type, &range).await?;
        if total == 0 {
            return Err(DiscoveryError::NoData {
                event_type: event_type.to_string(),
            });
        }
        self.inner.build_schema(ctx, event_type, range, depth, total).await
    }

    /// Draws a sample with the strategy chosen for its declared volume, or
    /// the configured strategy if one is forced.
    #[instrument(skip(self, ctx, params), fields(event_type = %params.event_type))]
    pub async fn sample_data(&self, ctx: &QueryContext, params: &SamplingParams) -> Result<DataSample> {
        params.validate()?;
        self.inner.sample(ctx, params).await
    }

    /// Scores the quality of one event type over the discovery window.
    ///
    /// An event type without records yields a report scoring zero with a
    /// critical no-data issue.
    #[instrument(skip(self, ctx))]
    pub async fn assess_quality(&self, ctx: &QueryContext, event_type: &str) -> Result<QualityReport> {
        NrqlSecurity::validate_identifier(event_type)?;
        let range = self.window();
        let params = SamplingParams::new(event_type, range).with_max_samples(self.inner.config.sample_size);
        let total = count_records(ctx, &self.inner.client, event_type, &range).await?;
        let sample = if total == 0 {
            DataSample::new(&params, Vec::new(), 0, "none")
        } else {
            self.inner.sample(ctx, &params.with_known_total(total)).await?
        };
        let attributes = self.inner.analyzer.analyze_sample(&sample, ProfileDepth::Standard);
        Ok(self
            .inner
            .quality
            .assess(event_type, &sample, &attributes, Utc::now()))
    }

    /// Mines joins, correlations and temporal links between `schemas`.
    pub async fn find_relationships(
        &self,
        ctx: &QueryContext,
        schemas: &[Schema],
    ) -> Result<Vec<Relationship>> {
        self.inner
            .miner
            .mine(ctx, &self.inner.client, schemas, &self.window())
            .await
    }

    /// Discovers schemas, ranks them against `hints`, optionally mines
    /// relationships among the retained ones, and summarizes the findings.
    #[instrument(skip(self, ctx, hints), fields(keywords = ?hints.keywords, domain = ?hints.domain))]
    pub async fn discover_with_intelligence(
        &self,
        ctx: &QueryContext,
        hints: &DiscoveryHints,
    ) -> Result<DiscoveryResult> {
        let started = Instant::now();
        let queries_before = self.inner.client.queries();

        let outcome = self.discover_schemas(ctx, &hints.filter).await?;
        let considered = outcome.schemas.len() + outcome.failures.len() + outcome.skipped.len();
        let discovered = outcome.schemas.len();
        let from_cache = outcome.from_cache;

        let terms = RelevanceTerms::from_hints(hints);
        let mut ranked = rank(outcome.schemas, &terms);
        if let Some(max) = hints.max_schemas {
            ranked.truncate(max);
        }
        let schemas: Vec<Schema> = ranked.into_iter().map(|(schema, _)| schema).collect();

        let relationships = if hints.mine_relationships && schemas.len() > 1 {
            self.find_relationships(ctx, &schemas).await?
        } else {
            Vec::new()
        };

        let mut patterns: Vec<DetectedPattern> = schemas
            .iter()
            .flat_map(|s| s.patterns.iter().cloned())
            .collect();
        patterns.sort_by(|a, b| b.confidence().total_cmp(&a.confidence()));

        let insights = derive_insights(&schemas, &relationships);
        let recommendations = recommend(&insights);
        let summary = ExecutionSummary {
            duration_ms: started.elapsed().as_millis() as u64,
            event_types_considered: considered,
            schemas_discovered: discovered,
            schemas_returned: schemas.len(),
            failures: outcome.failures.len(),
            relationships_found: relationships.len(),
            queries_issued: self.inner.client.queries().saturating_sub(queries_before),
            from_cache,
        };
        info!(
            schemas = summary.schemas_returned,
            relationships = summary.relationships_found,
            insights = insights.len(),
            queries = summary.queries_issued,
            "Intelligent discovery complete"
        );

        Ok(DiscoveryResult {
            schemas,
            patterns,
            relationships,
            insights,
            recommendations,
            failures: outcome.failures,
            summary,
        })
    }

    /// Drops the cached result for `filter` at the default depth.
    pub fn invalidate(&self, filter: &DiscoveryFilter) -> bool {
        let key = SchemaCache::key_for(filter, self.inner.config.default_depth);
        self.inner.cache.invalidate(&key)
    }

    /// Drops every cached set containing `event_type`.
    pub fn invalidate_event_type(&self, event_type: &str) -> usize {
        self.inner.cache.invalidate_event_type(event_type)
    }

    pub fn clear_cache(&self) {
        self.inner.cache.clear();
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.inner.cache.stats()
    }

    pub fn metrics(&self) -> EngineMetrics {
        let cache = self.inner.cache.stats();
        EngineMetrics {
            queries_processed: self.inner.client.queries(),
            errors: self.inner.client.errors(),
            discoveries: self.inner.discoveries.load(Ordering::Relaxed),
            schemas_discovered: self.inner.schemas_discovered.load(Ordering::Relaxed),
            cache_hits: cache.hits,
            cache_misses: cache.misses,
            cache_hit_rate: cache.hit_rate(),
            uptime_secs: self.inner.started_at.elapsed().as_secs(),
        }
    }

    /// Component states and aggregate counters. Does not query the remote
    /// store.
    pub fn health(&self) -> HealthStatus {
        let metrics = self.metrics();
        let mut components = Vec::with_capacity(3);

        match &self.inner.resilient {
            Some(resilient) => {
                let client = resilient.metrics();
                let state = match client.circuit_state {
                    CircuitState::Closed => HealthState::Healthy,
                    CircuitState::HalfOpen => HealthState::Degraded,
                    CircuitState::Open => HealthState::Unhealthy,
                };
                components.push(ComponentHealth::new(
                    "remote_client",
                    state,
                    format!(
                        "circuit {}, {} queries, error rate {:.1}%",
                        client.circuit_state,
                        client.queries_processed,
                        client.error_rate() * 100.0
                    ),
                ));

                let tokens = resilient.rate_limiter().available_tokens();
                let state = if tokens < 1.0 {
                    HealthState::Degraded
                } else {
                    HealthState::Healthy
                };
                components.push(ComponentHealth::new(
                    "rate_limiter",
                    state,
                    format!("{tokens:.1} tokens available, {} waits", client.rate_limit_waits),
                ));
            }
            None => {
                let error_rate = if metrics.queries_processed == 0 {
                    0.0
                } else {
                    metrics.errors as f64 / metrics.queries_processed as f64
                };
                let state = if error_rate > 0.5 {
                    HealthState::Degraded
                } else {
                    HealthState::Healthy
                };
                components.push(ComponentHealth::new(
                    "remote_client",
                    state,
                    format!(
                        "{} queries, error rate {:.1}%",
                        metrics.queries_processed,
                        error_rate * 100.0
                    ),
                ));
            }
        }

        let cache = self.inner.cache.stats();
        components.push(ComponentHealth::new(
            "schema_cache",
            HealthState::Healthy,
            format!(
                "{} active entries, hit rate {:.0}%",
                cache.active_entries,
                cache.hit_rate() * 100.0
            ),
        ));

        let state = components
            .iter()
            .map(|c| c.state)
            .max()
            .unwrap_or(HealthState::Healthy);
        HealthStatus {
            state,
            components,
            metrics,
            checked_at: Utc::now(),
        }
    }
}

impl EngineInner {
    fn window(&self) -> TimeRange {
        TimeRange::last(self.config.discovery_window)
    }

    async fn sample(&self, ctx: &QueryContext, params: &SamplingParams) -> Result<DataSample> {
        let kind = self.config.strategy.unwrap_or_else(|| {
            select_strategy(
                &DataCharacteristics {
                    total_records: params.known_total,
                    ..Default::default()
                },
                &self.config.sampling,
            )
        });
        log_sampling!(
            self.config.log,
            event_type = %params.event_type,
            strategy = %kind,
            max_samples = params.max_samples,
            "Sampling"
        );
        kind.build(&self.config.sampling)
            .sample(ctx, &self.client, params)
            .await
    }

    /// `Ok(None)` when the event type has fewer than `min_records` records.
    async fn discover_one(
        &self,
        ctx: &QueryContext,
        event_type: &str,
        range: TimeRange,
        depth: ProfileDepth,
        min_records: u64,
    ) -> Result<Option<Schema>> {
        NrqlSecurity::validate_identifier(event_type)?;
        let _permit = ctx
            .run(async {
                Arc::clone(&self.workers)
                    .acquire_owned()
                    .await
                    .map_err(|_| DiscoveryError::cancelled("worker pool closed"))
            })
            .await?;

        let total = count_records(ctx, &self.client, event_type, &range).await?;
        if total == 0 || total < min_records {
            debug!(event_type, total, min_records, "Skipping event type");
            return Ok(None);
        }
        self.build_schema(ctx, event_type, range, depth, total)
            .await
            .map(Some)
    }

    async fn build_schema(
        &self,
        ctx: &QueryContext,
        event_type: &str,
        range: TimeRange,
        depth: ProfileDepth,
        total: u64,
    ) -> Result<Schema> {
        let params = SamplingParams::new(event_type, range)
            .with_max_samples(self.config.sample_size)
            .with_known_total(total);
        let mut sample = self.sample(ctx, &params).await?;
        if sample.is_empty() {
            return Err(DiscoveryError::NoData {
                event_type: event_type.to_string(),
            });
        }
        // Detectors read values in time order.
        sort_by_timestamp(&mut sample.records);

        let mut attributes = self.analyzer.analyze_sample(&sample, depth);
        let mut patterns = Vec::new();
        if depth.detects_patterns() {
            for attribute in &mut attributes {
                let values: Vec<Value> = sample
                    .records
                    .iter()
                    .map(|r| r.get(&attribute.name).cloned().unwrap_or(Value::Null))
                    .collect();
                let found = self
                    .patterns
                    .detect(&PatternInput::new(&attribute.name, attribute.data_type, &values));
                patterns.extend(
                    found
                        .iter()
                        .cloned()
                        .map(|p| DetectedPattern::new(event_type, Some(attribute.name.clone()), p)),
                );
                attribute.patterns = found;
            }
            patterns.extend(self.rate_patterns(ctx, event_type, &range).await?);
        }

        let quality = if depth.assesses_quality() {
            self.quality
                .assess(event_type, &sample, &attributes, Utc::now())
                .metrics()
        } else {
            QualityMetrics::default()
        };

        let mut schema = Schema::new(event_type, attributes);
        schema.sample_count = sample.sample_size;
        schema.data_volume = DataVolumeProfile::new(total, range.duration().num_minutes());
        schema.quality = quality;
        schema.patterns = patterns;
        schema.touch(Utc::now());
        debug!(
            event_type,
            attributes = schema.attributes.len(),
            patterns = schema.patterns.len(),
            quality = schema.quality.overall_score,
            "Profiled schema"
        );
        Ok(schema)
    }

    /// Schema-level patterns in the bucketed record rate.
    async fn rate_patterns(
        &self,
        ctx: &QueryContext,
        event_type: &str,
        range: &TimeRange,
    ) -> Result<Vec<DetectedPattern>> {
        let nrql = Nrql::count_series(event_type, range, self.config.rate_series_buckets)?;
        let counts = self.client.query(ctx, &nrql).await?.numbers(COUNT_ALIAS);
        Ok(self
            .patterns
            .detect_series("record_rate", &counts)
            .into_iter()
            .map(|p| DetectedPattern::new(event_type, None, p))
            .collect())
    }
}

/// Oldest first; records without a timestamp keep their order at the end.
fn sort_by_timestamp(records: &mut [Record]) {
    records.sort_by_key(|r| {
        r.get(TIMESTAMP_ATTRIBUTE)
            .and_then(value_as_timestamp)
            .map_or(i64::MAX, |at| at.timestamp_millis())
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{generate_records, generate_records_with, timestamp_of, MockNrdbClient};
    use serde_json::json;
    use std::time::Duration;

    fn engine(mock: MockNrdbClient) -> (DiscoveryEngine, Arc<MockNrdbClient>) {
        let mock = Arc::new(mock);
        let engine = DiscoveryEngine::new(mock.clone(), EngineConfig::default().with_max_concurrency(2)).unwrap();
        (engine, mock)
    }

    fn day() -> TimeRange {
        TimeRange::last(Duration::from_secs(24 * 3600))
    }

    #[test]
    fn test_sort_by_timestamp() {
        let mut records = vec![
            crate::testing::record(json!({"timestamp": 3000})),
            crate::testing::record(json!({"name": "no timestamp"})),
            crate::testing::record(json!({"timestamp": 1000})),
        ];
        sort_by_timestamp(&mut records);
        assert_eq!(records[0]["timestamp"], 1000);
        assert_eq!(records[1]["timestamp"], 3000);
        assert!(timestamp_of(&records[2]).is_none());
    }

    #[tokio::test]
    async fn test_profile_schema_depths() {
        let range = day();
        let records = generate_records_with(&range, 500, |i| {
            json!({"duration": 0.1 + (i % 17) as f64, "host": format!("web-{}", i % 4)})
        });
        let (engine, _) = engine(MockNrdbClient::new().with_event_type("Transaction", records));
        let ctx = QueryContext::background();

        let basic = engine
            .profile_schema(&ctx, "Transaction", ProfileDepth::Basic)
            .await
            .unwrap();
        assert!(!basic.attributes.is_empty());
        assert_eq!(basic.quality, QualityMetrics::default());
        assert!(basic.attribute("host").unwrap().sample_values.is_empty());

        let full = engine
            .profile_schema(&ctx, "Transaction", ProfileDepth::Full)
            .await
            .unwrap();
        assert!(full.quality.overall_score > 0.0);
        assert!(!full.attribute("host").unwrap().sample_values.is_empty());
        assert_eq!(full.data_volume.total_records, 500);
        assert!(full.discovered_at <= full.last_analyzed_at);
    }

    #[tokio::test]
    async fn test_profile_unknown_data_is_an_error() {
        let (engine, _) = engine(MockNrdbClient::new().with_event_type("Empty", Vec::new()));
        let err = engine
            .profile_schema(&QueryContext::background(), "Empty", ProfileDepth::Standard)
            .await
            .unwrap_err();
        assert!(matches!(err, DiscoveryError::NoData { .. }));
    }

    #[tokio::test]
    async fn test_partial_failures_are_collected() {
        let range = day();
        let mock = MockNrdbClient::new()
            .with_event_type("Transaction", generate_records(&range, 200))
            .with_event_type("PageView", generate_records(&range, 200))
            .with_event_type("Log", generate_records(&range, 200));
        mock.fail_event_type("PageView", DiscoveryError::from_status(403, "forbidden", None));
        let (engine, _) = engine(mock);

        let outcome = engine
            .discover_schemas(&QueryContext::background(), &DiscoveryFilter::new())
            .await
            .unwrap();
        let names: Vec<&str> = outcome.schemas.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Log", "Transaction"]);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].event_type, "PageView");
        assert_eq!(outcome.failures[0].class, crate::error::ErrorClass::Permanent);
        // Incomplete outcomes are not cached.
        assert_eq!(engine.cache_stats().total_entries, 0);
    }

    #[tokio::test]
    async fn test_min_record_count_skips() {
        let range = day();
        let (engine, _) = engine(
            MockNrdbClient::new()
                .with_event_type("Busy", generate_records(&range, 300))
                .with_event_type("Quiet", generate_records(&range, 3)),
        );
        let outcome = engine
            .discover_schemas(&QueryContext::background(), &DiscoveryFilter::new().min_record_count(10))
            .await
            .unwrap();
        assert_eq!(outcome.schemas.len(), 1);
        assert_eq!(outcome.skipped, vec!["Quiet"]);
    }

    #[tokio::test]
    async fn test_cancelled_discovery_is_an_error() {
        let range = day();
        let (engine, _) = engine(MockNrdbClient::new().with_event_type("Transaction", generate_records(&range, 10)));
        let (ctx, handle) = QueryContext::cancellable();
        handle.cancel();
        let err = engine
            .discover_schemas(&ctx, &DiscoveryFilter::new())
            .await
            .unwrap_err();
        assert!(matches!(err, DiscoveryError::Cancelled { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_batch_timeout_fails_slow_workers() {
        let range = day();
        let mock = Arc::new(
            MockNrdbClient::new()
                .with_event_type("Transaction", generate_records(&range, 10))
                .with_latency(Duration::from_secs(10)),
        );
        let engine = DiscoveryEngine::new(
            mock,
            EngineConfig::default().with_batch_timeout(Duration::from_secs(15)),
        )
        .unwrap();

        let outcome = engine
            .discover_schemas(&QueryContext::background(), &DiscoveryFilter::new())
            .await
            .unwrap();
        assert!(outcome.schemas.is_empty());
        assert_eq!(outcome.failures[0].class, crate::error::ErrorClass::Cancelled);
    }

    #[tokio::test]
    async fn test_assess_quality_of_empty_event_type() {
        let (engine, _) = engine(MockNrdbClient::new().with_event_type("Empty", Vec::new()));
        let report = engine
            .assess_quality(&QueryContext::background(), "Empty")
            .await
            .unwrap();
        assert_eq!(report.overall_score, 0.0);
        assert!(!report.issues.is_empty());
    }

    #[tokio::test]
    async fn test_health_reports_components() {
        let range = day();
        let (engine, _) = engine(MockNrdbClient::new().with_event_type("Transaction", generate_records(&range, 50)));
        engine
            .discover_schemas(&QueryContext::background(), &DiscoveryFilter::new())
            .await
            .unwrap();

        let health = engine.health();
        assert!(health.is_healthy());
        assert!(health.component("remote_client").is_some());
        assert!(health.component("schema_cache").is_some());
        assert!(health.metrics.queries_processed > 0);
        assert_eq!(health.metrics.schemas_discovered, 1);
    }
}
