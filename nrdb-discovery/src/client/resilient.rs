//! Rate limiting, retry and circuit breaking around any [`NrdbClient`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, instrument, warn};

use crate::client::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
use crate::client::rate_limit::{RateLimitConfig, RateLimiter};
use crate::client::retry::{RetryConfig, RetryPolicy};
use crate::client::types::QueryResult;
use crate::client::NrdbClient;
use crate::context::QueryContext;
use crate::error::{DiscoveryError, ErrorClass, Result};
use crate::log_query;
use crate::logging::{truncate_field, LogConfig};

/// Settings for every resilience layer of a [`ResilientClient`].
#[derive(Debug, Clone)]
pub struct ResilienceConfig {
    pub rate_limit: RateLimitConfig,
    pub retry: RetryConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    /// Upper bound for a single attempt (default: 30s).
    pub query_timeout: Duration,
    pub log: LogConfig,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            rate_limit: RateLimitConfig::default(),
            retry: RetryConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            query_timeout: Duration::from_secs(30),
            log: LogConfig::default(),
        }
    }
}

impl ResilienceConfig {
    pub fn with_rate_limit(mut self, rate_limit: RateLimitConfig) -> Self {
        self.rate_limit = rate_limit;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_circuit_breaker(mut self, circuit_breaker: CircuitBreakerConfig) -> Self {
        self.circuit_breaker = circuit_breaker;
        self
    }

    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = timeout;
        self
    }

    pub fn with_log_config(mut self, log: LogConfig) -> Self {
        self.log = log;
        self
    }

    /// Validates every nested configuration.
    pub fn validate(&self) -> Result<()> {
        self.rate_limit.validate()?;
        self.retry.validate()?;
        self.circuit_breaker.validate()?;
        if self.query_timeout.is_zero() {
            return Err(DiscoveryError::configuration("query_timeout must be non-zero"));
        }
        Ok(())
    }
}

/// Read-only counters exported by a [`ResilientClient`].
#[derive(Debug, Clone, Serialize)]
pub struct ClientMetrics {
    /// Calls to [`NrdbClient::query`].
    pub queries_processed: u64,
    /// Calls that ultimately returned an error.
    pub errors: u64,
    /// Attempts sent to the transport, including retries.
    pub attempts: u64,
    /// Attempts after the first one.
    pub retries: u64,
    /// Attempts rejected by the open circuit without touching the transport.
    pub circuit_rejections: u64,
    /// Times a caller waited for a rate-limit token.
    pub rate_limit_waits: u64,
    pub circuit_state: CircuitState,
}

impl ClientMetrics {
    /// Fraction of processed queries that failed.
    pub fn error_rate(&self) -> f64 {
        if self.queries_processed == 0 {
            0.0
        } else {
            self.errors as f64 / self.queries_processed as f64
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    queries: AtomicU64,
    errors: AtomicU64,
    attempts: AtomicU64,
    retries: AtomicU64,
    rejections: AtomicU64,
}

/// Client wrapper adding rate limiting, retries with backoff and a circuit
/// breaker.
///
/// Each attempt asks the breaker for permission first, so that calls are
/// rejected immediately while the circuit is open, then takes a rate-limit
/// token, then calls the transport under `query_timeout`. The breaker counts
/// transient failures only: a permanent error proves the remote answered,
/// and a cancelled attempt says nothing about the remote at all.
pub struct ResilientClient {
    inner: Arc<dyn NrdbClient>,
    limiter: RateLimiter,
    retry: RetryPolicy,
    breaker: CircuitBreaker,
    query_timeout: Duration,
    log_config: LogConfig,
    counters: Counters,
}

impl ResilientClient {
    pub fn new(inner: Arc<dyn NrdbClient>, config: ResilienceConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            inner,
            limiter: RateLimiter::new(&config.rate_limit),
            retry: RetryPolicy::new(config.retry),
            breaker: CircuitBreaker::new(config.circuit_breaker),
            query_timeout: config.query_timeout,
            log_config: config.log,
            counters: Counters::default(),
        })
    }

    pub fn circuit_breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Snapshot of the client's counters.
    pub fn metrics(&self) -> ClientMetrics {
        ClientMetrics {
            queries_processed: self.counters.queries.load(Ordering::Relaxed),
            errors: self.counters.errors.load(Ordering::Relaxed),
            attempts: self.counters.attempts.load(Ordering::Relaxed),
            retries: self.counters.retries.load(Ordering::Relaxed),
            circuit_rejections: self.counters.rejections.load(Ordering::Relaxed),
            rate_limit_waits: self.limiter.wait_count(),
            circuit_state: self.breaker.state(),
        }
    }

    async fn attempt(&self, ctx: &QueryContext, nrql: &str, attempt: u32) -> Result<QueryResult> {
        if attempt > 1 {
            self.counters.retries.fetch_add(1, Ordering::Relaxed);
        }

        if let Err(err) = self.breaker.allow() {
            self.counters.rejections.fetch_add(1, Ordering::Relaxed);
            return Err(err);
        }

        if let Err(err) = self.limiter.wait(ctx).await {
            self.breaker.record_ignored();
            return Err(err);
        }

        self.counters.attempts.fetch_add(1, Ordering::Relaxed);
        let outcome = match tokio::time::timeout(
            self.query_timeout,
            ctx.run(self.inner.query(ctx, nrql)),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(DiscoveryError::Timeout {
                elapsed: self.query_timeout,
            }),
        };

        match &outcome {
            Ok(_) => self.breaker.record_success(),
            Err(err) => match err.class() {
                ErrorClass::Transient => self.breaker.record_failure(),
                ErrorClass::Cancelled | ErrorClass::CircuitOpen => self.breaker.record_ignored(),
                ErrorClass::Permanent | ErrorClass::Configuration => self.breaker.record_success(),
            },
        }

        if let Err(err) = &outcome {
            debug!(attempt, error = %err, "Query attempt failed");
        }
        outcome
    }
}

#[async_trait]
impl NrdbClient for ResilientClient {
    #[instrument(skip(self, ctx, nrql))]
    async fn query(&self, ctx: &QueryContext, nrql: &str) -> Result<QueryResult> {
        self.counters.queries.fetch_add(1, Ordering::Relaxed);
        log_query!(self.log_config, nrql);

        let started = Instant::now();
        let result = self
            .retry
            .execute(ctx, |attempt| self.attempt(ctx, nrql, attempt))
            .await;
        let elapsed = started.elapsed();
        if self.log_config.is_slow(elapsed) {
            warn!(
                elapsed_ms = elapsed.as_millis() as u64,
                nrql = %truncate_field(nrql, self.log_config.max_field_length),
                "Slow NRQL query"
            );
        }

        if result.is_err() {
            self.counters.errors.fetch_add(1, Ordering::Relaxed);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockNrdbClient;

    fn config() -> ResilienceConfig {
        ResilienceConfig::default()
            .with_rate_limit(RateLimitConfig::new(6000, 100))
            .with_retry(RetryConfig {
                max_attempts: 3,
                initial_interval: Duration::from_millis(10),
                max_interval: Duration::from_millis(50),
                multiplier: 2.0,
                jitter: 0.0,
            })
            .with_circuit_breaker(
                CircuitBreakerConfig::default()
                    .with_failure_threshold(3)
                    .with_open_duration(Duration::from_secs(30)),
            )
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_passes_through() {
        let mock = Arc::new(MockNrdbClient::new().with_event_type("Transaction", Vec::new()));
        let client = ResilientClient::new(mock.clone(), config()).unwrap();

        client
            .query(&QueryContext::background(), "SHOW EVENT TYPES")
            .await
            .unwrap();

        let metrics = client.metrics();
        assert_eq!(metrics.queries_processed, 1);
        assert_eq!(metrics.attempts, 1);
        assert_eq!(metrics.errors, 0);
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_retry_then_open_circuit() {
        let mock = Arc::new(MockNrdbClient::new());
        mock.fail_always(DiscoveryError::from_status(503, "unavailable", None));
        let client = ResilientClient::new(mock.clone(), config()).unwrap();
        let ctx = QueryContext::background();

        let err = client.query(&ctx, "SHOW EVENT TYPES").await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(mock.call_count(), 3);
        assert_eq!(client.metrics().circuit_state, CircuitState::Open);

        for _ in 0..5 {
            let err = client.query(&ctx, "SHOW EVENT TYPES").await.unwrap_err();
            assert!(err.is_circuit_open());
        }
        assert_eq!(mock.call_count(), 3);

        let metrics = client.metrics();
        assert_eq!(metrics.circuit_rejections, 5);
        assert_eq!(metrics.errors, 6);
        assert_eq!(metrics.retries, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_error_does_not_trip_breaker() {
        let mock = Arc::new(MockNrdbClient::new());
        mock.fail_always(DiscoveryError::from_status(403, "forbidden", None));
        let client = ResilientClient::new(mock.clone(), config()).unwrap();

        for _ in 0..10 {
            let err = client
                .query(&QueryContext::background(), "SHOW EVENT TYPES")
                .await
                .unwrap_err();
            assert!(matches!(err, DiscoveryError::Authentication { .. }));
        }
        assert_eq!(mock.call_count(), 10);
        assert_eq!(client.metrics().circuit_state, CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_transport_times_out() {
        let mock = Arc::new(MockNrdbClient::new().with_latency(Duration::from_secs(60)));
        let client = ResilientClient::new(
            mock,
            config()
                .with_query_timeout(Duration::from_secs(1))
                .with_retry(RetryConfig::no_retry()),
        )
        .unwrap();

        let err = client
            .query(&QueryContext::background(), "SHOW EVENT TYPES")
            .await
            .unwrap_err();
        assert!(matches!(err, DiscoveryError::Timeout { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_context_is_not_a_breaker_failure() {
        let mock = Arc::new(MockNrdbClient::new().with_latency(Duration::from_secs(60)));
        let client = ResilientClient::new(mock, config()).unwrap();

        for _ in 0..5 {
            let ctx = QueryContext::with_timeout(Duration::from_millis(100));
            let err = client.query(&ctx, "SHOW EVENT TYPES").await.unwrap_err();
            assert!(matches!(err, DiscoveryError::Cancelled { .. }));
        }
        assert_eq!(client.metrics().circuit_state, CircuitState::Closed);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mock = Arc::new(MockNrdbClient::new());
        let result = ResilientClient::new(
            mock,
            ResilienceConfig::default().with_query_timeout(Duration::ZERO),
        );
        assert!(result.is_err());
    }
}
