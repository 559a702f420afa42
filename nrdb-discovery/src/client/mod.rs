//! Remote query client and its resilience layers.
//!
//! [`NrdbClient`] is the single boundary between the engine and the remote
//! telemetry store. [`NerdGraphClient`] is the HTTP transport; wrap it (or any
//! other implementation) in a [`ResilientClient`] to add rate limiting,
//! retries and a circuit breaker.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use nrdb_discovery::client::{ClientConfig, NerdGraphClient, NrdbClient, ResilienceConfig, ResilientClient};
//! use nrdb_discovery::context::QueryContext;
//!
//! # async fn example() -> nrdb_discovery::error::Result<()> {
//! let transport = NerdGraphClient::new(ClientConfig::from_env()?)?;
//! let client = ResilientClient::new(Arc::new(transport), ResilienceConfig::default())?;
//! let result = client
//!     .query(&QueryContext::background(), "SELECT count(*) FROM Transaction SINCE 1 hour ago")
//!     .await?;
//! println!("{} rows", result.len());
//! # Ok(())
//! # }
//! ```

pub mod circuit_breaker;
pub mod config;
pub mod nerdgraph;
pub mod rate_limit;
pub mod resilient;
pub mod retry;
pub mod types;

use async_trait::async_trait;

use crate::context::QueryContext;
use crate::error::Result;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitSnapshot, CircuitState};
pub use config::{ClientConfig, Region};
pub use nerdgraph::NerdGraphClient;
pub use rate_limit::{RateLimitConfig, RateLimiter};
pub use resilient::{ClientMetrics, ResilienceConfig, ResilientClient};
pub use retry::{RetryConfig, RetryPolicy};
pub use types::{PerformanceInfo, QueryMetadata, QueryResult, Record};

/// Executes NRQL statements against one account of the remote store.
#[async_trait]
pub trait NrdbClient: Send + Sync {
    /// Runs `nrql` and returns its rows and metadata.
    ///
    /// Implementations must stop waiting once `ctx` is done.
    async fn query(&self, ctx: &QueryContext, nrql: &str) -> Result<QueryResult>;
}

#[async_trait]
impl<T: NrdbClient + ?Sized> NrdbClient for std::sync::Arc<T> {
    async fn query(&self, ctx: &QueryContext, nrql: &str) -> Result<QueryResult> {
        (**self).query(ctx, nrql).await
    }
}
