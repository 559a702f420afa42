//! # nrdb-discovery - Zero-Knowledge Schema Discovery for NRDB
//!
//! nrdb-discovery learns what is inside an NRDB telemetry account without any
//! prior knowledge of it. It lists the event types that carry data, samples
//! each one with a strategy suited to its volume, infers attribute types and
//! meanings, detects patterns, scores data quality and mines the
//! relationships between event types.
//!
//! ## Overview
//!
//! Every interaction with the remote store goes through the
//! [`client::NrdbClient`] trait, so the whole pipeline runs the same way
//! against the live NerdGraph API and against the in-memory
//! [`testing::MockNrdbClient`]. The production client is wrapped in a
//! [`client::ResilientClient`] that rate-limits, retries transient failures
//! with backoff and trips a circuit breaker when the remote side keeps
//! failing.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use nrdb_discovery::prelude::*;
//! use nrdb_discovery::testing::{generate_records, MockNrdbClient};
//!
//! # async fn example() -> nrdb_discovery::error::Result<()> {
//! let window = TimeRange::last(std::time::Duration::from_secs(24 * 3600));
//! let client = Arc::new(
//!     MockNrdbClient::new().with_event_type("Transaction", generate_records(&window, 500)),
//! );
//!
//! let engine = DiscoveryEngine::new(client, EngineConfig::default())?;
//! let ctx = QueryContext::background();
//!
//! let result = engine
//!     .discover_with_intelligence(&ctx, &DiscoveryHints::new().domain("apm"))
//!     .await?;
//! for schema in &result.schemas {
//!     println!(
//!         "{}: {} attributes, quality {:.2}",
//!         schema.name,
//!         schema.attributes.len(),
//!         schema.quality.overall_score
//!     );
//! }
//! for insight in &result.insights {
//!     println!("[{}] {}", insight.insight_type, insight.title);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Key Features
//!
//! ### Sampling
//!
//! - **Random**: uniform draws for small and medium event types
//! - **Stratified**: equal time strata for bursty or seasonal data
//! - **Adaptive**: probes variability and sizes the sample to match
//! - **Reservoir**: bounded memory over streams of unknown length
//!
//! ### Profiling
//!
//! - Data type and semantic type inference with confidence scores
//! - Cardinality and per-type statistics
//! - Pattern detection: trends, seasonality, anomalies, distributions,
//!   value formats and sequences
//!
//! ### Data Quality
//!
//! Completeness, consistency, validity, timeliness and uniqueness are each
//! scored in [0, 1]. Issues are graded against configurable benchmarks and
//! turned into prioritized recommendations.
//!
//! ### Relationships
//!
//! Join candidates verified against sampled values, Pearson correlations
//! between numeric series, temporal co-movement of record rates and derived
//! edges through the resulting graph.
//!
//! ## Architecture
//!
//! - **`client`**: the query trait, NerdGraph transport and resilience layer
//! - **`context`**: deadlines and cancellation carried through every call
//! - **`nrql`**: safe construction of the statements the engine issues
//! - **`sampling`**: sampling strategies and their selection
//! - **`analysis`**: attribute type, semantics, cardinality and statistics
//! - **`patterns`**: pattern detectors
//! - **`quality`**: quality scoring, issues and recommendations
//! - **`relationships`**: relationship mining and the relationship graph
//! - **`engine`**: orchestration, caching, ranking and health
//! - **`testing`**: an in-memory client and record generators

pub mod analysis;
pub mod client;
pub mod context;
pub mod engine;
pub mod error;
pub mod logging;
pub mod nrql;
pub mod patterns;
pub mod prelude;
pub mod quality;
pub mod relationships;
pub mod sampling;
pub mod schema;
pub mod security;
pub mod testing;
