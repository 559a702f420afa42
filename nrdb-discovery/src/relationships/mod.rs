//! Relationship mining across profiled schemas.
//!
//! Three independent passes run over the schemas: join discovery from
//! matching attribute names validated against sampled values, Pearson
//! correlation of bucketed numeric averages, and lagged (temporal)
//! correlation of the same series. The results form a
//! [`RelationshipGraph`], which then derives transitive edges from pairs of
//! strong edges sharing an attribute.

mod correlation;
mod graph;
mod join;
mod types;

use std::collections::HashMap;

use futures::future::join_all;
use tracing::{debug, info, instrument, warn};

use crate::client::NrdbClient;
use crate::context::QueryContext;
use crate::error::{DiscoveryError, ErrorClass, Result};
use crate::nrql::{Nrql, VALUE_ALIAS};
use crate::sampling::TimeRange;
use crate::schema::Schema;

pub use correlation::{aligned, correlate, temporal, AttributeSeries};
pub use graph::RelationshipGraph;
pub use join::{candidates, measure, name_similarity, JoinCandidate, JoinMeasurement, JoinSample};
pub use types::{
    AttributeRef, Evidence, EvidenceType, JoinCardinality, Relationship, RelationshipType,
};

/// Thresholds and query budgets for [`RelationshipMiner`].
#[derive(Debug, Clone)]
pub struct RelationshipConfig {
    /// Joins below this match ratio are discarded (default: 0.1).
    pub min_match_ratio: f64,
    /// Values fetched per join side (default: 1000).
    pub join_sample_size: u64,
    /// Token similarity for partial name matches of id-like attributes
    /// (default: 0.5).
    pub name_similarity_threshold: f64,
    /// Join candidates validated per run (default: 25).
    pub max_join_candidates: usize,
    /// |r| must exceed this for correlation and temporal edges (default: 0.7).
    pub correlation_threshold: f64,
    /// Minimum aligned buckets for a correlation (default: 10).
    pub min_correlation_points: usize,
    /// Buckets per average series (default: 48).
    pub series_buckets: u32,
    /// Largest lag tried for temporal correlation, in buckets (default: 6).
    pub max_lag_buckets: usize,
    /// Numeric attributes per schema considered for correlation (default: 5).
    pub max_numeric_attributes: usize,
    /// Edges at or above this are composed transitively (default: 0.8).
    pub transitive_min_confidence: f64,
    pub mine_joins: bool,
    pub mine_correlations: bool,
    pub mine_temporal: bool,
}

impl Default for RelationshipConfig {
    fn default() -> Self {
        Self {
            min_match_ratio: 0.1,
            join_sample_size: 1000,
            name_similarity_threshold: 0.5,
            max_join_candidates: 25,
            correlation_threshold: 0.7,
            min_correlation_points: 10,
            series_buckets: 48,
            max_lag_buckets: 6,
            max_numeric_attributes: 5,
            transitive_min_confidence: 0.8,
            mine_joins: true,
            mine_correlations: true,
            mine_temporal: true,
        }
    }
}

impl RelationshipConfig {
    pub fn validate(&self) -> Result<()> {
        use crate::security::InputValidator;

        InputValidator::validate_ratio(self.min_match_ratio, "min_match_ratio")?;
        InputValidator::validate_ratio(self.name_similarity_threshold, "name_similarity_threshold")?;
        InputValidator::validate_ratio(self.correlation_threshold, "correlation_threshold")?;
        InputValidator::validate_ratio(self.transitive_min_confidence, "transitive_min_confidence")?;
        InputValidator::validate_positive(self.join_sample_size, "join_sample_size")?;
        InputValidator::validate_positive(self.series_buckets as u64, "series_buckets")?;
        if self.min_correlation_points < 3 {
            return Err(DiscoveryError::configuration(
                "min_correlation_points must be at least 3",
            ));
        }
        Ok(())
    }
}

/// Finds joins, correlations and temporal links between schemas.
#[derive(Debug, Clone, Default)]
pub struct RelationshipMiner {
    config: RelationshipConfig,
}

impl RelationshipMiner {
    pub fn new(config: RelationshipConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RelationshipConfig {
        &self.config
    }

    /// Mines all relationships between `schemas` over `range`, most
    /// confident first.
    ///
    /// A failed query for one candidate skips that candidate; cancellation
    /// and an open circuit abort the run.
    #[instrument(skip_all, fields(schemas = schemas.len()))]
    pub async fn mine(
        &self,
        ctx: &QueryContext,
        client: &dyn NrdbClient,
        schemas: &[Schema],
        range: &TimeRange,
    ) -> Result<Vec<Relationship>> {
        let mut graph = RelationshipGraph::default();

        if self.config.mine_joins {
            for relationship in self.discover_joins(ctx, client, schemas, range).await? {
                graph.add(relationship);
            }
        }
        if self.config.mine_correlations || self.config.mine_temporal {
            for relationship in self.discover_correlations(ctx, client, schemas, range).await? {
                graph.add(relationship);
            }
        }
        let derived = graph.derive_transitive(self.config.transitive_min_confidence)?;

        let mut relationships = graph.into_relationships();
        relationships.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        info!(
            relationships = relationships.len(),
            derived, "Relationship mining complete"
        );
        Ok(relationships)
    }

    /// Validates name-matched candidates against sampled values.
    pub async fn discover_joins(
        &self,
        ctx: &QueryContext,
        client: &dyn NrdbClient,
        schemas: &[Schema],
        range: &TimeRange,
    ) -> Result<Vec<Relationship>> {
        let mut found = Vec::new();
        for candidate in candidates(schemas, &self.config) {
            let sample = match join::sample_candidate(
                ctx,
                client,
                &candidate,
                range,
                self.config.join_sample_size,
            )
            .await
            {
                Ok(sample) => sample,
                Err(e) => {
                    skip_or_abort(e, &candidate.source, &candidate.target)?;
                    continue;
                }
            };
            let measurement = measure(&sample);
            debug!(
                source = %candidate.source,
                target = %candidate.target,
                match_ratio = measurement.match_ratio,
                cardinality = measurement.cardinality.as_str(),
                "Measured join candidate"
            );
            if let Some(relationship) = join::evaluate(&candidate, &measurement, &self.config)? {
                found.push(relationship);
            }
        }
        Ok(found)
    }

    /// Correlation and temporal edges between numeric attributes of
    /// different schemas. Each series is queried once.
    pub async fn discover_correlations(
        &self,
        ctx: &QueryContext,
        client: &dyn NrdbClient,
        schemas: &[Schema],
        range: &TimeRange,
    ) -> Result<Vec<Relationship>> {
        let buckets = self.config.series_buckets;
        let bucket_secs = Nrql::bucket_width(range, buckets).as_secs();

        let mut requests: Vec<(AttributeRef, String)> = Vec::new();
        for schema in schemas {
            for attribute in schema
                .numeric_attributes()
                .take(self.config.max_numeric_attributes)
            {
                let query = Nrql::average_series(&schema.name, &attribute.name, range, buckets)?;
                requests.push((AttributeRef::new(&schema.name, &attribute.name), query));
            }
        }
        // Rate limiting, if any, is the client's concern.
        let results = join_all(requests.iter().map(|(_, query)| client.query(ctx, query))).await;

        let mut series: Vec<AttributeSeries> = Vec::new();
        for ((attribute_ref, _), result) in requests.into_iter().zip(results) {
            match result {
                Ok(result) => series.push(AttributeSeries::new(
                    attribute_ref,
                    result.numbers_with_gaps(VALUE_ALIAS),
                )),
                Err(e) => skip_or_abort(e, &attribute_ref, &attribute_ref)?,
            }
        }

        let mut found: HashMap<String, Relationship> = HashMap::new();
        for (i, a) in series.iter().enumerate() {
            for b in series[i + 1..]
                .iter()
                .filter(|b| b.attribute.schema != a.attribute.schema)
            {
                if self.config.mine_correlations {
                    if let Some(r) = correlate(a, b, &self.config)? {
                        found.entry(r.id.clone()).or_insert(r);
                    }
                }
                if self.config.mine_temporal {
                    if let Some(r) = temporal(a, b, &self.config, bucket_secs)? {
                        found.entry(r.id.clone()).or_insert(r);
                    }
                }
            }
        }
        let mut relationships: Vec<Relationship> = found.into_values().collect();
        relationships.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(relationships)
    }
}

fn skip_or_abort(error: DiscoveryError, source: &AttributeRef, target: &AttributeRef) -> Result<()> {
    match error.class() {
        ErrorClass::Cancelled | ErrorClass::CircuitOpen => Err(error),
        _ => {
            warn!(%source, %target, error = %error, "Skipping relationship candidate");
            Ok(())
        }
    }
}
