//! Join discovery: candidate pairs from names and types, validated against
//! sampled values.

use std::collections::HashSet;

use serde_json::Value;
use tracing::debug;

use super::types::{AttributeRef, Evidence, EvidenceType, JoinCardinality, Relationship, RelationshipType};
use super::RelationshipConfig;
use crate::analysis::{name_tokens, value_key};
use crate::client::NrdbClient;
use crate::context::QueryContext;
use crate::error::Result;
use crate::nrql::Nrql;
use crate::sampling::TimeRange;
use crate::schema::{Attribute, DataType, Schema, SemanticType};

/// Sampled distinct ratio at which one side counts as unique.
const UNIQUE_SIDE_RATIO: f64 = 0.95;

/// Attribute pair worth testing as a join.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinCandidate {
    pub source: AttributeRef,
    pub target: AttributeRef,
    /// Name similarity in [0, 1].
    pub name_score: f64,
}

/// Values of both sides as fetched for validation.
#[derive(Debug, Clone, Default)]
pub struct JoinSample {
    pub source: Vec<Value>,
    pub target: Vec<Value>,
}

/// Measured overlap of a candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinMeasurement {
    pub match_ratio: f64,
    pub source_sampled: usize,
    pub matched: usize,
    pub cardinality: JoinCardinality,
    pub source_unique_ratio: f64,
    pub target_unique_ratio: f64,
}

fn joinable(attribute: &Attribute) -> bool {
    matches!(attribute.data_type, DataType::String | DataType::Numeric)
        && !matches!(
            attribute.semantic_type,
            SemanticType::Timestamp
                | SemanticType::Duration
                | SemanticType::Currency
                | SemanticType::Percentage
                | SemanticType::Count
        )
}

fn identifier_like(attribute: &Attribute) -> bool {
    matches!(
        attribute.semantic_type,
        SemanticType::Identifier | SemanticType::Uuid | SemanticType::Email
    )
}

/// Similarity of two attribute names: 1 for the same tokens in any case
/// convention, otherwise the Jaccard index of their tokens.
pub fn name_similarity(a: &str, b: &str) -> f64 {
    let ta = name_tokens(a);
    let tb = name_tokens(b);
    if ta.is_empty() || tb.is_empty() {
        return 0.0;
    }
    if ta == tb {
        return 1.0;
    }
    let sa: HashSet<&String> = ta.iter().collect();
    let sb: HashSet<&String> = tb.iter().collect();
    sa.intersection(&sb).count() as f64 / sa.union(&sb).count() as f64
}

/// Candidate joins across different schemas, best names first.
pub fn candidates(schemas: &[Schema], config: &RelationshipConfig) -> Vec<JoinCandidate> {
    let mut found = Vec::new();
    for (i, left) in schemas.iter().enumerate() {
        for right in &schemas[i + 1..] {
            for a in left.attributes.iter().filter(|a| joinable(a)) {
                for b in right.attributes.iter().filter(|b| joinable(b)) {
                    if a.data_type != b.data_type {
                        continue;
                    }
                    let score = name_similarity(&a.name, &b.name);
                    // Partial name matches are only trusted for id-like attributes.
                    let accepted = score >= 1.0
                        || (score >= config.name_similarity_threshold
                            && identifier_like(a)
                            && identifier_like(b));
                    if accepted {
                        found.push(JoinCandidate {
                            source: AttributeRef::new(&left.name, &a.name),
                            target: AttributeRef::new(&right.name, &b.name),
                            name_score: score,
                        });
                    }
                }
            }
        }
    }
    found.sort_by(|x, y| y.name_score.total_cmp(&x.name_score));
    found.truncate(config.max_join_candidates);
    found
}

fn unique_ratio(values: &[Value]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let distinct: HashSet<String> = values.iter().map(value_key).collect();
    distinct.len() as f64 / values.len() as f64
}

/// Match ratio and cardinality class of sampled join values.
pub fn measure(sample: &JoinSample) -> JoinMeasurement {
    let source: Vec<&Value> = sample.source.iter().filter(|v| !v.is_null()).collect();
    let target: Vec<Value> = sample.target.iter().filter(|v| !v.is_null()).cloned().collect();
    let target_keys: HashSet<String> = target.iter().map(value_key).collect();
    let matched = source
        .iter()
        .filter(|v| target_keys.contains(&value_key(v)))
        .count();
    let match_ratio = if source.is_empty() {
        0.0
    } else {
        matched as f64 / source.len() as f64
    };

    let source_values: Vec<Value> = source.iter().map(|v| (*v).clone()).collect();
    let source_unique_ratio = unique_ratio(&source_values);
    let target_unique_ratio = unique_ratio(&target);
    let cardinality = match (
        source_unique_ratio >= UNIQUE_SIDE_RATIO,
        target_unique_ratio >= UNIQUE_SIDE_RATIO,
    ) {
        (true, true) => JoinCardinality::OneToOne,
        (true, false) | (false, true) => JoinCardinality::OneToMany,
        (false, false) => JoinCardinality::ManyToMany,
    };

    JoinMeasurement {
        match_ratio,
        source_sampled: source.len(),
        matched,
        cardinality,
        source_unique_ratio,
        target_unique_ratio,
    }
}

/// Builds the join relationship for a measured candidate, or `None` below
/// `min_match_ratio`.
pub fn evaluate(
    candidate: &JoinCandidate,
    measurement: &JoinMeasurement,
    config: &RelationshipConfig,
) -> Result<Option<Relationship>> {
    if measurement.source_sampled == 0 || measurement.match_ratio < config.min_match_ratio {
        return Ok(None);
    }
    let consistency = measurement.cardinality.consistency();
    let confidence = measurement.match_ratio * consistency;
    let evidence = vec![
        Evidence::new(
            EvidenceType::Sample,
            "match_ratio",
            measurement.match_ratio,
            measurement.match_ratio,
        ),
        Evidence::new(
            EvidenceType::Sample,
            "cardinality",
            measurement.cardinality.as_str(),
            consistency,
        ),
        Evidence::new(
            EvidenceType::Structural,
            "name_similarity",
            candidate.name_score,
            candidate.name_score,
        ),
    ];
    let relationship = Relationship::new(
        RelationshipType::Join,
        candidate.source.clone(),
        candidate.target.clone(),
        confidence,
        evidence,
    )?
    .with_metadata("join_cardinality", measurement.cardinality.as_str())
    .with_metadata("source_sampled", measurement.source_sampled as u64)
    .with_metadata("matched", measurement.matched as u64)
    .with_metadata("source_unique_ratio", measurement.source_unique_ratio)
    .with_metadata("target_unique_ratio", measurement.target_unique_ratio);
    Ok(Some(relationship))
}

/// Fetches both sides of `candidate` over `range`.
pub async fn sample_candidate(
    ctx: &QueryContext,
    client: &dyn NrdbClient,
    candidate: &JoinCandidate,
    range: &TimeRange,
    limit: u64,
) -> Result<JoinSample> {
    let fetch = |side: &AttributeRef| Nrql::select_attribute(&side.schema, &side.attribute, range, limit);
    let source_query = fetch(&candidate.source)?;
    let target_query = fetch(&candidate.target)?;

    let source = client.query(ctx, &source_query).await?;
    let target = client.query(ctx, &target_query).await?;
    let column = |rows: &[crate::client::Record], attribute: &str| -> Vec<Value> {
        rows.iter()
            .map(|row| row.get(attribute).cloned().unwrap_or(Value::Null))
            .collect()
    };

    let sample = JoinSample {
        source: column(&source.results, &candidate.source.attribute),
        target: column(&target.results, &candidate.target.attribute),
    };
    debug!(
        source = %candidate.source,
        target = %candidate.target,
        source_values = sample.source.len(),
        target_values = sample.target.len(),
        "Sampled join candidate"
    );
    Ok(sample)
}
