//! Attribute analysis: turns sampled records into typed, profiled
//! [`Attribute`]s.
//!
//! Analysis is pure and deterministic; it never talks to the remote store.
//!
//! # Example
//!
//! ```rust
//! use nrdb_discovery::analysis::AttributeAnalyzer;
//! use nrdb_discovery::schema::{DataType, ProfileDepth, SemanticType};
//! use serde_json::json;
//!
//! let analyzer = AttributeAnalyzer::builder().top_values(3).build();
//! let values = vec![json!("a@example.com"), json!("b@example.com"), json!(null)];
//! let refs: Vec<_> = values.iter().collect();
//!
//! let attribute = analyzer.analyze_attribute("contact", &refs, ProfileDepth::Standard);
//! assert_eq!(attribute.data_type, DataType::String);
//! assert_eq!(attribute.semantic_type, SemanticType::Email);
//! assert!((attribute.null_ratio - 1.0 / 3.0).abs() < 1e-9);
//! ```

mod inference;
mod stats;

use serde_json::Value;
use tracing::{debug, instrument};

use crate::sampling::DataSample;
use crate::schema::{Attribute, AttributeQuality, DataType, ProfileDepth, SemanticType};

pub use inference::{infer_data_type, semantic_from_name, semantic_from_values, value_as_timestamp};
pub use stats::{cardinality, statistics};

pub(crate) use inference::{classify_value, format_for, name_tokens};
pub(crate) use stats::value_key;

/// Configuration for [`AttributeAnalyzer`].
#[derive(Debug, Clone)]
pub struct AnalyzerConfig {
    /// Share of string values that must match a format for the value-based
    /// semantic type (default: 0.9).
    pub semantic_match_ratio: f64,
    /// Number of most frequent values kept (default: 10).
    pub top_values: usize,
    /// Unique ratio at or above which an attribute is high cardinality
    /// (default: 0.8).
    pub high_cardinality_ratio: f64,
    /// Minimum distinct values for the high-cardinality flag (default: 50).
    pub high_cardinality_min_unique: u64,
    /// Maximum distinct values for a string attribute to count as a
    /// category (default: 50).
    pub categorical_max_unique: u64,
    /// Raw values kept per attribute at full depth (default: 20).
    pub max_sample_values: usize,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            semantic_match_ratio: 0.9,
            top_values: 10,
            high_cardinality_ratio: 0.8,
            high_cardinality_min_unique: 50,
            categorical_max_unique: 50,
            max_sample_values: 20,
        }
    }
}

/// Builder for [`AttributeAnalyzer`].
#[derive(Debug, Default)]
pub struct AttributeAnalyzerBuilder {
    config: AnalyzerConfig,
}

impl AttributeAnalyzerBuilder {
    pub fn semantic_match_ratio(mut self, ratio: f64) -> Self {
        self.config.semantic_match_ratio = ratio;
        self
    }

    pub fn top_values(mut self, n: usize) -> Self {
        self.config.top_values = n;
        self
    }

    pub fn high_cardinality(mut self, ratio: f64, min_unique: u64) -> Self {
        self.config.high_cardinality_ratio = ratio;
        self.config.high_cardinality_min_unique = min_unique;
        self
    }

    pub fn max_sample_values(mut self, n: usize) -> Self {
        self.config.max_sample_values = n;
        self
    }

    pub fn build(self) -> AttributeAnalyzer {
        AttributeAnalyzer {
            config: self.config,
        }
    }
}

/// Infers types, cardinality, statistics and per-attribute quality.
#[derive(Debug, Clone, Default)]
pub struct AttributeAnalyzer {
    config: AnalyzerConfig,
}

impl AttributeAnalyzer {
    pub fn new(config: AnalyzerConfig) -> Self {
        Self { config }
    }

    pub fn builder() -> AttributeAnalyzerBuilder {
        AttributeAnalyzerBuilder::default()
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    /// Profiles every attribute seen in `sample`, in first-seen order.
    #[instrument(skip(self, sample), fields(event_type = %sample.event_type, records = sample.records.len()))]
    pub fn analyze_sample(&self, sample: &DataSample, depth: ProfileDepth) -> Vec<Attribute> {
        let attributes: Vec<Attribute> = sample
            .attribute_names()
            .into_iter()
            .map(|name| {
                let values = sample.values(&name);
                self.analyze_attribute(&name, &values, depth)
            })
            .collect();
        debug!(attributes = attributes.len(), "Analyzed sample");
        attributes
    }

    /// Profiles one attribute from its values; `Null` entries count as
    /// missing.
    pub fn analyze_attribute(&self, name: &str, values: &[&Value], depth: ProfileDepth) -> Attribute {
        let data_type = infer_data_type(name, values);
        let cardinality = cardinality(
            values,
            self.config.top_values,
            self.config.high_cardinality_ratio,
            self.config.high_cardinality_min_unique,
        );
        let semantic_type = self.infer_semantic_type(name, data_type, values, cardinality.unique_count);
        let statistics = statistics(data_type, values);

        let nulls = values.iter().filter(|v| v.is_null()).count();
        let null_ratio = if values.is_empty() {
            1.0
        } else {
            nulls as f64 / values.len() as f64
        };

        let sample_values = if depth.includes_samples() {
            let mut seen = std::collections::HashSet::new();
            values
                .iter()
                .filter(|v| !v.is_null())
                .filter(|v| seen.insert(value_key(v)))
                .take(self.config.max_sample_values)
                .map(|v| (*v).clone())
                .collect()
        } else {
            Vec::new()
        };

        Attribute {
            name: name.to_string(),
            data_type,
            semantic_type,
            quality: attribute_quality(data_type, semantic_type, values, null_ratio),
            cardinality,
            statistics,
            null_ratio,
            patterns: Vec::new(),
            sample_values,
        }
    }

    /// Name heuristics first, then value formats, then the type itself.
    pub fn infer_semantic_type(
        &self,
        name: &str,
        data_type: DataType,
        values: &[&Value],
        unique_count: u64,
    ) -> SemanticType {
        if let Some(semantic) = semantic_from_name(name, data_type) {
            return semantic;
        }
        let strings: Vec<&str> = values.iter().filter_map(|v| v.as_str()).collect();
        if let Some(semantic) = semantic_from_values(&strings, self.config.semantic_match_ratio) {
            return semantic;
        }
        match data_type {
            DataType::Timestamp => SemanticType::Timestamp,
            DataType::Json => SemanticType::Json,
            DataType::String | DataType::Boolean
                if unique_count > 0 && unique_count <= self.config.categorical_max_unique =>
            {
                // A handful of repeated values is a category; all-distinct is not.
                if data_type == DataType::Boolean || unique_count * 2 <= strings.len() as u64 {
                    SemanticType::Category
                } else {
                    SemanticType::Custom
                }
            }
            _ => SemanticType::Custom,
        }
    }
}

/// Completeness, validity and consistency of one attribute.
///
/// Validity is the share of non-null values whose shape matches the inferred
/// type. Consistency is the share of values conforming to the format or
/// range the semantic type implies; 1 when it implies none.
pub fn attribute_quality(
    data_type: DataType,
    semantic_type: SemanticType,
    values: &[&Value],
    null_ratio: f64,
) -> AttributeQuality {
    let present: Vec<&Value> = values.iter().copied().filter(|v| !v.is_null()).collect();
    if present.is_empty() {
        return AttributeQuality {
            completeness: 0.0,
            ..AttributeQuality::default()
        };
    }

    let validity = if data_type == DataType::Unknown {
        0.0
    } else {
        let conforming = present
            .iter()
            .filter(|v| conforms(data_type, v))
            .count();
        conforming as f64 / present.len() as f64
    };

    let consistency = match (format_for(semantic_type), semantic_type) {
        (Some(kinds), _) => {
            let strings: Vec<&str> = present.iter().filter_map(|v| v.as_str()).collect();
            if strings.is_empty() {
                0.0
            } else {
                strings
                    .iter()
                    .filter(|s| kinds.iter().any(|k| k.matches(s)))
                    .count() as f64
                    / present.len() as f64
            }
        }
        (None, SemanticType::Percentage) => in_range(&present, |n| (0.0..=100.0).contains(&n)),
        (None, SemanticType::Currency | SemanticType::Count | SemanticType::Duration) => {
            in_range(&present, |n| n >= 0.0)
        }
        _ => 1.0,
    };

    AttributeQuality {
        completeness: (1.0 - null_ratio).clamp(0.0, 1.0),
        validity,
        consistency,
    }
}

fn conforms(data_type: DataType, value: &Value) -> bool {
    match (data_type, classify_value(value)) {
        // Epoch numbers classify as numeric but are valid timestamps.
        (DataType::Timestamp, _) => value_as_timestamp(value).is_some(),
        (expected, Some(actual)) => expected == actual,
        (_, None) => false,
    }
}

fn in_range(values: &[&Value], accept: impl Fn(f64) -> bool) -> f64 {
    let hits = values
        .iter()
        .filter(|v| v.as_f64().is_some_and(&accept))
        .count();
    hits as f64 / values.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sampling::{SamplingParams, TimeRange};
    use crate::schema::Statistics;
    use serde_json::json;

    fn sample(records: Vec<Value>) -> DataSample {
        let params = SamplingParams::new("Transaction", TimeRange::last(std::time::Duration::from_secs(3600)));
        let records = records
            .into_iter()
            .filter_map(|r| r.as_object().cloned())
            .collect();
        DataSample::new(&params, records, 0, "test")
    }

    #[test]
    fn test_analyze_sample_profiles_every_attribute() {
        let sample = sample(vec![
            json!({"duration": 0.5, "sessionId": "s-1", "error": false}),
            json!({"duration": 1.5, "sessionId": "s-2", "error": true, "host": "web-1"}),
            json!({"duration": 2.5, "sessionId": "s-3", "error": false}),
        ]);
        let attributes = AttributeAnalyzer::default().analyze_sample(&sample, ProfileDepth::Basic);
        let names: Vec<&str> = attributes.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["duration", "sessionId", "error", "host"]);

        let duration = &attributes[0];
        assert_eq!(duration.data_type, DataType::Numeric);
        assert_eq!(duration.semantic_type, SemanticType::Duration);
        assert!(matches!(duration.statistics, Statistics::Numeric { mean, .. } if (mean - 1.5).abs() < 1e-9));

        assert_eq!(attributes[1].semantic_type, SemanticType::Identifier);
        assert_eq!(attributes[2].data_type, DataType::Boolean);

        let host = &attributes[3];
        assert!((host.null_ratio - 2.0 / 3.0).abs() < 1e-9);
        assert!((host.quality.completeness - 1.0 / 3.0).abs() < 1e-9);
        assert!(host.sample_values.is_empty());
    }

    #[test]
    fn test_full_depth_keeps_distinct_samples() {
        let analyzer = AttributeAnalyzer::builder().max_sample_values(2).build();
        let values = [json!("a"), json!("a"), json!("b"), json!("c")];
        let refs: Vec<&Value> = values.iter().collect();
        let attribute = analyzer.analyze_attribute("tier", &refs, ProfileDepth::Full);
        assert_eq!(attribute.sample_values, vec![json!("a"), json!("b")]);
    }

    #[test]
    fn test_semantic_falls_back_to_values_then_custom() {
        let analyzer = AttributeAnalyzer::default();
        let ids: Vec<Value> = (0..20)
            .map(|i| json!(format!("3f2b8c1e-9a4d-4e5f-8a7b-1c2d3e4f5a{i:02}")))
            .collect();
        let refs: Vec<&Value> = ids.iter().collect();
        assert_eq!(
            analyzer.analyze_attribute("ref", &refs, ProfileDepth::Basic).semantic_type,
            SemanticType::Uuid
        );

        let tiers: Vec<Value> = (0..20).map(|i| json!(["gold", "silver"][i % 2])).collect();
        let refs: Vec<&Value> = tiers.iter().collect();
        assert_eq!(
            analyzer.analyze_attribute("tier", &refs, ProfileDepth::Basic).semantic_type,
            SemanticType::Category
        );

        let free: Vec<Value> = (0..20).map(|i| json!(format!("note number {i}"))).collect();
        let refs: Vec<&Value> = free.iter().collect();
        assert_eq!(
            analyzer.analyze_attribute("note", &refs, ProfileDepth::Basic).semantic_type,
            SemanticType::Custom
        );
    }

    #[test]
    fn test_attribute_quality_scores() {
        let values = [json!("ops@example.com"), json!("broken"), json!(null), json!(7)];
        let refs: Vec<&Value> = values.iter().collect();
        let quality = attribute_quality(DataType::String, SemanticType::Email, &refs, 0.25);
        assert_eq!(quality.completeness, 0.75);
        assert!((quality.validity - 2.0 / 3.0).abs() < 1e-9);
        assert!((quality.consistency - 1.0 / 3.0).abs() < 1e-9);

        let empty = attribute_quality(DataType::Unknown, SemanticType::Custom, &[], 1.0);
        assert_eq!(empty.completeness, 0.0);
    }

    #[test]
    fn test_negative_durations_are_inconsistent() {
        let values = [json!(1.0), json!(-2.0), json!(3.0), json!(4.0)];
        let refs: Vec<&Value> = values.iter().collect();
        let quality = attribute_quality(DataType::Numeric, SemanticType::Duration, &refs, 0.0);
        assert_eq!(quality.consistency, 0.75);
        assert_eq!(quality.validity, 1.0);
    }
}
