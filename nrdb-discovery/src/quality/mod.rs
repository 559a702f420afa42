//! Five-dimension data quality scoring.
//!
//! The assessor scores completeness, consistency, timeliness, uniqueness and
//! validity in [0, 1], combines them into a weighted overall score, and
//! emits issues plus templated recommendations wherever a score falls below
//! its benchmark. An empty sample is not an error: every dimension scores 0
//! and a [`IssueType::NoData`] issue is raised.

mod recommendations;
mod types;

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, instrument};

use crate::analysis::{value_as_timestamp, value_key};
use crate::error::{DiscoveryError, Result};
use crate::sampling::DataSample;
use crate::schema::{Attribute, SemanticType};

pub use types::{
    DimensionScore, IssueType, QualityDimension, QualityIssue, QualityRecommendation, QualityReport,
    Severity,
};

/// Attribute read for freshness.
pub const TIMESTAMP_ATTRIBUTE: &str = "timestamp";

/// Relative weight of each dimension in the overall score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QualityWeights {
    pub completeness: f64,
    pub consistency: f64,
    pub timeliness: f64,
    pub uniqueness: f64,
    pub validity: f64,
}

impl Default for QualityWeights {
    fn default() -> Self {
        Self {
            completeness: 0.30,
            consistency: 0.20,
            timeliness: 0.15,
            uniqueness: 0.15,
            validity: 0.20,
        }
    }
}

impl QualityWeights {
    fn weight(&self, dimension: QualityDimension) -> f64 {
        match dimension {
            QualityDimension::Completeness => self.completeness,
            QualityDimension::Consistency => self.consistency,
            QualityDimension::Timeliness => self.timeliness,
            QualityDimension::Uniqueness => self.uniqueness,
            QualityDimension::Validity => self.validity,
        }
    }

    fn total(&self) -> f64 {
        QualityDimension::ALL.iter().map(|d| self.weight(*d)).sum()
    }
}

/// Benchmarks and weights for [`QualityAssessor`].
#[derive(Debug, Clone)]
pub struct QualityConfig {
    /// Expected share of non-null values per attribute (default: 0.95).
    pub expected_completeness: f64,
    /// Per-attribute overrides of `expected_completeness`.
    pub completeness_overrides: HashMap<String, f64>,
    /// Dimension scores below this raise an issue (default: 0.8).
    pub dimension_benchmark: f64,
    /// Attribute consistency and validity below this raise an issue
    /// (default: 0.9).
    pub attribute_benchmark: f64,
    /// Gap below a benchmark at which an issue becomes critical (default: 0.2).
    pub critical_gap: f64,
    /// Data at most this old scores full timeliness (default: 5 minutes).
    pub fresh_within: Duration,
    /// Data at least this old scores zero timeliness (default: 24 hours).
    pub stale_after: Duration,
    pub weights: QualityWeights,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            expected_completeness: 0.95,
            completeness_overrides: HashMap::new(),
            dimension_benchmark: 0.8,
            attribute_benchmark: 0.9,
            critical_gap: 0.2,
            fresh_within: Duration::from_secs(5 * 60),
            stale_after: Duration::from_secs(24 * 60 * 60),
            weights: QualityWeights::default(),
        }
    }
}

impl QualityConfig {
    pub fn with_expected_completeness(mut self, expected: f64) -> Self {
        self.expected_completeness = expected;
        self
    }

    pub fn with_completeness_override(mut self, attribute: impl Into<String>, expected: f64) -> Self {
        self.completeness_overrides.insert(attribute.into(), expected);
        self
    }

    pub fn with_weights(mut self, weights: QualityWeights) -> Self {
        self.weights = weights;
        self
    }

    pub fn expected_completeness_for(&self, attribute: &str) -> f64 {
        self.completeness_overrides
            .get(attribute)
            .copied()
            .unwrap_or(self.expected_completeness)
    }

    pub fn validate(&self) -> Result<()> {
        use crate::security::InputValidator;

        InputValidator::validate_ratio(self.expected_completeness, "expected_completeness")?;
        InputValidator::validate_ratio(self.dimension_benchmark, "dimension_benchmark")?;
        InputValidator::validate_ratio(self.attribute_benchmark, "attribute_benchmark")?;
        for (attribute, expected) in &self.completeness_overrides {
            InputValidator::validate_ratio(*expected, attribute)?;
        }
        if QualityDimension::ALL.iter().any(|d| self.weights.weight(*d) < 0.0)
            || self.weights.total() <= 0.0
        {
            return Err(DiscoveryError::configuration(
                "quality weights must be non-negative with a positive sum",
            ));
        }
        if self.stale_after <= self.fresh_within {
            return Err(DiscoveryError::configuration(
                "stale_after must be longer than fresh_within",
            ));
        }
        Ok(())
    }

    fn severity(&self, observed: f64, benchmark: f64) -> Severity {
        if observed < benchmark - self.critical_gap {
            Severity::Critical
        } else {
            Severity::Warning
        }
    }
}

/// Scores profiled samples.
#[derive(Debug, Clone, Default)]
pub struct QualityAssessor {
    config: QualityConfig,
}

impl QualityAssessor {
    pub fn new(config: QualityConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &QualityConfig {
        &self.config
    }

    /// Assesses `sample` whose attributes were profiled as `attributes`,
    /// judging freshness against `now`.
    #[instrument(skip_all, fields(schema = %schema_name, records = sample.records.len()))]
    pub fn assess(
        &self,
        schema_name: &str,
        sample: &DataSample,
        attributes: &[Attribute],
        now: DateTime<Utc>,
    ) -> QualityReport {
        let dimensions = if sample.is_empty() {
            self.empty_dimensions(schema_name)
        } else {
            vec![
                self.completeness(attributes),
                self.consistency(attributes),
                self.timeliness(sample, now),
                self.uniqueness(sample, attributes),
                self.validity(attributes),
            ]
        };

        let weights = &self.config.weights;
        let weighted: f64 = dimensions
            .iter()
            .map(|d| d.score * weights.weight(d.dimension))
            .sum();
        let overall_score = (weighted / weights.total()).clamp(0.0, 1.0);

        let mut issues: Vec<QualityIssue> = dimensions.iter().flat_map(|d| d.issues.clone()).collect();
        issues.sort_by(|a, b| b.severity.cmp(&a.severity));
        let recommendations = recommendations::recommend(schema_name, &issues);

        debug!(overall_score, issues = issues.len(), "Assessed quality");
        QualityReport {
            schema_name: schema_name.to_string(),
            assessed_at: now,
            overall_score,
            dimensions,
            issues,
            recommendations,
        }
    }

    fn empty_dimensions(&self, schema_name: &str) -> Vec<DimensionScore> {
        QualityDimension::ALL
            .iter()
            .map(|dimension| {
                let issues = if *dimension == QualityDimension::Completeness {
                    vec![QualityIssue {
                        issue_type: IssueType::NoData,
                        dimension: *dimension,
                        severity: Severity::Critical,
                        attribute: None,
                        message: format!("no records sampled for {schema_name}"),
                        observed: 0.0,
                        expected: self.config.expected_completeness,
                    }]
                } else {
                    Vec::new()
                };
                DimensionScore {
                    dimension: *dimension,
                    score: 0.0,
                    details: "empty sample".to_string(),
                    issues,
                }
            })
            .collect()
    }

    fn completeness(&self, attributes: &[Attribute]) -> DimensionScore {
        let mut issues = Vec::new();
        for attribute in attributes {
            let expected = self.config.expected_completeness_for(&attribute.name);
            let observed = attribute.quality.completeness;
            if observed < expected {
                issues.push(QualityIssue {
                    issue_type: IssueType::LowCompleteness,
                    dimension: QualityDimension::Completeness,
                    severity: self.config.severity(observed, expected),
                    attribute: Some(attribute.name.clone()),
                    message: format!(
                        "'{}' is {:.1}% null, benchmark allows {:.1}%",
                        attribute.name,
                        (1.0 - observed) * 100.0,
                        (1.0 - expected) * 100.0
                    ),
                    observed,
                    expected,
                });
            }
        }
        let score = mean_or_zero(attributes.iter().map(|a| a.quality.completeness));
        self.dimension(
            QualityDimension::Completeness,
            score,
            format!("mean completeness over {} attributes", attributes.len()),
            issues,
        )
    }

    fn consistency(&self, attributes: &[Attribute]) -> DimensionScore {
        let issues = attributes
            .iter()
            .filter(|a| a.quality.consistency < self.config.attribute_benchmark)
            .map(|a| QualityIssue {
                issue_type: IssueType::InconsistentFormat,
                dimension: QualityDimension::Consistency,
                severity: self
                    .config
                    .severity(a.quality.consistency, self.config.attribute_benchmark),
                attribute: Some(a.name.clone()),
                message: format!(
                    "{:.1}% of '{}' values do not look like {}",
                    (1.0 - a.quality.consistency) * 100.0,
                    a.name,
                    a.semantic_type
                ),
                observed: a.quality.consistency,
                expected: self.config.attribute_benchmark,
            })
            .collect();
        let scored: Vec<&Attribute> = attributes.iter().filter(|a| a.quality.completeness > 0.0).collect();
        let score = if scored.is_empty() {
            1.0
        } else {
            mean_or_zero(scored.iter().map(|a| a.quality.consistency))
        };
        self.dimension(
            QualityDimension::Consistency,
            score,
            "values conforming to their semantic type".to_string(),
            issues,
        )
    }

    fn timeliness(&self, sample: &DataSample, now: DateTime<Utc>) -> DimensionScore {
        let latest = sample
            .values(TIMESTAMP_ATTRIBUTE)
            .into_iter()
            .filter_map(value_as_timestamp)
            .max();
        let Some(latest) = latest else {
            let issue = QualityIssue {
                issue_type: IssueType::MissingTimestamps,
                dimension: QualityDimension::Timeliness,
                severity: Severity::Info,
                attribute: Some(TIMESTAMP_ATTRIBUTE.to_string()),
                message: "records carry no readable timestamp".to_string(),
                observed: 0.5,
                expected: 1.0,
            };
            return DimensionScore {
                dimension: QualityDimension::Timeliness,
                score: 0.5,
                details: "freshness unknown".to_string(),
                issues: vec![issue],
            };
        };

        let age = (now - latest).to_std().unwrap_or_default();
        let fresh = self.config.fresh_within.as_secs_f64();
        let stale = self.config.stale_after.as_secs_f64();
        let score = if age.as_secs_f64() <= fresh {
            1.0
        } else {
            (1.0 - (age.as_secs_f64() - fresh) / (stale - fresh)).clamp(0.0, 1.0)
        };

        let mut issues = Vec::new();
        if score < self.config.dimension_benchmark {
            issues.push(QualityIssue {
                issue_type: IssueType::StaleData,
                dimension: QualityDimension::Timeliness,
                severity: self.config.severity(score, self.config.dimension_benchmark),
                attribute: None,
                message: format!("newest record is {}s old", age.as_secs()),
                observed: score,
                expected: self.config.dimension_benchmark,
            });
        }
        DimensionScore {
            dimension: QualityDimension::Timeliness,
            score,
            details: format!("newest record at {latest}"),
            issues,
        }
    }

    fn uniqueness(&self, sample: &DataSample, attributes: &[Attribute]) -> DimensionScore {
        let mut seen = HashSet::new();
        let distinct = sample
            .records
            .iter()
            .filter(|record| {
                let key: Vec<(String, String)> = record
                    .iter()
                    .map(|(k, v)| (k.clone(), value_key(v)))
                    .collect();
                seen.insert(key)
            })
            .count();
        let record_uniqueness = distinct as f64 / sample.records.len() as f64;

        let mut issues = Vec::new();
        if record_uniqueness < 1.0 {
            issues.push(QualityIssue {
                issue_type: IssueType::DuplicateRecords,
                dimension: QualityDimension::Uniqueness,
                severity: if record_uniqueness < self.config.dimension_benchmark {
                    self.config.severity(record_uniqueness, self.config.dimension_benchmark)
                } else {
                    Severity::Info
                },
                attribute: None,
                message: format!(
                    "{} of {} sampled records are exact duplicates",
                    sample.records.len() - distinct,
                    sample.records.len()
                ),
                observed: record_uniqueness,
                expected: 1.0,
            });
        }

        // UUID-valued attributes are expected to be unique per record.
        let mut score = record_uniqueness;
        for attribute in attributes
            .iter()
            .filter(|a| a.semantic_type == SemanticType::Uuid && a.cardinality.total_count > 1)
        {
            let ratio = attribute.cardinality.unique_ratio;
            score = score.min(ratio);
            if ratio < self.config.attribute_benchmark {
                issues.push(QualityIssue {
                    issue_type: IssueType::DuplicateKeys,
                    dimension: QualityDimension::Uniqueness,
                    severity: self.config.severity(ratio, self.config.attribute_benchmark),
                    attribute: Some(attribute.name.clone()),
                    message: format!("'{}' repeats UUID values", attribute.name),
                    observed: ratio,
                    expected: 1.0,
                });
            }
        }

        self.dimension(
            QualityDimension::Uniqueness,
            score,
            format!("{distinct} distinct of {} records", sample.records.len()),
            issues,
        )
    }

    fn validity(&self, attributes: &[Attribute]) -> DimensionScore {
        let scored: Vec<&Attribute> = attributes.iter().filter(|a| a.quality.completeness > 0.0).collect();
        let issues = scored
            .iter()
            .filter(|a| a.quality.validity < self.config.attribute_benchmark)
            .map(|a| QualityIssue {
                issue_type: IssueType::InvalidValues,
                dimension: QualityDimension::Validity,
                severity: self
                    .config
                    .severity(a.quality.validity, self.config.attribute_benchmark),
                attribute: Some(a.name.clone()),
                message: format!(
                    "{:.1}% of '{}' values are not {}",
                    (1.0 - a.quality.validity) * 100.0,
                    a.name,
                    a.data_type
                ),
                observed: a.quality.validity,
                expected: self.config.attribute_benchmark,
            })
            .collect();
        let score = mean_or_zero(scored.iter().map(|a| a.quality.validity));
        self.dimension(
            QualityDimension::Validity,
            score,
            "values matching their inferred type".to_string(),
            issues,
        )
    }

    /// Wraps a score, adding a dimension-level issue below the benchmark.
    fn dimension(
        &self,
        dimension: QualityDimension,
        score: f64,
        details: String,
        mut issues: Vec<QualityIssue>,
    ) -> DimensionScore {
        let score = score.clamp(0.0, 1.0);
        let benchmark = self.config.dimension_benchmark;
        if score < benchmark {
            issues.push(QualityIssue {
                issue_type: IssueType::LowDimensionScore,
                dimension,
                severity: self.config.severity(score, benchmark),
                attribute: None,
                message: format!("{dimension} score {score:.2} is below {benchmark:.2}"),
                observed: score,
                expected: benchmark,
            });
        }
        DimensionScore {
            dimension,
            score,
            details,
            issues,
        }
    }
}

fn mean_or_zero(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::AttributeAnalyzer;
    use crate::sampling::{SamplingParams, TimeRange};
    use crate::schema::ProfileDepth;
    use serde_json::{json, Value};

    fn sample_of(records: Vec<Value>) -> DataSample {
        let params = SamplingParams::new("PageView", TimeRange::last(Duration::from_secs(3600)));
        let records = records
            .into_iter()
            .filter_map(|r| r.as_object().cloned())
            .collect();
        DataSample::new(&params, records, 0, "test")
    }

    fn assess(sample: &DataSample, now: DateTime<Utc>) -> QualityReport {
        let attributes = AttributeAnalyzer::default().analyze_sample(sample, ProfileDepth::Standard);
        QualityAssessor::default().assess("PageView", sample, &attributes, now)
    }

    #[test]
    fn test_empty_sample_scores_zero() {
        let report = assess(&sample_of(Vec::new()), Utc::now());
        assert_eq!(report.overall_score, 0.0);
        assert_eq!(report.score(QualityDimension::Completeness), 0.0);
        assert_eq!(report.issues[0].issue_type, IssueType::NoData);
        assert_eq!(report.max_severity(), Some(Severity::Critical));
        assert_eq!(report.recommendations.len(), 1);
    }

    #[test]
    fn test_clean_fresh_sample_scores_high() {
        let now = Utc::now();
        let records = (0..50)
            .map(|i| {
                json!({
                    "timestamp": (now - chrono::Duration::seconds(i)).timestamp_millis(),
                    "pageUrl": format!("https://example.com/page/{i}"),
                    "duration": i as f64 / 10.0,
                })
            })
            .collect();
        let report = assess(&sample_of(records), now);
        assert!(report.overall_score > 0.95, "score {}", report.overall_score);
        assert!(report.issues.is_empty(), "{:?}", report.issues);
        assert_eq!(report.metrics().timeliness, 1.0);
    }

    #[test]
    fn test_null_rate_above_benchmark_is_flagged() {
        let now = Utc::now();
        let records = (0..100)
            .map(|i| {
                if i % 20 < 3 {
                    json!({"timestamp": now.timestamp_millis(), "userAgent": null})
                } else {
                    json!({"timestamp": now.timestamp_millis(), "userAgent": "Mozilla/5.0"})
                }
            })
            .collect();
        let report = assess(&sample_of(records), now);

        let issue = report
            .issues_for("userAgent")
            .find(|i| i.issue_type == IssueType::LowCompleteness)
            .expect("completeness issue");
        assert!(issue.severity >= Severity::Warning);
        assert!((issue.observed - 0.85).abs() < 1e-9);
        assert!(report
            .recommendations
            .iter()
            .any(|r| r.attribute.as_deref() == Some("userAgent")));
    }

    #[test]
    fn test_stale_and_duplicate_records() {
        let now = Utc::now();
        let old = (now - chrono::Duration::hours(48)).timestamp_millis();
        let records = vec![
            json!({"timestamp": old, "id": 1}),
            json!({"timestamp": old, "id": 1}),
            json!({"timestamp": old, "id": 2}),
            json!({"timestamp": old, "id": 3}),
        ];
        let report = assess(&sample_of(records), now);
        assert_eq!(report.score(QualityDimension::Timeliness), 0.0);
        assert_eq!(report.score(QualityDimension::Uniqueness), 0.75);
        assert!(report.issues.iter().any(|i| i.issue_type == IssueType::StaleData));
        assert!(report
            .issues
            .iter()
            .any(|i| i.issue_type == IssueType::DuplicateRecords));
    }

    #[test]
    fn test_missing_timestamps_score_neutral() {
        let records = vec![json!({"name": "a"}), json!({"name": "b"})];
        let report = assess(&sample_of(records), Utc::now());
        assert_eq!(report.score(QualityDimension::Timeliness), 0.5);
        assert!(report
            .issues
            .iter()
            .any(|i| i.issue_type == IssueType::MissingTimestamps && i.severity == Severity::Info));
    }

    #[test]
    fn test_config_validation() {
        assert!(QualityConfig::default().validate().is_ok());
        assert!(QualityConfig::default()
            .with_expected_completeness(1.5)
            .validate()
            .is_err());
        let zero = QualityWeights {
            completeness: 0.0,
            consistency: 0.0,
            timeliness: 0.0,
            uniqueness: 0.0,
            validity: 0.0,
        };
        assert!(QualityConfig::default().with_weights(zero).validate().is_err());
        assert_eq!(
            QualityConfig::default()
                .with_completeness_override("userAgent", 0.5)
                .expected_completeness_for("userAgent"),
            0.5
        );
    }
}
