use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::schema::QualityMetrics;

/// The five scored quality dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityDimension {
    Completeness,
    Consistency,
    Timeliness,
    Uniqueness,
    Validity,
}

impl QualityDimension {
    pub const ALL: [QualityDimension; 5] = [
        Self::Completeness,
        Self::Consistency,
        Self::Timeliness,
        Self::Uniqueness,
        Self::Validity,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completeness => "completeness",
            Self::Consistency => "consistency",
            Self::Timeliness => "timeliness",
            Self::Uniqueness => "uniqueness",
            Self::Validity => "validity",
        }
    }
}

impl fmt::Display for QualityDimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Issue severity, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Critical => "critical",
        })
    }
}

/// What kind of problem an issue describes; recommendations are keyed on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueType {
    NoData,
    LowCompleteness,
    InconsistentFormat,
    InvalidValues,
    StaleData,
    MissingTimestamps,
    DuplicateRecords,
    DuplicateKeys,
    LowDimensionScore,
}

/// A problem found during assessment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityIssue {
    pub issue_type: IssueType,
    pub dimension: QualityDimension,
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribute: Option<String>,
    pub message: String,
    /// Observed score or ratio.
    pub observed: f64,
    /// Benchmark it was compared against.
    pub expected: f64,
}

/// Score for one dimension, with the issues raised under it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionScore {
    pub dimension: QualityDimension,
    pub score: f64,
    pub details: String,
    pub issues: Vec<QualityIssue>,
}

/// A suggested fix for one issue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityRecommendation {
    pub issue_type: IssueType,
    pub priority: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribute: Option<String>,
    pub action: String,
}

/// Result of assessing one schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    pub schema_name: String,
    pub assessed_at: DateTime<Utc>,
    /// Weighted mean of the dimension scores, in [0, 1].
    pub overall_score: f64,
    pub dimensions: Vec<DimensionScore>,
    pub issues: Vec<QualityIssue>,
    pub recommendations: Vec<QualityRecommendation>,
}

impl QualityReport {
    pub fn dimension(&self, dimension: QualityDimension) -> Option<&DimensionScore> {
        self.dimensions.iter().find(|d| d.dimension == dimension)
    }

    pub fn score(&self, dimension: QualityDimension) -> f64 {
        self.dimension(dimension).map_or(0.0, |d| d.score)
    }

    /// Issues raised for `attribute`, most severe first.
    pub fn issues_for<'a>(&'a self, attribute: &'a str) -> impl Iterator<Item = &'a QualityIssue> + 'a {
        self.issues
            .iter()
            .filter(move |i| i.attribute.as_deref() == Some(attribute))
    }

    pub fn max_severity(&self) -> Option<Severity> {
        self.issues.iter().map(|i| i.severity).max()
    }

    /// Summary stored on the schema.
    pub fn metrics(&self) -> QualityMetrics {
        QualityMetrics {
            overall_score: self.overall_score,
            completeness: self.score(QualityDimension::Completeness),
            consistency: self.score(QualityDimension::Consistency),
            timeliness: self.score(QualityDimension::Timeliness),
            uniqueness: self.score(QualityDimension::Uniqueness),
            validity: self.score(QualityDimension::Validity),
        }
    }
}
