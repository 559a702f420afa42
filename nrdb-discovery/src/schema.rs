//! Discovered schema model: event types, their attributes and the profiles
//! attached to them.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::{DiscoveryError, Result};
use crate::patterns::{DetectedPattern, Pattern};

/// Primitive type inferred from value shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    String,
    Numeric,
    Boolean,
    Timestamp,
    Json,
    Array,
    Unknown,
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::String => "string",
            Self::Numeric => "numeric",
            Self::Boolean => "boolean",
            Self::Timestamp => "timestamp",
            Self::Json => "json",
            Self::Array => "array",
            Self::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Meaning inferred from attribute names and value formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SemanticType {
    Identifier,
    Email,
    Url,
    Ip,
    Uuid,
    Currency,
    Duration,
    Percentage,
    Timestamp,
    Json,
    Count,
    Category,
    Custom,
}

impl fmt::Display for SemanticType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Identifier => "identifier",
            Self::Email => "email",
            Self::Url => "url",
            Self::Ip => "ip",
            Self::Uuid => "uuid",
            Self::Currency => "currency",
            Self::Duration => "duration",
            Self::Percentage => "percentage",
            Self::Timestamp => "timestamp",
            Self::Json => "json",
            Self::Count => "count",
            Self::Category => "category",
            Self::Custom => "custom",
        };
        f.write_str(name)
    }
}

/// A value and how often it occurred.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueCount {
    pub value: String,
    pub count: u64,
}

/// Distinct-value profile of one attribute.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CardinalityProfile {
    /// Distinct non-null values in the sample.
    pub unique_count: u64,
    /// Non-null values in the sample.
    pub total_count: u64,
    /// `unique_count / total_count`, 0 when there are no values.
    pub unique_ratio: f64,
    pub is_high_cardinality: bool,
    /// Most frequent values, most frequent first.
    pub top_values: Vec<ValueCount>,
}

/// Type-dependent summary statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Statistics {
    Numeric {
        min: f64,
        max: f64,
        mean: f64,
        std_dev: f64,
        median: f64,
        p95: f64,
    },
    String {
        min_length: usize,
        max_length: usize,
        mean_length: f64,
    },
    Timestamp {
        earliest: DateTime<Utc>,
        latest: DateTime<Utc>,
        /// Smallest positive gap between consecutive distinct timestamps.
        granularity_ms: Option<i64>,
    },
    Boolean {
        true_ratio: f64,
    },
    None,
}

/// Per-attribute quality scores, each in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AttributeQuality {
    pub completeness: f64,
    pub validity: f64,
    pub consistency: f64,
}

impl Default for AttributeQuality {
    fn default() -> Self {
        Self {
            completeness: 0.0,
            validity: 1.0,
            consistency: 1.0,
        }
    }
}

/// One attribute of a schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    pub data_type: DataType,
    pub semantic_type: SemanticType,
    pub cardinality: CardinalityProfile,
    pub statistics: Statistics,
    /// Fraction of sampled records where the attribute is missing or null.
    pub null_ratio: f64,
    #[serde(default)]
    pub patterns: Vec<Pattern>,
    pub quality: AttributeQuality,
    /// Raw sampled values, only filled for [`ProfileDepth::Full`].
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sample_values: Vec<Value>,
}

impl Attribute {
    pub fn is_numeric(&self) -> bool {
        self.data_type == DataType::Numeric
    }
}

/// How much data volume an event type carries in the discovery window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DataVolumeProfile {
    pub total_records: u64,
    pub window_minutes: i64,
    pub events_per_minute: f64,
    pub estimated_daily_volume: u64,
}

impl DataVolumeProfile {
    pub fn new(total_records: u64, window_minutes: i64) -> Self {
        let minutes = window_minutes.max(1);
        let events_per_minute = total_records as f64 / minutes as f64;
        Self {
            total_records,
            window_minutes: minutes,
            events_per_minute,
            estimated_daily_volume: (events_per_minute * 60.0 * 24.0).round() as u64,
        }
    }
}

/// Quality scores summarised on the schema.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct QualityMetrics {
    pub overall_score: f64,
    pub completeness: f64,
    pub consistency: f64,
    pub timeliness: f64,
    pub uniqueness: f64,
    pub validity: f64,
}

/// How much detail [`crate::engine::DiscoveryEngine::profile_schema`] collects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileDepth {
    /// Types, cardinality and statistics only.
    Basic,
    /// Adds pattern detection and quality assessment.
    #[default]
    Standard,
    /// Adds raw sample values per attribute.
    Full,
}

impl ProfileDepth {
    pub fn detects_patterns(&self) -> bool {
        !matches!(self, Self::Basic)
    }

    pub fn assesses_quality(&self) -> bool {
        !matches!(self, Self::Basic)
    }

    pub fn includes_samples(&self) -> bool {
        matches!(self, Self::Full)
    }
}

impl FromStr for ProfileDepth {
    type Err = DiscoveryError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "basic" => Ok(Self::Basic),
            "standard" => Ok(Self::Standard),
            "full" => Ok(Self::Full),
            other => Err(DiscoveryError::configuration(format!(
                "unknown profile depth '{other}'"
            ))),
        }
    }
}

/// A discovered event type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    /// Stable identifier derived from the event type name.
    pub id: String,
    pub name: String,
    pub attributes: Vec<Attribute>,
    pub sample_count: u64,
    pub data_volume: DataVolumeProfile,
    pub quality: QualityMetrics,
    #[serde(default)]
    pub patterns: Vec<DetectedPattern>,
    pub discovered_at: DateTime<Utc>,
    pub last_analyzed_at: DateTime<Utc>,
}

impl Schema {
    pub fn new(name: impl Into<String>, attributes: Vec<Attribute>) -> Self {
        let name = name.into();
        let now = Utc::now();
        Self {
            id: Self::id_for(&name),
            name,
            attributes,
            sample_count: 0,
            data_volume: DataVolumeProfile::default(),
            quality: QualityMetrics::default(),
            patterns: Vec::new(),
            discovered_at: now,
            last_analyzed_at: now,
        }
    }

    /// Stable id: the first 16 hex digits of SHA-256 over the name.
    pub fn id_for(name: &str) -> String {
        let digest = Sha256::digest(name.as_bytes());
        hex::encode(&digest[..8])
    }

    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.name == name)
    }

    pub fn numeric_attributes(&self) -> impl Iterator<Item = &Attribute> {
        self.attributes.iter().filter(|a| a.is_numeric())
    }

    /// Marks the schema as re-analyzed, keeping `discovered_at <= last_analyzed_at`.
    pub fn touch(&mut self, at: DateTime<Utc>) {
        self.last_analyzed_at = at.max(self.discovered_at);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_schema_id_is_stable() {
        assert_eq!(Schema::id_for("Transaction"), Schema::id_for("Transaction"));
        assert_ne!(Schema::id_for("Transaction"), Schema::id_for("PageView"));
        assert_eq!(Schema::id_for("Transaction").len(), 16);
    }

    #[test]
    fn test_touch_keeps_timestamps_ordered() {
        let mut schema = Schema::new("Transaction", Vec::new());
        let discovered = schema.discovered_at;
        schema.touch(discovered - Duration::hours(1));
        assert_eq!(schema.last_analyzed_at, discovered);
        schema.touch(discovered + Duration::hours(1));
        assert!(schema.last_analyzed_at > schema.discovered_at);
    }

    #[test]
    fn test_volume_profile() {
        let volume = DataVolumeProfile::new(6_000, 60);
        assert_eq!(volume.events_per_minute, 100.0);
        assert_eq!(volume.estimated_daily_volume, 144_000);
    }

    #[test]
    fn test_depth_parsing() {
        assert_eq!("FULL".parse::<ProfileDepth>().unwrap(), ProfileDepth::Full);
        assert!(!ProfileDepth::Basic.detects_patterns());
        assert!(ProfileDepth::Full.includes_samples());
        assert!("deep".parse::<ProfileDepth>().is_err());
    }
}
