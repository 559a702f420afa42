use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Kind of pattern a detector can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternType {
    Seasonal,
    Trend,
    Anomaly,
    ChangePoint,
    Distribution,
    Format,
    Sequence,
}

impl fmt::Display for PatternType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Seasonal => "seasonal",
            Self::Trend => "trend",
            Self::Anomaly => "anomaly",
            Self::ChangePoint => "change_point",
            Self::Distribution => "distribution",
            Self::Format => "format",
            Self::Sequence => "sequence",
        };
        f.write_str(name)
    }
}

/// A confidence-scored finding about one attribute's values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    pub pattern_type: PatternType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtype: Option<String>,
    /// Always within [0, 1].
    pub confidence: f64,
    pub description: String,
    #[serde(default)]
    pub parameters: HashMap<String, Value>,
}

impl Pattern {
    pub fn new(pattern_type: PatternType, confidence: f64, description: impl Into<String>) -> Self {
        Self {
            pattern_type,
            subtype: None,
            confidence: if confidence.is_finite() {
                confidence.clamp(0.0, 1.0)
            } else {
                0.0
            },
            description: description.into(),
            parameters: HashMap::new(),
        }
    }

    pub fn with_subtype(mut self, subtype: impl Into<String>) -> Self {
        self.subtype = Some(subtype.into());
        self
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    /// Reads a numeric parameter.
    pub fn parameter_f64(&self, key: &str) -> Option<f64> {
        self.parameters.get(key).and_then(Value::as_f64)
    }
}

/// A pattern attached to the schema (and attribute) that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedPattern {
    pub event_type: String,
    /// `None` for schema-level patterns such as the record-rate series.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribute: Option<String>,
    #[serde(flatten)]
    pub pattern: Pattern,
}

impl DetectedPattern {
    pub fn new(event_type: impl Into<String>, attribute: Option<String>, pattern: Pattern) -> Self {
        Self {
            event_type: event_type.into(),
            attribute,
            pattern,
        }
    }

    pub fn confidence(&self) -> f64 {
        self.pattern.confidence
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confidence_is_clamped() {
        assert_eq!(Pattern::new(PatternType::Trend, 1.7, "up").confidence, 1.0);
        assert_eq!(Pattern::new(PatternType::Trend, -0.2, "down").confidence, 0.0);
        assert_eq!(Pattern::new(PatternType::Trend, f64::NAN, "?").confidence, 0.0);
    }

    #[test]
    fn test_detected_pattern_serializes_flat() {
        let detected = DetectedPattern::new(
            "Transaction",
            Some("duration".to_string()),
            Pattern::new(PatternType::Seasonal, 0.8, "daily cycle").with_parameter("period", 24),
        );
        let json = serde_json::to_value(&detected).unwrap();
        assert_eq!(json["pattern_type"], "seasonal");
        assert_eq!(json["parameters"]["period"], 24);
        assert_eq!(json["attribute"], "duration");
    }
}
