//! Pattern detection over attribute values and time series.
//!
//! The [`PatternEngine`] runs a set of independent [`PatternDetector`]s and
//! returns the union of their findings. Findings are never mutually
//! exclusive: an attribute may be both seasonal and trending, and callers
//! rank by confidence.
//!
//! ```rust
//! use nrdb_discovery::patterns::{PatternEngine, PatternInput, PatternType};
//! use nrdb_discovery::schema::DataType;
//! use serde_json::json;
//!
//! let values: Vec<_> = (0..50).map(|i| json!(format!("user{i}@example.com"))).collect();
//! let engine = PatternEngine::default();
//! let patterns = engine.detect(&PatternInput::new("email", DataType::String, &values));
//! assert!(patterns.iter().any(|p| p.pattern_type == PatternType::Format));
//! ```

mod distribution;
mod format;
pub mod math;
mod sequence;
mod time_series;
mod types;

use serde_json::Value;

use crate::schema::DataType;

pub use distribution::{DistributionDetector, DistributionFit};
pub use format::{FormatDetector, FormatKind};
pub use sequence::SequenceDetector;
pub use time_series::TimeSeriesDetector;
pub use types::{DetectedPattern, Pattern, PatternType};

/// Thresholds for every detector.
#[derive(Debug, Clone)]
pub struct PatternConfig {
    /// Findings below this confidence are dropped by the engine (default: 0.5).
    pub min_confidence: f64,
    /// Minimum non-null values for value-based detectors (default: 5).
    pub min_values: usize,
    /// Minimum points for time-series checks (default: 12).
    pub min_series_length: usize,
    /// |t| above which a slope counts as a trend (default: 2.0).
    pub trend_t_threshold: f64,
    /// Minimum spectral strength for seasonality (default: 0.5).
    pub seasonality_threshold: f64,
    /// Rolling baseline length for anomalies (default: 24).
    pub anomaly_window: usize,
    /// z-score above which a point is anomalous (default: 3.0).
    pub anomaly_z_threshold: f64,
    /// Variance ratio that marks a change point (default: 4.0).
    pub change_variance_ratio: f64,
    /// Minimum values for distribution fitting (default: 30).
    pub min_distribution_values: usize,
    /// Minimum fit score to report a distribution (default: 0.6).
    pub distribution_threshold: f64,
    /// Share of values that must match a format (default: 0.8).
    pub format_match_ratio: f64,
    /// Share of steps that must agree for a sequence (default: 0.9).
    pub sequence_match_ratio: f64,
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.5,
            min_values: 5,
            min_series_length: 12,
            trend_t_threshold: 2.0,
            seasonality_threshold: 0.5,
            anomaly_window: 24,
            anomaly_z_threshold: 3.0,
            change_variance_ratio: 4.0,
            min_distribution_values: 30,
            distribution_threshold: 0.6,
            format_match_ratio: 0.8,
            sequence_match_ratio: 0.9,
        }
    }
}

/// Ordered values of one attribute, oldest first.
#[derive(Debug, Clone, Copy)]
pub struct PatternInput<'a> {
    pub attribute: &'a str,
    pub data_type: DataType,
    pub values: &'a [Value],
}

impl<'a> PatternInput<'a> {
    pub fn new(attribute: &'a str, data_type: DataType, values: &'a [Value]) -> Self {
        Self {
            attribute,
            data_type,
            values,
        }
    }

    /// Finite numeric values in order; numeric strings are accepted.
    pub fn numbers(&self) -> Vec<f64> {
        self.values
            .iter()
            .filter_map(|v| match v {
                Value::Number(n) => n.as_f64(),
                Value::String(s) => s.trim().parse::<f64>().ok(),
                _ => None,
            })
            .filter(|v| v.is_finite())
            .collect()
    }

    /// String values in order.
    pub fn strings(&self) -> Vec<&'a str> {
        self.values.iter().filter_map(Value::as_str).collect()
    }
}

/// An independent pattern detector.
pub trait PatternDetector: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether the detector applies to attributes of this type.
    fn supports(&self, data_type: DataType) -> bool;

    fn detect(&self, input: &PatternInput<'_>) -> Vec<Pattern>;
}

/// Runs all registered detectors.
pub struct PatternEngine {
    detectors: Vec<Box<dyn PatternDetector>>,
    time_series: TimeSeriesDetector,
    min_confidence: f64,
}

impl PatternEngine {
    /// Engine with the time-series, distribution, format and sequence detectors.
    pub fn new(config: PatternConfig) -> Self {
        Self {
            detectors: vec![
                Box::new(TimeSeriesDetector::new(&config)),
                Box::new(DistributionDetector::new(&config)),
                Box::new(FormatDetector::new(&config)),
                Box::new(SequenceDetector::new(&config)),
            ],
            time_series: TimeSeriesDetector::new(&config),
            min_confidence: config.min_confidence,
        }
    }

    /// Adds a detector.
    pub fn with_detector(mut self, detector: Box<dyn PatternDetector>) -> Self {
        self.detectors.push(detector);
        self
    }

    pub fn detector_names(&self) -> Vec<&'static str> {
        self.detectors.iter().map(|d| d.name()).collect()
    }

    /// Union of all applicable detectors' findings, most confident first.
    pub fn detect(&self, input: &PatternInput<'_>) -> Vec<Pattern> {
        let mut patterns: Vec<Pattern> = self
            .detectors
            .iter()
            .filter(|d| d.supports(input.data_type))
            .flat_map(|d| d.detect(input))
            .filter(|p| p.confidence >= self.min_confidence)
            .collect();
        patterns.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        patterns
    }

    /// Time-series findings for an evenly bucketed series, such as a
    /// per-hour record count.
    pub fn detect_series(&self, name: &str, series: &[f64]) -> Vec<Pattern> {
        let mut patterns: Vec<Pattern> = self
            .time_series
            .analyze(name, series)
            .into_iter()
            .filter(|p| p.confidence >= self.min_confidence)
            .collect();
        patterns.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        patterns
    }
}

impl Default for PatternEngine {
    fn default() -> Self {
        Self::new(PatternConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct AlwaysDetector;

    impl PatternDetector for AlwaysDetector {
        fn name(&self) -> &'static str {
            "always"
        }

        fn supports(&self, _data_type: DataType) -> bool {
            true
        }

        fn detect(&self, input: &PatternInput<'_>) -> Vec<Pattern> {
            vec![
                Pattern::new(PatternType::Format, 0.95, format!("{} seen", input.attribute)),
                Pattern::new(PatternType::Format, 0.1, "weak"),
            ]
        }
    }

    #[test]
    fn test_engine_unions_and_filters() {
        let engine = PatternEngine::default().with_detector(Box::new(AlwaysDetector));
        assert_eq!(
            engine.detector_names(),
            vec!["time_series", "distribution", "format", "sequence", "always"]
        );

        let values: Vec<Value> = (0..30).map(|i| json!(i * 2)).collect();
        let patterns = engine.detect(&PatternInput::new("counter", DataType::Numeric, &values));

        // Sequence from the built-in detectors, strong finding from the custom one.
        assert!(patterns.iter().any(|p| p.pattern_type == PatternType::Sequence));
        assert!(patterns.iter().any(|p| p.description == "counter seen"));
        assert!(patterns.iter().all(|p| p.confidence >= 0.5));
        for pair in patterns.windows(2) {
            assert!(pair[0].confidence >= pair[1].confidence);
        }
    }

    #[test]
    fn test_input_accessors() {
        let values = vec![json!(1), json!("2.5"), json!(null), json!("abc"), json!(true)];
        let input = PatternInput::new("mixed", DataType::Unknown, &values);
        assert_eq!(input.numbers(), vec![1.0, 2.5]);
        assert_eq!(input.strings(), vec!["2.5", "abc"]);
    }
}
