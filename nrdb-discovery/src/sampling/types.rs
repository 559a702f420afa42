use std::collections::HashMap;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::client::Record;
use crate::error::{DiscoveryError, Result};

/// Half-open time window `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// The window of length `duration` ending now.
    pub fn last(duration: std::time::Duration) -> Self {
        Self::ending_at(Utc::now(), duration)
    }

    /// The window of length `duration` ending at `end`.
    pub fn ending_at(end: DateTime<Utc>, duration: std::time::Duration) -> Self {
        let span = ChronoDuration::from_std(duration).unwrap_or(ChronoDuration::MAX);
        let start = end.checked_sub_signed(span).unwrap_or(DateTime::<Utc>::MIN_UTC);
        Self { start, end }
    }

    pub fn duration(&self) -> ChronoDuration {
        self.end - self.start
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.start && at < self.end
    }

    /// Splits the window into `parts` contiguous windows of equal length.
    /// The last part absorbs rounding so the union equals `self`.
    pub fn split(&self, parts: u32) -> Vec<TimeRange> {
        let parts = parts.max(1) as i64;
        let total_ms = self.duration().num_milliseconds().max(0);
        let step = total_ms / parts;
        (0..parts)
            .map(|i| {
                let start = self.start + ChronoDuration::milliseconds(step * i);
                let end = if i == parts - 1 {
                    self.end
                } else {
                    self.start + ChronoDuration::milliseconds(step * (i + 1))
                };
                TimeRange::new(start, end)
            })
            .collect()
    }

    pub fn validate(&self) -> Result<()> {
        if self.end <= self.start {
            return Err(DiscoveryError::configuration(format!(
                "time range end {} must be after start {}",
                self.end, self.start
            )));
        }
        Ok(())
    }
}

/// Input to a sampling strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplingParams {
    pub event_type: String,
    pub time_range: TimeRange,
    /// Upper bound on the number of records returned.
    pub max_samples: u64,
    /// Population size if the caller already knows it; skips the count query.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub known_total: Option<u64>,
    /// Seed for reproducible random choices.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl SamplingParams {
    pub fn new(event_type: impl Into<String>, time_range: TimeRange) -> Self {
        Self {
            event_type: event_type.into(),
            time_range,
            max_samples: 1000,
            known_total: None,
            seed: None,
        }
    }

    pub fn with_max_samples(mut self, max_samples: u64) -> Self {
        self.max_samples = max_samples;
        self
    }

    pub fn with_known_total(mut self, total: u64) -> Self {
        self.known_total = Some(total);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn validate(&self) -> Result<()> {
        crate::security::NrqlSecurity::validate_identifier(&self.event_type)?;
        crate::security::InputValidator::validate_positive(self.max_samples, "max_samples")?;
        self.time_range.validate()
    }
}

/// A representative set of raw records drawn from one event type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataSample {
    pub event_type: String,
    pub records: Vec<Record>,
    pub sample_size: u64,
    /// Estimated number of records in the window.
    pub total_population: u64,
    /// `sample_size / total_population`, capped at 1.
    pub sampling_rate: f64,
    pub strategy: String,
    pub time_range: TimeRange,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

impl DataSample {
    pub fn new(
        params: &SamplingParams,
        records: Vec<Record>,
        total_population: u64,
        strategy: impl Into<String>,
    ) -> Self {
        let sample_size = records.len() as u64;
        // The count may lag the records actually returned.
        let total_population = total_population.max(sample_size);
        let sampling_rate = if total_population == 0 {
            0.0
        } else {
            (sample_size as f64 / total_population as f64).min(1.0)
        };
        Self {
            event_type: params.event_type.clone(),
            records,
            sample_size,
            total_population,
            sampling_rate,
            strategy: strategy.into(),
            time_range: params.time_range,
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Attribute names in first-seen order across all records.
    pub fn attribute_names(&self) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        let mut names = Vec::new();
        for record in &self.records {
            for key in record.keys() {
                if seen.insert(key.as_str()) {
                    names.push(key.clone());
                }
            }
        }
        names
    }

    /// Values of one attribute in record order; missing keys become `Null`.
    pub fn values(&self, attribute: &str) -> Vec<&Value> {
        self.records
            .iter()
            .map(|record| record.get(attribute).unwrap_or(&Value::Null))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn day() -> TimeRange {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        TimeRange::new(start, start + ChronoDuration::days(1))
    }

    #[test]
    fn test_split_covers_range() {
        let parts = day().split(7);
        assert_eq!(parts.len(), 7);
        assert_eq!(parts[0].start, day().start);
        assert_eq!(parts[6].end, day().end);
        for pair in parts.windows(2) {
            assert_eq!(pair[0].end, pair[1].start);
        }
    }

    #[test]
    fn test_contains_is_half_open() {
        let range = day();
        assert!(range.contains(range.start));
        assert!(!range.contains(range.end));
    }

    #[test]
    fn test_params_validation() {
        let params = SamplingParams::new("Transaction", day());
        assert!(params.validate().is_ok());
        assert!(params.clone().with_max_samples(0).validate().is_err());

        let backwards = TimeRange::new(day().end, day().start);
        assert!(SamplingParams::new("Transaction", backwards).validate().is_err());
    }

    #[test]
    fn test_sample_rate_and_attribute_order() {
        let params = SamplingParams::new("PageView", day());
        let records = vec![
            json!({"a": 1, "b": 2}).as_object().cloned().unwrap(),
            json!({"b": 3, "c": null}).as_object().cloned().unwrap(),
        ];
        let sample = DataSample::new(&params, records, 200, "random");

        assert_eq!(sample.sample_size, 2);
        assert!((sample.sampling_rate - 0.01).abs() < 1e-12);
        assert_eq!(sample.attribute_names(), vec!["a", "b", "c"]);
        assert_eq!(sample.values("a")[1], &Value::Null);

        let tiny = DataSample::new(&params, Vec::new(), 0, "random");
        assert_eq!(tiny.sampling_rate, 0.0);
    }
}
