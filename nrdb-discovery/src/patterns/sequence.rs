use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;

use super::{Pattern, PatternConfig, PatternDetector, PatternInput, PatternType};
use crate::schema::DataType;

static NUMERIC_SUFFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(.*?)(\d+)$").unwrap());

/// Arithmetic and string-increment sequences in ordered values.
#[derive(Debug, Clone)]
pub struct SequenceDetector {
    min_values: usize,
    min_ratio: f64,
}

impl SequenceDetector {
    pub fn new(config: &PatternConfig) -> Self {
        Self {
            min_values: config.min_values,
            min_ratio: config.sequence_match_ratio,
        }
    }

    /// Most common non-zero step between consecutive values and the share of
    /// steps equal to it.
    fn dominant_step(values: &[f64]) -> Option<(f64, f64)> {
        let steps: Vec<f64> = values.windows(2).map(|w| w[1] - w[0]).collect();
        if steps.is_empty() {
            return None;
        }
        let mut counts: HashMap<i64, usize> = HashMap::new();
        for step in &steps {
            // Steps are compared at micro-unit precision.
            *counts.entry((step * 1e6).round() as i64).or_default() += 1;
        }
        let (step, count) = counts
            .into_iter()
            .filter(|(step, _)| *step != 0)
            .max_by_key(|(step, count)| (*count, -step.abs()))?;
        Some((step as f64 / 1e6, count as f64 / steps.len() as f64))
    }

    fn arithmetic(&self, name: &str, values: &[f64]) -> Option<Pattern> {
        let (step, ratio) = Self::dominant_step(values)?;
        (ratio >= self.min_ratio).then(|| {
            Pattern::new(
                PatternType::Sequence,
                ratio,
                format!("'{name}' advances by {step} between records"),
            )
            .with_subtype("arithmetic")
            .with_parameter("step", step)
            .with_parameter("start", values[0])
        })
    }

    fn string_increment(&self, name: &str, values: &[&str]) -> Option<Pattern> {
        let mut prefix: Option<&str> = None;
        let mut numbers = Vec::with_capacity(values.len());
        for value in values {
            let caps = NUMERIC_SUFFIX.captures(value)?;
            let head = caps.get(1).map_or("", |m| m.as_str());
            match prefix {
                None => prefix = Some(head),
                Some(existing) if existing != head => return None,
                Some(_) => {}
            }
            numbers.push(caps.get(2)?.as_str().parse::<f64>().ok()?);
        }
        let prefix = prefix?;
        let (step, ratio) = Self::dominant_step(&numbers)?;
        (ratio >= self.min_ratio).then(|| {
            Pattern::new(
                PatternType::Sequence,
                ratio,
                format!("'{name}' is '{prefix}' followed by a counter stepping by {step}"),
            )
            .with_subtype("string_increment")
            .with_parameter("prefix", prefix)
            .with_parameter("step", step)
        })
    }
}

impl PatternDetector for SequenceDetector {
    fn name(&self) -> &'static str {
        "sequence"
    }

    fn supports(&self, data_type: DataType) -> bool {
        matches!(data_type, DataType::Numeric | DataType::String)
    }

    fn detect(&self, input: &PatternInput<'_>) -> Vec<Pattern> {
        let pattern = match input.data_type {
            DataType::Numeric => {
                let values = input.numbers();
                if values.len() < self.min_values {
                    return Vec::new();
                }
                self.arithmetic(input.attribute, &values)
            }
            _ => {
                let values = input.strings();
                if values.len() < self.min_values {
                    return Vec::new();
                }
                self.string_increment(input.attribute, &values)
            }
        };
        pattern.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn detector() -> SequenceDetector {
        SequenceDetector::new(&PatternConfig::default())
    }

    #[test]
    fn test_arithmetic_sequence() {
        let values: Vec<Value> = (0..20).map(|i| json!(1000 + i * 5)).collect();
        let input = PatternInput::new("order_id", DataType::Numeric, &values);
        let patterns = detector().detect(&input);
        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns[0].subtype.as_deref(), Some("arithmetic"));
        assert_eq!(patterns[0].parameter_f64("step"), Some(5.0));
    }

    #[test]
    fn test_string_increment() {
        let values: Vec<Value> = (1..=12).map(|i| json!(format!("job-{i}"))).collect();
        let input = PatternInput::new("job", DataType::String, &values);
        let patterns = detector().detect(&input);
        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns[0].subtype.as_deref(), Some("string_increment"));
        assert_eq!(patterns[0].parameters["prefix"], "job-");
    }

    #[test]
    fn test_mixed_prefixes_are_not_a_sequence() {
        let values: Vec<Value> = (1..=12)
            .map(|i| json!(if i % 2 == 0 { format!("a{i}") } else { format!("b{i}") }))
            .collect();
        let input = PatternInput::new("id", DataType::String, &values);
        assert!(detector().detect(&input).is_empty());
    }

    #[test]
    fn test_random_numbers_are_not_a_sequence() {
        let values: Vec<Value> = [5, 3, 9, 1, 7, 2, 8, 4, 6, 0].iter().map(|v| json!(v)).collect();
        let input = PatternInput::new("x", DataType::Numeric, &values);
        assert!(detector().detect(&input).is_empty());
    }
}
