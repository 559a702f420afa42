//! Cardinality and type-dependent summary statistics.

use std::collections::HashMap;

use serde_json::Value;

use super::inference::value_as_timestamp;
use crate::patterns::math;
use crate::schema::{CardinalityProfile, DataType, Statistics, ValueCount};

/// Key used to compare values for distinctness.
pub(crate) fn value_key(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Distinct-value profile over the non-null values.
pub fn cardinality(
    values: &[&Value],
    top_n: usize,
    high_ratio: f64,
    high_min_unique: u64,
) -> CardinalityProfile {
    let mut counts: HashMap<String, u64> = HashMap::new();
    let mut total = 0u64;
    for value in values.iter().filter(|v| !v.is_null()) {
        total += 1;
        *counts.entry(value_key(value)).or_default() += 1;
    }
    if total == 0 {
        return CardinalityProfile::default();
    }

    let unique_count = counts.len() as u64;
    let unique_ratio = unique_count as f64 / total as f64;
    let mut top_values: Vec<ValueCount> = counts
        .into_iter()
        .map(|(value, count)| ValueCount { value, count })
        .collect();
    top_values.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.value.cmp(&b.value)));
    top_values.truncate(top_n);

    CardinalityProfile {
        unique_count,
        total_count: total,
        unique_ratio,
        is_high_cardinality: unique_ratio >= high_ratio && unique_count >= high_min_unique,
        top_values,
    }
}

/// Statistics appropriate for `data_type`; `Statistics::None` when no value
/// of that shape is present.
pub fn statistics(data_type: DataType, values: &[&Value]) -> Statistics {
    match data_type {
        DataType::Numeric => numeric(values),
        DataType::String => string(values),
        DataType::Timestamp => timestamp(values),
        DataType::Boolean => boolean(values),
        _ => Statistics::None,
    }
}

fn numeric(values: &[&Value]) -> Statistics {
    let numbers: Vec<f64> = values
        .iter()
        .filter_map(|v| v.as_f64())
        .filter(|v| v.is_finite())
        .collect();
    if numbers.is_empty() {
        return Statistics::None;
    }
    let sorted = math::sorted(&numbers);
    Statistics::Numeric {
        min: sorted[0],
        max: sorted[sorted.len() - 1],
        mean: math::mean(&numbers),
        std_dev: math::std_dev(&numbers),
        median: math::percentile(&sorted, 0.5),
        p95: math::percentile(&sorted, 0.95),
    }
}

fn string(values: &[&Value]) -> Statistics {
    let lengths: Vec<usize> = values
        .iter()
        .filter_map(|v| v.as_str())
        .map(|s| s.chars().count())
        .collect();
    let (Some(min), Some(max)) = (lengths.iter().min(), lengths.iter().max()) else {
        return Statistics::None;
    };
    Statistics::String {
        min_length: *min,
        max_length: *max,
        mean_length: lengths.iter().sum::<usize>() as f64 / lengths.len() as f64,
    }
}

fn timestamp(values: &[&Value]) -> Statistics {
    let mut millis: Vec<i64> = values
        .iter()
        .filter_map(|v| value_as_timestamp(v))
        .map(|t| t.timestamp_millis())
        .collect();
    millis.sort_unstable();
    millis.dedup();
    let (Some(first), Some(last)) = (millis.first(), millis.last()) else {
        return Statistics::None;
    };
    let granularity_ms = millis.windows(2).map(|w| w[1] - w[0]).filter(|d| *d > 0).min();
    match (
        chrono::DateTime::from_timestamp_millis(*first),
        chrono::DateTime::from_timestamp_millis(*last),
    ) {
        (Some(earliest), Some(latest)) => Statistics::Timestamp {
            earliest,
            latest,
            granularity_ms,
        },
        _ => Statistics::None,
    }
}

fn boolean(values: &[&Value]) -> Statistics {
    let flags: Vec<bool> = values.iter().filter_map(|v| v.as_bool()).collect();
    if flags.is_empty() {
        return Statistics::None;
    }
    Statistics::Boolean {
        true_ratio: flags.iter().filter(|b| **b).count() as f64 / flags.len() as f64,
    }
}
