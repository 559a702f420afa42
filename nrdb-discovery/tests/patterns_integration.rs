//! Pattern detection on record rates and attribute values.

use std::f64::consts::PI;
use std::sync::Arc;
use std::time::Duration;

use nrdb_discovery::context::QueryContext;
use nrdb_discovery::engine::{DiscoveryEngine, EngineConfig};
use nrdb_discovery::patterns::{PatternEngine, PatternInput, PatternType};
use nrdb_discovery::sampling::TimeRange;
use nrdb_discovery::schema::{DataType, ProfileDepth};
use nrdb_discovery::testing::{record, MockNrdbClient};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::{json, Value};

const HOURS_PER_WEEK: usize = 24 * 7;

/// Four weeks of hourly traffic whose volume follows a weekly cycle.
fn weekly_traffic(range: &TimeRange) -> Vec<nrdb_discovery::client::Record> {
    let start_ms = range.start.timestamp_millis();
    let hours = (range.duration().num_hours()) as usize;
    let mut records = Vec::new();
    for hour in 0..hours {
        let phase = 2.0 * PI * hour as f64 / HOURS_PER_WEEK as f64;
        let per_hour = (20.0 + 15.0 * phase.sin()).round() as i64;
        let spacing_ms = 3_600_000 / per_hour;
        for k in 0..per_hour {
            let timestamp = start_ms + hour as i64 * 3_600_000 + k * spacing_ms + spacing_ms / 2;
            records.push(record(json!({
                "timestamp": timestamp,
                "latency": 0.2 + (k % 5) as f64 * 0.01,
            })));
        }
    }
    records
}

#[tokio::test]
async fn test_weekly_seasonality_in_record_rate() {
    let window = Duration::from_secs(28 * 24 * 3600);
    let range = TimeRange::last(window);
    let mock = MockNrdbClient::new().with_event_type("Request", weekly_traffic(&range));

    let mut config = EngineConfig::default().with_discovery_window(window);
    config.rate_series_buckets = 28 * 24;
    let engine = DiscoveryEngine::new(Arc::new(mock), config).unwrap();

    let schema = engine
        .profile_schema(&QueryContext::background(), "Request", ProfileDepth::Standard)
        .await
        .unwrap();

    let seasonal = schema
        .patterns
        .iter()
        .find(|p| p.attribute.is_none() && p.pattern.pattern_type == PatternType::Seasonal)
        .expect("seasonal record rate");
    let period = seasonal.pattern.parameter_f64("period").unwrap();
    // Seven days of hourly buckets.
    assert!((period - 168.0).abs() <= 8.0, "period {period}");
    assert!(seasonal.confidence() >= 0.5);
}

#[test]
fn test_daily_cycle_in_sampled_series() {
    let samples_per_day = 24;
    let mut rng = StdRng::seed_from_u64(7);
    let series: Vec<f64> = (0..samples_per_day * 14)
        .map(|t| {
            let phase = 2.0 * PI * t as f64 / samples_per_day as f64;
            500.0 + 120.0 * phase.sin() + rng.random_range(-10.0..10.0)
        })
        .collect();

    let patterns = PatternEngine::default().detect_series("throughput", &series);
    let seasonal = patterns
        .iter()
        .find(|p| p.pattern_type == PatternType::Seasonal)
        .expect("seasonal pattern");
    assert_eq!(seasonal.parameter_f64("period"), Some(samples_per_day as f64));
    assert!(seasonal.confidence >= 0.5);
}

#[test]
fn test_attribute_values_reveal_formats() {
    let values: Vec<Value> = (0..200)
        .map(|i| json!(format!("user{}@example.com", i)))
        .collect();
    let patterns = PatternEngine::default().detect(&PatternInput::new("contact", DataType::String, &values));
    assert!(patterns.iter().any(|p| p.pattern_type == PatternType::Format));
    for pattern in &patterns {
        assert!((0.0..=1.0).contains(&pattern.confidence));
    }
}

#[test]
fn test_spike_is_reported_as_anomaly() {
    let mut rng = StdRng::seed_from_u64(21);
    let mut series: Vec<f64> = (0..300).map(|_| 100.0 + rng.random_range(-2.0..2.0)).collect();
    series[250] = 400.0;

    let patterns = PatternEngine::default().detect_series("errors", &series);
    let anomaly = patterns
        .iter()
        .find(|p| p.pattern_type == PatternType::Anomaly)
        .expect("anomaly");
    assert!(anomaly.confidence >= 0.5);
}
