//! In-memory [`NrdbClient`] and record generators for tests and demos.
//!
//! [`MockNrdbClient`] answers the NRQL statements built by [`crate::nrql`]
//! from records registered per event type. Rows are filtered by their
//! `timestamp` attribute (epoch milliseconds) against the statement's
//! `SINCE`/`UNTIL` bounds, newest first, the same way the remote store
//! orders raw selects.
//!
//! ```rust
//! use nrdb_discovery::client::NrdbClient;
//! use nrdb_discovery::context::QueryContext;
//! use nrdb_discovery::nrql::Nrql;
//! use nrdb_discovery::sampling::TimeRange;
//! use nrdb_discovery::testing::{generate_records, MockNrdbClient};
//! use std::time::Duration;
//!
//! # #[tokio::main]
//! # async fn main() -> nrdb_discovery::error::Result<()> {
//! let range = TimeRange::last(Duration::from_secs(3600));
//! let client = MockNrdbClient::new().with_event_type("Transaction", generate_records(&range, 100));
//! let result = client
//!     .query(&QueryContext::background(), &Nrql::count("Transaction", &range)?)
//!     .await?;
//! assert_eq!(result.first_number("count"), Some(100.0));
//! # Ok(())
//! # }
//! ```

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use regex::Regex;
use serde_json::{json, Value};

use crate::analysis::value_as_timestamp;
use crate::client::{NrdbClient, PerformanceInfo, QueryMetadata, QueryResult, Record};
use crate::context::QueryContext;
use crate::error::{DiscoveryError, Result};
use crate::nrql::{COUNT_ALIAS, VALUE_ALIAS};
use crate::sampling::TimeRange;

/// Attribute the mock filters and orders rows by.
pub const TIMESTAMP_FIELD: &str = "timestamp";

static SHOW_EVENT_TYPES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^SHOW EVENT TYPES(?: SINCE (-?\d+) UNTIL (-?\d+))?$").unwrap());

static SELECT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^SELECT (?P<select>.+?) FROM `(?P<event>[^`]+)` SINCE (?P<since>-?\d+) UNTIL (?P<until>-?\d+)(?: TIMESERIES (?P<minutes>\d+) minutes)?(?: LIMIT (?P<limit>\d+))?$",
    )
    .unwrap()
});

static AVERAGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^average\(`(?P<attr>[^`]+)`\) AS '[^']+'$").unwrap());

static ATTRIBUTE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^`(?P<attr>[^`]+)`$").unwrap());

#[derive(Debug, Clone)]
enum Projection {
    Count,
    Average(String),
    All,
    Attribute(String),
}

#[derive(Debug, Clone)]
struct ParsedSelect {
    projection: Projection,
    event_type: String,
    since_ms: i64,
    until_ms: i64,
    bucket_minutes: Option<i64>,
    limit: Option<usize>,
}

#[derive(Debug, Default)]
struct Failures {
    always: Option<DiscoveryError>,
    next: Vec<DiscoveryError>,
    by_event_type: HashMap<String, DiscoveryError>,
}

/// Scripted in-memory client.
///
/// Registration methods consume and return `self`; failure injection works
/// through a shared reference so it can be changed while the client is held
/// in an `Arc`.
#[derive(Debug, Default)]
pub struct MockNrdbClient {
    event_types: BTreeMap<String, Vec<Record>>,
    declared_totals: HashMap<String, u64>,
    latency: Duration,
    failures: Mutex<Failures>,
    calls: AtomicU64,
    log: Mutex<Vec<String>>,
}

impl MockNrdbClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `records` under `event_type`, replacing earlier ones.
    pub fn with_event_type(mut self, event_type: impl Into<String>, records: Vec<Record>) -> Self {
        self.event_types.insert(event_type.into(), records);
        self
    }

    /// Makes count queries report `total` records for `event_type`, scaling
    /// bucketed counts proportionally. Raw selects still return the
    /// registered records, which stand in for a sample of a larger store.
    pub fn with_declared_total(mut self, event_type: impl Into<String>, total: u64) -> Self {
        self.declared_totals.insert(event_type.into(), total);
        self
    }

    /// Delays every response by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Fails every following query with `error`.
    pub fn fail_always(&self, error: DiscoveryError) {
        self.failures.lock().always = Some(error);
    }

    /// Fails the next `times` queries with `error`.
    pub fn fail_next(&self, times: usize, error: DiscoveryError) {
        let mut failures = self.failures.lock();
        failures.next.extend((0..times).map(|_| error.clone()));
    }

    /// Fails every query that reads `event_type`.
    pub fn fail_event_type(&self, event_type: impl Into<String>, error: DiscoveryError) {
        self.failures
            .lock()
            .by_event_type
            .insert(event_type.into(), error);
    }

    /// Removes all injected failures.
    pub fn clear_failures(&self) {
        *self.failures.lock() = Failures::default();
    }

    /// Number of queries received, including failed ones.
    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Every statement received, in order.
    pub fn queries(&self) -> Vec<String> {
        self.log.lock().clone()
    }

    /// Statements received that read `event_type`.
    pub fn queries_for(&self, event_type: &str) -> Vec<String> {
        let quoted = format!("`{event_type}`");
        self.log
            .lock()
            .iter()
            .filter(|q| q.contains(&quoted))
            .cloned()
            .collect()
    }

    fn injected_failure(&self, event_type: Option<&str>) -> Option<DiscoveryError> {
        let mut failures = self.failures.lock();
        if let Some(error) = &failures.always {
            return Some(error.clone());
        }
        if !failures.next.is_empty() {
            return Some(failures.next.remove(0));
        }
        event_type.and_then(|name| failures.by_event_type.get(name).cloned())
    }

    fn show_event_types(&self, since_ms: Option<i64>, until_ms: Option<i64>) -> QueryResult {
        let names: Vec<String> = self
            .event_types
            .iter()
            .filter(|(name, records)| {
                // Empty registrations and declared totals show regardless of the window.
                let (Some(since), Some(until)) = (since_ms, until_ms) else {
                    return true;
                };
                self.declared_totals.contains_key(*name)
                    || records.is_empty()
                    || records.iter().any(|r| in_window(r, since, until))
            })
            .map(|(name, _)| name.clone())
            .collect();
        let rows = names
            .iter()
            .map(|name| object(json!({"eventType": name})))
            .collect();
        let mut result = QueryResult::from_rows(rows);
        result.metadata.event_types = names;
        result
    }

    fn select(&self, parsed: &ParsedSelect) -> Result<QueryResult> {
        let records = self.event_types.get(&parsed.event_type).ok_or_else(|| {
            DiscoveryError::NotFound {
                message: format!("event type '{}' does not exist", parsed.event_type),
            }
        })?;
        let mut matching: Vec<&Record> = records
            .iter()
            .filter(|r| in_window(r, parsed.since_ms, parsed.until_ms))
            .collect();
        matching.sort_by_key(|r| std::cmp::Reverse(millis_of(r).unwrap_or(i64::MIN)));
        let inspected = matching.len() as u64;
        let declared = self.declared_totals.get(&parsed.event_type).copied();

        let rows: Vec<Record> = match (&parsed.projection, parsed.bucket_minutes) {
            (Projection::Count, None) => {
                let count = declared.unwrap_or(inspected);
                vec![object(json!({ COUNT_ALIAS: count }))]
            }
            (Projection::Count, Some(minutes)) => {
                let scale = match declared {
                    Some(total) if inspected > 0 => total as f64 / inspected as f64,
                    _ => 1.0,
                };
                buckets(parsed, minutes)
                    .map(|(begin, end)| {
                        let n = matching.iter().filter(|r| in_window(r, begin, end)).count();
                        let count = (n as f64 * scale).round() as u64;
                        bucket_row(begin, end, COUNT_ALIAS, json!(count))
                    })
                    .collect()
            }
            (Projection::Average(attribute), Some(minutes)) => buckets(parsed, minutes)
                .map(|(begin, end)| {
                    let values: Vec<f64> = matching
                        .iter()
                        .filter(|r| in_window(r, begin, end))
                        .filter_map(|r| r.get(attribute).and_then(Value::as_f64))
                        .collect();
                    let average = if values.is_empty() {
                        Value::Null
                    } else {
                        json!(values.iter().sum::<f64>() / values.len() as f64)
                    };
                    bucket_row(begin, end, VALUE_ALIAS, average)
                })
                .collect(),
            (Projection::Average(attribute), None) => {
                let values: Vec<f64> = matching
                    .iter()
                    .filter_map(|r| r.get(attribute).and_then(Value::as_f64))
                    .collect();
                let average = if values.is_empty() {
                    Value::Null
                } else {
                    json!(values.iter().sum::<f64>() / values.len() as f64)
                };
                vec![object(json!({ VALUE_ALIAS: average }))]
            }
            (Projection::All, _) => limited(&matching, parsed.limit)
                .map(|r| (*r).clone())
                .collect(),
            (Projection::Attribute(attribute), _) => limited(&matching, parsed.limit)
                .map(|r| {
                    let mut row = Record::new();
                    row.insert(
                        attribute.clone(),
                        r.get(attribute).cloned().unwrap_or(Value::Null),
                    );
                    if let Some(ts) = r.get(TIMESTAMP_FIELD) {
                        row.insert(TIMESTAMP_FIELD.to_string(), ts.clone());
                    }
                    row
                })
                .collect(),
        };

        let mut result = QueryResult::from_rows(rows);
        result.metadata = QueryMetadata {
            event_types: vec![parsed.event_type.clone()],
            messages: Vec::new(),
            performance: Some(PerformanceInfo {
                inspected_count: inspected,
                matched_count: result.results.len() as u64,
                wall_clock_time_ms: self.latency.as_millis() as u64,
            }),
        };
        Ok(result)
    }
}

#[async_trait]
impl NrdbClient for MockNrdbClient {
    async fn query(&self, ctx: &QueryContext, nrql: &str) -> Result<QueryResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.log.lock().push(nrql.to_string());
        ctx.check()?;
        if !self.latency.is_zero() {
            ctx.sleep(self.latency).await?;
        }

        let nrql = nrql.trim();
        if let Some(caps) = SHOW_EVENT_TYPES.captures(nrql) {
            if let Some(error) = self.injected_failure(None) {
                return Err(error);
            }
            let since = caps.get(1).and_then(|m| m.as_str().parse().ok());
            let until = caps.get(2).and_then(|m| m.as_str().parse().ok());
            return Ok(self.show_event_types(since, until));
        }

        let parsed = parse_select(nrql)?;
        if let Some(error) = self.injected_failure(Some(&parsed.event_type)) {
            return Err(error);
        }
        self.select(&parsed)
    }
}

fn parse_select(nrql: &str) -> Result<ParsedSelect> {
    let unsupported = || DiscoveryError::invalid_query(format!("unsupported statement: {nrql}"));
    let caps = SELECT.captures(nrql).ok_or_else(unsupported)?;
    let select = &caps["select"];

    let projection = if select.starts_with("count(*)") {
        Projection::Count
    } else if let Some(average) = AVERAGE.captures(select) {
        Projection::Average(average["attr"].to_string())
    } else if select == "*" {
        Projection::All
    } else if let Some(attribute) = ATTRIBUTE.captures(select) {
        Projection::Attribute(attribute["attr"].to_string())
    } else {
        return Err(unsupported());
    };

    let number = |name: &str| caps.name(name).and_then(|m| m.as_str().parse::<i64>().ok());
    Ok(ParsedSelect {
        projection,
        event_type: caps["event"].to_string(),
        since_ms: number("since").ok_or_else(unsupported)?,
        until_ms: number("until").ok_or_else(unsupported)?,
        bucket_minutes: number("minutes").filter(|m| *m > 0),
        limit: number("limit").map(|l| l.max(0) as usize),
    })
}

fn buckets(parsed: &ParsedSelect, minutes: i64) -> impl Iterator<Item = (i64, i64)> {
    let width = minutes * 60_000;
    let (since, until) = (parsed.since_ms, parsed.until_ms);
    let count = ((until - since).max(0) + width - 1) / width;
    (0..count).map(move |i| {
        let begin = since + i * width;
        (begin, (begin + width).min(until))
    })
}

fn bucket_row(begin_ms: i64, end_ms: i64, alias: &str, value: Value) -> Record {
    let mut row = Record::new();
    row.insert("beginTimeSeconds".to_string(), json!(begin_ms / 1000));
    row.insert("endTimeSeconds".to_string(), json!(end_ms / 1000));
    row.insert(alias.to_string(), value);
    row
}

fn limited<'a>(rows: &'a [&'a Record], limit: Option<usize>) -> impl Iterator<Item = &'a &'a Record> {
    rows.iter().take(limit.unwrap_or(usize::MAX))
}

fn millis_of(record: &Record) -> Option<i64> {
    timestamp_of(record).map(|at| at.timestamp_millis())
}

fn in_window(record: &Record, since_ms: i64, until_ms: i64) -> bool {
    millis_of(record).is_some_and(|ms| ms >= since_ms && ms < until_ms)
}

fn object(value: Value) -> Record {
    match value {
        Value::Object(map) => map,
        _ => Record::new(),
    }
}

/// Converts a JSON object literal into a [`Record`]; other values give an
/// empty record.
pub fn record(value: Value) -> Record {
    object(value)
}

/// The `timestamp` of a record.
pub fn timestamp_of(record: &Record) -> Option<DateTime<Utc>> {
    record.get(TIMESTAMP_FIELD).and_then(value_as_timestamp)
}

/// `n` records spread evenly over `range`, each carrying `timestamp` (epoch
/// milliseconds) and `index`.
pub fn generate_records(range: &TimeRange, n: usize) -> Vec<Record> {
    generate_records_with(range, n, |i| json!({ "index": i }))
}

/// `n` records spread evenly over `range`; `attributes(i)` supplies the
/// fields of record `i` alongside its `timestamp`.
pub fn generate_records_with<F>(range: &TimeRange, n: usize, attributes: F) -> Vec<Record>
where
    F: Fn(usize) -> Value,
{
    if n == 0 {
        return Vec::new();
    }
    let start = range.start.timestamp_millis();
    let step = range.duration().num_milliseconds().max(0) as f64 / n as f64;
    (0..n)
        .map(|i| {
            let mut row = object(attributes(i));
            let at = start + ((i as f64 + 0.5) * step) as i64;
            row.insert(TIMESTAMP_FIELD.to_string(), json!(at));
            row
        })
        .collect()
}
