//! NRQL statement construction.
//!
//! All statements the engine sends are built here. Identifiers discovered from
//! the remote store are validated and backtick-quoted, and time windows are
//! rendered as absolute epoch-millisecond bounds so that repeated queries over
//! the same [`TimeRange`] are comparable.

use std::time::Duration;

use crate::error::Result;
use crate::sampling::TimeRange;
use crate::security::NrqlSecurity;

/// Largest `LIMIT` accepted by the remote store for a single query.
pub const MAX_QUERY_LIMIT: u64 = 5000;

/// Result alias used for every aggregate that returns a single value.
pub const VALUE_ALIAS: &str = "value";

/// Result alias used for `count(*)` aggregates.
pub const COUNT_ALIAS: &str = "count";

/// Namespace for NRQL statement builders.
pub struct Nrql;

impl Nrql {
    fn window(range: &TimeRange) -> String {
        format!(
            "SINCE {} UNTIL {}",
            range.start.timestamp_millis(),
            range.end.timestamp_millis()
        )
    }

    fn bucket_clause(range: &TimeRange, buckets: u32) -> String {
        let buckets = buckets.max(1) as i64;
        let minutes = (range.duration().num_minutes() / buckets).max(1);
        format!("TIMESERIES {minutes} minutes")
    }

    /// Lists event types with data in the window.
    pub fn show_event_types(range: &TimeRange) -> String {
        format!("SHOW EVENT TYPES {}", Self::window(range))
    }

    /// Counts records of an event type in the window.
    pub fn count(event_type: &str, range: &TimeRange) -> Result<String> {
        Ok(format!(
            "SELECT count(*) AS '{COUNT_ALIAS}' FROM {} {}",
            NrqlSecurity::quote_identifier(event_type)?,
            Self::window(range)
        ))
    }

    /// Counts records per time bucket.
    pub fn count_series(event_type: &str, range: &TimeRange, buckets: u32) -> Result<String> {
        Ok(format!(
            "SELECT count(*) AS '{COUNT_ALIAS}' FROM {} {} {}",
            NrqlSecurity::quote_identifier(event_type)?,
            Self::window(range),
            Self::bucket_clause(range, buckets)
        ))
    }

    /// Averages a numeric attribute per time bucket.
    pub fn average_series(
        event_type: &str,
        attribute: &str,
        range: &TimeRange,
        buckets: u32,
    ) -> Result<String> {
        Ok(format!(
            "SELECT average({}) AS '{VALUE_ALIAS}' FROM {} {} {}",
            NrqlSecurity::quote_identifier(attribute)?,
            NrqlSecurity::quote_identifier(event_type)?,
            Self::window(range),
            Self::bucket_clause(range, buckets)
        ))
    }

    /// Selects raw records in the window, most recent first.
    pub fn select_all(event_type: &str, range: &TimeRange, limit: u64) -> Result<String> {
        Ok(format!(
            "SELECT * FROM {} {} LIMIT {}",
            NrqlSecurity::quote_identifier(event_type)?,
            Self::window(range),
            limit.clamp(1, MAX_QUERY_LIMIT)
        ))
    }

    /// Selects one attribute's raw values in the window.
    pub fn select_attribute(
        event_type: &str,
        attribute: &str,
        range: &TimeRange,
        limit: u64,
    ) -> Result<String> {
        Ok(format!(
            "SELECT {} FROM {} {} LIMIT {}",
            NrqlSecurity::quote_identifier(attribute)?,
            NrqlSecurity::quote_identifier(event_type)?,
            Self::window(range),
            limit.clamp(1, MAX_QUERY_LIMIT)
        ))
    }

    /// Duration of each bucket produced by [`Nrql::count_series`] for `buckets` buckets.
    pub fn bucket_width(range: &TimeRange, buckets: u32) -> Duration {
        let buckets = buckets.max(1) as i64;
        let minutes = (range.duration().num_minutes() / buckets).max(1) as u64;
        Duration::from_secs(minutes * 60)
    }
}
