//! Data type and semantic type inference from attribute names and values.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde_json::Value;

use crate::patterns::FormatKind;
use crate::schema::{DataType, SemanticType};

/// Epoch milliseconds between 1973 and 5138; NRDB stores `timestamp` this way.
const EPOCH_MS_RANGE: std::ops::RangeInclusive<f64> = 1e11..=1e14;
/// Epoch seconds between 2001 and 2286.
const EPOCH_SECS_RANGE: std::ops::RangeInclusive<f64> = 1e9..=1e10;

/// Shape of a single non-null value.
pub(crate) fn classify_value(value: &Value) -> Option<DataType> {
    match value {
        Value::Null => None,
        Value::Bool(_) => Some(DataType::Boolean),
        Value::Number(_) => Some(DataType::Numeric),
        Value::Array(_) => Some(DataType::Array),
        Value::Object(_) => Some(DataType::Json),
        Value::String(s) => {
            let s = s.trim();
            if FormatKind::IsoTimestamp.matches(s) {
                Some(DataType::Timestamp)
            } else if FormatKind::Json.matches(s) {
                Some(DataType::Json)
            } else {
                Some(DataType::String)
            }
        }
    }
}

/// Dominant value shape among the non-null values.
///
/// Returns `Unknown` when there are no values or no shape covers at least
/// half of them. Numeric attributes named like a timestamp whose values all
/// fall in a plausible epoch range are reported as `Timestamp`.
pub fn infer_data_type(name: &str, values: &[&Value]) -> DataType {
    let mut counts: Vec<(DataType, usize)> = Vec::new();
    let mut total = 0usize;
    for kind in values.iter().filter_map(|v| classify_value(v)) {
        total += 1;
        match counts.iter_mut().find(|(k, _)| *k == kind) {
            Some((_, count)) => *count += 1,
            None => counts.push((kind, 1)),
        }
    }
    let Some((dominant, count)) = counts.into_iter().max_by_key(|(_, count)| *count) else {
        return DataType::Unknown;
    };
    if count * 2 < total {
        return DataType::Unknown;
    }

    if dominant == DataType::Numeric && is_temporal_name(name) {
        let epoch_like = values
            .iter()
            .filter_map(|v| v.as_f64())
            .all(|n| EPOCH_MS_RANGE.contains(&n) || EPOCH_SECS_RANGE.contains(&n));
        if epoch_like {
            return DataType::Timestamp;
        }
    }
    dominant
}

/// Parses epoch numbers (seconds or milliseconds) and ISO-8601 strings.
pub fn value_as_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => {
            let n = n.as_f64()?;
            if EPOCH_MS_RANGE.contains(&n) {
                Utc.timestamp_millis_opt(n as i64).single()
            } else if EPOCH_SECS_RANGE.contains(&n) {
                Utc.timestamp_millis_opt((n * 1000.0) as i64).single()
            } else {
                None
            }
        }
        Value::String(s) => {
            let s = s.trim();
            DateTime::parse_from_rfc3339(s)
                .map(|dt| dt.with_timezone(&Utc))
                .ok()
                .or_else(|| {
                    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"]
                        .iter()
                        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
                        .map(|naive| naive.and_utc())
                })
        }
        _ => None,
    }
}

/// Splits `camelCase`, `snake_case`, `dotted.names` and `kebab-case` into
/// lowercase tokens.
pub(crate) fn name_tokens(name: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut prev_lower = false;
    for ch in name.chars() {
        if !ch.is_alphanumeric() {
            if !current.is_empty() {
                tokens.push(std::mem::take(&mut current));
            }
            prev_lower = false;
            continue;
        }
        if ch.is_uppercase() && prev_lower && !current.is_empty() {
            tokens.push(std::mem::take(&mut current));
        }
        prev_lower = ch.is_lowercase() || ch.is_ascii_digit();
        current.extend(ch.to_lowercase());
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

fn is_temporal_name(name: &str) -> bool {
    let tokens = name_tokens(name);
    tokens
        .iter()
        .any(|t| matches!(t.as_str(), "timestamp" | "date" | "datetime" | "epoch"))
        || tokens.last().is_some_and(|t| t == "at" || t == "time") && tokens.len() > 1
        || name == "timestamp"
}

/// Semantic type suggested by the attribute name alone.
pub fn semantic_from_name(name: &str, data_type: DataType) -> Option<SemanticType> {
    let tokens = name_tokens(name);
    let has = |candidates: &[&str]| tokens.iter().any(|t| candidates.contains(&t.as_str()));
    let numeric = data_type == DataType::Numeric;
    let textual = data_type == DataType::String;

    if has(&["uuid", "guid"]) {
        return Some(SemanticType::Uuid);
    }
    if textual && has(&["email", "mail"]) {
        return Some(SemanticType::Email);
    }
    if textual && has(&["url", "uri", "href", "link"]) {
        return Some(SemanticType::Url);
    }
    if textual && has(&["ip"]) {
        return Some(SemanticType::Ip);
    }
    if numeric && has(&["duration", "latency", "elapsed"]) {
        return Some(SemanticType::Duration);
    }
    if data_type == DataType::Timestamp || (is_temporal_name(name) && !numeric) {
        return Some(SemanticType::Timestamp);
    }
    if numeric && has(&["price", "cost", "amount", "revenue", "usd", "eur", "currency"]) {
        return Some(SemanticType::Currency);
    }
    if numeric && has(&["percent", "percentage", "pct"]) {
        return Some(SemanticType::Percentage);
    }
    if numeric && has(&["count", "total", "num"]) {
        return Some(SemanticType::Count);
    }
    if tokens
        .last()
        .is_some_and(|t| matches!(t.as_str(), "id" | "key" | "identifier"))
        || tokens.iter().any(|t| t.ends_with("id") && t.len() > 2 && t != "paid" && t != "valid")
            && tokens.len() == 1
    {
        return Some(SemanticType::Identifier);
    }
    None
}

/// Semantic type suggested by the values: the first format matched by at
/// least `min_ratio` of the string values.
pub fn semantic_from_values(values: &[&str], min_ratio: f64) -> Option<SemanticType> {
    if values.is_empty() {
        return None;
    }
    FormatKind::ALL
        .iter()
        .find(|kind| kind.match_ratio(values) >= min_ratio)
        .map(|kind| match kind {
            FormatKind::Uuid => SemanticType::Uuid,
            FormatKind::Email => SemanticType::Email,
            FormatKind::Url => SemanticType::Url,
            FormatKind::Ipv4 | FormatKind::Ipv6 => SemanticType::Ip,
            FormatKind::IsoTimestamp => SemanticType::Timestamp,
            FormatKind::Json => SemanticType::Json,
        })
}

/// Format a semantic type implies, if any.
pub(crate) fn format_for(semantic: SemanticType) -> Option<&'static [FormatKind]> {
    match semantic {
        SemanticType::Uuid => Some(&[FormatKind::Uuid]),
        SemanticType::Email => Some(&[FormatKind::Email]),
        SemanticType::Url => Some(&[FormatKind::Url]),
        SemanticType::Ip => Some(&[FormatKind::Ipv4, FormatKind::Ipv6]),
        SemanticType::Json => Some(&[FormatKind::Json]),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn refs(values: &[Value]) -> Vec<&Value> {
        values.iter().collect()
    }

    #[test]
    fn test_name_tokens() {
        assert_eq!(name_tokens("sessionId"), vec!["session", "id"]);
        assert_eq!(name_tokens("request.uri"), vec!["request", "uri"]);
        assert_eq!(name_tokens("http_status-code"), vec!["http", "status", "code"]);
        assert_eq!(name_tokens("IPAddress"), vec!["ipaddress"]);
    }

    #[test]
    fn test_dominant_data_type() {
        let values = vec![json!(1), json!(2.5), json!(null), json!("x"), json!(3)];
        assert_eq!(infer_data_type("duration", &refs(&values)), DataType::Numeric);

        let values = vec![json!(true), json!(false)];
        assert_eq!(infer_data_type("error", &refs(&values)), DataType::Boolean);

        let values = vec![json!("2024-01-01T00:00:00Z"), json!("2024-01-02T00:00:00Z")];
        assert_eq!(infer_data_type("createdAt", &refs(&values)), DataType::Timestamp);

        let values = vec![json!(null), json!(null)];
        assert_eq!(infer_data_type("empty", &refs(&values)), DataType::Unknown);

        let values = vec![json!(1), json!("a"), json!(true), json!([1])];
        assert_eq!(infer_data_type("mixed", &refs(&values)), DataType::Unknown);
    }

    #[test]
    fn test_epoch_timestamp_attribute() {
        let values = vec![json!(1_700_000_000_000_i64), json!(1_700_000_060_000_i64)];
        assert_eq!(infer_data_type("timestamp", &refs(&values)), DataType::Timestamp);
        // Same magnitudes under a non-temporal name stay numeric.
        assert_eq!(infer_data_type("bytes", &refs(&values)), DataType::Numeric);

        let ts = value_as_timestamp(&values[0]).unwrap();
        assert_eq!(ts.timestamp_millis(), 1_700_000_000_000);
        assert!(value_as_timestamp(&json!(42)).is_none());
        assert!(value_as_timestamp(&json!("2024-03-01 12:00:00")).is_some());
    }

    #[test]
    fn test_semantic_name_heuristics() {
        assert_eq!(
            semantic_from_name("sessionId", DataType::String),
            Some(SemanticType::Identifier)
        );
        assert_eq!(
            semantic_from_name("userEmail", DataType::String),
            Some(SemanticType::Email)
        );
        assert_eq!(
            semantic_from_name("duration", DataType::Numeric),
            Some(SemanticType::Duration)
        );
        assert_eq!(
            semantic_from_name("totalPrice", DataType::Numeric),
            Some(SemanticType::Currency)
        );
        assert_eq!(semantic_from_name("zip", DataType::String), None);
        // A numeric "email" is not trusted.
        assert_eq!(semantic_from_name("email", DataType::Numeric), None);
    }

    #[test]
    fn test_semantic_from_values_requires_ratio() {
        let ips = ["10.0.0.1", "10.0.0.2", "192.168.1.1", "8.8.8.8", "1.1.1.1"];
        assert_eq!(semantic_from_values(&ips, 0.9), Some(SemanticType::Ip));

        let mostly = ["10.0.0.1", "10.0.0.2", "n/a", "8.8.8.8", "1.1.1.1"];
        assert_eq!(semantic_from_values(&mostly, 0.9), None);
    }
}
