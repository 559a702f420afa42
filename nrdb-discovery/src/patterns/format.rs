use once_cell::sync::Lazy;
use regex::Regex;

use super::{Pattern, PatternConfig, PatternDetector, PatternInput, PatternType};
use crate::schema::DataType;

static EMAIL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}$").unwrap());
static URL: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(https?|wss?|ftp)://[^\s/$.?#][^\s]*$").unwrap());
static IPV4: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^((25[0-5]|2[0-4]\d|1\d\d|[1-9]?\d)\.){3}(25[0-5]|2[0-4]\d|1\d\d|[1-9]?\d)$").unwrap()
});
static IPV6: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([0-9A-Fa-f]{0,4}:){2,7}[0-9A-Fa-f]{0,4}$").unwrap());
static UUID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$")
        .unwrap()
});
static ISO_TIMESTAMP: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\d{4}-\d{2}-\d{2}[T ]\d{2}:\d{2}(:\d{2}(\.\d+)?)?(Z|[+-]\d{2}:?\d{2})?$").unwrap()
});

/// String formats recognised by the format detector and the semantic type
/// inference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FormatKind {
    Uuid,
    Email,
    Url,
    Ipv4,
    Ipv6,
    IsoTimestamp,
    Json,
}

impl FormatKind {
    /// Checked in this order; the more specific shapes come first.
    pub const ALL: [FormatKind; 7] = [
        FormatKind::Uuid,
        FormatKind::Email,
        FormatKind::Url,
        FormatKind::Ipv4,
        FormatKind::Ipv6,
        FormatKind::IsoTimestamp,
        FormatKind::Json,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Uuid => "uuid",
            Self::Email => "email",
            Self::Url => "url",
            Self::Ipv4 => "ipv4",
            Self::Ipv6 => "ipv6",
            Self::IsoTimestamp => "iso_timestamp",
            Self::Json => "json",
        }
    }

    pub fn matches(&self, value: &str) -> bool {
        let value = value.trim();
        match self {
            Self::Uuid => UUID.is_match(value),
            Self::Email => EMAIL.is_match(value),
            Self::Url => URL.is_match(value),
            Self::Ipv4 => IPV4.is_match(value),
            // Plain times like 12:30 would otherwise pass.
            Self::Ipv6 => value.matches(':').count() >= 2 && IPV6.is_match(value),
            Self::IsoTimestamp => ISO_TIMESTAMP.is_match(value),
            Self::Json => {
                (value.starts_with('{') || value.starts_with('['))
                    && serde_json::from_str::<serde_json::Value>(value).is_ok()
            }
        }
    }

    /// Fraction of `values` in this format, 0 for no values.
    pub fn match_ratio(&self, values: &[&str]) -> f64 {
        if values.is_empty() {
            return 0.0;
        }
        let hits = values.iter().filter(|v| self.matches(v)).count();
        hits as f64 / values.len() as f64
    }
}

/// Regex-based detection of well-known string formats.
#[derive(Debug, Clone)]
pub struct FormatDetector {
    min_ratio: f64,
    min_values: usize,
}

impl FormatDetector {
    pub fn new(config: &PatternConfig) -> Self {
        Self {
            min_ratio: config.format_match_ratio,
            min_values: config.min_values,
        }
    }
}

impl PatternDetector for FormatDetector {
    fn name(&self) -> &'static str {
        "format"
    }

    fn supports(&self, data_type: DataType) -> bool {
        matches!(data_type, DataType::String | DataType::Json)
    }

    fn detect(&self, input: &PatternInput<'_>) -> Vec<Pattern> {
        let values = input.strings();
        if values.len() < self.min_values {
            return Vec::new();
        }

        FormatKind::ALL
            .iter()
            .filter_map(|kind| {
                let ratio = kind.match_ratio(&values);
                (ratio >= self.min_ratio).then(|| {
                    Pattern::new(
                        PatternType::Format,
                        ratio,
                        format!(
                            "{:.0}% of '{}' values are {}",
                            ratio * 100.0,
                            input.attribute,
                            kind.name()
                        ),
                    )
                    .with_subtype(kind.name())
                    .with_parameter("match_ratio", ratio)
                    .with_parameter("values_checked", values.len() as u64)
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    #[test]
    fn test_format_matchers() {
        assert!(FormatKind::Email.matches("ops@example.com"));
        assert!(!FormatKind::Email.matches("not an email"));
        assert!(FormatKind::Url.matches("https://example.com/checkout?id=1"));
        assert!(FormatKind::Ipv4.matches("10.0.0.255"));
        assert!(!FormatKind::Ipv4.matches("10.0.0.256"));
        assert!(FormatKind::Ipv6.matches("fe80::1ff:fe23:4567:890a"));
        assert!(!FormatKind::Ipv6.matches("12:30"));
        assert!(FormatKind::Uuid.matches("3f2b8c1e-9a4d-4e5f-8a7b-1c2d3e4f5a6b"));
        assert!(FormatKind::IsoTimestamp.matches("2024-03-01T12:00:00Z"));
        assert!(FormatKind::Json.matches(r#"{"a": [1, 2]}"#));
        assert!(!FormatKind::Json.matches("{broken"));
    }

    #[test]
    fn test_detects_dominant_format() {
        let mut values: Vec<Value> = (0..9)
            .map(|i| json!(format!("user{i}@example.com")))
            .collect();
        values.push(json!("unknown"));
        let input = PatternInput::new("email", DataType::String, &values);

        let patterns = FormatDetector::new(&PatternConfig::default()).detect(&input);
        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns[0].subtype.as_deref(), Some("email"));
        assert!((patterns[0].confidence - 0.9).abs() < 1e-9);
    }
}
