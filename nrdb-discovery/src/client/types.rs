use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single result row: attribute name to JSON value.
pub type Record = serde_json::Map<String, Value>;

/// Rows and metadata returned by one NRQL query.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryResult {
    pub results: Vec<Record>,
    #[serde(default)]
    pub metadata: QueryMetadata,
}

/// Metadata the remote store attaches to a query result.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryMetadata {
    #[serde(default)]
    pub event_types: Vec<String>,
    #[serde(default)]
    pub messages: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub performance: Option<PerformanceInfo>,
}

/// Cost and latency information for a query.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceInfo {
    #[serde(default)]
    pub inspected_count: u64,
    #[serde(default)]
    pub matched_count: u64,
    #[serde(default)]
    pub wall_clock_time_ms: u64,
}

impl QueryResult {
    /// Builds a result from rows with empty metadata.
    pub fn from_rows(results: Vec<Record>) -> Self {
        Self {
            results,
            metadata: QueryMetadata::default(),
        }
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.results.len()
    }

    /// Returns true if the query returned no rows.
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Reads a numeric field from the first row.
    pub fn first_number(&self, key: &str) -> Option<f64> {
        self.results.first()?.get(key)?.as_f64()
    }

    /// Reads a numeric field from every row, skipping rows where it is absent.
    pub fn numbers(&self, key: &str) -> Vec<f64> {
        self.results
            .iter()
            .filter_map(|row| row.get(key).and_then(Value::as_f64))
            .collect()
    }

    /// Reads a numeric field from every row, keeping gaps as `None`.
    pub fn numbers_with_gaps(&self, key: &str) -> Vec<Option<f64>> {
        self.results
            .iter()
            .map(|row| row.get(key).and_then(Value::as_f64))
            .collect()
    }

    /// Reads a string field from every row.
    pub fn strings(&self, key: &str) -> Vec<String> {
        self.results
            .iter()
            .filter_map(|row| row.get(key).and_then(Value::as_str).map(str::to_string))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_accessors() {
        let result = QueryResult::from_rows(vec![
            row(json!({"count": 42, "eventType": "Transaction"})),
            row(json!({"count": 7.5, "eventType": "PageView"})),
            row(json!({"eventType": "Span"})),
        ]);

        assert_eq!(result.len(), 3);
        assert_eq!(result.first_number("count"), Some(42.0));
        assert_eq!(result.numbers("count"), vec![42.0, 7.5]);
        assert_eq!(result.numbers_with_gaps("count"), vec![Some(42.0), Some(7.5), None]);
        assert_eq!(result.strings("eventType").len(), 3);
    }

    #[test]
    fn test_metadata_deserialization() {
        let metadata: QueryMetadata = serde_json::from_value(json!({
            "eventTypes": ["Transaction"],
            "messages": ["sampled"],
        }))
        .unwrap();
        assert_eq!(metadata.event_types, vec!["Transaction"]);
        assert!(metadata.performance.is_none());
    }
}
