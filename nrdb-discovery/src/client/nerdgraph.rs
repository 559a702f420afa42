use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, instrument};

use crate::client::config::ClientConfig;
use crate::client::types::{PerformanceInfo, QueryMetadata, QueryResult, Record};
use crate::client::NrdbClient;
use crate::context::QueryContext;
use crate::error::{DiscoveryError, Result};

const NRQL_QUERY: &str = "query($accountId: Int!, $nrql: Nrql!, $timeout: Seconds) { \
actor { account(id: $accountId) { nrql(query: $nrql, timeout: $timeout) { \
results metadata { eventTypes messages } } } } }";

/// HTTP transport that runs NRQL through the NerdGraph GraphQL API.
#[derive(Clone)]
pub struct NerdGraphClient {
    config: Arc<ClientConfig>,
    client: Client,
}

#[derive(Debug, Serialize)]
struct GraphqlRequest<'a> {
    query: &'a str,
    variables: Value,
}

#[derive(Debug, Deserialize)]
struct GraphqlResponse {
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    errors: Vec<GraphqlError>,
}

#[derive(Debug, Deserialize)]
struct GraphqlError {
    message: String,
    #[serde(default)]
    extensions: Option<GraphqlErrorExtensions>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphqlErrorExtensions {
    #[serde(default)]
    error_class: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NrqlPayload {
    #[serde(default)]
    results: Vec<Record>,
    #[serde(default)]
    metadata: Option<QueryMetadata>,
}

impl NerdGraphClient {
    /// Create a new client with the given configuration.
    pub fn new(config: ClientConfig) -> Result<Self> {
        config.validate()?;
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| {
                DiscoveryError::configuration(format!("Failed to create HTTP client: {e}"))
            })?;

        Ok(Self {
            config: Arc::new(config),
            client,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn request_body(&self, nrql: &str) -> GraphqlRequest<'static> {
        GraphqlRequest {
            query: NRQL_QUERY,
            variables: json!({
                "accountId": self.config.account_id(),
                "nrql": nrql,
                "timeout": self.config.timeout().as_secs().max(1),
            }),
        }
    }

    /// Convert an error response to a DiscoveryError.
    async fn handle_error_response(&self, response: reqwest::Response) -> DiscoveryError {
        let status = response.status();
        let retry_after = response
            .headers()
            .get("Retry-After")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok());

        let body = response.text().await.unwrap_or_default();
        DiscoveryError::from_status(status.as_u16(), body, retry_after)
    }
}

/// Maps a GraphQL error entry onto the error taxonomy.
fn classify_graphql_error(error: &GraphqlError) -> DiscoveryError {
    let class = error
        .extensions
        .as_ref()
        .and_then(|ext| ext.error_class.as_deref())
        .unwrap_or_default()
        .to_ascii_uppercase();
    let message = error.message.clone();

    match class.as_str() {
        "TIMEOUT" | "NRDB_TIMEOUT" => DiscoveryError::Timeout {
            elapsed: std::time::Duration::ZERO,
        },
        "TOO_MANY_REQUESTS" | "RATE_LIMITED" => DiscoveryError::RateLimited {
            retry_after_secs: None,
        },
        "FORBIDDEN" | "UNAUTHORIZED" | "ACCESS_DENIED" => {
            DiscoveryError::Authentication { message }
        }
        "NOT_FOUND" => DiscoveryError::NotFound { message },
        "BAD_USER_INPUT" | "INVALID_INPUT" | "NRQL_SYNTAX_ERROR" => {
            DiscoveryError::invalid_query(message)
        }
        "SERVER_ERROR" | "SERVICE_UNAVAILABLE" => DiscoveryError::Http {
            status: 503,
            message,
        },
        _ => DiscoveryError::Other(message),
    }
}

/// Extracts rows and metadata from a NerdGraph response body.
fn parse_response(body: GraphqlResponse) -> Result<QueryResult> {
    if let Some(first) = body.errors.first() {
        return Err(classify_graphql_error(first));
    }

    let nrql = body
        .data
        .as_ref()
        .and_then(|data| data.pointer("/actor/account/nrql"))
        .cloned()
        .ok_or_else(|| DiscoveryError::Serialization {
            message: "response is missing actor.account.nrql".to_string(),
        })?;

    if nrql.is_null() {
        return Err(DiscoveryError::NotFound {
            message: "account returned no NRQL result".to_string(),
        });
    }

    let payload: NrqlPayload = serde_json::from_value(nrql)?;
    Ok(QueryResult {
        results: payload.results,
        metadata: payload.metadata.unwrap_or_default(),
    })
}

#[async_trait]
impl NrdbClient for NerdGraphClient {
    #[instrument(skip(self, ctx, nrql), fields(account_id = self.config.account_id()))]
    async fn query(&self, ctx: &QueryContext, nrql: &str) -> Result<QueryResult> {
        let request = self
            .client
            .post(self.config.endpoint())
            .header("Content-Type", "application/json")
            .header("API-Key", self.config.api_key().expose())
            .json(&self.request_body(nrql));

        let started = Instant::now();
        let response = ctx.run(async { request.send().await.map_err(DiscoveryError::from) }).await?;

        if !response.status().is_success() {
            return Err(self.handle_error_response(response).await);
        }

        let body: GraphqlResponse = ctx
            .run(async { response.json().await.map_err(DiscoveryError::from) })
            .await?;
        let mut result = parse_response(body)?;

        let elapsed_ms = started.elapsed().as_millis() as u64;
        let rows = result.results.len() as u64;
        let performance = result
            .metadata
            .performance
            .get_or_insert_with(PerformanceInfo::default);
        performance.wall_clock_time_ms = elapsed_ms;
        performance.matched_count = rows;

        debug!(rows, elapsed_ms, "NerdGraph query completed");
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(value: Value) -> GraphqlResponse {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_parse_rows_and_metadata() {
        let result = parse_response(response(json!({
            "data": {"actor": {"account": {"nrql": {
                "results": [{"count": 10}, {"count": 12}],
                "metadata": {"eventTypes": ["Transaction"], "messages": []}
            }}}}
        })))
        .unwrap();

        assert_eq!(result.len(), 2);
        assert_eq!(result.metadata.event_types, vec!["Transaction"]);
    }

    #[test]
    fn test_graphql_errors_are_classified() {
        let err = parse_response(response(json!({
            "errors": [{"message": "NRQL Syntax Error", "extensions": {"errorClass": "BAD_USER_INPUT"}}]
        })))
        .unwrap_err();
        assert!(matches!(err, DiscoveryError::InvalidQuery { .. }));
        assert!(!err.is_retryable());

        let err = parse_response(response(json!({
            "errors": [{"message": "timed out", "extensions": {"errorClass": "TIMEOUT"}}]
        })))
        .unwrap_err();
        assert!(err.is_retryable());

        let err = parse_response(response(json!({
            "errors": [{"message": "something new"}]
        })))
        .unwrap_err();
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_missing_payload() {
        let err = parse_response(response(json!({"data": {"actor": {}}}))).unwrap_err();
        assert!(matches!(err, DiscoveryError::Serialization { .. }));

        let err = parse_response(response(json!({
            "data": {"actor": {"account": {"nrql": null}}}
        })))
        .unwrap_err();
        assert!(matches!(err, DiscoveryError::NotFound { .. }));
    }

    #[test]
    fn test_request_body_carries_variables() {
        let client = NerdGraphClient::new(ClientConfig::new("key", 99)).unwrap();
        let body = serde_json::to_value(client.request_body("SELECT 1")).unwrap();
        assert_eq!(body["variables"]["accountId"], 99);
        assert_eq!(body["variables"]["nrql"], "SELECT 1");
        assert!(body["query"].as_str().unwrap().contains("nrql(query: $nrql"));
    }
}
