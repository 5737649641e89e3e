//! BigQuery REST adapter for SQL execution.
//!
//! Uses the synchronous `jobs.query` endpoint: one POST, one response. If the
//! job does not finish within the request timeout the call is reported as a
//! failure; there is no polling loop.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use serde::{Deserialize, Serialize};

use crate::session::TabularResult;

use super::auth::{ServiceAccountKey, ServiceAccountTokens, TokenSource};
use super::error::WarehouseError;
use super::{ColumnSpec, JobStats, QueryExecutor, QueryOutcome};

/// Maximum allowed response length (8MB) - result sets are row-capped anyway.
const MAX_RESPONSE_LEN: usize = 8 * 1_024 * 1_024;

/// BigQuery API adapter.
pub struct BigQueryExecutor {
    client: reqwest::Client,
    base_url: String,
    project_id: String,
    tokens: Arc<dyn TokenSource>,
    max_results: u32,
    query_timeout: Duration,
}

impl BigQueryExecutor {
    /// Create from the credentials env var, with defaults for everything else.
    pub fn from_env() -> Result<Self, WarehouseError> {
        let key = ServiceAccountKey::from_env()?;
        let project_id = key.project_id.clone();
        let tokens = Arc::new(ServiceAccountTokens::new(key)?);
        Self::with_config(
            "https://bigquery.googleapis.com/bigquery/v2",
            project_id,
            tokens,
            1000,
            Duration::from_secs(60),
        )
    }

    /// Create with custom configuration.
    pub fn with_config(
        base_url: impl Into<String>,
        project_id: impl Into<String>,
        tokens: Arc<dyn TokenSource>,
        max_results: u32,
        query_timeout: Duration,
    ) -> Result<Self, WarehouseError> {
        let client = reqwest::Client::builder()
            .timeout(query_timeout + Duration::from_secs(10))
            .gzip(true)
            .build()
            .map_err(|e| WarehouseError::config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            project_id: project_id.into(),
            tokens,
            max_results,
            query_timeout,
        })
    }

    fn query_url(&self) -> String {
        format!("{}/projects/{}/queries", self.base_url, self.project_id)
    }
}

// =============================================================================
// API TYPES
// =============================================================================

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryApiRequest<'a> {
    query: &'a str,
    use_legacy_sql: bool,
    max_results: u32,
    timeout_ms: u64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryApiResponse {
    schema: Option<ApiSchema>,
    job_reference: Option<ApiJobReference>,
    total_rows: Option<String>,
    rows: Option<Vec<ApiRow>>,
    total_bytes_processed: Option<String>,
    total_bytes_billed: Option<String>,
    job_complete: Option<bool>,
    cache_hit: Option<bool>,
    error: Option<ApiErrorEnvelope>,
}

#[derive(Deserialize)]
struct ApiSchema {
    fields: Option<Vec<ApiField>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiField {
    name: String,
    #[serde(rename = "type")]
    field_type: Option<String>,
    mode: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiJobReference {
    job_id: Option<String>,
    location: Option<String>,
}

#[derive(Deserialize)]
struct ApiRow {
    f: Option<Vec<ApiCell>>,
}

#[derive(Deserialize)]
struct ApiCell {
    v: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct ApiErrorEnvelope {
    message: Option<String>,
    code: Option<u16>,
}

/// Display-string form of one cell. The result model is textual: the few-shot
/// prompt and the CSV export both consume strings.
fn cell_to_string(value: Option<serde_json::Value>) -> String {
    match value {
        None | Some(serde_json::Value::Null) => String::new(),
        Some(serde_json::Value::String(s)) => s,
        Some(other) => other.to_string(),
    }
}

fn parse_u64(raw: Option<String>) -> u64 {
    raw.and_then(|s| s.parse().ok()).unwrap_or(0)
}

// =============================================================================
// QUERY EXECUTOR IMPL
// =============================================================================

#[async_trait]
impl QueryExecutor for BigQueryExecutor {
    async fn execute(&self, sql: &str) -> Result<QueryOutcome, WarehouseError> {
        let token = self.tokens.access_token().await?;
        let start = Instant::now();

        let api_req = QueryApiRequest {
            query: sql,
            use_legacy_sql: false,
            max_results: self.max_results,
            timeout_ms: self.query_timeout.as_millis() as u64,
        };

        let mut response = self
            .client
            .post(self.query_url())
            .header(AUTHORIZATION, format!("Bearer {token}"))
            .json(&api_req)
            .send()
            .await?;

        let status = response.status();

        let mut bytes = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            let new_len = bytes.len() + chunk.len();
            if new_len > MAX_RESPONSE_LEN {
                return Err(WarehouseError::decode(format!(
                    "response too large: {new_len} bytes"
                )));
            }
            bytes.extend_from_slice(&chunk);
        }
        let body = String::from_utf8_lossy(&bytes).to_string();

        if !status.is_success() {
            let message = serde_json::from_str::<serde_json::Value>(&body)
                .ok()
                .and_then(|v| {
                    v.get("error")
                        .and_then(|e| e.get("message"))
                        .and_then(|m| m.as_str())
                        .map(String::from)
                })
                .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));

            return Err(match status.as_u16() {
                401 | 403 => WarehouseError::auth(message),
                code => WarehouseError::query_with_status(message, code),
            });
        }

        let parsed: QueryApiResponse = serde_json::from_str(&body)
            .map_err(|e| WarehouseError::decode(format!("invalid JSON: {e}")))?;

        if let Some(err) = parsed.error {
            let message = err.message.unwrap_or_default();
            return Err(match err.code {
                Some(401) | Some(403) => WarehouseError::auth(message),
                Some(code) => WarehouseError::query_with_status(message, code),
                None => WarehouseError::query(message),
            });
        }

        if parsed.job_complete != Some(true) {
            return Err(WarehouseError::query(format!(
                "query did not complete within {}s",
                self.query_timeout.as_secs()
            )));
        }

        let schema: Vec<ColumnSpec> = parsed
            .schema
            .and_then(|s| s.fields)
            .unwrap_or_default()
            .into_iter()
            .map(|f| ColumnSpec {
                name: f.name,
                field_type: f.field_type.unwrap_or_else(|| "STRING".into()),
                mode: f.mode.unwrap_or_else(|| "NULLABLE".into()),
            })
            .collect();

        let columns: Vec<String> = schema.iter().map(|c| c.name.clone()).collect();
        let rows: Vec<Vec<String>> = parsed
            .rows
            .unwrap_or_default()
            .into_iter()
            .map(|row| {
                row.f
                    .unwrap_or_default()
                    .into_iter()
                    .map(|cell| cell_to_string(cell.v))
                    .collect()
            })
            .collect();

        let result = TabularResult::new(columns, rows)
            .map_err(|e| WarehouseError::decode(format!("malformed result: {e}")))?;

        let job_ref = parsed.job_reference;
        let stats = JobStats {
            job_id: job_ref
                .as_ref()
                .and_then(|j| j.job_id.clone())
                .unwrap_or_else(|| "unknown".into()),
            location: job_ref.and_then(|j| j.location),
            complete: true,
            total_rows: parse_u64(parsed.total_rows),
            total_bytes_processed: parse_u64(parsed.total_bytes_processed),
            total_bytes_billed: parsed.total_bytes_billed.and_then(|s| s.parse().ok()),
            cache_hit: parsed.cache_hit.unwrap_or(false),
            elapsed: start.elapsed(),
            schema,
        };

        Ok(QueryOutcome { result, stats })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cells_stringify_in_display_form() {
        assert_eq!(cell_to_string(None), "");
        assert_eq!(cell_to_string(Some(serde_json::Value::Null)), "");
        assert_eq!(cell_to_string(Some(serde_json::json!("42"))), "42");
        assert_eq!(cell_to_string(Some(serde_json::json!(1.5))), "1.5");
        assert_eq!(cell_to_string(Some(serde_json::json!(true))), "true");
    }
}
