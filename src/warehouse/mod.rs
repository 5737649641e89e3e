//! Warehouse execution: run SQL, get a table back.

pub mod auth;
pub mod bigquery;
pub mod error;

use std::time::Duration;

use crate::session::TabularResult;

pub use auth::{ServiceAccountKey, ServiceAccountTokens, StaticToken, TokenSource};
pub use bigquery::BigQueryExecutor;
pub use error::WarehouseError;

/// One column of the result schema, as reported by the warehouse.
#[derive(Debug, Clone)]
pub struct ColumnSpec {
    pub name: String,
    pub field_type: String,
    pub mode: String,
}

/// Diagnostic/cost telemetry for one executed job. Logged, never stored on
/// the session.
#[derive(Debug, Clone)]
pub struct JobStats {
    pub job_id: String,
    pub location: Option<String>,
    pub complete: bool,
    pub total_rows: u64,
    pub total_bytes_processed: u64,
    pub total_bytes_billed: Option<u64>,
    pub cache_hit: bool,
    pub elapsed: Duration,
    pub schema: Vec<ColumnSpec>,
}

/// Successful execution: the table plus its telemetry.
#[derive(Debug, Clone)]
pub struct QueryOutcome {
    pub result: TabularResult,
    pub stats: JobStats,
}

/// The seam the lifecycle controller executes SQL through. One blocking call
/// at a time; no retries, no polling.
#[async_trait::async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn execute(&self, sql: &str) -> Result<QueryOutcome, WarehouseError>;
}

/// Log job telemetry at info level: job identity, cost drivers, cache state,
/// timing, and the result schema.
pub fn log_job_stats(stats: &JobStats) {
    tracing::info!(
        job_id = %stats.job_id,
        location = stats.location.as_deref().unwrap_or("unknown"),
        complete = stats.complete,
        total_rows = stats.total_rows,
        bytes_processed = stats.total_bytes_processed,
        bytes_billed = stats.total_bytes_billed,
        cache_hit = stats.cache_hit,
        elapsed_ms = stats.elapsed.as_millis() as u64,
        "query job finished"
    );
    for col in &stats.schema {
        tracing::debug!(
            column = %col.name,
            field_type = %col.field_type,
            mode = %col.mode,
            "result schema"
        );
    }
}
