use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use chainquery::warehouse::{
    BigQueryExecutor, QueryExecutor, StaticToken, WarehouseError,
};

const PROJECT: &str = "test-project";

fn executor_for(server: &MockServer) -> BigQueryExecutor {
    BigQueryExecutor::with_config(
        server.uri(),
        PROJECT,
        Arc::new(StaticToken("test-token".into())),
        100,
        Duration::from_secs(5),
    )
    .unwrap()
}

fn success_body() -> serde_json::Value {
    json!({
        "kind": "bigquery#queryResponse",
        "schema": { "fields": [
            { "name": "tx_count", "type": "INTEGER", "mode": "NULLABLE" },
            { "name": "day", "type": "DATE", "mode": "NULLABLE" }
        ]},
        "jobReference": { "projectId": PROJECT, "jobId": "job_abc123", "location": "US" },
        "totalRows": "2",
        "rows": [
            { "f": [{ "v": "42" }, { "v": "2026-08-01" }] },
            { "f": [{ "v": "17" }, { "v": null }] }
        ],
        "totalBytesProcessed": "1048576",
        "jobComplete": true,
        "cacheHit": true
    })
}

#[tokio::test]
async fn parses_rows_schema_and_telemetry() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(format!("/projects/{PROJECT}/queries")))
        .and(header("authorization", "Bearer test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(success_body()))
        .mount(&server)
        .await;

    let executor = executor_for(&server);
    let outcome = executor
        .execute("SELECT COUNT(*) AS tx_count FROM transactions")
        .await
        .unwrap();

    assert_eq!(outcome.result.columns(), &["tx_count", "day"]);
    assert_eq!(outcome.result.row_count(), 2);
    assert_eq!(outcome.result.rows()[0], vec!["42", "2026-08-01"]);
    // Null cells stringify to the empty display form.
    assert_eq!(outcome.result.rows()[1], vec!["17", ""]);

    assert_eq!(outcome.stats.job_id, "job_abc123");
    assert_eq!(outcome.stats.location.as_deref(), Some("US"));
    assert_eq!(outcome.stats.total_rows, 2);
    assert_eq!(outcome.stats.total_bytes_processed, 1_048_576);
    assert!(outcome.stats.cache_hit);
    assert_eq!(outcome.stats.schema.len(), 2);
    assert_eq!(outcome.stats.schema[0].field_type, "INTEGER");
}

#[tokio::test]
async fn sends_standard_sql_with_row_cap_and_timeout() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(format!("/projects/{PROJECT}/queries")))
        .and(body_partial_json(json!({
            "query": "SELECT 1 AS one",
            "useLegacySql": false,
            "maxResults": 100,
            "timeoutMs": 5000
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "schema": { "fields": [{ "name": "one", "type": "INTEGER", "mode": "NULLABLE" }] },
            "jobReference": { "jobId": "job_1" },
            "totalRows": "1",
            "rows": [{ "f": [{ "v": "1" }] }],
            "jobComplete": true
        })))
        .expect(1)
        .mount(&server)
        .await;

    let executor = executor_for(&server);
    executor.execute("SELECT 1 AS one").await.unwrap();
}

#[tokio::test]
async fn empty_result_set_is_a_valid_outcome() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(format!("/projects/{PROJECT}/queries")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "schema": { "fields": [{ "name": "tx_count", "type": "INTEGER", "mode": "NULLABLE" }] },
            "jobReference": { "jobId": "job_2" },
            "totalRows": "0",
            "jobComplete": true
        })))
        .mount(&server)
        .await;

    let executor = executor_for(&server);
    let outcome = executor.execute("SELECT 1 AS one WHERE FALSE").await.unwrap();
    assert!(outcome.result.is_empty());
    assert_eq!(outcome.result.columns(), &["tx_count"]);
}

#[tokio::test]
async fn query_error_carries_the_warehouse_message() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(format!("/projects/{PROJECT}/queries")))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": {
                "code": 400,
                "message": "Syntax error: Unexpected keyword FORM at [1:10]",
                "status": "INVALID_ARGUMENT"
            }
        })))
        .mount(&server)
        .await;

    let executor = executor_for(&server);
    let err = executor.execute("SELECT 1 FORM transactions").await.unwrap_err();
    match err {
        WarehouseError::Query { message, http_status } => {
            assert!(message.contains("Syntax error"));
            assert_eq!(http_status, Some(400));
        }
        other => panic!("expected Query error, got {other:?}"),
    }
}

#[tokio::test]
async fn http_401_is_classified_as_auth() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(format!("/projects/{PROJECT}/queries")))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": { "code": 401, "message": "Invalid Credentials", "status": "UNAUTHENTICATED" }
        })))
        .mount(&server)
        .await;

    let executor = executor_for(&server);
    let err = executor.execute("SELECT 1 AS one").await.unwrap_err();
    assert!(err.is_auth());
}

#[tokio::test]
async fn incomplete_job_is_reported_as_failure() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(format!("/projects/{PROJECT}/queries")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jobReference": { "jobId": "job_slow" },
            "jobComplete": false
        })))
        .mount(&server)
        .await;

    let executor = executor_for(&server);
    let err = executor.execute("SELECT * FROM huge_table").await.unwrap_err();
    match err {
        WarehouseError::Query { message, .. } => {
            assert!(message.contains("did not complete"));
        }
        other => panic!("expected Query error, got {other:?}"),
    }
}
