//! HTTP transport tests against a mock ClickHouse endpoint.

#![allow(clippy::expect_used)]
#![allow(clippy::unwrap_used)]

use chseed_core::config::vars;
use chseed_core::{ClickHouseClient, Config, SchemaRunner, SeedError, SqlDirRunner, connect};
use wiremock::matchers::{body_string, body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config_for(server: &MockServer, schema: &tempfile::TempDir) -> Config {
    let endpoint = server.uri();
    let env = [
        (vars::ENDPOINT, endpoint.as_str()),
        (vars::USER, "seeder"),
        (vars::PASSWORD, "s3cret"),
    ];
    Config::resolve(&env, Some(schema.path())).expect("config should resolve")
}

#[tokio::test]
async fn test_http_ping_sends_credentials_and_limits() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/"))
        .and(query_param("max_execution_time", "60"))
        .and(header("X-ClickHouse-User", "seeder"))
        .and(header("X-ClickHouse-Key", "s3cret"))
        .and(body_string("SELECT 1"))
        .respond_with(ResponseTemplate::new(200).set_body_string("1\n"))
        .expect(1)
        .mount(&server)
        .await;

    let schema = tempfile::tempdir().unwrap();
    let client = connect(&config_for(&server, &schema)).await.unwrap();

    client.ping().await.expect("ping should succeed");
}

#[tokio::test]
async fn test_http_statements_sent_plain_without_database() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let schema = tempfile::tempdir().unwrap();
    let client = connect(&config_for(&server, &schema)).await.unwrap();
    let sql = "CREATE DATABASE IF NOT EXISTS otel;";
    client.execute(sql).await.unwrap();

    let received = server.received_requests().await.expect("recording enabled");
    assert_eq!(received.len(), 1);
    let request = &received[0];
    assert_eq!(request.body, sql.as_bytes());
    assert!(request.headers.get("content-encoding").is_none());
    let params: Vec<String> = request.url.query_pairs().map(|(key, _)| key.into_owned()).collect();
    assert_eq!(params, vec!["max_execution_time".to_string()]);
}

#[tokio::test]
async fn test_http_ping_rejected_credentials() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(516)
                .set_body_string("Code: 516. DB::Exception: seeder: Authentication failed"),
        )
        .mount(&server)
        .await;

    let schema = tempfile::tempdir().unwrap();
    let client = connect(&config_for(&server, &schema)).await.unwrap();
    let err = client.ping().await.unwrap_err();

    assert!(matches!(err, SeedError::Connection { .. }));
    assert!(err.to_string().contains("Authentication failed"));
    assert!(!err.to_string().contains("s3cret"));
}

#[tokio::test]
async fn test_http_ping_unreachable_server() {
    let schema = tempfile::tempdir().unwrap();
    let env = [(vars::ENDPOINT, "http://127.0.0.1:1")];
    let config = Config::resolve(&env, Some(schema.path())).unwrap();

    let client = connect(&config).await.unwrap();
    let err = client.ping().await.unwrap_err();

    assert!(matches!(err, SeedError::Connection { .. }));
}

#[tokio::test]
async fn test_http_execute_surfaces_server_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(500)
                .set_body_string("Code: 62. DB::Exception: Syntax error: failed at position 1\n"),
        )
        .mount(&server)
        .await;

    let schema = tempfile::tempdir().unwrap();
    let client = connect(&config_for(&server, &schema)).await.unwrap();
    let err = client.execute("SELEC 1").await.unwrap_err();

    assert!(matches!(err, SeedError::QueryExecution { .. }));
    let message = err.to_string();
    assert!(message.contains("HTTP 500"), "got {message}");
    assert!(message.contains("Code: 62"), "got {message}");
}

#[tokio::test]
async fn test_http_runner_applies_statements_in_file_order() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let schema = tempfile::tempdir().unwrap();
    std::fs::write(
        schema.path().join("001_database.sql"),
        "CREATE DATABASE IF NOT EXISTS otel;\n",
    )
    .unwrap();
    std::fs::write(
        schema.path().join("002_tables.sql"),
        "-- +goose Up\nCREATE TABLE IF NOT EXISTS otel.a (x UInt8) ENGINE = Memory;\nCREATE TABLE IF NOT EXISTS otel.b (x UInt8) ENGINE = Memory;\n-- +goose Down\nDROP TABLE otel.a;\n",
    )
    .unwrap();

    let client = connect(&config_for(&server, &schema)).await.unwrap();
    let runner = SqlDirRunner::new(client);
    runner.apply(schema.path()).await.unwrap();

    let bodies: Vec<String> = server
        .received_requests()
        .await
        .expect("request recording is enabled")
        .iter()
        .map(|request| String::from_utf8_lossy(&request.body).into_owned())
        .collect();

    assert_eq!(
        bodies,
        vec![
            "CREATE DATABASE IF NOT EXISTS otel;",
            "CREATE TABLE IF NOT EXISTS otel.a (x UInt8) ENGINE = Memory;",
            "CREATE TABLE IF NOT EXISTS otel.b (x UInt8) ENGINE = Memory;",
        ]
    );
}

#[tokio::test]
async fn test_http_runner_failure_names_file() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_string_contains("missing_db"))
        .respond_with(
            ResponseTemplate::new(404).set_body_string("Code: 81. DB::Exception: Database missing_db does not exist"),
        )
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let schema = tempfile::tempdir().unwrap();
    std::fs::write(schema.path().join("001_ok.sql"), "SELECT 1;").unwrap();
    std::fs::write(
        schema.path().join("002_bad.sql"),
        "CREATE TABLE IF NOT EXISTS missing_db.t (x UInt8) ENGINE = Memory;",
    )
    .unwrap();

    let client = connect(&config_for(&server, &schema)).await.unwrap();
    let err = SqlDirRunner::new(client).apply(schema.path()).await.unwrap_err();

    assert!(matches!(err, SeedError::Apply { ref file, .. } if file == "002_bad.sql"));
}
