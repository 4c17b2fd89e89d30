//! The materialized schema copy is removed however a run ends.
//!
//! Each test points `TMPDIR` at a private directory and checks that nothing
//! is left in it afterwards. `temp_env` serializes these tests.

#![cfg(unix)]
#![allow(clippy::expect_used)]
#![allow(clippy::unwrap_used)]

use chseed::run;
use chseed_core::config::vars;
use chseed_core::{Config, SeedError};
use std::path::Path;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_string_contains, method};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn write_schema(dir: &Path) {
    std::fs::write(
        dir.join("000_database.sql"),
        "CREATE DATABASE IF NOT EXISTS ${DATABASE};\n",
    )
    .unwrap();
    std::fs::write(
        dir.join("001_logs.sql"),
        "CREATE TABLE IF NOT EXISTS ${DATABASE}.otel_logs (Body String)\nENGINE = MergeTree\nORDER BY Body\nTTL now() + ${TABLES_TTL};\n",
    )
    .unwrap();
}

/// Server that accepts the ping and the database but rejects the table.
async fn failing_server() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_string_contains("otel_logs"))
        .respond_with(ResponseTemplate::new(500).set_body_string("Code: 241. DB::Exception: Memory limit exceeded"))
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    server
}

/// Runs `body` with `TMPDIR` set to a fresh empty directory and returns the
/// entries left in it.
fn leftovers_after<F, Fut>(body: F) -> Vec<String>
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = ()>,
{
    let private_tmp = tempfile::tempdir().unwrap();
    temp_env::with_var("TMPDIR", Some(private_tmp.path()), || {
        tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .unwrap()
            .block_on(body());
    });

    std::fs::read_dir(private_tmp.path())
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect()
}

#[test]
fn test_end_to_end_cleanup_after_exhausted_retries() {
    let schema = tempfile::tempdir().unwrap();
    write_schema(schema.path());

    let leftover = leftovers_after(|| async {
        let server = failing_server().await;
        let endpoint = server.uri();
        let env = [(vars::ENDPOINT, endpoint.as_str()), (vars::MAX_ATTEMPTS, "2")];
        let config = Config::resolve(&env, Some(schema.path())).unwrap();

        let err = run(&config, &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, SeedError::Seed { attempts: 2, .. }), "{err:?}");
    });

    assert!(leftover.is_empty(), "left behind: {leftover:?}");
}

#[test]
fn test_end_to_end_cleanup_after_cancel_during_backoff() {
    let schema = tempfile::tempdir().unwrap();
    write_schema(schema.path());

    let leftover = leftovers_after(|| async {
        let server = failing_server().await;
        let endpoint = server.uri();
        let env = [(vars::ENDPOINT, endpoint.as_str()), (vars::MAX_ATTEMPTS, "3")];
        let config = Config::resolve(&env, Some(schema.path())).unwrap();

        // The first attempt fails at once; the 1s backoff is still running
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(400)).await;
            trigger.cancel();
        });

        let err = run(&config, &cancel).await.unwrap_err();
        assert!(matches!(err, SeedError::Cancelled), "{err:?}");

        let received = server.received_requests().await.unwrap();
        assert!(
            received
                .iter()
                .any(|request| String::from_utf8_lossy(&request.body).contains("otel_logs"))
        );
    });

    assert!(leftover.is_empty(), "left behind: {leftover:?}");
}
