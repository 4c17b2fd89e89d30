//! Library module for chseed
//!
//! Exposes the CLI definition and the seed run so they can be tested without
//! spawning the binary.

pub mod seed;

pub use seed::run;

use clap::{Args, Parser};
use std::path::PathBuf;

/// CLI argument structure
#[derive(Debug, Parser)]
#[command(name = "chseed")]
#[command(about = "Idempotent ClickHouse schema seeding tool")]
#[command(version)]
#[command(long_about = "
chseed - Idempotent ClickHouse schema seeding

Copies SCHEMA_DIR into a temporary directory, substitutes the ${DATABASE}
and ${TABLES_TTL} macros in every file, and applies each top-level .sql
file in name order. Every run re-applies every file, so statements must be
idempotent (CREATE ... IF NOT EXISTS).

ENVIRONMENT:
  CLICKHOUSE_ENDPOINT                         Server endpoint (default tcp://localhost:9000)
  CLICKHOUSE_USER / CLICKHOUSE_PASSWORD       Credentials (default user: default)
  HYPERDX_OTEL_EXPORTER_CLICKHOUSE_DATABASE   Value of ${DATABASE} (default: default)
  HYPERDX_OTEL_EXPORTER_TABLES_TTL            Retention for ${TABLES_TTL} (default: 720h)
  CLICKHOUSE_TLS_CA_FILE                      CA bundle used to verify the server
  CLICKHOUSE_TLS_CERT_FILE / _KEY_FILE        Client certificate and key
  CLICKHOUSE_TLS_SERVER_NAME_OVERRIDE         Name verified in the server certificate
  CLICKHOUSE_TLS_INSECURE_SKIP_VERIFY         'true' disables certificate verification
  CLICKHOUSE_SEED_MAX_ATTEMPTS                Seed attempts before giving up (default: 5)

EXAMPLES:
  chseed ./schema
  CLICKHOUSE_ENDPOINT=https://ch.example.com:8443 chseed -v ./schema
")]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    /// Schema template directory
    #[arg(value_name = "SCHEMA_DIR", help = "Directory of SQL schema templates")]
    pub schema_dir: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct GlobalArgs {
    /// Increase verbosity
    #[arg(
        short,
        long,
        action = clap::ArgAction::Count,
        help = "Increase verbosity (-v, -vv)"
    )]
    pub verbose: u8,

    /// Suppress output
    #[arg(short, long, help = "Suppress all output except errors")]
    pub quiet: bool,
}

/// Renders an error followed by its chain of causes.
pub fn error_chain(error: &dyn std::error::Error) -> String {
    let mut rendered = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        rendered.push_str(": ");
        rendered.push_str(&cause.to_string());
        source = cause.source();
    }
    rendered
}
