//! Core library for chseed, an idempotent ClickHouse schema seeder.
//!
//! A run resolves its configuration from the environment, connects to the
//! server, converts the retention period into a ClickHouse interval literal,
//! materializes the schema directory with its macros substituted and applies
//! every SQL file with bounded exponential backoff.
//!
//! # Security Guarantees
//! - The password is held in zeroizing memory and never logged
//! - Endpoints are redacted before they appear in logs or errors
//! - TLS certificate material is read once and validated before connecting
//!
//! # Seeding Model
//! Every run re-applies every file. There is no version table, so schema
//! files must be idempotent (`CREATE ... IF NOT EXISTS`).

pub mod client;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod logging;
pub mod runner;
pub mod seeder;
pub mod template;
pub mod tls;
pub mod ttl;

// Re-export commonly used types
pub use client::{ClickHouseClient, HttpClient, NativeClient, connect};
pub use config::{Config, EnvSource, ProcessEnv, TlsSettings};
pub use endpoint::{ConnectionTarget, Transport, parse_endpoint};
pub use error::{Result, SeedError, redact_endpoint};
pub use runner::{SchemaRunner, SqlDirRunner, list_sql_files};
pub use seeder::{RetryPolicy, SeedAttempt, seed};
pub use template::{Macros, MaterializedSchema, materialize};
pub use tls::TlsPolicy;
pub use ttl::{IntervalLiteral, IntervalUnit, parse_ttl, to_interval_literal};
