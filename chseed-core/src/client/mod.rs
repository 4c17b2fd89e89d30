//! Database client seam.
//!
//! The seeder only needs two operations from a driver: a liveness check and
//! the ability to execute one SQL statement. Keeping them behind a trait lets
//! the runner and seeder be exercised without a live server.

pub mod http;
pub mod native;

use crate::Result;
use crate::config::Config;
use crate::endpoint::{ConnectionTarget, Transport, parse_endpoint};
use crate::tls::TlsPolicy;
use async_trait::async_trait;
use std::time::Duration;

pub use http::HttpClient;
pub use native::NativeClient;

/// Connect timeout applied to every new connection.
pub const DIAL_TIMEOUT: Duration = Duration::from_secs(30);

/// Server-side limit for a single statement, in seconds.
pub const MAX_EXECUTION_TIME_SECS: u64 = 60;

/// Statement used to check connectivity and credentials.
const PING_QUERY: &str = "SELECT 1";

/// Minimal ClickHouse driver interface.
///
/// # Object Safety
/// This trait is object-safe, so runners can hold a `Box<dyn ClickHouseClient>`.
#[async_trait]
pub trait ClickHouseClient: Send + Sync {
    /// Checks that the server is reachable and accepts the credentials.
    ///
    /// # Errors
    /// Returns a connection error if the server cannot be reached or rejects
    /// the request.
    async fn ping(&self) -> Result<()>;

    /// Executes one statement, discarding any result set.
    ///
    /// # Errors
    /// Returns an error carrying the server's message if the statement fails.
    async fn execute(&self, sql: &str) -> Result<()>;

    /// Where this client connects, for log lines.
    fn target(&self) -> &ConnectionTarget;
}

#[async_trait]
impl<C: ClickHouseClient + ?Sized> ClickHouseClient for Box<C> {
    async fn ping(&self) -> Result<()> {
        (**self).ping().await
    }

    async fn execute(&self, sql: &str) -> Result<()> {
        (**self).execute(sql).await
    }

    fn target(&self) -> &ConnectionTarget {
        (**self).target()
    }
}

/// Builds a client for the configured endpoint.
///
/// The TLS policy is only constructed when the target needs encryption (see
/// [`TlsPolicy::required_for`]).
///
/// `http`/`https` targets get an [`HttpClient`]; `tcp` targets get a
/// [`NativeClient`], which opens its connection here.
///
/// # Errors
/// - configuration error for an unparseable endpoint
/// - TLS error for unusable certificate material, or for TLS on a native
///   target
/// - connection error when a native target cannot be reached
pub async fn connect(config: &Config) -> Result<Box<dyn ClickHouseClient>> {
    let target = parse_endpoint(&config.endpoint)?;

    let tls = if TlsPolicy::required_for(&target, &config.tls) {
        Some(TlsPolicy::from_settings(&config.tls)?)
    } else {
        None
    };

    match target.transport {
        Transport::Http => Ok(Box::new(HttpClient::new(target, config, tls.as_ref()).await?)),
        Transport::Native => Ok(Box::new(
            NativeClient::connect(target, config, tls.is_some()).await?,
        )),
    }
}
