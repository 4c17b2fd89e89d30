//! ClickHouse native-protocol client.
//!
//! Used for `tcp://` endpoints. One connection is opened per run and every
//! statement is sent over it in order.

use super::{ClickHouseClient, DIAL_TIMEOUT, MAX_EXECUTION_TIME_SECS};
use crate::Result;
use crate::config::Config;
use crate::endpoint::ConnectionTarget;
use crate::error::SeedError;
use async_trait::async_trait;
use klickhouse::{Client, ClientOptions};
use tracing::{debug, trace};

/// Client for ClickHouse's native TCP protocol.
pub struct NativeClient {
    client: Client,
    target: ConnectionTarget,
}

impl std::fmt::Debug for NativeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeClient")
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

impl NativeClient {
    /// Opens a connection to `target` with the configured credentials.
    ///
    /// # Errors
    /// - TLS error when TLS is requested; this transport is plaintext only
    /// - connection error when the server cannot be reached within the dial
    ///   timeout or rejects the handshake
    pub async fn connect(target: ConnectionTarget, config: &Config, tls: bool) -> Result<Self> {
        if tls {
            return Err(SeedError::tls(format!(
                "TLS is not supported over the native protocol for {target}; \
                 use an https:// endpoint"
            )));
        }

        let options = ClientOptions {
            username: config.user.clone(),
            password: config.password.to_string(),
            ..ClientOptions::default()
        };

        let address = target.address();
        let client = tokio::time::timeout(DIAL_TIMEOUT, Client::connect(address.as_str(), options))
            .await
            .map_err(|_| {
                SeedError::connection(format!(
                    "timed out after {}s connecting to {target}",
                    DIAL_TIMEOUT.as_secs()
                ))
            })?
            .map_err(|e| SeedError::connection_failed(format!("cannot reach {target}"), e))?;

        client
            .execute(format!("SET max_execution_time = {MAX_EXECUTION_TIME_SECS}"))
            .await
            .map_err(|e| {
                SeedError::connection_failed(format!("{target} rejected session settings"), e)
            })?;

        debug!("Native connection open to {}", target);
        Ok(Self { client, target })
    }
}

#[async_trait]
impl ClickHouseClient for NativeClient {
    async fn ping(&self) -> Result<()> {
        self.client
            .execute(super::PING_QUERY)
            .await
            .map_err(|e| SeedError::connection_failed(format!("cannot reach {}", self.target), e))
    }

    async fn execute(&self, sql: &str) -> Result<()> {
        trace!("Executing statement: {}", sql);
        self.client
            .execute(sql)
            .await
            .map_err(|e| SeedError::query_failed(e.to_string()))
    }

    fn target(&self) -> &ConnectionTarget {
        &self.target
    }
}
