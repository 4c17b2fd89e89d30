//! ClickHouse HTTP interface client.
//!
//! Statements are sent as the body of a POST request. Credentials travel in
//! the `X-ClickHouse-User` / `X-ClickHouse-Key` headers, so they never appear
//! in a URL that could be logged.

use super::{ClickHouseClient, DIAL_TIMEOUT, MAX_EXECUTION_TIME_SECS, PING_QUERY};
use crate::Result;
use crate::config::Config;
use crate::endpoint::ConnectionTarget;
use crate::error::SeedError;
use crate::tls::TlsPolicy;
use async_trait::async_trait;
use std::net::SocketAddr;
use tracing::{debug, trace};
use url::Url;
use zeroize::Zeroizing;

/// Client for ClickHouse's HTTP interface.
pub struct HttpClient {
    http: reqwest::Client,
    url: Url,
    target: ConnectionTarget,
    user: String,
    password: Zeroizing<String>,
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("url", &self.url.as_str())
            .field("user", &self.user)
            .finish_non_exhaustive()
    }
}

impl HttpClient {
    /// Creates a client for `target`, applying `tls` when present.
    ///
    /// No request is sent; call [`ClickHouseClient::ping`] to verify the
    /// connection.
    ///
    /// # Errors
    /// - TLS error when certificate material is rejected by the TLS stack
    /// - connection error when a server-name override is set and the real host
    ///   cannot be resolved
    pub async fn new(
        target: ConnectionTarget,
        config: &Config,
        tls: Option<&TlsPolicy>,
    ) -> Result<Self> {
        let mut builder = reqwest::Client::builder().connect_timeout(DIAL_TIMEOUT);
        let mut authority = target.address();

        if let Some(policy) = tls {
            if let Some(roots) = &policy.root_certs {
                builder = builder.tls_built_in_root_certs(false);
                for der in roots {
                    let cert = reqwest::Certificate::from_der(der.as_ref()).map_err(|e| {
                        SeedError::tls_failed("failed to parse CA certificate", e)
                    })?;
                    builder = builder.add_root_certificate(cert);
                }
            }

            if let Some(identity) = &policy.client_identity {
                let identity = reqwest::Identity::from_pem(identity.pem()).map_err(|e| {
                    SeedError::tls_failed("failed to load client certificate", e)
                })?;
                builder = builder.identity(identity);
            }

            if policy.insecure_skip_verify {
                builder = builder.danger_accept_invalid_certs(true);
            }

            // Address the override name and pin it to the real host's
            // addresses so it is the name verified in the handshake.
            if let Some(server_name) = &policy.server_name {
                let addrs = resolve(&target).await?;
                builder = builder.resolve_to_addrs(server_name, &addrs);
                authority = format!("{server_name}:{}", target.port);
            }
        }

        let scheme = if tls.is_some() { "https" } else { "http" };
        let mut url = Url::parse(&format!("{scheme}://{authority}/")).map_err(|e| {
            SeedError::configuration(format!("invalid server address {authority}: {e}"))
        })?;
        url.query_pairs_mut()
            .append_pair("max_execution_time", &MAX_EXECUTION_TIME_SECS.to_string());

        let http = builder
            .build()
            .map_err(|e| SeedError::tls_failed("failed to build HTTP client", e))?;

        debug!("HTTP client ready for {}", url);

        Ok(Self {
            http,
            url,
            target,
            user: config.user.clone(),
            password: config.password.clone(),
        })
    }

    async fn post(&self, sql: &str) -> std::result::Result<String, PostError> {
        let response = self
            .http
            .post(self.url.clone())
            .header("X-ClickHouse-User", &self.user)
            .header("X-ClickHouse-Key", self.password.as_str())
            .body(sql.to_string())
            .send()
            .await
            .map_err(PostError::Transport)?;

        let status = response.status();
        let body = response.text().await.map_err(PostError::Transport)?;
        if status.is_success() {
            Ok(body)
        } else {
            Err(PostError::Rejected {
                status: status.as_u16(),
                message: body.trim().to_string(),
            })
        }
    }
}

enum PostError {
    Transport(reqwest::Error),
    Rejected { status: u16, message: String },
}

async fn resolve(target: &ConnectionTarget) -> Result<Vec<SocketAddr>> {
    let addrs: Vec<SocketAddr> = tokio::net::lookup_host((target.host.as_str(), target.port))
        .await
        .map_err(|e| SeedError::connection_failed(format!("failed to resolve {}", target.host), e))?
        .collect();

    if addrs.is_empty() {
        return Err(SeedError::connection(format!(
            "no addresses found for {}",
            target.host
        )));
    }
    Ok(addrs)
}

#[async_trait]
impl ClickHouseClient for HttpClient {
    async fn ping(&self) -> Result<()> {
        match self.post(PING_QUERY).await {
            Ok(_) => Ok(()),
            Err(PostError::Transport(e)) => Err(SeedError::connection_failed(
                format!("cannot reach {}", self.target),
                e,
            )),
            Err(PostError::Rejected { status, message }) => Err(SeedError::connection(format!(
                "{} answered HTTP {status}: {message}",
                self.target
            ))),
        }
    }

    async fn execute(&self, sql: &str) -> Result<()> {
        trace!("Executing statement: {}", sql);
        match self.post(sql).await {
            Ok(_) => Ok(()),
            Err(PostError::Transport(e)) => Err(SeedError::connection_failed(
                format!("request to {} failed", self.target),
                e,
            )),
            Err(PostError::Rejected { status, message }) => Err(SeedError::query_failed(format!(
                "HTTP {status}: {message}"
            ))),
        }
    }

    fn target(&self) -> &ConnectionTarget {
        &self.target
    }
}
