//! Endpoint string parsing.
//!
//! Translates a logical ClickHouse endpoint such as `tcp://clickhouse` or
//! `https://ch.example.com:9443` into the transport-level parameters a driver
//! needs. Endpoints without a scheme are treated as `tcp://`.

use crate::error::{SeedError, redact_endpoint};
use std::fmt;
use url::{Host, Url};

/// Scheme assumed when an endpoint has no `://` separator.
pub const DEFAULT_SCHEME: &str = "tcp";

/// Host used by the default endpoint.
pub const DEFAULT_HOST: &str = "localhost";

/// Wire protocol used to talk to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    /// ClickHouse native TCP protocol
    Native,
    /// ClickHouse HTTP interface
    Http,
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Native => write!(f, "native"),
            Self::Http => write!(f, "http"),
        }
    }
}

/// One row of the scheme dispatch table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchemeDefaults {
    pub scheme: &'static str,
    pub transport: Transport,
    pub port: u16,
    pub secure: bool,
}

/// Supported endpoint schemes.
pub const SCHEMES: &[SchemeDefaults] = &[
    SchemeDefaults {
        scheme: "tcp",
        transport: Transport::Native,
        port: 9000,
        secure: false,
    },
    SchemeDefaults {
        scheme: "http",
        transport: Transport::Http,
        port: 8123,
        secure: false,
    },
    SchemeDefaults {
        scheme: "https",
        transport: Transport::Http,
        port: 8443,
        secure: true,
    },
];

/// Looks up the dispatch table entry for a scheme.
pub fn scheme_defaults(scheme: &str) -> Option<SchemeDefaults> {
    SCHEMES.iter().copied().find(|entry| entry.scheme == scheme)
}

/// Endpoint used when none is configured: `tcp://localhost:9000`.
pub fn default_endpoint() -> String {
    let port = scheme_defaults(DEFAULT_SCHEME).map_or(9000, |entry| entry.port);
    format!("{DEFAULT_SCHEME}://{DEFAULT_HOST}:{port}")
}

/// Transport-level description of where the server lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionTarget {
    pub transport: Transport,
    pub host: String,
    pub port: u16,
    pub secure: bool,
}

impl ConnectionTarget {
    /// `host:port`, bracketing IPv6 literals.
    pub fn address(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

impl fmt::Display for ConnectionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}://{}{}",
            self.transport,
            self.address(),
            if self.secure { " (tls)" } else { "" }
        )
    }
}

/// Parses an endpoint string into a [`ConnectionTarget`].
///
/// An explicit port always wins over the scheme's default port.
///
/// # Errors
/// Returns a configuration error if the endpoint is not a valid URI, has no
/// host, or uses a scheme other than `tcp`, `http` or `https`.
///
/// # Example
/// ```rust
/// use chseed_core::endpoint::{Transport, parse_endpoint};
///
/// let target = parse_endpoint("https://ch.example.com")?;
/// assert_eq!(target.transport, Transport::Http);
/// assert_eq!(target.port, 8443);
/// assert!(target.secure);
/// # Ok::<(), chseed_core::SeedError>(())
/// ```
pub fn parse_endpoint(endpoint: &str) -> crate::Result<ConnectionTarget> {
    let candidate = if endpoint.contains("://") {
        endpoint.to_string()
    } else {
        format!("{DEFAULT_SCHEME}://{endpoint}")
    };

    let url = Url::parse(&candidate).map_err(|e| {
        SeedError::configuration(format!(
            "failed to parse endpoint {}: {e}",
            redact_endpoint(endpoint)
        ))
    })?;

    let defaults = scheme_defaults(url.scheme()).ok_or_else(|| {
        SeedError::configuration(format!("unsupported protocol: {}", url.scheme()))
    })?;

    let host = match url.host() {
        Some(Host::Ipv6(addr)) => addr.to_string(),
        Some(Host::Ipv4(addr)) => addr.to_string(),
        Some(Host::Domain(domain)) if !domain.is_empty() => domain.to_string(),
        _ => {
            return Err(SeedError::configuration(format!(
                "missing host in endpoint {}",
                redact_endpoint(endpoint)
            )));
        }
    };

    Ok(ConnectionTarget {
        transport: defaults.transport,
        host,
        port: explicit_port(&url, &candidate).unwrap_or(defaults.port),
        secure: defaults.secure,
    })
}

/// Port written in the endpoint, if any.
///
/// `Url` normalizes away ports equal to the scheme's well-known default
/// (80 for http, 443 for https), so those are recovered from the raw text.
fn explicit_port(url: &Url, raw: &str) -> Option<u16> {
    if let Some(port) = url.port() {
        return Some(port);
    }
    let known = url.port_or_known_default()?;
    let authority = raw
        .split_once("://")
        .map_or(raw, |(_, rest)| rest)
        .split(['/', '?', '#'])
        .next()
        .unwrap_or_default();
    authority
        .ends_with(&format!(":{known}"))
        .then_some(known)
}
