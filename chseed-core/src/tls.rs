//! TLS policy construction from optional certificate material.
//!
//! # Security
//! - Client key material is held in a `Zeroizing` buffer and never printed
//! - A client certificate is only loaded together with its key; either one
//!   alone is ignored rather than producing a half-configured identity

use crate::config::TlsSettings;
use crate::endpoint::ConnectionTarget;
use crate::error::SeedError;
use rustls_pki_types::pem::PemObject;
use rustls_pki_types::{CertificateDer, PrivateKeyDer};
use std::fmt;
use std::path::Path;
use zeroize::Zeroizing;

/// Client certificate chain and private key, kept as validated PEM.
#[derive(Clone)]
pub struct ClientIdentity {
    pem: Zeroizing<Vec<u8>>,
    chain_len: usize,
}

impl ClientIdentity {
    /// Combined certificate chain and key PEM, as TLS clients expect it.
    pub fn pem(&self) -> &[u8] {
        &self.pem
    }

    /// Number of certificates in the chain.
    pub fn chain_len(&self) -> usize {
        self.chain_len
    }
}

impl fmt::Debug for ClientIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientIdentity")
            .field("chain_len", &self.chain_len)
            .field("key", &"****")
            .finish()
    }
}

/// Resolved transport security parameters for one connection.
#[derive(Debug, Clone, Default)]
pub struct TlsPolicy {
    pub insecure_skip_verify: bool,
    pub server_name: Option<String>,
    /// Trust roots replacing the platform defaults, when a CA file is given
    pub root_certs: Option<Vec<CertificateDer<'static>>>,
    pub client_identity: Option<ClientIdentity>,
}

impl TlsPolicy {
    /// Whether a connection to `target` must be encrypted.
    ///
    /// TLS is used for secure schemes and whenever a CA file or client
    /// certificate has been configured.
    pub fn required_for(target: &ConnectionTarget, settings: &TlsSettings) -> bool {
        target.secure || settings.has_material()
    }

    /// Builds a policy from the configured TLS settings.
    ///
    /// # Errors
    /// - the CA file cannot be read, or holds no parseable PEM certificate
    /// - the client certificate or key cannot be read or parsed
    pub fn from_settings(settings: &TlsSettings) -> crate::Result<Self> {
        let root_certs = settings
            .ca_file
            .as_deref()
            .map(load_ca_certificates)
            .transpose()?;

        let client_identity = match (&settings.cert_file, &settings.key_file) {
            (Some(cert), Some(key)) => Some(load_client_identity(cert, key)?),
            _ => None,
        };

        Ok(Self {
            insecure_skip_verify: settings.insecure_skip_verify,
            server_name: settings.server_name.clone(),
            root_certs,
            client_identity,
        })
    }
}

fn load_ca_certificates(path: &Path) -> crate::Result<Vec<CertificateDer<'static>>> {
    let pem = std::fs::read(path).map_err(|e| {
        SeedError::tls_failed(
            format!("failed to read CA certificate file {}", path.display()),
            e,
        )
    })?;

    let certs = CertificateDer::pem_slice_iter(&pem)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| {
            SeedError::tls_failed(
                format!("failed to parse CA certificate {}", path.display()),
                e,
            )
        })?;

    if certs.is_empty() {
        return Err(SeedError::tls(format!(
            "failed to parse CA certificate {}: no PEM certificates found",
            path.display()
        )));
    }

    Ok(certs)
}

fn load_client_identity(cert_path: &Path, key_path: &Path) -> crate::Result<ClientIdentity> {
    let read = |path: &Path, what: &str| {
        std::fs::read(path).map(Zeroizing::new).map_err(|e| {
            SeedError::tls_failed(
                format!(
                    "failed to load client certificate: cannot read {what} {}",
                    path.display()
                ),
                e,
            )
        })
    };
    let cert_pem = read(cert_path, "certificate")?;
    let key_pem = read(key_path, "key")?;

    let chain = CertificateDer::pem_slice_iter(&cert_pem)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| {
            SeedError::tls_failed(
                format!("failed to load client certificate {}", cert_path.display()),
                e,
            )
        })?;
    if chain.is_empty() {
        return Err(SeedError::tls(format!(
            "failed to load client certificate {}: no PEM certificates found",
            cert_path.display()
        )));
    }

    PrivateKeyDer::from_pem_slice(&key_pem).map_err(|e| {
        SeedError::tls_failed(
            format!("failed to load client key {}", key_path.display()),
            e,
        )
    })?;

    let mut pem = Zeroizing::new(Vec::with_capacity(
        cert_pem.len().saturating_add(key_pem.len()).saturating_add(1),
    ));
    pem.extend_from_slice(&cert_pem);
    pem.push(b'\n');
    pem.extend_from_slice(&key_pem);

    Ok(ClientIdentity {
        pem,
        chain_len: chain.len(),
    })
}
