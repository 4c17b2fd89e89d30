//! Run configuration.
//!
//! The configuration is resolved exactly once per run from an environment
//! snapshot and the schema-directory argument, then passed by reference to
//! every component. Nothing else in the crate reads the process environment.
//!
//! # Security
//! The password is held in a `Zeroizing` container and redacted from `Debug`
//! output.

use crate::endpoint::default_endpoint;
use crate::error::SeedError;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use zeroize::Zeroizing;

/// Environment variable names.
pub mod vars {
    pub const ENDPOINT: &str = "CLICKHOUSE_ENDPOINT";
    pub const USER: &str = "CLICKHOUSE_USER";
    pub const PASSWORD: &str = "CLICKHOUSE_PASSWORD";
    pub const DATABASE: &str = "HYPERDX_OTEL_EXPORTER_CLICKHOUSE_DATABASE";
    pub const TABLES_TTL: &str = "HYPERDX_OTEL_EXPORTER_TABLES_TTL";
    pub const TLS_CA_FILE: &str = "CLICKHOUSE_TLS_CA_FILE";
    pub const TLS_CERT_FILE: &str = "CLICKHOUSE_TLS_CERT_FILE";
    pub const TLS_KEY_FILE: &str = "CLICKHOUSE_TLS_KEY_FILE";
    pub const TLS_SERVER_NAME_OVERRIDE: &str = "CLICKHOUSE_TLS_SERVER_NAME_OVERRIDE";
    pub const TLS_INSECURE_SKIP_VERIFY: &str = "CLICKHOUSE_TLS_INSECURE_SKIP_VERIFY";
    pub const MAX_ATTEMPTS: &str = "CLICKHOUSE_SEED_MAX_ATTEMPTS";
}

/// Name the binary is invoked as in usage messages.
pub const BIN_NAME: &str = "chseed";

pub const DEFAULT_USER: &str = "default";
pub const DEFAULT_DATABASE: &str = "default";
pub const DEFAULT_TABLES_TTL: &str = "720h";
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Read-only view of environment variables.
pub trait EnvSource {
    /// Returns the raw value of `key`, if set.
    fn var(&self, key: &str) -> Option<String>;
}

impl EnvSource for HashMap<String, String> {
    fn var(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

impl<const N: usize> EnvSource for [(&str, &str); N] {
    fn var(&self, key: &str) -> Option<String> {
        self.iter()
            .find(|(name, _)| *name == key)
            .map(|(_, value)| (*value).to_string())
    }
}

/// Snapshot of the process environment taken at startup.
#[derive(Debug, Clone, Default)]
pub struct ProcessEnv {
    vars: HashMap<String, String>,
}

impl ProcessEnv {
    /// Captures all variables with UTF-8 names and values.
    pub fn capture() -> Self {
        let vars = std::env::vars_os()
            .filter_map(|(key, value)| Some((key.into_string().ok()?, value.into_string().ok()?)))
            .collect();
        Self { vars }
    }
}

impl EnvSource for ProcessEnv {
    fn var(&self, key: &str) -> Option<String> {
        self.vars.var(key)
    }
}

/// Empty values are treated the same as unset ones.
fn non_empty(env: &impl EnvSource, key: &str) -> Option<String> {
    env.var(key).filter(|value| !value.is_empty())
}

/// TLS inputs, all optional.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TlsSettings {
    pub ca_file: Option<PathBuf>,
    pub cert_file: Option<PathBuf>,
    pub key_file: Option<PathBuf>,
    pub server_name: Option<String>,
    pub insecure_skip_verify: bool,
}

impl TlsSettings {
    /// Whether any certificate material was configured.
    pub fn has_material(&self) -> bool {
        self.ca_file.is_some() || self.cert_file.is_some()
    }
}

/// Immutable snapshot of everything a seed run needs.
#[derive(Clone, PartialEq, Eq)]
pub struct Config {
    pub endpoint: String,
    pub user: String,
    pub password: Zeroizing<String>,
    pub database: String,
    pub tls: TlsSettings,
    pub schema_dir: PathBuf,
    pub tables_ttl: String,
    pub max_attempts: u32,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("endpoint", &crate::error::redact_endpoint(&self.endpoint))
            .field("user", &self.user)
            .field("password", &"****")
            .field("database", &self.database)
            .field("tls", &self.tls)
            .field("schema_dir", &self.schema_dir)
            .field("tables_ttl", &self.tables_ttl)
            .field("max_attempts", &self.max_attempts)
            .finish()
    }
}

impl Config {
    /// Resolves the configuration from an environment and the schema
    /// directory argument.
    ///
    /// Every variable in [`vars`] overrides its default when set to a
    /// non-empty value. The TTL and endpoint are not validated here; their
    /// parsers do that when they run.
    ///
    /// # Errors
    /// - usage error when `schema_dir` is `None`
    /// - not-found error when the directory does not exist
    /// - configuration error when the max-attempts override is not a positive
    ///   integer
    ///
    /// # Example
    /// ```rust
    /// use chseed_core::Config;
    ///
    /// let dir = std::env::temp_dir();
    /// let env = [("HYPERDX_OTEL_EXPORTER_CLICKHOUSE_DATABASE", "otel")];
    /// let config = Config::resolve(&env, Some(&dir))?;
    /// assert_eq!(config.database, "otel");
    /// assert_eq!(config.endpoint, "tcp://localhost:9000");
    /// # Ok::<(), chseed_core::SeedError>(())
    /// ```
    pub fn resolve(env: &impl EnvSource, schema_dir: Option<&Path>) -> crate::Result<Self> {
        let schema_dir = schema_dir.ok_or_else(|| {
            SeedError::configuration(format!("usage: {BIN_NAME} <schema-directory>"))
        })?;

        match std::fs::metadata(schema_dir) {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => {
                return Err(SeedError::configuration(format!(
                    "schema path is not a directory: {}",
                    schema_dir.display()
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(SeedError::configuration(format!(
                    "schema directory does not exist: {}",
                    schema_dir.display()
                )));
            }
            Err(e) => {
                return Err(SeedError::configuration(format!(
                    "cannot access schema directory {}: {e}",
                    schema_dir.display()
                )));
            }
        }

        let max_attempts = match non_empty(env, vars::MAX_ATTEMPTS) {
            None => DEFAULT_MAX_ATTEMPTS,
            Some(raw) => match raw.trim().parse::<u32>() {
                Ok(n) if n >= 1 => n,
                _ => {
                    return Err(SeedError::configuration(format!(
                        "{} must be a positive integer, got {raw:?}",
                        vars::MAX_ATTEMPTS
                    )));
                }
            },
        };

        Ok(Self {
            endpoint: non_empty(env, vars::ENDPOINT).unwrap_or_else(default_endpoint),
            user: non_empty(env, vars::USER).unwrap_or_else(|| DEFAULT_USER.to_string()),
            password: Zeroizing::new(non_empty(env, vars::PASSWORD).unwrap_or_default()),
            database: non_empty(env, vars::DATABASE)
                .unwrap_or_else(|| DEFAULT_DATABASE.to_string()),
            tls: TlsSettings {
                ca_file: non_empty(env, vars::TLS_CA_FILE).map(PathBuf::from),
                cert_file: non_empty(env, vars::TLS_CERT_FILE).map(PathBuf::from),
                key_file: non_empty(env, vars::TLS_KEY_FILE).map(PathBuf::from),
                server_name: non_empty(env, vars::TLS_SERVER_NAME_OVERRIDE),
                insecure_skip_verify: non_empty(env, vars::TLS_INSECURE_SKIP_VERIFY)
                    .is_some_and(|value| value == "true"),
            },
            schema_dir: schema_dir.to_path_buf(),
            tables_ttl: non_empty(env, vars::TABLES_TTL)
                .unwrap_or_else(|| DEFAULT_TABLES_TTL.to_string()),
            max_attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_schema_dir_argument() {
        let err = Config::resolve(&HashMap::new(), None).unwrap_err();
        assert!(err.to_string().contains("usage:"), "got {err}");
    }

    #[test]
    fn test_nonexistent_schema_dir() {
        let err = Config::resolve(&HashMap::new(), Some(Path::new("/nonexistent/path/schema")))
            .unwrap_err();
        assert!(err.to_string().contains("does not exist"), "got {err}");
        assert!(err.to_string().contains("/nonexistent/path/schema"));
    }

    #[test]
    fn test_schema_path_is_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let err = Config::resolve(&HashMap::new(), Some(file.path())).unwrap_err();
        assert!(err.to_string().contains("not a directory"));
    }

    #[test]
    fn test_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::resolve(&HashMap::new(), Some(dir.path())).unwrap();

        assert_eq!(config.endpoint, "tcp://localhost:9000");
        assert_eq!(config.user, "default");
        assert_eq!(config.password.as_str(), "");
        assert_eq!(config.database, "default");
        assert_eq!(config.tables_ttl, "720h");
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.schema_dir, dir.path());
        assert_eq!(config.tls, TlsSettings::default());
    }

    #[test]
    fn test_env_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let env = [
            (vars::ENDPOINT, "https://ch.example.com:8443"),
            (vars::USER, "admin"),
            (vars::PASSWORD, "secret"),
            (vars::DATABASE, "mydb"),
            (vars::TABLES_TTL, "7d"),
            (vars::TLS_CA_FILE, "/etc/ssl/ca.pem"),
            (vars::TLS_SERVER_NAME_OVERRIDE, "ch.internal"),
            (vars::TLS_INSECURE_SKIP_VERIFY, "true"),
            (vars::MAX_ATTEMPTS, "3"),
        ];

        let config = Config::resolve(&env, Some(dir.path())).unwrap();

        assert_eq!(config.endpoint, "https://ch.example.com:8443");
        assert_eq!(config.user, "admin");
        assert_eq!(config.password.as_str(), "secret");
        assert_eq!(config.database, "mydb");
        assert_eq!(config.tables_ttl, "7d");
        assert_eq!(config.tls.ca_file, Some(PathBuf::from("/etc/ssl/ca.pem")));
        assert_eq!(config.tls.server_name.as_deref(), Some("ch.internal"));
        assert!(config.tls.insecure_skip_verify);
        assert_eq!(config.max_attempts, 3);
    }

    #[test]
    fn test_empty_values_behave_as_unset() {
        let dir = tempfile::tempdir().unwrap();
        let with_empty = [
            (vars::ENDPOINT, ""),
            (vars::USER, ""),
            (vars::DATABASE, ""),
            (vars::TABLES_TTL, ""),
            (vars::TLS_CERT_FILE, ""),
            (vars::MAX_ATTEMPTS, ""),
        ];

        assert_eq!(
            Config::resolve(&with_empty, Some(dir.path())).unwrap(),
            Config::resolve(&HashMap::new(), Some(dir.path())).unwrap()
        );
    }

    #[test]
    fn test_skip_verify_requires_literal_true() {
        let dir = tempfile::tempdir().unwrap();
        for value in ["1", "yes", "TRUE", "false"] {
            let env = [(vars::TLS_INSECURE_SKIP_VERIFY, value)];
            let config = Config::resolve(&env, Some(dir.path())).unwrap();
            assert!(!config.tls.insecure_skip_verify, "value {value:?}");
        }
    }

    #[test]
    fn test_invalid_max_attempts() {
        let dir = tempfile::tempdir().unwrap();
        for value in ["0", "-2", "many"] {
            let env = [(vars::MAX_ATTEMPTS, value)];
            let err = Config::resolve(&env, Some(dir.path())).unwrap_err();
            assert!(err.to_string().contains(vars::MAX_ATTEMPTS));
        }
    }

    #[test]
    fn test_ttl_not_validated_at_resolution() {
        let dir = tempfile::tempdir().unwrap();
        let env = [(vars::TABLES_TTL, "not-a-duration")];
        let config = Config::resolve(&env, Some(dir.path())).unwrap();
        assert_eq!(config.tables_ttl, "not-a-duration");
    }

    #[test]
    fn test_debug_redacts_password() {
        let dir = tempfile::tempdir().unwrap();
        let env = [
            (vars::PASSWORD, "hunter2"),
            (vars::ENDPOINT, "http://u:inline-secret@ch:8123"),
        ];
        let config = Config::resolve(&env, Some(dir.path())).unwrap();
        let debug = format!("{config:?}");

        assert!(!debug.contains("hunter2"));
        assert!(!debug.contains("inline-secret"));
    }
}
