// ABOUTME: Configuration loading and validation for the docbundle server.
// ABOUTME: Reads DOCBUNDLE_* environment variables and refuses unauthenticated remote binds.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use docbundle_core::OrgId;
use docbundle_store::{RetryPolicy, StoreOptions};
use thiserror::Error;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("DOCBUNDLE_BIND is not a valid socket address: {0}")]
    InvalidBind(String),

    #[error("DOCBUNDLE_BIND {0} is not a loopback address; set DOCBUNDLE_ALLOW_REMOTE=true to listen on it")]
    RemoteNotAllowed(SocketAddr),

    #[error("DOCBUNDLE_ALLOW_REMOTE is true but DOCBUNDLE_AUTH_TOKEN is not set; refusing to start without authentication")]
    RemoteWithoutToken,

    #[error("ORG_ID must be a positive integer, got {0:?}")]
    InvalidOrgId(String),

    #[error("{name} must be a non-negative integer, got {value:?}")]
    InvalidNumber { name: &'static str, value: String },
}

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct BundlerConfig {
    pub home: PathBuf,
    pub db_path: PathBuf,
    pub bind: SocketAddr,
    pub allow_remote: bool,
    pub auth_token: Option<String>,
    pub default_org_id: Option<OrgId>,
    pub busy_timeout: Duration,
    pub conflict_retries: u32,
}

impl BundlerConfig {
    /// Load configuration from environment variables with sensible defaults.
    ///
    /// Environment variables:
    /// - DOCBUNDLE_HOME: data directory (default: ~/.docbundle)
    /// - DOCBUNDLE_DB: SQLite database file (default: $DOCBUNDLE_HOME/bundles.db)
    /// - DOCBUNDLE_BIND: socket address to bind (default: 127.0.0.1:5003)
    /// - DOCBUNDLE_ALLOW_REMOTE: allow non-loopback binds (default: false)
    /// - DOCBUNDLE_AUTH_TOKEN: bearer token for API auth (optional)
    /// - ORG_ID: organization used when a request names none (optional)
    /// - DOCBUNDLE_BUSY_TIMEOUT_MS: SQLite lock wait (default: 5000)
    /// - DOCBUNDLE_CONFLICT_RETRIES: attempts for bundle-for-document (default: 3)
    pub fn from_env() -> Result<Self, ConfigError> {
        let home = std::env::var("DOCBUNDLE_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                std::env::var("HOME")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from("/tmp"))
                    .join(".docbundle")
            });

        let db_path = std::env::var("DOCBUNDLE_DB")
            .ok()
            .filter(|p| !p.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| home.join("bundles.db"));

        let bind_str =
            std::env::var("DOCBUNDLE_BIND").unwrap_or_else(|_| "127.0.0.1:5003".to_string());
        let bind: SocketAddr = bind_str
            .parse()
            .map_err(|_| ConfigError::InvalidBind(bind_str))?;

        let allow_remote = std::env::var("DOCBUNDLE_ALLOW_REMOTE")
            .map(|v| v == "true" || v == "1" || v == "yes")
            .unwrap_or(false);

        let auth_token = std::env::var("DOCBUNDLE_AUTH_TOKEN")
            .ok()
            .filter(|t| !t.is_empty());

        let default_org_id = match std::env::var("ORG_ID") {
            Ok(raw) if !raw.trim().is_empty() => Some(parse_org(&raw)?),
            _ => None,
        };

        let busy_timeout = Duration::from_millis(number("DOCBUNDLE_BUSY_TIMEOUT_MS", 5000)?);
        let conflict_retries = u32::try_from(number("DOCBUNDLE_CONFLICT_RETRIES", 3)?)
            .map_err(|_| ConfigError::InvalidNumber {
                name: "DOCBUNDLE_CONFLICT_RETRIES",
                value: std::env::var("DOCBUNDLE_CONFLICT_RETRIES").unwrap_or_default(),
            })?;

        if allow_remote && auth_token.is_none() {
            return Err(ConfigError::RemoteWithoutToken);
        }
        if !allow_remote && !bind.ip().is_loopback() {
            return Err(ConfigError::RemoteNotAllowed(bind));
        }

        Ok(Self {
            home,
            db_path,
            bind,
            allow_remote,
            auth_token,
            default_org_id,
            busy_timeout,
            conflict_retries,
        })
    }

    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            busy_timeout: self.busy_timeout,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.conflict_retries.max(1),
            ..RetryPolicy::default()
        }
    }
}

fn parse_org(raw: &str) -> Result<OrgId, ConfigError> {
    match raw.trim().parse::<OrgId>() {
        Ok(org) if org > 0 => Ok(org),
        _ => Err(ConfigError::InvalidOrgId(raw.to_string())),
    }
}

fn number(name: &'static str, default: u64) -> Result<u64, ConfigError> {
    match std::env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => {
            raw.trim()
                .parse()
                .map_err(|_| ConfigError::InvalidNumber { name, value: raw })
        }
        _ => Ok(default),
    }
}
