//! # Vault Configuration & Constants
//!
//! The knobs a host needs to stand the vault up: who the bootstrap admin is,
//! which pause policy governs recovery withdrawals, and where the node
//! listens. Values come from a JSON file written by `vault-node init` and
//! can be overridden by CLI flags or `VAULT_*` environment variables.

use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::VaultError;
use crate::principal::Principal;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Crate version reported by the node.
pub const VAULT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default HTTP API port.
pub const DEFAULT_API_PORT: u16 = 9750;

/// Default Prometheus metrics port.
pub const DEFAULT_METRICS_PORT: u16 = 9751;

/// Header carrying the authenticated caller identity. Set by the gateway
/// in front of the node, never by end users.
pub const CALLER_HEADER: &str = "x-vault-principal";

/// Upper bound on events returned by a single history query.
pub const MAX_EVENT_PAGE: usize = 1_000;

/// Default `tracing` filter when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "vault_node=info,vault_contracts=info,tower_http=debug";

/// File name used by `vault-node init` inside the data directory.
pub const CONFIG_FILE_NAME: &str = "vault.json";

// ---------------------------------------------------------------------------
// Pause policy
// ---------------------------------------------------------------------------

/// Whether administrative recovery withdrawals may run while the vault is paused.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PausePolicy {
    /// Pause halts deposits and withdrawals; `admin_withdraw` keeps working.
    #[default]
    AllowAdminRecovery,
    /// Pause halts every value-moving operation, recovery included.
    HaltAll,
}

impl PausePolicy {
    /// Returns `true` if `admin_withdraw` is permitted while paused.
    pub fn permits_recovery_while_paused(self) -> bool {
        matches!(self, PausePolicy::AllowAdminRecovery)
    }
}

impl std::fmt::Display for PausePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PausePolicy::AllowAdminRecovery => write!(f, "allow-admin-recovery"),
            PausePolicy::HaltAll => write!(f, "halt-all"),
        }
    }
}

impl FromStr for PausePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "allow-admin-recovery" => Ok(PausePolicy::AllowAdminRecovery),
            "halt-all" => Ok(PausePolicy::HaltAll),
            other => Err(format!("unknown pause policy: {other}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Config file
// ---------------------------------------------------------------------------

/// Errors raised while loading or validating a [`VaultConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(#[from] VaultError),
}

/// Node configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    /// Identity that holds admin authority when the node first starts.
    pub bootstrap_admin: String,
    /// HTTP API port.
    pub api_port: u16,
    /// Prometheus metrics port.
    pub metrics_port: u16,
    /// Recovery-while-paused policy.
    pub pause_policy: PausePolicy,
    /// `pretty` or `json`.
    pub log_format: String,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            bootstrap_admin: String::new(),
            api_port: DEFAULT_API_PORT,
            metrics_port: DEFAULT_METRICS_PORT,
            pause_policy: PausePolicy::default(),
            log_format: "pretty".to_string(),
        }
    }
}

impl VaultConfig {
    /// Reads and validates a JSON config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let config: VaultConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Writes the config as pretty-printed JSON.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let body = serde_json::to_string_pretty(self)?;
        std::fs::write(path, body)?;
        Ok(())
    }

    /// The bootstrap admin as a [`Principal`].
    pub fn admin(&self) -> Principal {
        Principal::new(self.bootstrap_admin.clone())
    }

    /// Rejects a config whose bootstrap admin is the null identity.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.admin().ensure_not_null()?;
        Ok(())
    }
}
