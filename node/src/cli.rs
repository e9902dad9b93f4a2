//! # CLI Interface
//!
//! Defines the command-line argument structure for `vault-node` using
//! `clap` derive. Supports three subcommands: `run`, `init`, and `version`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use vault_protocol::config::{ConfigError, CONFIG_FILE_NAME};
use vault_protocol::{PausePolicy, VaultConfig};

/// Secure vault host node.
///
/// Wires an authorization manager into a secure vault and serves both over
/// HTTP. Caller identities arrive already authenticated, in a request header
/// set by the gateway in front of the node.
#[derive(Parser, Debug)]
#[command(
    name = "vault-node",
    about = "Authorization-gated asset vault node",
    version,
    propagate_version = true
)]
pub struct VaultNodeCli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands for the vault node binary.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the vault node.
    Run(RunArgs),
    /// Write a fresh config file naming the bootstrap admin.
    Init(InitArgs),
    /// Print version information and exit.
    Version,
}

/// Arguments for the `run` subcommand. Flags override the config file.
#[derive(Parser, Debug, Default)]
pub struct RunArgs {
    /// Path to the node configuration file (JSON).
    #[arg(long, short = 'c', env = "VAULT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Bootstrap admin identity.
    #[arg(long, env = "VAULT_ADMIN")]
    pub admin: Option<String>,

    /// Port for the HTTP API.
    #[arg(long, env = "VAULT_API_PORT")]
    pub api_port: Option<u16>,

    /// Port for the Prometheus metrics endpoint.
    #[arg(long, env = "VAULT_METRICS_PORT")]
    pub metrics_port: Option<u16>,

    /// Whether recovery withdrawals run while paused:
    /// `allow-admin-recovery` or `halt-all`.
    #[arg(long, env = "VAULT_PAUSE_POLICY")]
    pub pause_policy: Option<PausePolicy>,

    /// Log output format: `pretty` or `json`.
    #[arg(long, env = "VAULT_LOG_FORMAT")]
    pub log_format: Option<String>,
}

impl RunArgs {
    /// Loads the config file (if any), applies flag overrides, validates.
    pub fn resolve(&self) -> Result<VaultConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => {
                let raw = std::fs::read_to_string(path)?;
                serde_json::from_str(&raw)?
            }
            None => VaultConfig::default(),
        };
        if let Some(admin) = &self.admin {
            config.bootstrap_admin = admin.clone();
        }
        if let Some(port) = self.api_port {
            config.api_port = port;
        }
        if let Some(port) = self.metrics_port {
            config.metrics_port = port;
        }
        if let Some(policy) = self.pause_policy {
            config.pause_policy = policy;
        }
        if let Some(format) = &self.log_format {
            config.log_format = format.clone();
        }
        config.validate()?;
        Ok(config)
    }
}

/// Arguments for the `init` subcommand.
#[derive(Parser, Debug)]
pub struct InitArgs {
    /// Directory to write the config file into.
    #[arg(long, short = 'd', env = "VAULT_DATA_DIR", default_value = ".")]
    pub data_dir: PathBuf,

    /// Bootstrap admin identity.
    #[arg(long, env = "VAULT_ADMIN")]
    pub admin: String,

    /// Pause policy to record in the config.
    #[arg(long, default_value_t = PausePolicy::AllowAdminRecovery)]
    pub pause_policy: PausePolicy,
}

impl InitArgs {
    /// Where `init` writes the config.
    pub fn config_path(&self) -> PathBuf {
        self.data_dir.join(CONFIG_FILE_NAME)
    }
}
