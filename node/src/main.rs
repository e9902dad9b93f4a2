// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Vault Node
//!
//! Entry point for the `vault-node` binary. Parses CLI arguments, initializes
//! logging and metrics, deploys the authorization manager and the vault bound
//! to it, and serves the HTTP API.
//!
//! The binary supports three subcommands:
//!
//! - `run`     start the node
//! - `init`    write a config file naming the bootstrap admin
//! - `version` print build version information

mod api;
mod cli;
mod logging;
mod metrics;

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tokio::signal;

use vault_protocol::config::{DEFAULT_LOG_FILTER, VAULT_VERSION};
use vault_protocol::VaultConfig;

use cli::{Commands, VaultNodeCli};
use logging::LogFormat;
use metrics::VaultMetrics;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = VaultNodeCli::parse();

    match cli.command {
        Commands::Run(args) => run_node(args).await,
        Commands::Init(args) => init_node(args),
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Deploys both components and serves the API and metrics endpoints until
/// a shutdown signal arrives.
async fn run_node(args: cli::RunArgs) -> Result<()> {
    let config = args.resolve().context("invalid node configuration")?;
    logging::init_logging(DEFAULT_LOG_FILTER, LogFormat::from_str_lossy(&config.log_format));

    tracing::info!(
        admin = %config.bootstrap_admin,
        api_port = config.api_port,
        metrics_port = config.metrics_port,
        pause_policy = %config.pause_policy,
        "starting vault-node"
    );

    // --- Metrics ---
    let vault_metrics = Arc::new(VaultMetrics::new());

    // --- Authorization manager, then the vault bound to it ---
    let app_state = api::AppState::bootstrap(
        format!("{} (vault {})", env!("CARGO_PKG_VERSION"), VAULT_VERSION),
        config.admin(),
        config.pause_policy,
        Arc::clone(&vault_metrics),
    )
    .context("failed to deploy vault")?;
    vault_metrics.observe_vault(0, false);
    tracing::info!(admin = %app_state.auth.admin(), "vault deployed");

    // --- API server ---
    let api_router = api::create_router(app_state);
    let api_addr = format!("0.0.0.0:{}", config.api_port);
    let api_listener = tokio::net::TcpListener::bind(&api_addr)
        .await
        .with_context(|| format!("failed to bind API listener on {}", api_addr))?;
    tracing::info!("API server listening on {}", api_addr);

    // --- Metrics server ---
    let metrics_router = axum::Router::new()
        .route("/metrics", axum::routing::get(metrics::metrics_handler))
        .with_state(Arc::clone(&vault_metrics));
    let metrics_addr = format!("0.0.0.0:{}", config.metrics_port);
    let metrics_listener = tokio::net::TcpListener::bind(&metrics_addr)
        .await
        .with_context(|| format!("failed to bind metrics listener on {}", metrics_addr))?;
    tracing::info!("Metrics server listening on {}", metrics_addr);

    // --- Serve ---
    tokio::select! {
        res = axum::serve(api_listener, api_router) => {
            if let Err(e) = res {
                tracing::error!("API server error: {}", e);
            }
        }
        res = axum::serve(metrics_listener, metrics_router) => {
            if let Err(e) = res {
                tracing::error!("Metrics server error: {}", e);
            }
        }
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received, draining connections");
        }
    }

    tracing::info!("vault-node stopped");
    Ok(())
}

/// Writes a fresh config file naming the bootstrap admin.
fn init_node(args: cli::InitArgs) -> Result<()> {
    logging::init_logging("vault_node=info", LogFormat::Pretty);

    let data_dir = &args.data_dir;
    tracing::info!(data_dir = %data_dir.display(), "initializing node");

    let config = VaultConfig {
        bootstrap_admin: args.admin.clone(),
        pause_policy: args.pause_policy,
        ..VaultConfig::default()
    };
    config.validate().context("refusing to write config")?;

    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("failed to create data directory: {}", data_dir.display()))?;

    let config_path = args.config_path();
    config
        .save(&config_path)
        .with_context(|| format!("failed to write config to {}", config_path.display()))?;

    tracing::info!(config = %config_path.display(), "config written");

    println!("Node initialized successfully.");
    println!("  Data directory : {}", data_dir.display());
    println!("  Config         : {}", config_path.display());
    println!("  Admin          : {}", config.bootstrap_admin);
    println!("  Pause policy   : {}", config.pause_policy);

    Ok(())
}

/// Prints version information to stdout.
fn print_version() {
    println!("vault-node {}", env!("CARGO_PKG_VERSION"));
    println!("vault      {}", VAULT_VERSION);
    println!("rustc      {}", rustc_version());
}

/// Returns the Rust compiler version used to build this binary.
fn rustc_version() -> &'static str {
    option_env!("RUSTC_VERSION").unwrap_or("unknown")
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
///
/// On non-Unix platforms, only Ctrl+C is supported.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
