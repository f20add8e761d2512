//! Chirm Server - real-time hub for a self-hosted chat server.

use anyhow::Context;
use chirm_server::api::AppState;
use chirm_server::config::ServerConfig;
use chirm_server::observability::{init_logging, LogFormat};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Chirm Server - WebSocket hub and voice signaling relay
#[derive(Parser, Debug)]
#[command(name = "chirm-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (TOML, YAML or JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// HTTP listen address, overrides the configuration
    #[arg(long)]
    bind_addr: Option<SocketAddr>,

    /// Log level (trace, debug, info, warn, error), overrides the configuration
    #[arg(long)]
    log_level: Option<String>,

    /// Log format (pretty, json), overrides the configuration
    #[arg(long)]
    log_format: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config =
        ServerConfig::load(args.config.as_deref()).context("failed to load configuration")?;
    if let Some(addr) = args.bind_addr {
        config.bind_addr = addr;
    }
    if let Some(level) = args.log_level {
        config.log_level = level;
    }
    if let Some(format) = args.log_format {
        config.log_format = format;
    }

    init_logging(
        &config.log_level,
        LogFormat::parse(&config.log_format).is_json(),
    );
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting Chirm server");
    tracing::info!(config = ?config, "Server configuration");

    let bind_addr = config.bind_addr;
    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;

    chirm_server::serve(listener, AppState::new(config), shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("Chirm server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
