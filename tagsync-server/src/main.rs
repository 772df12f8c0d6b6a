//! tagsync-server - label synchronization server
//!
//! Loads the dataset, then serves tag lists, clip layouts, row tables, images
//! and label mutations over TCP until Ctrl+C or SIGTERM.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tagsync_server::{Server, ServerConfig, ServerContext};

/// Command-line arguments for tagsync-server
#[derive(Parser, Debug)]
#[command(name = "tagsync-server")]
#[command(about = "Label synchronization server for image tagging")]
#[command(version)]
struct Args {
    /// Configuration file (created with defaults if missing)
    #[arg(short, long, default_value = "tagsync-server.toml", env = "TAGSYNC_SERVER_CONFIG")]
    config: PathBuf,

    /// Bind address, overrides the config file
    #[arg(long, env = "TAGSYNC_HOST")]
    host: Option<String>,

    /// Port to listen on, overrides the config file
    #[arg(short, long, env = "TAGSYNC_PORT")]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_existed = args.config.exists();
    let mut config = ServerConfig::load(&args.config)
        .with_context(|| format!("Failed to load {}", args.config.display()))?;
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting tagsync-server v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );
    if !config_existed {
        warn!(
            "{} not found, wrote default configuration",
            args.config.display()
        );
    }

    let ctx = Arc::new(ServerContext::load(&config).context("Failed to load dataset")?);

    let server = Server::bind(config.bind_addr(), ctx)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr()))?;
    info!("Listening on {}", server.local_addr()?);

    server.run_until(shutdown_signal()).await;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
