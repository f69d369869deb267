//! Summary statistics service (packline-api) - Main entry point

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use sqlx::mysql::MySqlPoolOptions;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use packline_api::{build_router, AppState};
use packline_common::config::Config;

/// Command-line arguments for packline-api
#[derive(Parser, Debug)]
#[command(name = "packline-api")]
#[command(about = "Read-only summary statistics service for the Packline production tracker")]
#[command(version)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, env = "PACKLINE_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "packline_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    info!("Starting Packline summary service v{}", env!("CARGO_PKG_VERSION"));

    let cfg = Config::load(args.config.as_deref()).context("Failed to load configuration")?;

    let pool = MySqlPoolOptions::new()
        .max_connections(4)
        .acquire_timeout(cfg.production_db.connect_timeout())
        .connect_lazy(&cfg.production_db.url)
        .context("Failed to configure production database pool")?;

    let state = AppState::new(pool, cfg.api.include_template_in_balance);
    let app = build_router(state);

    let addr: SocketAddr = format!("{}:{}", cfg.api.bind, cfg.api.port)
        .parse()
        .context("Invalid bind address")?;
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
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
