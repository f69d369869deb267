//! Display panel (packline-panel) - Main entry point
//!
//! Polls the summary service for one production line and renders the
//! figures as display frames on stdout.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use packline_common::config::Config;

mod client;
mod render;

use client::{Fetch, PanelClient};
use render::Frame;

/// Command-line arguments for packline-panel
#[derive(Parser, Debug)]
#[command(name = "packline-panel")]
#[command(about = "Production summary display panel")]
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
                .unwrap_or_else(|_| "packline_panel=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    info!("Starting Packline panel v{}", env!("CARGO_PKG_VERSION"));

    let cfg = Config::load(args.config.as_deref()).context("Failed to load configuration")?;
    info!(line = %cfg.panel.line, "panel line");

    let mut client = PanelClient::new(cfg.panel.clone());
    let mut ticker = tokio::time::interval(cfg.panel.fetch_interval());

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let frame = match client.fetch().await {
                    Fetch::Summary(summary) => Frame::from_summary(&summary),
                    Fetch::NoWip => Frame::status("NO WIP"),
                    Fetch::ApiError(_) => Frame::status("API ERR"),
                    Fetch::Unreachable => Frame::status("PI N/A"),
                };
                print!("{}", frame);
            }
            _ = &mut shutdown => {
                break;
            }
        }
    }

    info!("panel shutdown complete");
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
