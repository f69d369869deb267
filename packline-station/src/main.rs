//! Scanning station (packline-station) - Main entry point
//!
//! Wires the scan-session state machine to its collaborators: stdin scan
//! input, the central MySQL databases, the local record store, the
//! indicator stack, and the upload reconciler.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use packline_common::config::Config;
use packline_station::dispatch::Dispatcher;
use packline_station::indicator::{Actuator, IndicatorController};
use packline_station::session::Station;
use packline_station::staff::MySqlStaffDirectory;
use packline_station::store::RecordStore;
use packline_station::supervise::spawn_supervised;
use packline_station::uplink::MySqlUplink;
use packline_station::{input, reconciler};

/// Command-line arguments for packline-station
#[derive(Parser, Debug)]
#[command(name = "packline-station")]
#[command(about = "Scanning station service for the Packline production tracker")]
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
                .unwrap_or_else(|_| "packline_station=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    info!(
        "Starting Packline station v{}",
        env!("CARGO_PKG_VERSION")
    );

    let cfg = Config::load(args.config.as_deref()).context("Failed to load configuration")?;
    info!(line = %cfg.station.line, device = %cfg.station.device_id, "station identity");

    let store = Arc::new(RecordStore::open(cfg.station.data_dir.clone()));
    if !store.is_writable() {
        // keep running: scans still reach the central database, but the
        // local durability fallback is gone
        error!(
            "RECORD STORE NOT WRITABLE at {}; records will not be cached locally",
            store.root().display()
        );
    }

    let uplink = Arc::new(
        MySqlUplink::connect_lazy(&cfg.production_db)
            .context("Failed to configure production database pool")?,
    );
    let staff = Arc::new(
        MySqlStaffDirectory::connect_lazy(&cfg.staff_db, &cfg.station.staff_home_factory)
            .context("Failed to configure staff database pool")?,
    );

    let actuator: Arc<dyn Actuator> = build_actuator(&cfg)?;
    let indicator = IndicatorController::start(actuator, cfg.indicator.clone());

    {
        let store = store.clone();
        let uplink = uplink.clone();
        let interval = cfg.station.upload_interval();
        spawn_supervised("reconciler", move || {
            reconciler::run(store.clone(), uplink.clone(), interval)
        });
    }

    let (scan_tx, mut scan_rx) = mpsc::channel::<String>(64);
    input::spawn_reader(cfg.input.clone(), scan_tx);

    let mut dispatcher = Dispatcher::new(cfg.station.scan_window(), cfg.station.staff_window());
    let mut station = Station::new(
        cfg.station.clone(),
        uplink.clone(),
        uplink,
        staff,
        store,
        indicator.clone(),
    );

    info!("station ready, waiting for scans");
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            scan = scan_rx.recv() => {
                let Some(raw) = scan else {
                    info!("scan input closed, shutting down");
                    break;
                };
                if !dispatcher.admit(&raw) {
                    continue;
                }
                indicator.silence_alerts();
                let outcome = station.handle_scan(&raw).await;
                info!(?outcome, "scan processed");
            }
            _ = &mut shutdown => {
                break;
            }
        }
    }

    info!("station shutdown complete");
    Ok(())
}

#[cfg(feature = "gpio")]
fn build_actuator(cfg: &Config) -> Result<Arc<dyn Actuator>> {
    use packline_station::indicator::actuator::GpioActuator;
    let gpio = GpioActuator::new(&cfg.indicator).context("Failed to initialize GPIO")?;
    Ok(Arc::new(gpio))
}

#[cfg(not(feature = "gpio"))]
fn build_actuator(_cfg: &Config) -> Result<Arc<dyn Actuator>> {
    info!("no gpio feature, indicator transitions are traced only");
    Ok(Arc::new(packline_station::indicator::TraceActuator))
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
