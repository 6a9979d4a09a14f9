//! fleetpoold — the FleetPool daemon.
//!
//! Single binary that assembles the FleetPool subsystems:
//! - State store (redb)
//! - Cloud driver (simulated, for local development)
//! - Reconciliation engine
//! - REST API
//!
//! # Usage
//!
//! ```text
//! fleetpoold serve --config pool.toml --port 9010 --data-dir /var/lib/fleetpool
//! ```

mod simulated;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::info;

use fleet_core::PoolConfig;
use fleetpool_engine::{ControllerSettings, PoolController};
use fleetpool_state::StateStore;

use simulated::SimulatedDriver;

#[derive(Parser)]
#[command(name = "fleetpoold", about = "FleetPool daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the reconciliation engine and REST API for one pool.
    Serve {
        /// Pool configuration file (TOML).
        #[arg(long)]
        config: PathBuf,

        /// Port to listen on.
        #[arg(long, default_value = "9010")]
        port: u16,

        /// Data directory for persistent state.
        #[arg(long, default_value = "/var/lib/fleetpool")]
        data_dir: PathBuf,

        /// Reconciliation interval in seconds.
        #[arg(long, default_value = "15")]
        tick_interval: u64,

        /// Pool observation cache lifetime in seconds.
        #[arg(long, default_value = "30")]
        fetch_ttl: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,fleetpoold=debug,fleetpool=debug".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve {
            config,
            port,
            data_dir,
            tick_interval,
            fetch_ttl,
        } => run_serve(config, port, data_dir, tick_interval, fetch_ttl).await,
    }
}

async fn run_serve(
    config_path: PathBuf,
    port: u16,
    data_dir: PathBuf,
    tick_interval: u64,
    fetch_ttl: u64,
) -> anyhow::Result<()> {
    info!("FleetPool daemon starting");

    let pool_config = PoolConfig::from_file(&config_path)?;
    info!(pool = %pool_config.pool_name, config = ?config_path, "pool configuration loaded");

    // Ensure data directory exists.
    std::fs::create_dir_all(&data_dir)?;
    let db_path = data_dir.join("fleetpool.redb");

    // ── Initialize subsystems ──────────────────────────────────

    let store = StateStore::open(&db_path)?;
    info!(path = ?db_path, "state store opened");

    let driver = Arc::new(SimulatedDriver::new());
    info!("simulated cloud driver initialized");

    let settings = ControllerSettings {
        tick_interval: Duration::from_secs(tick_interval),
        fetch_ttl: Duration::from_secs(fetch_ttl),
        ..ControllerSettings::default()
    };
    let controller = Arc::new(PoolController::new(driver, store, settings));
    controller.configure(pool_config).await?;
    controller.start()?;
    info!(tick_interval, "reconciliation engine started");

    // ── Start API server ───────────────────────────────────────

    let router = fleetpool_api::build_router(controller.clone());
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    info!(%addr, "API server starting");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Graceful shutdown on Ctrl-C.
    let server = axum::serve(listener, router).with_graceful_shutdown(async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install CTRL+C handler");
        info!("shutdown signal received");
    });

    server.await?;

    controller.stop().await;
    info!("FleetPool daemon stopped");
    Ok(())
}
