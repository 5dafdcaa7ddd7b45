//! Session Service (atm-ss) - Main entry point
//!
//! Stores survey progress per participant and appends recorded judgments to
//! the results ledger.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use atm_common::config::{load_config, resolve_data_dir};
use atm_ss::db::{init_database, SessionStore};
use atm_ss::ledger::LedgerSink;
use atm_ss::{build_router, AppState};
use clap::Parser;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for atm-ss
#[derive(Parser, Debug)]
#[command(name = "atm-ss")]
#[command(about = "Session service for the audio-text matching survey")]
#[command(version)]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "8000", env = "PORT")]
    port: u16,

    /// Folder holding sessions.db and results.csv
    #[arg(short, long, env = "DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Folder served as static files (survey site, manifest, audio)
    #[arg(long, env = "STATIC_ROOT")]
    static_root: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "atm_ss=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting ATM Session Service (atm-ss) v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let args = Args::parse();

    let data_dir = resolve_data_dir(args.data_dir.as_deref(), &load_config());
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("Failed to create data folder {}", data_dir.display()))?;
    info!("Data folder: {}", data_dir.display());

    let pool = init_database(&data_dir.join("sessions.db"))
        .await
        .context("Failed to initialize session database")?;

    let ledger = LedgerSink::new(data_dir.join("results.csv"));
    ledger
        .ensure_header()
        .await
        .with_context(|| format!("Failed to initialize {}", ledger.path().display()))?;
    info!("Results ledger: {}", ledger.path().display());

    if let Some(root) = &args.static_root {
        info!("Serving static files from {}", root.display());
    }

    let state = AppState::new(SessionStore::new(pool), ledger);
    let app = build_router(state, args.static_root);

    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("atm-ss listening on http://{}", addr);

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
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received SIGTERM, shutting down");
        },
    }
}
