//! # Comanda API server
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  startup:   env ──► ApiConfig      comanda.toml + env ──► EngineConfig  │
//! │             SQLite (migrations) ──► Services ──► axum router            │
//! │             ShiftSweepScheduler (daily, cutoff 04:00 local)             │
//! │                                                                         │
//! │  shutdown:  Ctrl+C / SIGTERM ──► cancel scheduler ──► drain HTTP        │
//! │             ──► close pool                                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use comanda_api::auth::JwtManager;
use comanda_api::config::ApiConfig;
use comanda_api::{app, AppState};
use comanda_db::{Database, DbConfig};
use comanda_engine::{EngineConfig, Services, ShiftSweepScheduler};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,comanda=debug")),
        )
        .with_target(true)
        .init();

    info!("Starting Comanda API server...");

    let config = ApiConfig::load()?;
    let engine_config = EngineConfig::load(config.engine_config_path.clone())?;
    info!(
        port = config.http_port,
        database = %config.database_path.display(),
        retry_attempts = engine_config.retry.max_attempts,
        sweep = engine_config.sweep.enabled,
        "Configuration loaded"
    );

    let db = Database::new(
        DbConfig::new(&config.database_path).max_connections(config.db_max_connections),
    )
    .await
    .context("opening database")?;

    let services = Services::new(db.clone(), &engine_config);
    let shutdown = CancellationToken::new();

    let scheduler = if engine_config.sweep.enabled {
        let cutoff = engine_config.cutoff_time()?;
        let scheduler = ShiftSweepScheduler::new(services.sweeper.clone(), cutoff, shutdown.clone());
        Some(tokio::spawn(scheduler.run()))
    } else {
        info!("Shift sweep disabled");
        None
    };

    let state = AppState {
        services,
        jwt: Arc::new(JwtManager::new(&config.jwt_secret)),
    };

    let addr = SocketAddr::from(([0, 0, 0, 0], config.http_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(%addr, "Listening");

    let signal = shutdown.clone();
    axum::serve(listener, app(state))
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            signal.cancel();
        })
        .await?;

    shutdown.cancel();
    if let Some(handle) = scheduler {
        let _ = handle.await;
    }
    db.close().await;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown...");
}
