//! Shard Manager binary
//!
//! Usage: `shard-manager <token> [shardCount]`

use anyhow::Result;
use shard_manager::config::ManagerConfig;
use shard_manager::health::{self, AppState};
use shard_manager::telemetry::ManagerMetrics;
use shard_manager::ShardManager;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let manager_config = match ManagerConfig::load(std::env::args().skip(1)) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(format!("shard_manager={}", manager_config.log_level).parse()?)
        .add_directive("twilight_gateway=info".parse()?);
    if manager_config.log_json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        shard_count = ?manager_config.shard_count,
        "Starting Shard Manager"
    );

    let manager = Arc::new(ShardManager::with_config(
        &manager_config.token,
        manager_config.connection.clone(),
    )?);

    if let Some(port) = manager_config.health_port {
        let metrics = match ManagerMetrics::install() {
            Ok(metrics) => Some(metrics),
            Err(e) => {
                warn!(error = %e, "Prometheus metrics unavailable");
                None
            }
        };

        let app_state = AppState {
            manager: Arc::clone(&manager),
            metrics,
        };
        let addr: SocketAddr = ([0, 0, 0, 0], port).into();
        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!(port, "Starting HTTP server");

        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, health::router(app_state)).await {
                error!(error = %e, "HTTP server error");
            }
        });
    }

    let startup = async {
        match manager_config.shard_count {
            Some(count) => manager.start_sharded(count).await,
            None => manager.start().await,
        }
    };

    tokio::select! {
        result = startup => {
            if let Err(e) = result {
                error!(error = %e, fatal = e.is_fatal(), "Startup failed");
                manager.close().await;
                return Err(e.into());
            }
        }
        _ = shutdown_signal() => {
            info!("Shutdown signal received during startup");
            manager.close().await;
            return Ok(());
        }
    }

    info!(
        shards = manager.connection_count(),
        plugins = manager.plugins().len(),
        "Bot is running"
    );
    manager.plugins().enable_all()?;

    shutdown_signal().await;
    info!("Shutdown signal received");

    if let Err(e) = manager.plugins().disable_all() {
        error!(error = %e, "Plugin failed to disable");
    }
    manager.close().await;

    info!("Shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
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
}
