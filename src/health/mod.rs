//! Health check endpoints

use crate::gateway::GatewayClient;
use crate::shard::{ConnectionInfo, Lifecycle, ShardManager};
use crate::telemetry::{self, ManagerMetrics};
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub lifecycle: Lifecycle,
}

/// Readiness check response
#[derive(Debug, Serialize)]
pub struct ReadyResponse {
    pub ready: bool,
    pub lifecycle: Lifecycle,
    pub shards_total: usize,
    pub shards_ready: usize,
    pub guilds_total: u64,
    pub plugins: Vec<String>,
    pub connections: Vec<ConnectionInfo>,
}

impl ReadyResponse {
    /// Build a readiness snapshot; ready once at least one shard is ready
    pub fn from_manager<G: GatewayClient>(manager: &ShardManager<G>) -> Self {
        let connections = manager.connections();
        let shards_ready = connections
            .iter()
            .filter(|info| info.health.is_ready())
            .count();

        Self {
            ready: shards_ready > 0,
            lifecycle: manager.lifecycle(),
            shards_total: connections.len(),
            shards_ready,
            guilds_total: connections.iter().map(|info| info.guilds).sum(),
            plugins: manager.plugins().names(),
            connections,
        }
    }
}

/// Application state for health endpoints
pub struct AppState<G: GatewayClient> {
    pub manager: Arc<ShardManager<G>>,
    pub metrics: Option<ManagerMetrics>,
}

impl<G: GatewayClient> Clone for AppState<G> {
    fn clone(&self) -> Self {
        Self {
            manager: Arc::clone(&self.manager),
            metrics: self.metrics.clone(),
        }
    }
}

/// Create the health check router
pub fn router<G: GatewayClient>(state: AppState<G>) -> Router {
    Router::new()
        .route("/health", get(health_handler::<G>))
        .route("/ready", get(ready_handler::<G>))
        .route("/metrics", get(metrics_handler::<G>))
        .with_state(state)
}

/// Health endpoint - always returns 200 if process is running
async fn health_handler<G: GatewayClient>(State(state): State<AppState<G>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        lifecycle: state.manager.lifecycle(),
    })
}

/// Readiness endpoint - returns 200 if at least one shard is ready
async fn ready_handler<G: GatewayClient>(State(state): State<AppState<G>>) -> impl IntoResponse {
    let response = ReadyResponse::from_manager(&state.manager);

    if response.ready {
        (StatusCode::OK, Json(response))
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(response))
    }
}

/// Metrics endpoint - returns Prometheus format metrics
async fn metrics_handler<G: GatewayClient>(State(state): State<AppState<G>>) -> impl IntoResponse {
    let Some(metrics) = state.metrics.as_ref() else {
        return (StatusCode::NOT_FOUND, String::from("metrics disabled\n"));
    };

    telemetry::set_shards_ready(state.manager.ready_count());
    telemetry::set_plugins_registered(state.manager.plugins().len());

    (StatusCode::OK, metrics.render())
}
