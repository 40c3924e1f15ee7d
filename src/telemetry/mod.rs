//! Prometheus metrics
//!
//! Recording goes through the global `metrics` facade, so it is a no-op
//! until `ManagerMetrics::install` sets up a recorder.

use crate::error::ManagerError;
use crate::gateway::ShardSlot;
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::Arc;
use std::time::Duration;

/// Handle to the installed Prometheus recorder
#[derive(Clone)]
pub struct ManagerMetrics {
    handle: Arc<PrometheusHandle>,
}

impl ManagerMetrics {
    /// Install the global recorder. Fails if one is already installed.
    pub fn install() -> Result<Self, ManagerError> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .map_err(|e| ManagerError::Metrics(e.to_string()))?;

        Self::register_metrics();

        Ok(Self {
            handle: Arc::new(handle),
        })
    }

    fn register_metrics() {
        describe_counter!(
            "shard_manager_shards_started_total",
            Unit::Count,
            "Shard connections that reached the ready state"
        );
        describe_counter!(
            "shard_manager_errors_total",
            Unit::Count,
            "Errors returned by shard startup, by type"
        );
        describe_histogram!(
            "shard_manager_shard_start_duration_seconds",
            Unit::Seconds,
            "Time from building a shard connection to ready"
        );
        describe_gauge!(
            "shard_manager_shards_ready",
            Unit::Count,
            "Number of shards in ready state"
        );
        describe_gauge!(
            "shard_manager_plugins_registered",
            Unit::Count,
            "Number of plugins tracked by the registry"
        );
    }

    /// Render metrics in Prometheus format
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

/// Record a shard that reached ready
pub fn record_shard_started(slot: ShardSlot, duration: Duration) {
    counter!("shard_manager_shards_started_total").increment(1);
    histogram!(
        "shard_manager_shard_start_duration_seconds",
        "shard_total" => slot.total.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Record a startup or connection error
pub fn record_error(error_type: &'static str) {
    counter!("shard_manager_errors_total", "error_type" => error_type).increment(1);
}

pub fn set_shards_ready(count: usize) {
    gauge!("shard_manager_shards_ready").set(count as f64);
}

pub fn set_plugins_registered(count: usize) {
    gauge!("shard_manager_plugins_registered").set(count as f64);
}
