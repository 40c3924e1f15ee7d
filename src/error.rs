//! Domain error types for the shard manager
//!
//! main.rs is the ONLY module allowed to use anyhow::Result (process boundary).
//! All library code returns Result<T, ManagerError>.

use crate::gateway::ShardSlot;
use thiserror::Error;

/// Boxed error used for collaborator and plugin callback failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Shard manager errors
///
/// None of these are retried internally. They propagate to the caller of
/// `start` / `start_sharded` (or of the plugin callback) unchanged.
#[derive(Error, Debug)]
pub enum ManagerError {
    /// Bad or missing credential, malformed shard count, invalid tuning
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The gateway rejected the credential
    #[error("authentication failed on shard {slot}: {reason}")]
    Authentication { slot: ShardSlot, reason: String },

    /// A pending start was cancelled before the connection became ready
    #[error("start interrupted after {started} shard(s) became ready")]
    Interrupted { started: usize },

    /// A programmatic argument is out of range
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The gateway closed the connection before it became ready
    #[error("shard {slot} closed before ready (close code {code:?})")]
    ConnectionClosed { slot: ShardSlot, code: Option<u16> },

    /// Any other failure reported by the gateway client
    #[error("gateway error on shard {slot}")]
    Gateway {
        slot: ShardSlot,
        #[source]
        source: BoxError,
    },

    /// Shard count exceeds u32::MAX (Twilight API boundary)
    #[error("shard count overflow: {value} exceeds u32::MAX")]
    ShardIdOverflow { value: u64 },

    /// A plugin lifecycle callback failed
    #[error("plugin '{name}' callback failed")]
    Plugin {
        name: String,
        #[source]
        source: BoxError,
    },

    /// The manager has been closed and cannot start new shards
    #[error("shard manager is closed")]
    Closed,

    /// The Prometheus recorder could not be installed
    #[error("metrics recorder installation failed: {0}")]
    Metrics(String),
}

impl ManagerError {
    /// Returns a static label string suitable for Prometheus metrics.
    pub fn error_type_label(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "config",
            Self::Authentication { .. } => "authentication",
            Self::Interrupted { .. } => "interrupted",
            Self::InvalidArgument(_) => "invalid_argument",
            Self::ConnectionClosed { .. } => "connection_closed",
            Self::Gateway { .. } => "gateway",
            Self::ShardIdOverflow { .. } => "shard_overflow",
            Self::Plugin { .. } => "plugin",
            Self::Closed => "closed",
            Self::Metrics(_) => "metrics",
        }
    }

    /// Whether the embedding application should terminate instead of retrying
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Configuration(_) | Self::Authentication { .. } | Self::ShardIdOverflow { .. }
        )
    }
}
