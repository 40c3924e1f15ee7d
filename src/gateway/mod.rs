//! Gateway client seam
//!
//! The shard manager never speaks the wire protocol itself. It drives any
//! `GatewayClient`: build a connection, wait for it to become ready, then
//! hand it to a background task that keeps it alive.

mod connection_config;
mod twilight;

pub use connection_config::{
    CacheCategory, ChunkingPolicy, ConnectionConfig, GatewayIntent, LARGE_THRESHOLD_RANGE,
};
pub use twilight::{TwilightConnection, TwilightGateway};

use crate::error::ManagerError;
use crate::shard::ShardStatus;
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use tokio::sync::broadcast;

/// Position of a shard within the bot's shard layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ShardSlot {
    /// Shard index (0-based)
    pub index: u32,
    /// Total number of shards
    pub total: u32,
}

impl ShardSlot {
    /// The single slot used when the bot is not sharded
    pub const UNSHARDED: ShardSlot = ShardSlot { index: 0, total: 1 };

    pub fn new(index: u32, total: u32) -> Result<Self, ManagerError> {
        if total == 0 {
            return Err(ManagerError::InvalidArgument(
                "shard total must be at least 1".to_string(),
            ));
        }
        if index >= total {
            return Err(ManagerError::InvalidArgument(format!(
                "shard index {index} out of range for {total} shard(s)"
            )));
        }
        Ok(Self { index, total })
    }
}

impl fmt::Display for ShardSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.index, self.total)
    }
}

/// Protocol client that owns the actual gateway connections
#[async_trait]
pub trait GatewayClient: Send + Sync + 'static {
    /// A connection in whatever state the client keeps it
    type Connection: Send + 'static;

    /// Build a connection for `slot`. May open the socket or defer it.
    async fn build_connection(
        &self,
        config: &ConnectionConfig,
        slot: ShardSlot,
    ) -> Result<Self::Connection, ManagerError>;

    /// Wait until the connection has completed its handshake.
    ///
    /// Dropping the returned future aborts the attempt.
    async fn await_ready(
        &self,
        connection: Self::Connection,
        status: &ShardStatus,
    ) -> Result<Self::Connection, ManagerError>;

    /// Keep a ready connection alive until it ends or `shutdown` fires.
    ///
    /// `shutdown` also resolves when its sender is dropped.
    async fn run(
        &self,
        connection: Self::Connection,
        status: ShardStatus,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<(), ManagerError>;
}

#[cfg(test)]
pub(crate) mod fake {
    //! Minimal in-memory client for unit tests

    use super::*;
    use crate::shard::ShardHealth;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct FakeGateway {
        pub built: Mutex<Vec<ShardSlot>>,
    }

    #[async_trait]
    impl GatewayClient for FakeGateway {
        type Connection = ShardSlot;

        async fn build_connection(
            &self,
            _config: &ConnectionConfig,
            slot: ShardSlot,
        ) -> Result<ShardSlot, ManagerError> {
            self.built.lock().unwrap().push(slot);
            Ok(slot)
        }

        async fn await_ready(
            &self,
            connection: ShardSlot,
            _status: &ShardStatus,
        ) -> Result<ShardSlot, ManagerError> {
            Ok(connection)
        }

        async fn run(
            &self,
            _connection: ShardSlot,
            status: ShardStatus,
            mut shutdown: broadcast::Receiver<()>,
        ) -> Result<(), ManagerError> {
            let _ = shutdown.recv().await;
            status.set_health(ShardHealth::Dead);
            Ok(())
        }
    }
}
