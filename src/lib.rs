//! Shard Manager - Discord bot shard lifecycle manager
//!
//! - Brings gateway shards online sequentially, each one ready before the next
//! - Owns the live connections and closes them on shutdown
//! - Tracks plugin instances for the embedding application
//! - Exposes health/ready endpoints and Prometheus metrics

pub mod config;
pub mod error;
pub mod gateway;
pub mod health;
pub mod plugin;
pub mod shard;
pub mod telemetry;

pub use error::ManagerError;
pub use gateway::{ConnectionConfig, GatewayClient, ShardSlot, TwilightGateway};
pub use plugin::{Plugin, PluginMetadata, PluginRegistry};
pub use shard::{Lifecycle, ShardManager};
