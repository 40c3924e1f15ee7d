//! Shard management module
//!
//! Owns the live gateway connections and the order they come online in.

mod connection;
mod manager;
mod state;

pub use connection::{ConnectionId, ConnectionInfo, ShardConnection};
pub use manager::{validate_token, Lifecycle, ShardManager};
pub use state::{ShardHealth, ShardStatus};
