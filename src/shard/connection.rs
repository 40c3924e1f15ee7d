//! Handles for live shard connections

use crate::gateway::ShardSlot;
use crate::shard::state::{ShardHealth, ShardStatus};
use serde::Serialize;
use std::fmt;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Identity of a connection within one manager, assigned in start order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ConnectionId(pub(crate) u64);

impl ConnectionId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A ready connection owned by the manager
///
/// Two handles are the same connection only if their ids match; slots are
/// never compared. Dropping the handle signals its driver task to close.
pub struct ShardConnection {
    id: ConnectionId,
    status: ShardStatus,
    shutdown: broadcast::Sender<()>,
    task: Option<JoinHandle<()>>,
}

impl ShardConnection {
    pub(crate) fn new(id: ConnectionId, status: ShardStatus, shutdown: broadcast::Sender<()>) -> Self {
        Self {
            id,
            status,
            shutdown,
            task: None,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn slot(&self) -> ShardSlot {
        self.status.slot()
    }

    pub fn health(&self) -> ShardHealth {
        self.status.health()
    }

    pub fn status(&self) -> &ShardStatus {
        &self.status
    }

    pub(crate) fn attach_task(&mut self, task: JoinHandle<()>) {
        self.task = Some(task);
    }

    /// Signal the driver to close and hand back its task for joining
    pub(crate) fn shutdown(mut self) -> Option<JoinHandle<()>> {
        let _ = self.shutdown.send(());
        self.task.take()
    }

    pub fn info(&self) -> ConnectionInfo {
        ConnectionInfo {
            id: self.id,
            slot: self.slot(),
            health: self.health(),
            guilds: self.status.guilds(),
            events_received: self.status.events_received(),
        }
    }
}

impl PartialEq for ShardConnection {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ShardConnection {}

impl fmt::Debug for ShardConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShardConnection")
            .field("id", &self.id)
            .field("slot", &self.slot())
            .field("health", &self.health())
            .finish()
    }
}

/// Point-in-time view of a connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionInfo {
    pub id: ConnectionId,
    pub slot: ShardSlot,
    pub health: ShardHealth,
    pub guilds: u64,
    pub events_received: u64,
}
