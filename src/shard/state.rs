//! Shard status tracking
//!
//! Each live connection owns one `ShardStatus`, shared with the task that
//! drives it so health can be reported without touching the connection.

use crate::gateway::ShardSlot;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

/// Health status for a shard
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ShardHealth {
    /// Shard is connecting
    Connecting,
    /// Shard is ready and receiving events
    Ready,
    /// Shard is resuming after disconnect
    Resuming,
    /// Shard is disconnected
    Disconnected,
    /// Shard encountered a fatal error or was closed
    Dead,
}

impl ShardHealth {
    /// Returns true if the shard is healthy
    pub fn is_healthy(&self) -> bool {
        matches!(self, ShardHealth::Ready | ShardHealth::Resuming)
    }

    /// Returns true if the shard is ready to receive events
    pub fn is_ready(&self) -> bool {
        matches!(self, ShardHealth::Ready)
    }
}

#[derive(Debug)]
struct StatusEntry {
    health: ShardHealth,
    guilds: u64,
    last_heartbeat: Option<Instant>,
    connected_at: Option<Instant>,
}

#[derive(Debug)]
struct ShardStatusInner {
    slot: ShardSlot,
    entry: Mutex<StatusEntry>,
    events_received: AtomicU64,
}

/// Shared status of a single shard connection
#[derive(Debug, Clone)]
pub struct ShardStatus {
    inner: Arc<ShardStatusInner>,
}

impl ShardStatus {
    /// Create a status tracker for a shard that is about to connect
    pub fn new(slot: ShardSlot) -> Self {
        Self {
            inner: Arc::new(ShardStatusInner {
                slot,
                entry: Mutex::new(StatusEntry {
                    health: ShardHealth::Connecting,
                    guilds: 0,
                    last_heartbeat: None,
                    connected_at: None,
                }),
                events_received: AtomicU64::new(0),
            }),
        }
    }

    fn with_entry<T>(&self, f: impl FnOnce(&mut StatusEntry) -> T) -> T {
        let mut entry = self
            .inner
            .entry
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        f(&mut entry)
    }

    pub fn slot(&self) -> ShardSlot {
        self.inner.slot
    }

    /// Update shard health
    pub fn set_health(&self, health: ShardHealth) {
        self.with_entry(|entry| {
            entry.health = health;
            if health == ShardHealth::Ready && entry.connected_at.is_none() {
                entry.connected_at = Some(Instant::now());
            }
        });
    }

    pub fn health(&self) -> ShardHealth {
        self.with_entry(|entry| entry.health)
    }

    pub fn set_guilds(&self, count: u64) {
        self.with_entry(|entry| entry.guilds = count);
    }

    pub fn guilds(&self) -> u64 {
        self.with_entry(|entry| entry.guilds)
    }

    /// Increment event received counter
    pub fn record_event(&self) {
        self.inner.events_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn events_received(&self) -> u64 {
        self.inner.events_received.load(Ordering::Relaxed)
    }

    /// Record heartbeat acknowledgement
    pub fn record_heartbeat(&self) {
        self.with_entry(|entry| entry.last_heartbeat = Some(Instant::now()));
    }

    pub fn last_heartbeat(&self) -> Option<Instant> {
        self.with_entry(|entry| entry.last_heartbeat)
    }

    /// When the shard first became ready
    pub fn connected_at(&self) -> Option<Instant> {
        self.with_entry(|entry| entry.connected_at)
    }
}
