//! Scripted gateway client shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use shard_manager::gateway::{ConnectionConfig, GatewayClient, ShardSlot};
use shard_manager::shard::ShardStatus;
use shard_manager::ManagerError;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, Notify};

/// Gateway whose behaviour per shard index is fixed up front
#[derive(Default, Clone)]
pub struct ScriptedGateway {
    /// "build N" / "ready N" in the order they happened
    pub log: Arc<Mutex<Vec<String>>>,
    /// Reject the credential when this shard identifies
    pub reject_at: Option<u32>,
    /// Never become ready on this shard
    pub hold_at: Option<u32>,
    /// Let this shard's connection end right after ready
    pub drop_at: Option<u32>,
    /// Notified when the held shard starts waiting
    pub holding: Arc<Notify>,
    /// Drivers that saw the shutdown signal
    pub closed: Arc<AtomicUsize>,
}

impl ScriptedGateway {
    pub fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    fn push(&self, entry: String) {
        self.log.lock().unwrap().push(entry);
    }
}

#[async_trait]
impl GatewayClient for ScriptedGateway {
    type Connection = ShardSlot;

    async fn build_connection(
        &self,
        _config: &ConnectionConfig,
        slot: ShardSlot,
    ) -> Result<ShardSlot, ManagerError> {
        self.push(format!("build {}", slot.index));
        Ok(slot)
    }

    async fn await_ready(
        &self,
        slot: ShardSlot,
        _status: &ShardStatus,
    ) -> Result<ShardSlot, ManagerError> {
        // Yield so a sequencing bug would interleave visibly
        tokio::task::yield_now().await;

        if self.reject_at == Some(slot.index) {
            return Err(ManagerError::Authentication {
                slot,
                reason: "invalid token".to_string(),
            });
        }
        if self.hold_at == Some(slot.index) {
            self.holding.notify_one();
            std::future::pending::<()>().await;
        }

        self.push(format!("ready {}", slot.index));
        Ok(slot)
    }

    async fn run(
        &self,
        slot: ShardSlot,
        _status: ShardStatus,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), ManagerError> {
        if self.drop_at == Some(slot.index) {
            return Err(ManagerError::ConnectionClosed {
                slot,
                code: Some(4000),
            });
        }

        let _ = shutdown.recv().await;
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Poll `condition` until it holds or a second passes
pub async fn eventually(condition: impl Fn() -> bool) -> bool {
    for _ in 0..100 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
