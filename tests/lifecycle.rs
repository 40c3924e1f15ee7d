//! Shard startup, interruption and shutdown against a scripted gateway

mod common;

use common::{eventually, ScriptedGateway};
use shard_manager::gateway::{ConnectionConfig, ShardSlot};
use shard_manager::shard::ShardHealth;
use shard_manager::{Lifecycle, ManagerError, ShardManager};
use std::sync::Arc;
use std::time::Duration;

fn manager(gateway: &ScriptedGateway) -> ShardManager<ScriptedGateway> {
    ShardManager::with_client(gateway.clone(), ConnectionConfig::default()).unwrap()
}

fn slots(manager: &ShardManager<ScriptedGateway>) -> Vec<ShardSlot> {
    manager.connections().into_iter().map(|info| info.slot).collect()
}

#[tokio::test]
async fn start_three_shards_in_index_order() {
    let gateway = ScriptedGateway::default();
    let manager = manager(&gateway);

    manager.start_sharded(3).await.unwrap();

    assert_eq!(
        gateway.log(),
        vec!["build 0", "ready 0", "build 1", "ready 1", "build 2", "ready 2"]
    );
    assert_eq!(
        slots(&manager),
        vec![
            ShardSlot { index: 0, total: 3 },
            ShardSlot { index: 1, total: 3 },
            ShardSlot { index: 2, total: 3 },
        ]
    );
    assert_eq!(manager.lifecycle(), Lifecycle::Running);
}

#[tokio::test]
async fn every_index_appears_exactly_once() {
    for count in [1u64, 2, 5, 8] {
        let gateway = ScriptedGateway::default();
        let manager = manager(&gateway);

        manager.start_sharded(count).await.unwrap();

        let connections = manager.connections();
        assert_eq!(connections.len() as u64, count);

        let mut indices: Vec<u32> = connections.iter().map(|info| info.slot.index).collect();
        indices.sort_unstable();
        let expected: Vec<u32> = (0..count as u32).collect();
        assert_eq!(indices, expected);

        let mut ids: Vec<_> = connections.iter().map(|info| info.id).collect();
        ids.dedup();
        assert_eq!(ids.len() as u64, count, "connection ids must be distinct");
    }
}

#[tokio::test]
async fn unsharded_start_adds_one_ready_connection() {
    let gateway = ScriptedGateway::default();
    let manager = manager(&gateway);

    manager.start().await.unwrap();

    let connections = manager.connections();
    assert_eq!(connections.len(), 1);
    assert_eq!(connections[0].slot, ShardSlot::UNSHARDED);
    assert_eq!(connections[0].health, ShardHealth::Ready);
}

#[tokio::test]
async fn authentication_failure_keeps_earlier_shards() {
    let gateway = ScriptedGateway {
        reject_at: Some(1),
        ..ScriptedGateway::default()
    };
    let manager = manager(&gateway);

    let err = manager.start_sharded(4).await.unwrap_err();

    assert!(matches!(err, ManagerError::Authentication { slot, .. } if slot.index == 1));
    assert!(err.is_fatal());
    // Shards 2 and 3 were never attempted
    assert_eq!(gateway.log(), vec!["build 0", "ready 0", "build 1"]);
    assert_eq!(slots(&manager), vec![ShardSlot { index: 0, total: 4 }]);
    assert_eq!(manager.lifecycle(), Lifecycle::Running);
}

#[tokio::test]
async fn failure_on_first_shard_leaves_manager_constructed() {
    let gateway = ScriptedGateway {
        reject_at: Some(0),
        ..ScriptedGateway::default()
    };
    let manager = manager(&gateway);

    assert!(manager.start().await.is_err());
    assert_eq!(manager.connection_count(), 0);
    assert_eq!(manager.lifecycle(), Lifecycle::Constructed);
}

#[tokio::test]
async fn huge_shard_count_fails_fast_on_first_shard() {
    let gateway = ScriptedGateway {
        reject_at: Some(0),
        ..ScriptedGateway::default()
    };
    let manager = manager(&gateway);

    let result = tokio::time::timeout(
        Duration::from_secs(5),
        manager.start_sharded(u64::from(u32::MAX)),
    )
    .await
    .expect("start should not size anything by the shard count");

    assert!(matches!(
        result,
        Err(ManagerError::Authentication { slot, .. }) if slot == ShardSlot { index: 0, total: u32::MAX }
    ));
    assert_eq!(gateway.log(), vec!["build 0"]);
    assert_eq!(manager.connection_count(), 0);
}

#[tokio::test]
async fn interrupt_preserves_ready_shards() {
    let gateway = ScriptedGateway {
        hold_at: Some(2),
        ..ScriptedGateway::default()
    };
    let manager = Arc::new(manager(&gateway));

    let starter = {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move { manager.start_sharded(4).await })
    };

    gateway.holding.notified().await;
    manager.interrupt();

    let err = starter.await.unwrap().unwrap_err();
    assert!(matches!(err, ManagerError::Interrupted { started: 2 }));
    assert_eq!(
        slots(&manager),
        vec![ShardSlot { index: 0, total: 4 }, ShardSlot { index: 1, total: 4 }]
    );
    assert!(!gateway.log().contains(&"build 3".to_string()));
    assert_eq!(manager.lifecycle(), Lifecycle::Running);
}

#[tokio::test]
async fn close_shuts_down_every_connection() {
    let gateway = ScriptedGateway::default();
    let manager = manager(&gateway);
    manager.start_sharded(3).await.unwrap();

    manager.close().await;

    assert_eq!(manager.connection_count(), 0);
    assert_eq!(manager.lifecycle(), Lifecycle::Closed);
    assert_eq!(gateway.closed(), 3);
}

#[tokio::test]
async fn start_after_close_is_refused() {
    let gateway = ScriptedGateway::default();
    let manager = manager(&gateway);
    manager.close().await;

    assert!(matches!(manager.start().await, Err(ManagerError::Closed)));
    assert!(gateway.log().is_empty());
}

#[tokio::test]
async fn close_interrupts_pending_start() {
    let gateway = ScriptedGateway {
        hold_at: Some(1),
        ..ScriptedGateway::default()
    };
    let manager = Arc::new(manager(&gateway));

    let starter = {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move { manager.start_sharded(2).await })
    };

    gateway.holding.notified().await;
    manager.close().await;

    let err = starter.await.unwrap().unwrap_err();
    assert!(matches!(err, ManagerError::Interrupted { started: 1 }));
    assert_eq!(manager.connection_count(), 0);
    assert_eq!(manager.lifecycle(), Lifecycle::Closed);
}

#[tokio::test]
async fn ended_connection_removes_itself() {
    let gateway = ScriptedGateway {
        drop_at: Some(0),
        ..ScriptedGateway::default()
    };
    let manager = manager(&gateway);

    manager.start_sharded(2).await.unwrap();

    assert!(eventually(|| manager.connection_count() == 1).await);
    assert_eq!(slots(&manager), vec![ShardSlot { index: 1, total: 2 }]);
}

#[tokio::test]
async fn later_start_adds_to_running_manager() {
    let gateway = ScriptedGateway::default();
    let manager = manager(&gateway);

    manager.start().await.unwrap();
    manager.start().await.unwrap();

    let connections = manager.connections();
    assert_eq!(connections.len(), 2);
    assert!(connections[0].id < connections[1].id);
}

#[test]
fn empty_token_is_rejected_before_connecting() {
    assert!(matches!(
        ShardManager::new(""),
        Err(ManagerError::Configuration(_))
    ));
}

#[test]
fn zero_shards_fails_without_attempts() {
    let gateway = ScriptedGateway::default();
    let manager = manager(&gateway);

    let err = tokio_test::block_on(manager.start_sharded(0)).unwrap_err();

    assert!(matches!(err, ManagerError::InvalidArgument(_)));
    assert!(gateway.log().is_empty());
    assert_eq!(manager.lifecycle(), Lifecycle::Constructed);
}
