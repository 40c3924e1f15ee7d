//! Shard manager
//!
//! Brings shards online one at a time, in index order, and owns them
//! afterwards. Shard `i + 1` is not built until shard `i` is ready or has
//! failed, so a failure on shard `k` leaves `0..k` live and `k..n`
//! untouched.

use crate::error::ManagerError;
use crate::gateway::{ConnectionConfig, GatewayClient, ShardSlot, TwilightGateway};
use crate::plugin::PluginRegistry;
use crate::shard::connection::{ConnectionId, ConnectionInfo, ShardConnection};
use crate::shard::state::{ShardHealth, ShardStatus};
use crate::telemetry;

use dashmap::DashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// How long `close` waits for each connection to finish closing
const CLOSE_TIMEOUT: Duration = Duration::from_secs(10);

/// Manager lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Lifecycle {
    /// Built, no start attempted (or every attempt left nothing live)
    Constructed,
    /// A start call is in progress
    Starting,
    /// At least one connection came online
    Running,
    /// `close` was called; no further starts are accepted
    Closed,
}

/// Validate and normalize a bot token.
///
/// Strips a leading `Bot ` prefix. Rejects empty tokens and tokens with
/// whitespace or control characters; anything else is left to the gateway.
pub fn validate_token(token: &str) -> Result<String, ManagerError> {
    let token = token.trim();
    // A bare "Bot" is a prefix with nothing after it
    let token = match token.strip_prefix("Bot") {
        Some(rest) if rest.is_empty() || rest.starts_with(char::is_whitespace) => rest.trim(),
        _ => token,
    };

    if token.is_empty() {
        return Err(ManagerError::Configuration(
            "bot token must not be empty".to_string(),
        ));
    }
    if token.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(ManagerError::Configuration(
            "bot token contains whitespace or control characters".to_string(),
        ));
    }

    Ok(token.to_string())
}

/// Owns the bot's shard connections and its plugin registry
pub struct ShardManager<G: GatewayClient = TwilightGateway> {
    client: Arc<G>,
    config: ConnectionConfig,
    connections: Arc<DashMap<ConnectionId, ShardConnection>>,
    plugins: PluginRegistry,
    lifecycle: Mutex<Lifecycle>,
    start_lock: tokio::sync::Mutex<()>,
    next_id: AtomicU64,
    interrupt_tx: broadcast::Sender<()>,
}

impl ShardManager<TwilightGateway> {
    /// Create a manager with the default resource tuning.
    ///
    /// No connection is opened until `start` or `start_sharded`.
    pub fn new(token: &str) -> Result<Self, ManagerError> {
        Self::with_config(token, ConnectionConfig::default())
    }

    pub fn with_config(token: &str, config: ConnectionConfig) -> Result<Self, ManagerError> {
        let token = validate_token(token)?;
        info!("Creating the bot");
        Self::with_client(TwilightGateway::new(token), config)
    }
}

impl<G: GatewayClient> ShardManager<G> {
    /// Create a manager on top of any gateway client
    pub fn with_client(client: G, config: ConnectionConfig) -> Result<Self, ManagerError> {
        config.validate()?;
        info!(
            disabled_cache = ?config.disabled_cache,
            chunking = ?config.chunking,
            disabled_intents = ?config.disabled_intents,
            large_threshold = config.large_threshold,
            "Configuring resource usage"
        );

        let (interrupt_tx, _) = broadcast::channel(1);

        Ok(Self {
            client: Arc::new(client),
            config,
            connections: Arc::new(DashMap::new()),
            plugins: PluginRegistry::new(),
            lifecycle: Mutex::new(Lifecycle::Constructed),
            start_lock: tokio::sync::Mutex::new(()),
            next_id: AtomicU64::new(0),
            interrupt_tx,
        })
    }

    /// Start a single unsharded connection and wait until it is ready
    pub async fn start(&self) -> Result<(), ManagerError> {
        let mut interrupt = self.interrupt_tx.subscribe();
        let _guard = self.start_lock.lock().await;
        self.begin_start()?;

        info!("Starting the bot");
        let result = self.start_slots([ShardSlot::UNSHARDED], &mut interrupt).await;
        self.finish_start();
        result
    }

    /// Start shards `0..shard_count` sequentially, each waiting for ready
    /// before the next is built.
    pub async fn start_sharded(&self, shard_count: u64) -> Result<(), ManagerError> {
        if shard_count == 0 {
            return Err(ManagerError::InvalidArgument(
                "shard count must be at least 1".to_string(),
            ));
        }
        // Twilight shard ids are u32
        let total = u32::try_from(shard_count)
            .map_err(|_| ManagerError::ShardIdOverflow { value: shard_count })?;
        // Slots are produced one at a time; the count may be huge
        let slots = (0..total).map(|index| ShardSlot { index, total });

        let mut interrupt = self.interrupt_tx.subscribe();
        let _guard = self.start_lock.lock().await;
        self.begin_start()?;

        let result = self.start_slots(slots, &mut interrupt).await;
        self.finish_start();
        result
    }

    /// Cancel any in-progress or queued start call.
    ///
    /// The interrupted call fails with `Interrupted`; shards that were already
    /// ready stay in the collection.
    pub fn interrupt(&self) {
        if self.interrupt_tx.send(()).is_ok() {
            info!("Interrupting shard startup");
        }
    }

    /// Close every connection and refuse further starts
    pub async fn close(&self) {
        self.set_lifecycle(Lifecycle::Closed);
        self.interrupt();
        let _guard = self.start_lock.lock().await;

        let ids: Vec<ConnectionId> = self.connections.iter().map(|entry| *entry.key()).collect();
        let mut tasks = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(connection) = self.remove_instance(id) {
                tasks.extend(connection.shutdown());
            }
        }

        info!(connections = tasks.len(), "Closing shard connections");

        for task in tasks {
            if tokio::time::timeout(CLOSE_TIMEOUT, task).await.is_err() {
                warn!("Shard connection did not close in time");
            }
        }

        telemetry::set_shards_ready(0);
        info!("Shard manager closed");
    }

    /// The registry owned by this manager. Callers register plugins directly.
    pub fn plugins(&self) -> &PluginRegistry {
        &self.plugins
    }

    pub fn connection_config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn lifecycle(&self) -> Lifecycle {
        *self.lifecycle_guard()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn ready_count(&self) -> usize {
        self.connections
            .iter()
            .filter(|entry| entry.health().is_ready())
            .count()
    }

    /// Snapshot of live connections ordered by id (start order)
    pub fn connections(&self) -> Vec<ConnectionInfo> {
        let mut infos: Vec<ConnectionInfo> =
            self.connections.iter().map(|entry| entry.info()).collect();
        infos.sort_by_key(|info| info.id);
        infos
    }

    async fn start_slots(
        &self,
        slots: impl IntoIterator<Item = ShardSlot>,
        interrupt: &mut broadcast::Receiver<()>,
    ) -> Result<(), ManagerError> {
        let mut started = 0;

        for slot in slots {
            if slot.total > 1 {
                info!("Starting shard {} of {}", slot.index + 1, slot.total);
            }

            let outcome = tokio::select! {
                result = self.connect(slot) => result,
                _ = interrupt.recv() => Err(ManagerError::Interrupted { started }),
            };

            if let Err(e) = outcome {
                telemetry::record_error(e.error_type_label());
                error!(shard = %slot, error = %e, "Shard failed to start");
                return Err(e);
            }
            started += 1;
        }

        Ok(())
    }

    /// Build one connection, wait for ready, then take ownership of it
    async fn connect(&self, slot: ShardSlot) -> Result<ConnectionId, ManagerError> {
        let started_at = Instant::now();
        let status = ShardStatus::new(slot);

        let connection = self.client.build_connection(&self.config, slot).await?;
        let connection = self.client.await_ready(connection, &status).await?;
        status.set_health(ShardHealth::Ready);

        let id = ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        self.add_instance(ShardConnection::new(id, status.clone(), shutdown_tx));

        let task = self.spawn_driver(id, connection, status, shutdown_rx);
        if let Some(mut entry) = self.connections.get_mut(&id) {
            entry.attach_task(task);
        }

        telemetry::record_shard_started(slot, started_at.elapsed());
        telemetry::set_shards_ready(self.ready_count());
        info!(connection = %id, shard = %slot, "Shard connection added");

        Ok(id)
    }

    /// Run the connection in the background. When it ends for any reason the
    /// connection removes itself from the collection.
    fn spawn_driver(
        &self,
        id: ConnectionId,
        connection: G::Connection,
        status: ShardStatus,
        shutdown: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        let client = Arc::clone(&self.client);
        let connections: Weak<DashMap<ConnectionId, ShardConnection>> =
            Arc::downgrade(&self.connections);

        tokio::spawn(async move {
            let slot = status.slot();
            let result = client.run(connection, status.clone(), shutdown).await;
            status.set_health(ShardHealth::Dead);

            match result {
                Ok(()) => info!(connection = %id, shard = %slot, "Shard connection ended"),
                Err(e) => {
                    telemetry::record_error(e.error_type_label());
                    error!(connection = %id, shard = %slot, error = %e, "Shard connection failed");
                }
            }

            if let Some(connections) = connections.upgrade() {
                if connections.remove(&id).is_some() {
                    warn!(connection = %id, shard = %slot, "Removed ended shard connection");
                }
            }
        })
    }

    /// Insert a connection; no-op if one with the same id is present
    fn add_instance(&self, connection: ShardConnection) -> bool {
        match self.connections.entry(connection.id()) {
            dashmap::mapref::entry::Entry::Occupied(_) => false,
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(connection);
                true
            }
        }
    }

    /// Remove a connection; `None` if absent. Dropping it closes the driver.
    fn remove_instance(&self, id: ConnectionId) -> Option<ShardConnection> {
        self.connections.remove(&id).map(|(_, connection)| connection)
    }

    /// Whether the connection is still owned by this manager
    pub fn contains_instance(&self, id: ConnectionId) -> bool {
        self.connections.contains_key(&id)
    }

    fn lifecycle_guard(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_lifecycle(&self, next: Lifecycle) {
        *self.lifecycle_guard() = next;
    }

    fn begin_start(&self) -> Result<(), ManagerError> {
        let mut lifecycle = self.lifecycle_guard();
        if *lifecycle == Lifecycle::Closed {
            return Err(ManagerError::Closed);
        }
        *lifecycle = Lifecycle::Starting;
        Ok(())
    }

    fn finish_start(&self) {
        let mut lifecycle = self.lifecycle_guard();
        if *lifecycle == Lifecycle::Starting {
            *lifecycle = if self.connections.is_empty() {
                Lifecycle::Constructed
            } else {
                Lifecycle::Running
            };
        }
    }
}
