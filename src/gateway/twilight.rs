//! Twilight-backed gateway client
//!
//! A shard counts as ready once it has received the READY dispatch. After
//! that the connection is driven by `run` until it closes or is told to.

use super::{ChunkingPolicy, ConnectionConfig, GatewayClient, ShardSlot};
use crate::error::ManagerError;
use crate::shard::{ShardHealth, ShardStatus};

use async_trait::async_trait;
use std::collections::HashSet;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use twilight_gateway::error::{ReceiveMessageError, ReceiveMessageErrorType};
use twilight_gateway::{CloseFrame, ConfigBuilder, EventTypeFlags, Shard, StreamExt as _};
use twilight_model::gateway::event::Event;
use twilight_model::gateway::payload::incoming::GuildCreate;
use twilight_model::gateway::payload::outgoing::RequestGuildMembers;
use twilight_model::gateway::{CloseCode, ShardId};
use twilight_model::id::{marker::GuildMarker, Id};

/// Consecutive receive errors tolerated before a ready shard is declared dead
const MAX_CONSECUTIVE_ERRORS: u32 = 10;

/// Gateway client holding the bot credential
pub struct TwilightGateway {
    token: String,
}

impl TwilightGateway {
    /// The token is expected to be validated already (see `validate_token`).
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

/// A Twilight shard plus the tuning it was built with
pub struct TwilightConnection {
    shard: Shard,
    event_types: EventTypeFlags,
    chunking: ChunkingPolicy,
    guilds: HashSet<Id<GuildMarker>>,
}

#[async_trait]
impl GatewayClient for TwilightGateway {
    type Connection = TwilightConnection;

    async fn build_connection(
        &self,
        config: &ConnectionConfig,
        slot: ShardSlot,
    ) -> Result<TwilightConnection, ManagerError> {
        config.validate()?;

        let gateway_config = ConfigBuilder::new(self.token.clone(), config.intents())
            .large_threshold(config.large_threshold)
            .build();

        // ShardSlot guarantees index < total, which ShardId::new asserts
        let shard = Shard::with_config(ShardId::new(slot.index, slot.total), gateway_config);

        debug!(shard = %slot, intents = ?config.intents(), "Built shard");

        Ok(TwilightConnection {
            shard,
            event_types: config.event_types(),
            chunking: config.chunking,
            guilds: HashSet::new(),
        })
    }

    async fn await_ready(
        &self,
        mut connection: TwilightConnection,
        status: &ShardStatus,
    ) -> Result<TwilightConnection, ManagerError> {
        let slot = status.slot();
        status.set_health(ShardHealth::Connecting);

        while let Some(item) = connection.shard.next_event(connection.event_types).await {
            let event = match item {
                Ok(event) => event,
                Err(source) if is_fatal(&source) => {
                    return Err(ManagerError::Gateway {
                        slot,
                        source: Box::new(source),
                    });
                }
                Err(source) => {
                    warn!(shard = %slot, error = %source, "Error while waiting for ready");
                    continue;
                }
            };

            status.record_event();

            match event {
                Event::Ready(ready) => {
                    connection.guilds = ready.guilds.iter().map(|guild| guild.id).collect();
                    status.set_guilds(connection.guilds.len() as u64);
                    info!(
                        shard = %slot,
                        guilds = ready.guilds.len(),
                        session_id = %ready.session_id,
                        "Shard ready"
                    );
                    return Ok(connection);
                }
                Event::GatewayClose(frame) => match classify_close(frame.as_ref()) {
                    CloseOutcome::Resumable(code) => {
                        // Twilight reconnects on its own for resumable codes
                        warn!(shard = %slot, ?code, "Gateway closed during handshake");
                        status.set_health(ShardHealth::Disconnected);
                    }
                    outcome => return Err(outcome.into_error(slot)),
                },
                _ => {}
            }
        }

        Err(ManagerError::ConnectionClosed { slot, code: None })
    }

    async fn run(
        &self,
        mut connection: TwilightConnection,
        status: ShardStatus,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), ManagerError> {
        let slot = status.slot();
        let mut closing = false;
        let mut consecutive_errors: u32 = 0;

        loop {
            let next = tokio::select! {
                item = connection.shard.next_event(connection.event_types) => Next::Item(item),
                _ = shutdown.recv(), if !closing => Next::Shutdown,
            };

            let item = match next {
                Next::Shutdown => {
                    info!(shard = %slot, "Closing shard");
                    connection.shard.close(CloseFrame::NORMAL);
                    closing = true;
                    continue;
                }
                Next::Item(Some(item)) => item,
                Next::Item(None) => break,
            };

            let event = match item {
                Ok(event) => {
                    consecutive_errors = 0;
                    event
                }
                Err(source) => {
                    consecutive_errors += 1;
                    warn!(shard = %slot, error = %source, consecutive = consecutive_errors, "Error receiving event");

                    if is_fatal(&source) || consecutive_errors >= MAX_CONSECUTIVE_ERRORS {
                        status.set_health(ShardHealth::Dead);
                        return Err(ManagerError::Gateway {
                            slot,
                            source: Box::new(source),
                        });
                    }

                    status.set_health(ShardHealth::Disconnected);
                    continue;
                }
            };

            status.record_event();

            match &event {
                Event::Ready(ready) => {
                    connection.guilds = ready.guilds.iter().map(|guild| guild.id).collect();
                    status.set_guilds(connection.guilds.len() as u64);
                    status.set_health(ShardHealth::Ready);
                    info!(shard = %slot, "Shard re-identified");
                }
                Event::Resumed => {
                    status.set_health(ShardHealth::Ready);
                    info!(shard = %slot, "Shard resumed");
                }
                Event::GatewayReconnect | Event::GatewayInvalidateSession(true) => {
                    status.set_health(ShardHealth::Resuming);
                }
                Event::GatewayHeartbeatAck => {
                    status.record_heartbeat();
                }
                Event::GatewayClose(frame) => {
                    if closing {
                        break;
                    }
                    match classify_close(frame.as_ref()) {
                        CloseOutcome::Resumable(code) => {
                            status.set_health(ShardHealth::Disconnected);
                            warn!(shard = %slot, ?code, "Shard disconnected");
                        }
                        outcome => {
                            status.set_health(ShardHealth::Dead);
                            return Err(outcome.into_error(slot));
                        }
                    }
                }
                Event::GuildCreate(guild) => {
                    connection.guilds.insert(guild.id());
                    status.set_guilds(connection.guilds.len() as u64);

                    if let GuildCreate::Available(available) = &**guild {
                        if connection.chunking.should_request(available.large) {
                            let request = RequestGuildMembers::builder(available.id).query("", None);
                            connection.shard.command(&request);
                            debug!(shard = %slot, guild_id = %available.id, "Requested guild members");
                        }
                    }
                }
                Event::GuildDelete(guild) => {
                    // Unavailable guilds are outages, not departures
                    if guild.unavailable != Some(true) {
                        connection.guilds.remove(&guild.id);
                        status.set_guilds(connection.guilds.len() as u64);
                    }
                    debug!(shard = %slot, guild_id = %guild.id, "Guild left");
                }
                _ => {}
            }
        }

        status.set_health(ShardHealth::Dead);
        info!(shard = %slot, "Shard event stream ended");
        Ok(())
    }
}

enum Next {
    Item(Option<Result<Event, ReceiveMessageError>>),
    Shutdown,
}

fn is_fatal(error: &ReceiveMessageError) -> bool {
    matches!(error.kind(), ReceiveMessageErrorType::Reconnect)
}

/// What a gateway close frame means for the shard
#[derive(Debug, PartialEq, Eq)]
enum CloseOutcome {
    /// 4004: the token was rejected
    Authentication(String),
    /// Discord will not accept a reconnect with this code
    Fatal(u16),
    /// Twilight reconnects on its own
    Resumable(Option<u16>),
}

impl CloseOutcome {
    fn into_error(self, slot: ShardSlot) -> ManagerError {
        match self {
            CloseOutcome::Authentication(reason) => ManagerError::Authentication { slot, reason },
            CloseOutcome::Fatal(code) => ManagerError::ConnectionClosed {
                slot,
                code: Some(code),
            },
            CloseOutcome::Resumable(code) => ManagerError::ConnectionClosed { slot, code },
        }
    }
}

fn classify_close(frame: Option<&CloseFrame<'_>>) -> CloseOutcome {
    let Some(frame) = frame else {
        return CloseOutcome::Resumable(None);
    };

    match CloseCode::try_from(frame.code) {
        Ok(CloseCode::AuthenticationFailed) => {
            let reason = if frame.reason.is_empty() {
                "authentication failed".to_string()
            } else {
                frame.reason.to_string()
            };
            CloseOutcome::Authentication(reason)
        }
        Ok(code) if !code.can_reconnect() => CloseOutcome::Fatal(frame.code),
        _ => CloseOutcome::Resumable(Some(frame.code)),
    }
}
