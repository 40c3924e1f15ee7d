//! Resource-usage tuning shared by every shard connection
//!
//! Built once per manager and handed read-only to the gateway client for
//! each shard it builds.

use crate::error::ManagerError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::ops::RangeInclusive;
use twilight_gateway::{EventTypeFlags, Intents};

/// Large threshold range accepted by the Discord gateway
pub const LARGE_THRESHOLD_RANGE: RangeInclusive<u64> = 50..=250;

/// Entity categories a connection can skip tracking to save memory
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheCategory {
    Activity,
    ClientStatus,
    OnlineStatus,
    MemberOverrides,
    VoiceState,
    Emoji,
    Sticker,
    ScheduledEvents,
}

impl CacheCategory {
    /// Event types whose payload only feeds this category and the ones
    /// listed by `sharing`.
    fn event_types(self) -> EventTypeFlags {
        match self {
            Self::Activity | Self::ClientStatus | Self::OnlineStatus => {
                EventTypeFlags::PRESENCE_UPDATE
            }
            Self::VoiceState => EventTypeFlags::VOICE_STATE_UPDATE,
            Self::Emoji => EventTypeFlags::GUILD_EMOJIS_UPDATE,
            Self::Sticker => EventTypeFlags::GUILD_STICKERS_UPDATE,
            Self::ScheduledEvents => {
                EventTypeFlags::GUILD_SCHEDULED_EVENT_CREATE
                    | EventTypeFlags::GUILD_SCHEDULED_EVENT_DELETE
                    | EventTypeFlags::GUILD_SCHEDULED_EVENT_UPDATE
                    | EventTypeFlags::GUILD_SCHEDULED_EVENT_USER_ADD
                    | EventTypeFlags::GUILD_SCHEDULED_EVENT_USER_REMOVE
            }
            // Permission overrides ride along on channel payloads.
            Self::MemberOverrides => EventTypeFlags::empty(),
        }
    }

    /// Categories that must all be disabled before this one's events can
    /// be dropped.
    fn sharing(self) -> &'static [CacheCategory] {
        match self {
            Self::Activity | Self::ClientStatus | Self::OnlineStatus => {
                &[Self::Activity, Self::ClientStatus, Self::OnlineStatus]
            }
            Self::VoiceState => &[Self::VoiceState],
            Self::Emoji => &[Self::Emoji],
            Self::Sticker => &[Self::Sticker],
            Self::ScheduledEvents => &[Self::ScheduledEvents],
            Self::MemberOverrides => &[Self::MemberOverrides],
        }
    }
}

/// Whether member lists are proactively requested from the gateway
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkingPolicy {
    /// Never request member chunks
    #[default]
    None,
    /// Only request members for large guilds, whose offline members are
    /// left out of the initial guild payload
    Lazy,
    /// Request members for every guild as it becomes available
    Eager,
}

impl ChunkingPolicy {
    /// Decide whether to request members for a guild that just arrived
    pub fn should_request(self, guild_is_large: bool) -> bool {
        match self {
            ChunkingPolicy::None => false,
            ChunkingPolicy::Lazy => guild_is_large,
            ChunkingPolicy::Eager => true,
        }
    }
}

/// Gateway event subscriptions a connection may opt out of
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatewayIntent {
    Guilds,
    GuildMembers,
    GuildModeration,
    GuildIntegrations,
    GuildWebhooks,
    GuildInvites,
    GuildVoiceStates,
    GuildPresences,
    GuildMessages,
    GuildMessageReactions,
    GuildMessageTyping,
    DirectMessages,
    DirectMessageReactions,
    DirectMessageTyping,
    MessageContent,
    GuildScheduledEvents,
    AutoModerationConfiguration,
    AutoModerationExecution,
}

impl GatewayIntent {
    pub const ALL: [GatewayIntent; 18] = [
        Self::Guilds,
        Self::GuildMembers,
        Self::GuildModeration,
        Self::GuildIntegrations,
        Self::GuildWebhooks,
        Self::GuildInvites,
        Self::GuildVoiceStates,
        Self::GuildPresences,
        Self::GuildMessages,
        Self::GuildMessageReactions,
        Self::GuildMessageTyping,
        Self::DirectMessages,
        Self::DirectMessageReactions,
        Self::DirectMessageTyping,
        Self::MessageContent,
        Self::GuildScheduledEvents,
        Self::AutoModerationConfiguration,
        Self::AutoModerationExecution,
    ];

    /// Privileged intents must be enabled in the developer portal and are
    /// not requested by default.
    pub fn is_privileged(self) -> bool {
        matches!(
            self,
            Self::GuildMembers | Self::GuildPresences | Self::MessageContent
        )
    }

    pub fn to_intents(self) -> Intents {
        match self {
            Self::Guilds => Intents::GUILDS,
            Self::GuildMembers => Intents::GUILD_MEMBERS,
            Self::GuildModeration => Intents::GUILD_MODERATION,
            Self::GuildIntegrations => Intents::GUILD_INTEGRATIONS,
            Self::GuildWebhooks => Intents::GUILD_WEBHOOKS,
            Self::GuildInvites => Intents::GUILD_INVITES,
            Self::GuildVoiceStates => Intents::GUILD_VOICE_STATES,
            Self::GuildPresences => Intents::GUILD_PRESENCES,
            Self::GuildMessages => Intents::GUILD_MESSAGES,
            Self::GuildMessageReactions => Intents::GUILD_MESSAGE_REACTIONS,
            Self::GuildMessageTyping => Intents::GUILD_MESSAGE_TYPING,
            Self::DirectMessages => Intents::DIRECT_MESSAGES,
            Self::DirectMessageReactions => Intents::DIRECT_MESSAGE_REACTIONS,
            Self::DirectMessageTyping => Intents::DIRECT_MESSAGE_TYPING,
            Self::MessageContent => Intents::MESSAGE_CONTENT,
            Self::GuildScheduledEvents => Intents::GUILD_SCHEDULED_EVENTS,
            Self::AutoModerationConfiguration => Intents::AUTO_MODERATION_CONFIGURATION,
            Self::AutoModerationExecution => Intents::AUTO_MODERATION_EXECUTION,
        }
    }
}

/// Connection configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Entity categories the connection does not track
    pub disabled_cache: BTreeSet<CacheCategory>,

    /// Member list chunking behaviour
    pub chunking: ChunkingPolicy,

    /// Event subscriptions removed from the default intent set
    pub disabled_intents: BTreeSet<GatewayIntent>,

    /// Member count above which a guild is treated as large
    pub large_threshold: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            disabled_cache: BTreeSet::from([
                CacheCategory::Activity,
                CacheCategory::MemberOverrides,
            ]),
            chunking: ChunkingPolicy::None,
            disabled_intents: BTreeSet::from([GatewayIntent::DirectMessageTyping]),
            large_threshold: 100,
        }
    }
}

impl ConnectionConfig {
    /// Check values the gateway would otherwise reject (or panic on)
    pub fn validate(&self) -> Result<(), ManagerError> {
        if !LARGE_THRESHOLD_RANGE.contains(&self.large_threshold) {
            return Err(ManagerError::Configuration(format!(
                "large_threshold must be between {} and {}, got {}",
                LARGE_THRESHOLD_RANGE.start(),
                LARGE_THRESHOLD_RANGE.end(),
                self.large_threshold
            )));
        }
        Ok(())
    }

    /// Every non-privileged intent
    pub fn default_intents() -> Intents {
        GatewayIntent::ALL
            .iter()
            .filter(|intent| !intent.is_privileged())
            .fold(Intents::empty(), |acc, intent| acc | intent.to_intents())
    }

    /// Intents to identify with
    pub fn intents(&self) -> Intents {
        self.disabled_intents
            .iter()
            .fold(Self::default_intents(), |acc, intent| {
                acc.difference(intent.to_intents())
            })
    }

    /// Event types the connection deserializes
    pub fn event_types(&self) -> EventTypeFlags {
        let mut flags = EventTypeFlags::all();
        for category in &self.disabled_cache {
            let shared_all_disabled = category
                .sharing()
                .iter()
                .all(|other| self.disabled_cache.contains(other));
            if shared_all_disabled {
                flags.remove(category.event_types());
            }
        }
        flags
    }
}
