//! Process configuration
//!
//! The bot token and shard count come from the command line
//! (`shard-manager <token> [shardCount]`), falling back to the environment.
//! Connection tuning is read from an optional `shard-manager.toml` and
//! `SHARD_MANAGER_*` variables.

use crate::error::ManagerError;
use crate::gateway::ConnectionConfig;
use std::env;

/// Base name of the optional tuning file (any format `config` understands)
pub const CONFIG_FILE: &str = "shard-manager";

/// Prefix for tuning overrides, e.g. `SHARD_MANAGER_LARGE_THRESHOLD=150`
pub const ENV_PREFIX: &str = "SHARD_MANAGER";

/// Process configuration
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Discord bot token
    pub token: String,

    /// Number of shards, or `None` for an unsharded start
    pub shard_count: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,

    /// Emit JSON log lines instead of human-readable ones
    pub log_json: bool,

    /// Health/metrics HTTP port; no server when unset
    pub health_port: Option<u16>,

    pub connection: ConnectionConfig,
}

impl ManagerConfig {
    /// Load configuration from CLI arguments (program name excluded) and the
    /// environment
    pub fn load(args: impl IntoIterator<Item = String>) -> Result<Self, ManagerError> {
        dotenvy::dotenv().ok();

        let (token, shard_count) = credentials(args, |key| env::var(key).ok())?;
        let shard_count = shard_count
            .map(|raw| parse_shard_count(&raw))
            .transpose()?;

        let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let log_json = env::var("LOG_FORMAT").is_ok_and(|format| format.eq_ignore_ascii_case("json"));

        let health_port = env::var("HEALTH_PORT")
            .ok()
            .map(|port| {
                port.parse().map_err(|e| {
                    ManagerError::Configuration(format!("HEALTH_PORT must be a valid port number: {e}"))
                })
            })
            .transpose()?;

        Ok(Self {
            token,
            shard_count,
            log_level,
            log_json,
            health_port,
            connection: load_connection_config()?,
        })
    }
}

/// Token and raw shard count, from the arguments or else the environment.
///
/// The two never mix: a token on the command line means `SHARD_COUNT` is
/// ignored, so `shard-manager <token>` is always unsharded.
fn credentials(
    args: impl IntoIterator<Item = String>,
    var: impl Fn(&str) -> Option<String>,
) -> Result<(String, Option<String>), ManagerError> {
    let mut args = args.into_iter();
    match args.next() {
        Some(token) => Ok((token, args.next())),
        None => {
            let token = var("DISCORD_TOKEN").ok_or_else(|| {
                ManagerError::Configuration("You must specify the bot's token!".to_string())
            })?;
            Ok((token, var("SHARD_COUNT")))
        }
    }
}

/// Parse a shard count given on the command line: digits only, at least 1
pub fn parse_shard_count(raw: &str) -> Result<u64, ManagerError> {
    let invalid = || {
        ManagerError::Configuration(format!(
            "You have specified an invalid amount of shards: {raw:?}"
        ))
    };

    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    match raw.parse::<u64>() {
        Ok(0) | Err(_) => Err(invalid()),
        Ok(count) => Ok(count),
    }
}

/// Read connection tuning from the optional file and environment overrides
pub fn load_connection_config() -> Result<ConnectionConfig, ManagerError> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name(CONFIG_FILE).required(false))
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("disabled_cache")
                .with_list_parse_key("disabled_intents"),
        )
        .build()
        .map_err(|e| ManagerError::Configuration(e.to_string()))?;

    let connection: ConnectionConfig = settings
        .try_deserialize()
        .map_err(|e| ManagerError::Configuration(e.to_string()))?;
    connection.validate()?;

    Ok(connection)
}
