//! Tunables for connection strategies.
//!
//! Defaults are read from the process environment when a strategy is built,
//! and can be overridden afterwards through the strategy's fluent setters.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::trace::warn;

/// Default socket send/receive buffer size hint.
pub const DEFAULT_TCP_BUFFER_SIZE: usize = 4 << 20;

/// Default window spent trying one address before giving up on it.
pub const DEFAULT_PAUSE_PERIOD: Duration = Duration::from_millis(500);

/// Default timeout of a single `connect(2)` attempt.
pub const DEFAULT_SOCKET_CONNECTION_TIMEOUT: Duration = Duration::from_millis(1);

/// Default pause a caller should observe between reconnect cycles.
pub const DEFAULT_PAUSE_BEFORE_RECONNECT: Duration = Duration::from_millis(500);

/// Environment keys consulted by [`StrategyConfig::from_env`].
pub mod keys {
    pub const TCP_BUFFER_SIZE: &str = "TETHER_TCP_BUFFER_SIZE";
    pub const CLIENT_TIMEOUT_MS: &str = "TETHER_CLIENT_TIMEOUT_MS";
    pub const SOCKET_CONNECTION_TIMEOUT_MS: &str = "TETHER_SOCKET_CONNECTION_TIMEOUT_MS";
    pub const PAUSE_BEFORE_RECONNECT_MS: &str = "TETHER_PAUSE_BEFORE_RECONNECT_MS";
}

/// Error parsing a configuration override.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// The value is not a non-negative integer.
    #[error("invalid value {value:?} for {key}")]
    Parse { key: &'static str, value: String },
}

/// Socket and pacing parameters shared by every connect attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyConfig {
    /// Send and receive buffer size applied to each new socket.
    pub tcp_buffer_size: usize,
    /// How long one address is retried before the strategy moves on. Also the
    /// pause after an unexpected failure.
    pub pause_period: Duration,
    /// Timeout of each individual connect call inside the pause period.
    pub socket_connection_timeout: Duration,
    /// Advisory pause between full reconnect cycles; never slept by the strategy.
    pub pause_before_reconnect: Duration,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            tcp_buffer_size: DEFAULT_TCP_BUFFER_SIZE,
            pause_period: DEFAULT_PAUSE_PERIOD,
            socket_connection_timeout: DEFAULT_SOCKET_CONNECTION_TIMEOUT,
            pause_before_reconnect: DEFAULT_PAUSE_BEFORE_RECONNECT,
        }
    }
}

impl StrategyConfig {
    /// Builds a configuration from the process environment.
    ///
    /// Unset keys keep their defaults. Malformed values are logged and
    /// ignored.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a configuration from an arbitrary key lookup.
    #[must_use]
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(v) = read(&lookup, keys::TCP_BUFFER_SIZE) {
            config.tcp_buffer_size = usize::try_from(v).unwrap_or(usize::MAX);
        }
        if let Some(ms) = read(&lookup, keys::CLIENT_TIMEOUT_MS) {
            config.pause_period = Duration::from_millis(ms);
        }
        if let Some(ms) = read(&lookup, keys::SOCKET_CONNECTION_TIMEOUT_MS) {
            config.socket_connection_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = read(&lookup, keys::PAUSE_BEFORE_RECONNECT_MS) {
            config.pause_before_reconnect = Duration::from_millis(ms);
        }

        config
    }
}

fn read<F>(lookup: &F, key: &'static str) -> Option<u64>
where
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    parse(key, &raw)
        .inspect_err(|_e| {
            warn!(error = %_e, "ignoring configuration override");
        })
        .ok()
}

fn parse(key: &'static str, raw: &str) -> Result<u64, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::Parse {
        key,
        value: raw.to_owned(),
    })
}
