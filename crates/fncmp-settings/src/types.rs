//! Settings schema.
//!
//! JSON keys are camelCase. Every section implements `Default` and is
//! `#[serde(default)]`, so a settings file only needs the keys it changes.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings object.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FncmpSettings {
    /// Network, queue and dispatch-loop settings.
    pub server: ServerSettings,
    /// Expiring cache settings.
    pub cache: CacheSettings,
    /// Log output settings.
    pub logging: LoggingSettings,
}

impl FncmpSettings {
    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<()> {
        self.server.validate()?;
        self.cache.validate()
    }
}

/// Server and dispatch engine settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Bind port (`0` picks a free port).
    pub port: u16,
    /// Capacity of each session handler's inbound and outbound queue.
    pub handler_queue_capacity: usize,
    /// Capacity of each connection's outbound frame queue.
    pub connection_queue_capacity: usize,
    /// Interval between WebSocket ping frames, in milliseconds.
    pub heartbeat_interval_ms: u64,
    /// Disconnect a client silent for this long, in milliseconds.
    pub heartbeat_timeout_ms: u64,
    /// Largest accepted inbound frame, in bytes.
    pub max_message_size: usize,
    /// Time budget for one listener callback, in milliseconds.
    pub callback_timeout_ms: u64,
    /// Send `error` dispatches to clients (otherwise log only).
    pub publish_errors: bool,
    /// Drop a connection's cache namespace when it disconnects.
    pub drop_cache_on_disconnect: bool,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            handler_queue_capacity: 1028,
            connection_queue_capacity: 16,
            heartbeat_interval_ms: 30_000,
            heartbeat_timeout_ms: 90_000,
            max_message_size: 1024 * 1024,
            callback_timeout_ms: 10_000,
            publish_errors: true,
            drop_cache_on_disconnect: false,
        }
    }
}

impl ServerSettings {
    /// Heartbeat interval as a `Duration`.
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// Heartbeat timeout as a `Duration`.
    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.heartbeat_timeout_ms)
    }

    /// Callback budget as a `Duration`.
    pub fn callback_timeout(&self) -> Duration {
        Duration::from_millis(self.callback_timeout_ms)
    }

    fn validate(&self) -> Result<()> {
        if self.handler_queue_capacity == 0 {
            return Err(SettingsError::InvalidValue(
                "server.handlerQueueCapacity must be at least 1".into(),
            ));
        }
        if self.connection_queue_capacity == 0 {
            return Err(SettingsError::InvalidValue(
                "server.connectionQueueCapacity must be at least 1".into(),
            ));
        }
        if self.heartbeat_timeout_ms < self.heartbeat_interval_ms {
            return Err(SettingsError::InvalidValue(
                "server.heartbeatTimeoutMs below server.heartbeatIntervalMs".into(),
            ));
        }
        Ok(())
    }
}

/// Expiring cache settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CacheSettings {
    /// TTL applied when a write asks for none (or zero), in milliseconds.
    pub default_ttl_ms: u64,
    /// Upper bound for requested TTLs, in milliseconds.
    pub max_ttl_ms: u64,
    /// Number of past values retained per entry.
    pub history_limit: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            default_ttl_ms: 300_000,
            max_ttl_ms: 300_000,
            history_limit: 16,
        }
    }
}

impl CacheSettings {
    /// Default TTL as a `Duration`.
    pub fn default_ttl(&self) -> Duration {
        Duration::from_millis(self.default_ttl_ms)
    }

    /// Maximum TTL as a `Duration`.
    pub fn max_ttl(&self) -> Duration {
        Duration::from_millis(self.max_ttl_ms)
    }

    fn validate(&self) -> Result<()> {
        if self.default_ttl_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "cache.defaultTtlMs must be positive".into(),
            ));
        }
        if self.max_ttl_ms < self.default_ttl_ms {
            return Err(SettingsError::InvalidValue(
                "cache.maxTtlMs below cache.defaultTtlMs".into(),
            ));
        }
        Ok(())
    }
}

/// Log output settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Filter directive used when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines instead of compact text.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}
