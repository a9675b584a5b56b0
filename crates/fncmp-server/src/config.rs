//! Runtime configuration for the engine and server.

use std::time::Duration;

use fncmp_settings::ServerSettings;

/// Resolved server configuration.
///
/// Built from [`ServerSettings`]; the default binds an ephemeral port so
/// tests never collide.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerConfig {
    /// Host to bind.
    pub host: String,
    /// Port to bind (`0` auto-assigns).
    pub port: u16,
    /// Capacity of each session handler queue.
    pub handler_queue_capacity: usize,
    /// Capacity of each connection's outbound frame queue.
    pub connection_queue_capacity: usize,
    /// Interval between server Ping frames.
    pub heartbeat_interval: Duration,
    /// Silence after which a connection is closed.
    pub heartbeat_timeout: Duration,
    /// Max inbound WebSocket message size in bytes.
    pub max_message_size: usize,
    /// Budget for one listener callback.
    pub callback_timeout: Duration,
    /// Publish error dispatches to the client (once) in addition to logging.
    pub publish_errors: bool,
    /// Drop the connection's cache namespace when it closes.
    pub drop_cache_on_disconnect: bool,
}

impl From<&ServerSettings> for ServerConfig {
    fn from(s: &ServerSettings) -> Self {
        Self {
            host: s.host.clone(),
            port: s.port,
            handler_queue_capacity: s.handler_queue_capacity,
            connection_queue_capacity: s.connection_queue_capacity,
            heartbeat_interval: s.heartbeat_interval(),
            heartbeat_timeout: s.heartbeat_timeout(),
            max_message_size: s.max_message_size,
            callback_timeout: s.callback_timeout(),
            publish_errors: s.publish_errors,
            drop_cache_on_disconnect: s.drop_cache_on_disconnect,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 0,
            ..Self::from(&ServerSettings::default())
        }
    }
}

impl ServerConfig {
    /// `host:port` string for binding.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_uses_ephemeral_port() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.port, 0);
        assert_eq!(cfg.host, "127.0.0.1");
        assert_eq!(cfg.bind_addr(), "127.0.0.1:0");
    }

    #[test]
    fn default_queue_capacities() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.handler_queue_capacity, 1028);
        assert_eq!(cfg.connection_queue_capacity, 16);
    }

    #[test]
    fn converts_millisecond_settings() {
        let settings = ServerSettings {
            port: 9000,
            heartbeat_interval_ms: 250,
            heartbeat_timeout_ms: 1000,
            callback_timeout_ms: 40,
            publish_errors: false,
            ..ServerSettings::default()
        };
        let cfg = ServerConfig::from(&settings);
        assert_eq!(cfg.port, 9000);
        assert_eq!(cfg.heartbeat_interval, Duration::from_millis(250));
        assert_eq!(cfg.heartbeat_timeout, Duration::from_secs(1));
        assert_eq!(cfg.callback_timeout, Duration::from_millis(40));
        assert!(!cfg.publish_errors);
    }
}
