//! `/health` endpoint body.

use std::time::Instant;

use serde::Serialize;

use crate::engine::Engine;

/// Health check response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    /// `"ok"` while serving, `"shutting_down"` once shutdown began.
    pub status: String,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Live connections.
    pub connections: usize,
    /// Registered session handlers.
    pub handlers: usize,
    /// Registered event listeners.
    pub listeners: usize,
    /// Cache namespaces.
    pub cache_stores: usize,
}

/// Snapshot the engine's counters.
pub fn health_check(start_time: Instant, engine: &Engine, shutting_down: bool) -> HealthResponse {
    HealthResponse {
        status: if shutting_down { "shutting_down" } else { "ok" }.into(),
        uptime_secs: start_time.elapsed().as_secs(),
        connections: engine.connections().len(),
        handlers: engine.handlers().len(),
        listeners: engine.listeners().len(),
        cache_stores: engine.caches().store_count(),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use fncmp_cache::StoreManager;
    use fncmp_core::ConnId;
    use fncmp_settings::CacheSettings;

    use super::*;
    use crate::config::ServerConfig;

    fn engine() -> Engine {
        Engine::new(ServerConfig::default(), StoreManager::new(CacheSettings::default()))
    }

    #[tokio::test]
    async fn empty_engine_is_ok() {
        let resp = health_check(Instant::now(), &engine(), false);
        assert_eq!(resp.status, "ok");
        assert!(resp.uptime_secs < 2);
        assert_eq!(resp.connections, 0);
        assert_eq!(resp.handlers, 0);
        assert_eq!(resp.listeners, 0);
        assert_eq!(resp.cache_stores, 0);
    }

    #[tokio::test]
    async fn counts_live_state() {
        let engine = engine();
        let handler = engine.new_handler();
        let (_a, _rx_a) = engine.connect(ConnId::from("a"), &handler);
        let (_b, _rx_b) = engine.connect(ConnId::from("b"), &handler);
        engine.caches().set("a", "k", 1_u8, None).unwrap();

        let resp = health_check(Instant::now(), &engine, false);
        assert_eq!(resp.connections, 2);
        assert_eq!(resp.handlers, 1);
        assert_eq!(resp.cache_stores, 1);
    }

    #[tokio::test]
    async fn reports_shutdown_and_uptime() {
        let start = Instant::now().checked_sub(Duration::from_secs(60)).unwrap();
        let resp = health_check(start, &engine(), true);
        assert_eq!(resp.status, "shutting_down");
        assert!(resp.uptime_secs >= 59);

        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["status"], "shutting_down");
        assert!(json["cache_stores"].is_number());
    }
}
