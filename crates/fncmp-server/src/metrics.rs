//! Prometheus metrics recorder and metric names.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus recorder as the global `metrics` recorder.
///
/// Call once at startup before anything is recorded. The returned handle
/// renders the `/metrics` endpoint.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// A handle backed by a private recorder (nothing is installed globally).
pub fn detached_handle() -> PrometheusHandle {
    PrometheusBuilder::new().build_recorder().handle()
}

/// Connections opened (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// Connections closed (counter).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Live connections (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// Connection lifetime (histogram).
pub const WS_CONNECTION_DURATION_SECONDS: &str = "ws_connection_duration_seconds";
/// Connections closed by the heartbeat (counter).
pub const WS_HEARTBEAT_TIMEOUTS_TOTAL: &str = "ws_heartbeat_timeouts_total";
/// Running session handlers (gauge).
pub const HANDLERS_ACTIVE: &str = "handlers_active";
/// Dispatches received from clients (counter, labels: function).
pub const DISPATCH_INBOUND_TOTAL: &str = "dispatch_inbound_total";
/// Dispatches written to connections (counter, labels: function).
pub const DISPATCH_PUBLISHED_TOTAL: &str = "dispatch_published_total";
/// Dispatches dropped before publishing (counter, labels: reason).
pub const DISPATCH_DROPPED_TOTAL: &str = "dispatch_dropped_total";
/// Error dispatches produced by the engine (counter, labels: code).
pub const DISPATCH_ERRORS_TOTAL: &str = "dispatch_errors_total";
/// Listener callback duration (histogram).
pub const CALLBACK_DURATION_SECONDS: &str = "callback_duration_seconds";
/// Registered event listeners (gauge).
pub const LISTENERS_REGISTERED: &str = "listeners_registered";
