//! `FncmpServer`: Axum HTTP + WebSocket front end for an [`Engine`].

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use fncmp_core::{ConnId, HandlerId};
use futures::{SinkExt, StreamExt, future};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Deserialize;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::engine::Engine;
use crate::handler::SessionHandler;
use crate::health::{self, HealthResponse};
use crate::shutdown::ShutdownCoordinator;
use crate::transport::frame::Frame;

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// The dispatch engine.
    pub engine: Engine,
    /// Handler used when the upgrade request names none.
    pub handler: Arc<SessionHandler>,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// When the server started.
    pub start_time: Instant,
    /// Renders `/metrics`.
    pub metrics: PrometheusHandle,
}

/// Query string of the WebSocket upgrade.
#[derive(Debug, Default, Deserialize)]
pub struct WsParams {
    /// Connection id chosen by the client; generated when absent.
    pub fncmp_id: Option<String>,
    /// Route to bootstrap.
    pub path: Option<String>,
    /// Handler to attach to instead of the default one.
    pub handler: Option<String>,
}

/// The fncmp server.
pub struct FncmpServer {
    engine: Engine,
    handler: Arc<SessionHandler>,
    shutdown: Arc<ShutdownCoordinator>,
    start_time: Instant,
    metrics: PrometheusHandle,
}

impl FncmpServer {
    /// Create a server with one default handler.
    pub fn new(engine: Engine, metrics: PrometheusHandle) -> Self {
        let handler = engine.new_handler();
        Self {
            engine,
            handler,
            shutdown: Arc::new(ShutdownCoordinator::new()),
            start_time: Instant::now(),
            metrics,
        }
    }

    /// The engine behind this server.
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// The default handler. Register routes here.
    pub fn handler(&self) -> &Arc<SessionHandler> {
        &self.handler
    }

    /// The shutdown coordinator.
    pub fn coordinator(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            engine: self.engine.clone(),
            handler: Arc::clone(&self.handler),
            shutdown: Arc::clone(&self.shutdown),
            start_time: self.start_time,
            metrics: self.metrics.clone(),
        };

        Router::new()
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .route("/ws", get(ws_handler))
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
            .with_state(state)
    }

    /// Bind the configured address and serve in the background until
    /// [`FncmpServer::shutdown`]. Returns the bound address.
    pub async fn listen(&self) -> std::io::Result<SocketAddr> {
        let listener = TcpListener::bind(self.engine.config().bind_addr()).await?;
        let addr = listener.local_addr()?;
        let app = self.router();
        let token = self.shutdown.token();

        info!(%addr, "fncmp server listening");
        self.shutdown.track(tokio::spawn(async move {
            let served = axum::serve(listener, app)
                .with_graceful_shutdown(async move { token.cancelled().await })
                .await;
            if let Err(err) = served {
                warn!(error = %err, "server stopped with error");
            }
        }));
        Ok(addr)
    }

    /// Stop accepting connections, close every live one and wait for the
    /// server task. Returns how many tasks had to be aborted.
    pub async fn shutdown(&self, timeout: Option<Duration>) -> usize {
        info!("shutting down");
        self.shutdown.shutdown();
        self.engine.shutdown();
        self.shutdown.graceful_shutdown(timeout).await
    }
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(
        state.start_time,
        &state.engine,
        state.shutdown.is_shutting_down(),
    ))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> String {
    state.metrics.render()
}

/// GET /ws?fncmp_id=..&path=..&handler=..
async fn ws_handler(ws: WebSocketUpgrade, Query(params): Query<WsParams>, State(state): State<AppState>) -> Response {
    if state.shutdown.is_shutting_down() {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }
    let handler = match params.handler.filter(|h| !h.is_empty()) {
        Some(id) => match state.engine.handler(&HandlerId::from(id)) {
            Some(handler) => handler,
            None => return (StatusCode::NOT_FOUND, "unknown handler").into_response(),
        },
        None => state.handler,
    };
    let conn_id = params
        .fncmp_id
        .filter(|id| !id.is_empty())
        .map_or_else(ConnId::new, ConnId::from);
    let path = params.path.unwrap_or_default();
    let engine = state.engine;

    ws.max_message_size(engine.config().max_message_size)
        .on_upgrade(move |socket| serve_socket(engine, handler, conn_id, path, socket))
}

async fn serve_socket(engine: Engine, handler: Arc<SessionHandler>, conn_id: ConnId, path: String, socket: WebSocket) {
    let (sink, stream) = socket.split();
    let sink = sink.with(|frame: Frame| future::ready(Ok::<_, axum::Error>(Message::from(frame))));
    let stream = stream.map(|msg| msg.map(Frame::from));
    engine.serve(conn_id, handler, path, sink, stream).await;
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::Request;
    use fncmp_cache::StoreManager;
    use fncmp_settings::CacheSettings;
    use tower::ServiceExt;

    use super::*;
    use crate::config::ServerConfig;
    use crate::metrics::detached_handle;

    fn make_server() -> FncmpServer {
        let engine = Engine::new(ServerConfig::default(), StoreManager::new(CacheSettings::default()));
        FncmpServer::new(engine, detached_handle())
    }

    async fn get(app: Router, uri: &str) -> (StatusCode, Vec<u8>) {
        let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        let status = resp.status();
        let body = axum::body::to_bytes(resp.into_body(), 100_000).await.unwrap();
        (status, body.to_vec())
    }

    #[tokio::test]
    async fn default_handler_is_registered() {
        let server = make_server();
        assert!(server.engine().handler(server.handler().id()).is_some());
        assert!(!server.coordinator().is_shutting_down());
    }

    #[tokio::test]
    async fn health_endpoint_returns_ok() {
        let server = make_server();
        let (status, body) = get(server.router(), "/health").await;
        assert_eq!(status, StatusCode::OK);
        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed["status"], "ok");
        assert_eq!(parsed["handlers"], 1);
        assert_eq!(parsed["connections"], 0);
    }

    #[tokio::test]
    async fn metrics_endpoint_renders() {
        let server = make_server();
        let (status, _) = get(server.router(), "/metrics").await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn plain_get_on_ws_is_rejected() {
        let server = make_server();
        let (status, _) = get(server.router(), "/ws?fncmp_id=abc").await;
        assert!(status.is_client_error());
    }

    #[tokio::test]
    async fn unknown_route_returns_404() {
        let server = make_server();
        let (status, _) = get(server.router(), "/nonexistent").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn listen_and_shutdown() {
        let server = make_server();
        let addr = server.listen().await.unwrap();
        assert_ne!(addr.port(), 0);
        assert_eq!(server.shutdown(Some(Duration::from_secs(5))).await, 0);
        assert!(server.coordinator().is_shutting_down());
        let (_, body) = get(server.router(), "/health").await;
        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed["status"], "shutting_down");
    }
}
