//! The engine: shared services plus the handler table.
//!
//! Everything the loops need (config, connection and listener registries,
//! cache) is owned here and handed to each [`SessionHandler`] by `Arc`.
//! There is no process-global state; two engines in one process are fully
//! independent.

use std::sync::Arc;

use fncmp_cache::StoreManager;
use fncmp_core::{ConnId, DispatchError, HandlerId};
use fncmp_settings::FncmpSettings;
use futures::{Sink, Stream};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::component::FnComponent;
use crate::config::ServerConfig;
use crate::handler::SessionHandler;
use crate::registry::{ConnectionRegistry, HandlerRegistry, ListenerRegistry};
use crate::transport::connection::Connection;
use crate::transport::frame::Frame;
use crate::transport::session::run_connection;

/// Services shared by every handler of an engine.
#[derive(Debug)]
pub(crate) struct Services {
    pub(crate) config: ServerConfig,
    pub(crate) connections: ConnectionRegistry,
    pub(crate) listeners: ListenerRegistry,
    pub(crate) caches: StoreManager,
}

/// Dispatch engine. Cheap to clone.
#[derive(Clone)]
pub struct Engine {
    services: Arc<Services>,
    handlers: Arc<HandlerRegistry>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("connections", &self.services.connections.len())
            .field("listeners", &self.services.listeners.len())
            .field("handlers", &self.handlers.len())
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Build an engine around an existing cache.
    pub fn new(config: ServerConfig, caches: StoreManager) -> Self {
        Self {
            services: Arc::new(Services {
                config,
                connections: ConnectionRegistry::new(),
                listeners: ListenerRegistry::new(),
                caches,
            }),
            handlers: Arc::new(HandlerRegistry::new()),
        }
    }

    /// Build an engine and its cache from loaded settings.
    pub fn from_settings(settings: &FncmpSettings) -> Self {
        Self::new(
            ServerConfig::from(&settings.server),
            StoreManager::new(settings.cache.clone()),
        )
    }

    /// Resolved configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.services.config
    }

    /// Live connections.
    pub fn connections(&self) -> &ConnectionRegistry {
        &self.services.connections
    }

    /// Registered event listeners.
    pub fn listeners(&self) -> &ListenerRegistry {
        &self.services.listeners
    }

    /// Registered session handlers.
    pub fn handlers(&self) -> &HandlerRegistry {
        &self.handlers
    }

    /// The cache service.
    pub fn caches(&self) -> &StoreManager {
        &self.services.caches
    }

    /// Create and register an idle handler. Its loops start with the first
    /// connection, or with an explicit [`SessionHandler::activate`].
    pub fn new_handler(&self) -> Arc<SessionHandler> {
        let handler = Arc::new(SessionHandler::new(Arc::clone(&self.services)));
        self.handlers.register(Arc::clone(&handler));
        debug!(handler_id = %handler.id(), "session handler created");
        handler
    }

    /// Look up a handler.
    pub fn handler(&self, id: &HandlerId) -> Option<Arc<SessionHandler>> {
        self.handlers.get(id)
    }

    /// Unregister and stop a handler.
    pub fn remove_handler(&self, id: &HandlerId) -> Option<Arc<SessionHandler>> {
        let handler = self.handlers.remove(id)?;
        handler.stop();
        Some(handler)
    }

    /// Register a connection for `handler` and start the handler if idle.
    ///
    /// A connection already registered under `conn_id` is closed and
    /// replaced. The returned receiver yields the encoded frames to write.
    pub fn connect(&self, conn_id: ConnId, handler: &Arc<SessionHandler>) -> (Arc<Connection>, mpsc::Receiver<Arc<String>>) {
        let (conn, rx) = Connection::channel(
            conn_id,
            handler.id().clone(),
            self.services.config.connection_queue_capacity,
        );
        if let Some(previous) = self.services.connections.register(Arc::clone(&conn)) {
            info!(conn_id = %previous.id, "connection replaced by reconnect");
        }
        let _ = handler.activate();
        (conn, rx)
    }

    /// Close `conn` and release what it owns.
    ///
    /// Listeners scoped to the connection (and, if configured, its cache
    /// namespace) are purged only when `conn` is still the registered one,
    /// so a connection replaced by a reconnect leaves its successor intact.
    /// Returns whether this call did the purge.
    pub fn disconnect(&self, conn: &Arc<Connection>) -> bool {
        let _ = conn.close();
        if !self.services.connections.remove_exact(conn) {
            return false;
        }
        let listeners = self.services.listeners.remove_by_connection(&conn.id);
        let entries = if self.services.config.drop_cache_on_disconnect {
            self.services.caches.drop_store(conn.id.as_str())
        } else {
            0
        };
        debug!(conn_id = %conn.id, listeners, entries, "connection released");
        true
    }

    /// Disconnect by id. Unknown ids are ignored.
    pub fn disconnect_id(&self, conn_id: &ConnId) -> bool {
        match self.services.connections.get(conn_id) {
            Some(conn) => self.disconnect(&conn),
            None => false,
        }
    }

    /// Send a component to one connection through its handler.
    pub async fn push(&self, conn_id: &ConnId, fc: FnComponent) -> Result<(), DispatchError> {
        let conn = self
            .services
            .connections
            .get(conn_id)
            .ok_or_else(|| DispatchError::not_found("connection", conn_id.as_str()))?;
        let handler = self
            .handlers
            .get(conn.handler_id())
            .ok_or_else(|| DispatchError::not_found("handler", conn.handler_id().as_str()))?;
        handler.push_to(conn_id, fc).await
    }

    /// Send a fresh component to every connection of a handler.
    /// Returns how many were enqueued.
    pub async fn broadcast(&self, handler_id: &HandlerId, make: impl Fn() -> FnComponent) -> usize {
        let Some(handler) = self.handlers.get(handler_id) else {
            return 0;
        };
        let mut sent = 0;
        for conn in self.services.connections.for_handler(handler_id) {
            if handler.push_to(&conn.id, make()).await.is_ok() {
                sent += 1;
            }
        }
        sent
    }

    /// Run one connection over an arbitrary frame transport until either
    /// side closes it.
    pub async fn serve<S, R, E>(&self, conn_id: ConnId, handler: Arc<SessionHandler>, path: String, sink: S, stream: R)
    where
        S: Sink<Frame> + Unpin + Send + 'static,
        R: Stream<Item = Result<Frame, E>> + Unpin,
        E: std::fmt::Display,
    {
        let (conn, rx) = self.connect(conn_id, &handler);
        run_connection(self, &handler, conn, rx, &path, sink, stream).await;
    }

    /// Stop every handler and close every connection.
    pub fn shutdown(&self) {
        for handler in self.handlers.all() {
            handler.stop();
        }
        for conn in self.services.connections.all() {
            let _ = self.disconnect(&conn);
        }
        info!("engine shut down");
    }
}
