//! Listener and route callbacks, and the context they receive.

use std::any::Any;
use std::future::Future;

use async_trait::async_trait;
use fncmp_cache::{Cache, CacheError, StoreManager};
use fncmp_core::{ConnId, DispatchError, FnEvent, HandlerId, Session};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::component::FnComponent;

/// What a callback returns. Errors become `error` dispatches addressed to
/// the originating connection.
pub type CallbackResult = Result<FnComponent, DispatchError>;

/// A server-side reaction to a route bootstrap or a client event.
///
/// Implemented for every `Fn(Context) -> impl Future<Output = CallbackResult>`,
/// so plain `async fn`s and closures can be registered directly.
#[async_trait]
pub trait Callback: Send + Sync + 'static {
    /// Produce the component to push back to the client.
    async fn call(&self, ctx: Context) -> CallbackResult;
}

#[async_trait]
impl<F, Fut> Callback for F
where
    F: Fn(Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = CallbackResult> + Send + 'static,
{
    async fn call(&self, ctx: Context) -> CallbackResult {
        self(ctx).await
    }
}

/// Everything a callback may use: the session, the triggering event, the
/// cache, and the handler's outbound queue.
#[derive(Clone)]
pub struct Context {
    session: Session,
    handler_id: HandlerId,
    event: Option<FnEvent>,
    path: String,
    caches: StoreManager,
    outbound: mpsc::Sender<FnComponent>,
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("session", &self.session)
            .field("event", &self.event)
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl Context {
    pub(crate) fn new(
        conn_id: ConnId,
        handler_id: HandlerId,
        event: Option<FnEvent>,
        path: String,
        caches: StoreManager,
        outbound: mpsc::Sender<FnComponent>,
    ) -> Self {
        Self {
            session: Session::bound(conn_id, handler_id.clone()),
            handler_id,
            event,
            path,
            caches,
            outbound,
        }
    }

    /// Session the callback runs for.
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Originating connection.
    pub fn conn_id(&self) -> &ConnId {
        self.session.conn_id()
    }

    /// Handler serving the connection.
    pub fn handler_id(&self) -> &HandlerId {
        &self.handler_id
    }

    /// Triggering event, `None` for a route bootstrap.
    pub fn event(&self) -> Option<&FnEvent> {
        self.event.as_ref()
    }

    /// Route path for a bootstrap, empty for events.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Raw event data (`null` without an event).
    pub fn raw_data(&self) -> &Value {
        self.event.as_ref().map_or(&Value::Null, |e| &e.data)
    }

    /// Decode the event data.
    pub fn data<T: DeserializeOwned>(&self) -> Result<T, DispatchError> {
        Ok(T::deserialize(self.raw_data())?)
    }

    /// Session-scoped cache handle, created with `T::default()` if absent.
    pub fn cache<T>(&self, key: &str) -> Result<Cache<T>, CacheError>
    where
        T: Any + Send + Sync + Clone + Default,
    {
        self.caches.use_cache(&self.session, key)
    }

    /// The shared store manager, for other namespaces.
    pub fn caches(&self) -> &StoreManager {
        &self.caches
    }

    /// Enqueue an extra component for this session right away, ahead of
    /// the callback's own result.
    pub async fn push(&self, fc: FnComponent) -> Result<(), DispatchError> {
        let fc = fc.stamped(self.session.conn_id(), &self.handler_id);
        self.outbound
            .send(fc)
            .await
            .map_err(|_| DispatchError::not_found("handler", self.handler_id.as_str()))
    }
}
