//! Session handlers.
//!
//! A [`SessionHandler`] owns two bounded queues and runs one loop on each:
//!
//! - the inbound loop takes client dispatches, resolves `event`s to their
//!   registered listener, runs the callback and enqueues its result;
//! - the outbound loop renders components and publishes dispatches to the
//!   connection they are stamped with.
//!
//! Neither loop is ever taken down by a bad message: lookup misses,
//! protocol violations, failing or slow callbacks all turn into an `error`
//! dispatch addressed to the originating connection.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Instant;

use fncmp_core::errors::Direction;
use fncmp_core::{ComponentId, ConnId, Dispatch, DispatchError, EventListener, FnEvent, FnRender, Function, HandlerId, Session};
use futures::FutureExt;
use metrics::{counter, gauge, histogram};
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, trace, warn};

use crate::callback::{Callback, CallbackResult, Context};
use crate::component::{FnComponent, PendingListener, sanitize_html, wrap_markup};
use crate::engine::Services;
use crate::metrics::{
    CALLBACK_DURATION_SECONDS, DISPATCH_DROPPED_TOTAL, DISPATCH_ERRORS_TOTAL, DISPATCH_INBOUND_TOTAL,
    DISPATCH_PUBLISHED_TOTAL, HANDLERS_ACTIVE,
};
use crate::registry::RegisteredListener;

/// Lifecycle of a [`SessionHandler`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum HandlerState {
    /// Created, loops not started.
    Idle = 0,
    /// Both loops running.
    Active = 1,
    /// One loop has exited.
    Closing = 2,
    /// Both loops have exited.
    Stopped = 3,
}

impl HandlerState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Idle,
            1 => Self::Active,
            2 => Self::Closing,
            _ => Self::Stopped,
        }
    }
}

struct Queues {
    inbound: mpsc::Receiver<Dispatch>,
    outbound: mpsc::Receiver<FnComponent>,
}

/// Routing unit for one or more connections.
pub struct SessionHandler {
    id: HandlerId,
    services: Arc<Services>,
    inbound_tx: mpsc::Sender<Dispatch>,
    outbound_tx: mpsc::Sender<FnComponent>,
    queues: Mutex<Option<Queues>>,
    routes: RwLock<HashMap<String, Arc<dyn Callback>>>,
    state: AtomicU8,
    running: AtomicU8,
    stop: CancellationToken,
}

impl std::fmt::Debug for SessionHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandler")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("routes", &self.routes())
            .finish_non_exhaustive()
    }
}

fn normalize_path(path: &str) -> String {
    if path.is_empty() { "/".to_owned() } else { path.to_owned() }
}

impl SessionHandler {
    pub(crate) fn new(services: Arc<Services>) -> Self {
        let capacity = services.config.handler_queue_capacity.max(1);
        let (inbound_tx, inbound) = mpsc::channel(capacity);
        let (outbound_tx, outbound) = mpsc::channel(capacity);
        Self {
            id: HandlerId::new(),
            services,
            inbound_tx,
            outbound_tx,
            queues: Mutex::new(Some(Queues { inbound, outbound })),
            routes: RwLock::new(HashMap::new()),
            state: AtomicU8::new(HandlerState::Idle as u8),
            running: AtomicU8::new(0),
            stop: CancellationToken::new(),
        }
    }

    /// Handler id.
    pub fn id(&self) -> &HandlerId {
        &self.id
    }

    /// Current lifecycle state.
    pub fn state(&self) -> HandlerState {
        HandlerState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Serve `path` with `callback` when a connection bootstraps.
    ///
    /// Registering the same path again replaces the callback.
    pub fn route(&self, path: impl Into<String>, callback: impl Callback) {
        let path = normalize_path(&path.into());
        let _ = self.routes.write().insert(path, Arc::new(callback));
    }

    /// Registered route paths.
    pub fn routes(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.routes.read().keys().cloned().collect();
        paths.sort();
        paths
    }

    /// Start both loops. Only the first call on an idle handler does
    /// anything; returns whether the loops were started.
    pub fn activate(self: &Arc<Self>) -> bool {
        if self
            .state
            .compare_exchange(
                HandlerState::Idle as u8,
                HandlerState::Active as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            return false;
        }
        let Some(Queues { inbound, outbound }) = self.queues.lock().take() else {
            return false;
        };

        self.running.store(2, Ordering::Release);
        gauge!(HANDLERS_ACTIVE).increment(1.0);
        debug!(handler_id = %self.id, "session handler activated");

        let handler = Arc::clone(self);
        let _inbound = tokio::spawn(async move {
            handler.inbound_loop(inbound).await;
            handler.loop_exited();
        });
        let handler = Arc::clone(self);
        let _outbound = tokio::spawn(async move {
            handler.outbound_loop(outbound).await;
            handler.loop_exited();
        });
        true
    }

    fn loop_exited(&self) {
        if self.running.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.state.store(HandlerState::Stopped as u8, Ordering::Release);
            gauge!(HANDLERS_ACTIVE).decrement(1.0);
            debug!(handler_id = %self.id, "session handler stopped");
        } else {
            let _ = self.state.compare_exchange(
                HandlerState::Active as u8,
                HandlerState::Closing as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            );
        }
    }

    /// Ask both loops to exit. Items still queued are discarded.
    pub fn stop(&self) {
        self.stop.cancel();
        let _ = self.state.compare_exchange(
            HandlerState::Idle as u8,
            HandlerState::Stopped as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    /// Enqueue a client dispatch on the inbound queue.
    pub async fn dispatch(&self, dispatch: Dispatch) -> Result<(), DispatchError> {
        self.inbound_tx
            .send(dispatch)
            .await
            .map_err(|_| DispatchError::not_found("handler", self.id.as_str()))
    }

    /// Parse a raw frame from `conn_id` and enqueue it.
    ///
    /// The dispatch is re-stamped with the receiving connection and this
    /// handler, whatever the client wrote. A frame that does not parse is
    /// answered with an `error` dispatch; only a stopped handler is an error.
    pub async fn receive(&self, conn_id: &ConnId, text: &str) -> Result<(), DispatchError> {
        match Dispatch::from_json(text) {
            Ok(dispatch) => self.dispatch(dispatch.stamped(conn_id, &self.id)).await,
            Err(err) => {
                self.report(conn_id, err).await;
                Ok(())
            }
        }
    }

    /// Enqueue a component on the outbound queue as is.
    pub async fn push(&self, fc: FnComponent) -> Result<(), DispatchError> {
        self.outbound_tx
            .send(fc)
            .await
            .map_err(|_| DispatchError::not_found("handler", self.id.as_str()))
    }

    /// Enqueue a component for `conn_id`.
    pub async fn push_to(&self, conn_id: &ConnId, fc: FnComponent) -> Result<(), DispatchError> {
        self.push(fc.stamped(conn_id, &self.id)).await
    }

    /// Run the route callback for `path` and enqueue its result for
    /// `conn_id`. A handler without routes skips the bootstrap.
    pub async fn bootstrap(&self, conn_id: &ConnId, path: &str) {
        let path = normalize_path(path);
        let callback = {
            let routes = self.routes.read();
            if routes.is_empty() {
                return;
            }
            routes.get(&path).cloned()
        };
        let Some(callback) = callback else {
            self.report(conn_id, DispatchError::not_found("route", path)).await;
            return;
        };
        debug!(conn_id = %conn_id, handler_id = %self.id, path, "bootstrapping route");
        let ctx = self.context(conn_id, None, path.clone());
        match self.invoke(callback, ctx, &path).await {
            Ok(fc) => self.enqueue(fc.stamped(conn_id, &self.id)).await,
            Err(err) => self.report(conn_id, err).await,
        }
    }

    fn context(&self, conn_id: &ConnId, event: Option<FnEvent>, path: String) -> Context {
        Context::new(
            conn_id.clone(),
            self.id.clone(),
            event,
            path,
            self.services.caches.clone(),
            self.outbound_tx.clone(),
        )
    }

    /// Run a callback within the configured budget, containing panics.
    async fn invoke(&self, callback: Arc<dyn Callback>, ctx: Context, label: &str) -> CallbackResult {
        let budget = self.services.config.callback_timeout;
        let started = Instant::now();
        let call = AssertUnwindSafe(callback.call(ctx)).catch_unwind();
        let outcome = tokio::time::timeout(budget, call).await;
        histogram!(CALLBACK_DURATION_SECONDS).record(started.elapsed().as_secs_f64());
        match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(DispatchError::CallbackPanicked {
                listener_id: label.to_owned(),
            }),
            Err(_) => Err(DispatchError::CallbackTimeout {
                listener_id: label.to_owned(),
                timeout_ms: budget.as_millis() as u64,
            }),
        }
    }

    async fn enqueue(&self, fc: FnComponent) {
        if self.outbound_tx.send(fc).await.is_err() {
            warn!(handler_id = %self.id, "outbound queue closed, dropping component");
            dropped("handler_stopped");
        }
    }

    /// Turn a failure into an `error` dispatch back to `conn_id`.
    async fn report(&self, conn_id: &ConnId, err: DispatchError) {
        debug!(conn_id = %conn_id, handler_id = %self.id, code = err.code(), error = %err, "dispatch failed");
        counter!(DISPATCH_ERRORS_TOTAL, "code" => err.code()).increment(1);
        self.enqueue(FnComponent::from_error(&err).stamped(conn_id, &self.id)).await;
    }

    // ── inbound ─────────────────────────────────────────────────────

    #[instrument(skip_all, fields(handler_id = %self.id))]
    async fn inbound_loop(&self, mut rx: mpsc::Receiver<Dispatch>) {
        debug!("inbound loop started");
        loop {
            let dispatch = tokio::select! {
                biased;
                () = self.stop.cancelled() => break,
                next = rx.recv() => match next {
                    Some(dispatch) => dispatch,
                    None => break,
                },
            };
            self.handle_inbound(dispatch).await;
        }
        debug!("inbound loop exited");
    }

    async fn handle_inbound(&self, dispatch: Dispatch) {
        counter!(DISPATCH_INBOUND_TOTAL, "function" => dispatch.function.to_string()).increment(1);
        let function = dispatch.function.clone();
        match function {
            Function::Event => self.handle_event(dispatch).await,
            Function::Error => {
                warn!(
                    conn_id = %dispatch.conn_id,
                    message = dispatch.error_message().unwrap_or_default(),
                    "client reported error"
                );
            }
            other => {
                let err = DispatchError::ProtocolViolation {
                    function: other.to_string(),
                    direction: Direction::Inbound,
                };
                self.report(&dispatch.conn_id, err).await;
            }
        }
    }

    async fn handle_event(&self, dispatch: Dispatch) {
        let conn_id = dispatch.conn_id;
        let event = dispatch.event.unwrap_or_default();
        let Some(registered) = self.services.listeners.get_scoped(&event.id, &conn_id) else {
            self.report(&conn_id, DispatchError::not_found("event listener", event.id.as_str()))
                .await;
            return;
        };

        let label = event.id.to_string();
        trace!(conn_id = %conn_id, listener_id = %label, target = %registered.target, "invoking listener");
        let ctx = self.context(&conn_id, Some(event), String::new());
        match self.invoke(Arc::clone(&registered.callback), ctx, &label).await {
            Ok(fc) => self.enqueue(fc.stamped(&conn_id, &self.id)).await,
            Err(err) => self.report(&conn_id, err).await,
        }
    }

    // ── outbound ────────────────────────────────────────────────────

    #[instrument(skip_all, fields(handler_id = %self.id))]
    async fn outbound_loop(&self, mut rx: mpsc::Receiver<FnComponent>) {
        debug!("outbound loop started");
        loop {
            let fc = tokio::select! {
                biased;
                () = self.stop.cancelled() => break,
                next = rx.recv() => match next {
                    Some(fc) => fc,
                    None => break,
                },
            };
            self.handle_outbound(fc).await;
        }
        debug!("outbound loop exited");
    }

    async fn handle_outbound(&self, fc: FnComponent) {
        let FnComponent {
            id,
            dispatch,
            component,
            listeners,
        } = fc;

        let function = dispatch.function.clone();
        match function {
            Function::Render => {
                let session = Session::bound(dispatch.conn_id.clone(), dispatch.handler_id.clone());
                let mut buf = Vec::new();
                if let Some(component) = &component {
                    if let Err(err) = component.render(&session, &mut buf) {
                        self.fail_outbound(dispatch, err.into()).await;
                        return;
                    }
                }
                self.publish_render(id, dispatch, &buf, listeners).await;
            }
            Function::Redirect => {
                if dispatch.redirect.as_ref().is_none_or(|r| r.url.is_empty()) {
                    dropped("empty_redirect");
                    return;
                }
                self.publish(dispatch, &id, Vec::new()).await;
            }
            Function::Custom => {
                if dispatch.custom.as_ref().is_none_or(|c| c.function.is_empty()) {
                    dropped("empty_custom");
                    return;
                }
                self.publish(dispatch, &id, Vec::new()).await;
            }
            Function::Class => {
                if dispatch.class.as_ref().is_none_or(|c| c.target_id.is_empty() || c.names.is_empty()) {
                    dropped("empty_class");
                    return;
                }
                self.publish(dispatch, &id, Vec::new()).await;
            }
            Function::Ping => self.publish(dispatch, &id, Vec::new()).await,
            Function::Error => self.handle_error(dispatch, &id).await,
            Function::Event | Function::Unknown(_) => {
                let err = DispatchError::ProtocolViolation {
                    function: function.to_string(),
                    direction: Direction::Outbound,
                };
                self.fail_outbound(dispatch, err).await;
            }
        }
    }

    async fn publish_render(&self, id: ComponentId, mut dispatch: Dispatch, rendered: &[u8], listeners: Vec<PendingListener>) {
        let preset = dispatch
            .render
            .as_mut()
            .map(|r| std::mem::take(&mut r.html))
            .unwrap_or_default();
        if rendered.is_empty() && preset.is_empty() {
            dropped("empty_render");
            return;
        }

        // Preset markup comes first, rendered markup follows it.
        let mut markup = preset;
        markup.push_str(&String::from_utf8_lossy(rendered));
        let descriptors: Vec<EventListener> = listeners.iter().map(|p| p.listener.clone()).collect();
        let html = match wrap_markup(&id, &descriptors, &markup) {
            Ok(html) => sanitize_html(&html),
            Err(err) => {
                self.fail_outbound(dispatch, err).await;
                return;
            }
        };

        let render = dispatch.render.get_or_insert_with(FnRender::default);
        render.html = html;
        render.event_listeners = descriptors;
        self.publish(dispatch, &id, listeners).await;
    }

    /// Errors are logged and, when configured, published once. A failure
    /// to publish an error never produces another error.
    async fn handle_error(&self, dispatch: Dispatch, id: &ComponentId) {
        warn!(
            conn_id = %dispatch.conn_id,
            handler_id = %self.id,
            code = dispatch.error.as_ref().map_or("", |e| e.code.as_str()),
            message = dispatch.error_message().unwrap_or_default(),
            "error dispatch"
        );
        if self.services.config.publish_errors && !dispatch.conn_id.is_empty() {
            self.publish(dispatch, id, Vec::new()).await;
        }
    }

    async fn fail_outbound(&self, failed: Dispatch, err: DispatchError) {
        counter!(DISPATCH_ERRORS_TOTAL, "code" => err.code()).increment(1);
        let fc = FnComponent::from_error(&err).stamped(&failed.conn_id, &failed.handler_id);
        let id = fc.id.clone();
        self.handle_error(fc.dispatch, &id).await;
    }

    /// Write `dispatch` to its connection, registering `listeners` first so
    /// the client can never trigger one that is not yet known.
    async fn publish(&self, dispatch: Dispatch, target: &ComponentId, listeners: Vec<PendingListener>) {
        let conn_id = dispatch.conn_id.clone();
        let Some(conn) = self.services.connections.get(&conn_id) else {
            warn!(
                conn_id = %conn_id,
                handler_id = %self.id,
                function = %dispatch.function,
                "connection not found, dropping dispatch"
            );
            dropped("no_connection");
            return;
        };

        let json = match dispatch.to_json() {
            Ok(json) => json,
            Err(err) => {
                warn!(conn_id = %conn_id, error = %err, "failed to encode dispatch");
                dropped("encode");
                return;
            }
        };

        let registered: Vec<_> = listeners
            .into_iter()
            .map(|p| {
                self.services.listeners.add(RegisteredListener {
                    listener: p.listener,
                    target: target.clone(),
                    scope: Some(conn_id.clone()),
                    callback: p.callback,
                })
            })
            .collect();

        match conn.send(Arc::new(json)).await {
            Ok(()) => {
                counter!(DISPATCH_PUBLISHED_TOTAL, "function" => dispatch.function.to_string()).increment(1);
                trace!(conn_id = %conn_id, function = %dispatch.function, "dispatch published");
            }
            Err(err) => {
                warn!(conn_id = %conn_id, error = %err, "publish failed, dropping dispatch");
                for id in &registered {
                    let _ = self.services.listeners.remove(id);
                }
                dropped("transport");
            }
        }
    }
}

fn dropped(reason: &'static str) {
    counter!(DISPATCH_DROPPED_TOTAL, "reason" => reason).increment(1);
}
