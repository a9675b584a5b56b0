//! One live client connection.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use fncmp_core::{ConnId, Dispatch, DispatchError, HandlerId};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// A connected client.
///
/// Holds the sending half of the connection's outbound frame queue; the
/// write loop owns the receiving half. Closing is one-way and shared by
/// every task serving the connection.
pub struct Connection {
    /// Connection id chosen by the client.
    pub id: ConnId,
    handler_id: HandlerId,
    tx: mpsc::Sender<Arc<String>>,
    /// When this connection was established.
    pub connected_at: Instant,
    /// Whether the client has shown activity since the last heartbeat check.
    pub is_alive: AtomicBool,
    last_pong: Mutex<Instant>,
    /// Frames refused because the connection was closed.
    pub dropped_messages: AtomicU64,
    closed: AtomicBool,
    cancel: CancellationToken,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("handler_id", &self.handler_id)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl Connection {
    /// Create a connection bound to `handler_id`.
    pub fn new(id: ConnId, handler_id: HandlerId, tx: mpsc::Sender<Arc<String>>) -> Self {
        let now = Instant::now();
        Self {
            id,
            handler_id,
            tx,
            connected_at: now,
            is_alive: AtomicBool::new(true),
            last_pong: Mutex::new(now),
            dropped_messages: AtomicU64::new(0),
            closed: AtomicBool::new(false),
            cancel: CancellationToken::new(),
        }
    }

    /// Create a connection together with its outbound queue receiver.
    pub fn channel(id: ConnId, handler_id: HandlerId, capacity: usize) -> (Arc<Self>, mpsc::Receiver<Arc<String>>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Arc::new(Self::new(id, handler_id, tx)), rx)
    }

    /// Handler serving this connection.
    pub fn handler_id(&self) -> &HandlerId {
        &self.handler_id
    }

    /// Enqueue a frame, waiting while the queue is full.
    ///
    /// Fails once the connection is closed or its write loop is gone.
    pub async fn send(&self, frame: Arc<String>) -> Result<(), DispatchError> {
        if self.is_closed() {
            return Err(self.refuse("connection closed"));
        }
        tokio::select! {
            sent = self.tx.send(frame) => sent.map_err(|_| self.refuse("write loop stopped")),
            () = self.cancel.cancelled() => Err(self.refuse("connection closed")),
        }
    }

    /// Serialize and enqueue a dispatch.
    pub async fn send_dispatch(&self, dispatch: &Dispatch) -> Result<(), DispatchError> {
        let json = dispatch.to_json()?;
        self.send(Arc::new(json)).await
    }

    fn refuse(&self, reason: &str) -> DispatchError {
        let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
        DispatchError::TransportFailure {
            conn_id: self.id.to_string(),
            reason: reason.to_owned(),
        }
    }

    /// Mark the connection closed. Returns `true` only for the first call.
    pub fn close(&self) -> bool {
        let first = !self.closed.swap(true, Ordering::AcqRel);
        self.cancel.cancel();
        first
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Resolves once the connection is closed.
    pub async fn closed(&self) {
        self.cancel.cancelled().await;
    }

    /// Token cancelled when the connection closes.
    pub fn close_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Total frames refused.
    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }

    /// Record client activity (pong or any frame).
    pub fn mark_alive(&self) {
        self.is_alive.store(true, Ordering::Relaxed);
        *self.last_pong.lock() = Instant::now();
    }

    /// Time since the last recorded activity.
    pub fn last_pong_elapsed(&self) -> Duration {
        self.last_pong.lock().elapsed()
    }

    /// Read and reset the alive flag.
    pub fn check_alive(&self) -> bool {
        self.is_alive.swap(false, Ordering::Relaxed)
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn make_connection(capacity: usize) -> (Arc<Connection>, mpsc::Receiver<Arc<String>>) {
        Connection::channel(ConnId::from("conn-1"), HandlerId::from("h-1"), capacity)
    }

    #[tokio::test]
    async fn send_preserves_order() {
        let (conn, mut rx) = make_connection(8);
        for i in 0..5 {
            conn.send(Arc::new(format!("msg_{i}"))).await.unwrap();
        }
        for i in 0..5 {
            assert_eq!(&*rx.recv().await.unwrap(), &format!("msg_{i}"));
        }
    }

    #[tokio::test]
    async fn send_waits_while_full() {
        let (conn, mut rx) = make_connection(1);
        conn.send(Arc::new("first".into())).await.unwrap();

        let sender = Arc::clone(&conn);
        let pending = tokio::spawn(async move { sender.send(Arc::new("second".into())).await });
        tokio::task::yield_now().await;
        assert!(!pending.is_finished());

        assert_eq!(&*rx.recv().await.unwrap(), "first");
        pending.await.unwrap().unwrap();
        assert_eq!(&*rx.recv().await.unwrap(), "second");
    }

    #[tokio::test]
    async fn close_releases_blocked_sender() {
        let (conn, _rx) = make_connection(1);
        conn.send(Arc::new("fill".into())).await.unwrap();

        let sender = Arc::clone(&conn);
        let pending = tokio::spawn(async move { sender.send(Arc::new("blocked".into())).await });
        tokio::task::yield_now().await;
        assert!(conn.close());

        let result = pending.await.unwrap();
        assert_matches!(result, Err(DispatchError::TransportFailure { .. }));
        assert_eq!(conn.drop_count(), 1);
    }

    #[tokio::test]
    async fn send_after_close_fails() {
        let (conn, _rx) = make_connection(4);
        assert!(conn.close());
        assert!(!conn.close());
        let err = conn.send(Arc::new("late".into())).await.unwrap_err();
        assert_eq!(err.code(), fncmp_core::errors::TRANSPORT_FAILURE);
    }

    #[tokio::test]
    async fn send_to_dropped_receiver_fails() {
        let (conn, rx) = make_connection(4);
        drop(rx);
        assert!(conn.send(Arc::new("x".into())).await.is_err());
    }

    #[tokio::test]
    async fn send_dispatch_serializes() {
        let (conn, mut rx) = make_connection(4);
        conn.send_dispatch(&Dispatch::redirect("/next")).await.unwrap();
        let msg = rx.recv().await.unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&msg).unwrap();
        assert_eq!(parsed["function"], "redirect");
        assert_eq!(parsed["redirect"]["url"], "/next");
    }

    #[test]
    fn mark_alive_and_check() {
        let (conn, _rx) = make_connection(1);
        assert!(conn.check_alive());
        assert!(!conn.check_alive());
        conn.mark_alive();
        assert!(conn.check_alive());
    }

    #[test]
    fn bound_to_handler() {
        let (conn, _rx) = make_connection(1);
        assert_eq!(conn.id.as_str(), "conn-1");
        assert_eq!(conn.handler_id().as_str(), "h-1");
        assert!(!conn.is_closed());
    }
}
