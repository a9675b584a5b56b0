//! Connection lifecycle: one client from upgrade through disconnect.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::{Sink, SinkExt, Stream, StreamExt};
use metrics::{counter, gauge, histogram};
use tokio::sync::mpsc;
use tokio::time;
use tracing::{debug, info, instrument, warn};

use super::connection::Connection;
use super::frame::Frame;
use super::heartbeat::{HeartbeatResult, run_heartbeat};
use crate::engine::Engine;
use crate::handler::SessionHandler;
use crate::metrics::{
    WS_CONNECTION_DURATION_SECONDS, WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL, WS_DISCONNECTIONS_TOTAL,
    WS_HEARTBEAT_TIMEOUTS_TOTAL,
};

/// How long the write loop gets to flush and send Close after the
/// connection is released.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Drive one registered connection until either side closes it.
///
/// 1. Spawns the write loop (queued frames plus periodic Ping)
/// 2. Spawns the heartbeat, which closes the connection on silence
/// 3. Bootstraps the requested route
/// 4. Feeds inbound text frames to the handler
/// 5. Releases the connection through the engine
#[instrument(skip_all, fields(conn_id = %conn.id, handler_id = %handler.id()))]
pub async fn run_connection<S, R, E>(
    engine: &Engine,
    handler: &Arc<SessionHandler>,
    conn: Arc<Connection>,
    rx: mpsc::Receiver<Arc<String>>,
    path: &str,
    sink: S,
    mut stream: R,
) where
    S: Sink<Frame> + Unpin + Send + 'static,
    R: Stream<Item = Result<Frame, E>> + Unpin,
    E: std::fmt::Display,
{
    let started = Instant::now();
    info!(path, "client connected");
    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);

    let config = engine.config();
    let mut writer = tokio::spawn(write_loop(Arc::clone(&conn), rx, sink, config.heartbeat_interval));

    let heartbeat_conn = Arc::clone(&conn);
    let (interval, timeout) = (config.heartbeat_interval, config.heartbeat_timeout);
    let heartbeat = tokio::spawn(async move {
        let cancel = heartbeat_conn.close_token();
        if run_heartbeat(Arc::clone(&heartbeat_conn), interval, timeout, cancel).await == HeartbeatResult::TimedOut {
            warn!(conn_id = %heartbeat_conn.id, "client unresponsive for {timeout:?}, disconnecting");
            counter!(WS_HEARTBEAT_TIMEOUTS_TOTAL).increment(1);
            let _ = heartbeat_conn.close();
        }
    });

    handler.bootstrap(&conn.id, path).await;

    loop {
        let frame = tokio::select! {
            () = conn.closed() => break,
            next = stream.next() => match next {
                Some(Ok(frame)) => frame,
                Some(Err(err)) => {
                    debug!(error = %err, "transport read failed");
                    break;
                }
                None => break,
            },
        };
        conn.mark_alive();

        match frame {
            Frame::Close => {
                info!("client sent close frame");
                break;
            }
            Frame::Ping(_) | Frame::Pong(_) => {}
            frame @ (Frame::Text(_) | Frame::Binary(_)) => {
                let Some(text) = frame.into_text() else {
                    info!("received non-UTF8 binary frame");
                    continue;
                };
                if let Err(err) = handler.receive(&conn.id, &text).await {
                    warn!(error = %err, "handler rejected frame, disconnecting");
                    break;
                }
            }
        }
    }

    let _ = engine.disconnect(&conn);
    if time::timeout(CLOSE_GRACE, &mut writer).await.is_err() {
        writer.abort();
    }
    heartbeat.abort();

    info!(dropped = conn.drop_count(), "client disconnected");
    counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
    histogram!(WS_CONNECTION_DURATION_SECONDS).record(started.elapsed().as_secs_f64());
}

/// Forward queued frames to the transport and send a Ping every
/// `ping_every`. Frames already queued when the connection closes are
/// flushed before the Close frame.
async fn write_loop<S>(conn: Arc<Connection>, mut rx: mpsc::Receiver<Arc<String>>, mut sink: S, ping_every: Duration)
where
    S: Sink<Frame> + Unpin,
{
    let mut ping = time::interval(ping_every);
    // skip the immediate first tick
    let _ = ping.tick().await;

    loop {
        tokio::select! {
            next = rx.recv() => match next {
                Some(text) => {
                    if sink.send(Frame::Text(Arc::unwrap_or_clone(text))).await.is_err() {
                        let _ = conn.close();
                        return;
                    }
                }
                None => break,
            },
            _ = ping.tick() => {
                if sink.send(Frame::Ping(Vec::new())).await.is_err() {
                    let _ = conn.close();
                    return;
                }
            }
            () = conn.closed() => break,
        }
    }

    while let Ok(text) = rx.try_recv() {
        if sink.send(Frame::Text(Arc::unwrap_or_clone(text))).await.is_err() {
            return;
        }
    }
    let _ = sink.send(Frame::Close).await;
    let _ = sink.close().await;
    let _ = conn.close();
}
