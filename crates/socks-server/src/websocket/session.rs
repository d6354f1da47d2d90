//! WebSocket session lifecycle: handles a single subscriber from upgrade
//! through disconnect.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge, histogram};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use super::connection::{ClientConnection, Delivery, Frame};
use super::interest::{InterestError, SubscribeAck, parse_interest};
use crate::errors::RegistryError;
use crate::ids::ConnectionId;
use crate::metrics::{
    WS_CONNECTION_DURATION_SECONDS, WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL,
    WS_DISCONNECTIONS_TOTAL,
};
use crate::registry::ConnectionRegistry;

/// Where a session is in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// Transport open, no interest declared, not in the registry.
    Connected,
    /// Registered with a non-empty channel set.
    Subscribed,
    /// Transport gone; removed from the registry.
    Closed,
}

/// Per-connection state machine driving registry membership.
pub struct SubscriberSession {
    connection: Arc<ClientConnection>,
    registry: Arc<ConnectionRegistry>,
    state: SessionState,
}

impl SubscriberSession {
    /// Start a session for a freshly accepted connection.
    pub fn new(connection: Arc<ClientConnection>, registry: Arc<ConnectionRegistry>) -> Self {
        Self {
            connection,
            registry,
            state: SessionState::Connected,
        }
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The underlying connection.
    pub fn connection(&self) -> &Arc<ClientConnection> {
        &self.connection
    }

    /// Process one inbound frame and return the ack to send back.
    ///
    /// Returns `None` once closed, or when the registry reports a broken
    /// invariant (logged; the session keeps running).
    pub fn handle_text(&mut self, text: &str) -> Option<SubscribeAck> {
        let channels = match parse_interest(text) {
            Ok(channels) => channels,
            Err(e) => {
                debug!(conn_id = %self.connection.id, error = %e, "rejected interest");
                return (self.state != SessionState::Closed).then(|| SubscribeAck::rejected(&e));
            }
        };

        let result = match self.state {
            SessionState::Closed => return None,
            SessionState::Connected => self
                .registry
                .register(Arc::clone(&self.connection), channels.clone()),
            SessionState::Subscribed => self
                .registry
                .update_interest(&self.connection.id, channels.clone()),
        };

        match result {
            Ok(()) => {
                self.state = SessionState::Subscribed;
                debug!(conn_id = %self.connection.id, channels = ?channels.to_sorted_vec(), "subscribed");
                Some(SubscribeAck::accepted(&channels))
            }
            Err(RegistryError::InvalidInterest) => {
                Some(SubscribeAck::rejected(&InterestError::NoChannels))
            }
            Err(e) => {
                error!(conn_id = %self.connection.id, error = %e, "registry rejected interest");
                None
            }
        }
    }

    /// Leave the registry and stop accepting frames. Idempotent.
    pub fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        let _ = self.registry.remove(&self.connection.id);
        self.connection.mark_closed();
        self.state = SessionState::Closed;
    }
}

impl Drop for SubscriberSession {
    fn drop(&mut self) {
        self.close();
    }
}

/// Shared resources every session needs.
#[derive(Clone)]
pub struct SessionContext {
    /// Process-wide connection registry.
    pub registry: Arc<ConnectionRegistry>,
    /// Close the session after this long without an inbound frame.
    pub idle_timeout: Option<Duration>,
    /// Capacity of each connection's outbound queue.
    pub send_queue: usize,
    /// Open WebSocket count, for `/health`.
    pub open_sessions: Arc<AtomicUsize>,
    /// Server shutdown signal.
    pub shutdown: CancellationToken,
}

/// Run a WebSocket session for a connected subscriber.
///
/// 1. Spawns a writer task draining the connection's queue into the socket
/// 2. Treats every inbound text (or UTF-8 binary) frame as an interest declaration
/// 3. Replies with an ack per frame
/// 4. On close, read error, idle timeout or shutdown: leaves the registry and stops the writer
#[instrument(skip_all, fields(conn_id = %id))]
pub async fn run_ws_session(ws: WebSocket, id: ConnectionId, ctx: SessionContext) {
    let (mut ws_tx, mut ws_rx) = ws.split();

    let (send_tx, mut send_rx) = mpsc::channel::<Frame>(ctx.send_queue.max(1));
    let connection = Arc::new(ClientConnection::new(id, send_tx));
    let mut session = SubscriberSession::new(Arc::clone(&connection), Arc::clone(&ctx.registry));

    info!("client connected");
    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);
    let _ = ctx.open_sessions.fetch_add(1, Ordering::Relaxed);

    let writer = tokio::spawn(async move {
        while let Some(frame) = send_rx.recv().await {
            if ws_tx.send(Message::Text(frame.to_string().into())).await.is_err() {
                break;
            }
        }
        let _ = ws_tx.close().await;
    });

    loop {
        let next = tokio::select! {
            () = ctx.shutdown.cancelled() => {
                debug!("server shutting down");
                break;
            }
            next = read_next(&mut ws_rx, ctx.idle_timeout) => next,
        };

        let msg = match next {
            Ok(Some(Ok(msg))) => msg,
            Ok(Some(Err(e))) => {
                debug!(error = %e, "read error");
                break;
            }
            Ok(None) => break,
            Err(_) => {
                info!("idle timeout, closing");
                break;
            }
        };

        let text = match msg {
            Message::Text(t) => t.as_str().to_owned(),
            Message::Binary(data) => {
                if let Ok(s) = std::str::from_utf8(&data) {
                    s.to_string()
                } else {
                    info!(len = data.len(), "received non-UTF8 binary frame");
                    continue;
                }
            }
            Message::Close(_) => {
                info!("client sent close frame");
                break;
            }
            Message::Ping(_) | Message::Pong(_) => continue,
        };

        let Some(ack) = session.handle_text(&text) else {
            continue;
        };
        // Never wait on a backed-up queue here.
        if connection.try_send_json(&ack) == Delivery::Dropped {
            warn!("ack dropped, send queue full or closed");
        }
    }

    session.close();
    writer.abort();

    info!(
        delivered = connection.delivered_count(),
        dropped = connection.drop_count(),
        "client disconnected"
    );
    counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
    histogram!(WS_CONNECTION_DURATION_SECONDS).record(connection.age().as_secs_f64());
    let _ = ctx.open_sessions.fetch_sub(1, Ordering::Relaxed);
}

type WsStream = futures::stream::SplitStream<WebSocket>;

/// Next inbound frame, or `Err` if the idle timeout elapsed first.
async fn read_next(
    rx: &mut WsStream,
    idle_timeout: Option<Duration>,
) -> Result<Option<Result<Message, axum::Error>>, tokio::time::error::Elapsed> {
    match idle_timeout {
        Some(limit) => tokio::time::timeout(limit, rx.next()).await,
        None => Ok(rx.next().await),
    }
}
