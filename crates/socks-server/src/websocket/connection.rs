//! Subscriber connection handle.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::mpsc;

use crate::ids::ConnectionId;

/// One outbound text frame, shared between every recipient of a publish.
pub type Frame = Arc<str>;

/// Result of a single delivery attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Delivery {
    /// Queued for the connection's writer task.
    Queued,
    /// The writer is gone (socket closed or reset); the frame was discarded.
    Dropped,
}

/// A live subscriber link.
///
/// Outbound frames go through a bounded queue drained by the session's
/// writer task, so a slow socket only backs up its own queue.
pub struct ClientConnection {
    /// Unique connection ID.
    pub id: ConnectionId,
    /// Send side of the writer queue.
    tx: mpsc::Sender<Frame>,
    /// When this connection was established.
    pub connected_at: Instant,
    /// Cleared once the session has closed.
    open: AtomicBool,
    /// Frames handed to the writer.
    delivered: AtomicU64,
    /// Frames discarded because the writer was gone.
    dropped: AtomicU64,
}

impl ClientConnection {
    /// Create a new connection around a writer queue.
    pub fn new(id: ConnectionId, tx: mpsc::Sender<Frame>) -> Self {
        Self {
            id,
            tx,
            connected_at: Instant::now(),
            open: AtomicBool::new(true),
            delivered: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Queue a frame, waiting for queue space if the client is behind.
    ///
    /// Never fails: a closed connection reports [`Delivery::Dropped`].
    pub async fn send(&self, frame: Frame) -> Delivery {
        if !self.is_open() {
            let _ = self.dropped.fetch_add(1, Ordering::Relaxed);
            return Delivery::Dropped;
        }
        if self.tx.send(frame).await.is_ok() {
            let _ = self.delivered.fetch_add(1, Ordering::Relaxed);
            Delivery::Queued
        } else {
            let _ = self.dropped.fetch_add(1, Ordering::Relaxed);
            Delivery::Dropped
        }
    }

    /// Queue a frame only if there is room right now.
    ///
    /// A full queue counts as [`Delivery::Dropped`].
    pub fn try_send(&self, frame: Frame) -> Delivery {
        if self.is_open() && self.tx.try_send(frame).is_ok() {
            let _ = self.delivered.fetch_add(1, Ordering::Relaxed);
            Delivery::Queued
        } else {
            let _ = self.dropped.fetch_add(1, Ordering::Relaxed);
            Delivery::Dropped
        }
    }

    /// Serialize a value and queue it without waiting.
    pub fn try_send_json<T: serde::Serialize>(&self, value: &T) -> Delivery {
        match serde_json::to_string(value) {
            Ok(json) => self.try_send(Frame::from(json)),
            Err(_) => Delivery::Dropped,
        }
    }

    /// Whether the session is still running.
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Relaxed) && !self.tx.is_closed()
    }

    /// Mark the connection closed. Later sends are dropped without queuing.
    pub fn mark_closed(&self) {
        self.open.store(false, Ordering::Relaxed);
    }

    /// Frames handed to the writer so far.
    pub fn delivered_count(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    /// Frames discarded so far.
    pub fn drop_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

impl std::fmt::Debug for ClientConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConnection")
            .field("id", &self.id)
            .field("open", &self.is_open())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_connection() -> (ClientConnection, mpsc::Receiver<Frame>) {
        let (tx, rx) = mpsc::channel(32);
        let conn = ClientConnection::new(ConnectionId::from_raw("conn_1"), tx);
        (conn, rx)
    }

    #[test]
    fn create_connection() {
        let (conn, _rx) = make_connection();
        assert_eq!(conn.id.as_str(), "conn_1");
        assert!(conn.is_open());
        assert_eq!(conn.drop_count(), 0);
    }

    #[tokio::test]
    async fn send_message_success() {
        let (conn, mut rx) = make_connection();
        assert_eq!(conn.send(Frame::from("hello")).await, Delivery::Queued);
        let msg = rx.recv().await.unwrap();
        assert_eq!(&*msg, "hello");
        assert_eq!(conn.delivered_count(), 1);
    }

    #[tokio::test]
    async fn send_to_closed_channel_is_dropped() {
        let (conn, rx) = make_connection();
        drop(rx);
        assert!(!conn.is_open());
        assert_eq!(conn.send(Frame::from("hello")).await, Delivery::Dropped);
        assert_eq!(conn.drop_count(), 1);
    }

    #[tokio::test]
    async fn send_after_mark_closed_is_dropped() {
        let (conn, mut rx) = make_connection();
        conn.mark_closed();
        assert_eq!(conn.send(Frame::from("late")).await, Delivery::Dropped);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn send_waits_for_queue_space() {
        let (tx, mut rx) = mpsc::channel(1);
        let conn = Arc::new(ClientConnection::new(ConnectionId::new(), tx));
        assert_eq!(conn.send(Frame::from("first")).await, Delivery::Queued);

        let sender = Arc::clone(&conn);
        let pending = tokio::spawn(async move { sender.send(Frame::from("second")).await });

        assert_eq!(&*rx.recv().await.unwrap(), "first");
        assert_eq!(pending.await.unwrap(), Delivery::Queued);
        assert_eq!(&*rx.recv().await.unwrap(), "second");
    }

    #[tokio::test]
    async fn try_send_on_full_queue_drops_immediately() {
        let (tx, mut rx) = mpsc::channel(1);
        let conn = ClientConnection::new(ConnectionId::new(), tx);
        assert_eq!(conn.try_send(Frame::from("first")), Delivery::Queued);
        assert_eq!(conn.try_send(Frame::from("second")), Delivery::Dropped);
        assert_eq!(conn.delivered_count(), 1);
        assert_eq!(conn.drop_count(), 1);

        assert_eq!(&*rx.recv().await.unwrap(), "first");
        assert!(rx.try_recv().is_err());
        assert_eq!(conn.try_send(Frame::from("third")), Delivery::Queued);
    }

    #[test]
    fn try_send_after_close_is_dropped() {
        let (conn, rx) = make_connection();
        drop(rx);
        assert_eq!(conn.try_send(Frame::from("late")), Delivery::Dropped);
        assert_eq!(conn.drop_count(), 1);
    }

    #[tokio::test]
    async fn try_send_json_serializes() {
        let (conn, mut rx) = make_connection();
        let value = serde_json::json!({"key": "value"});
        assert_eq!(conn.try_send_json(&value), Delivery::Queued);
        let msg = rx.recv().await.unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&msg).unwrap();
        assert_eq!(parsed["key"], "value");
    }

    #[tokio::test]
    async fn frames_arrive_in_order() {
        let (conn, mut rx) = make_connection();
        for i in 0..5 {
            assert_eq!(conn.send(Frame::from(format!("msg_{i}"))).await, Delivery::Queued);
        }
        for i in 0..5 {
            assert_eq!(&*rx.recv().await.unwrap(), format!("msg_{i}"));
        }
    }
}
