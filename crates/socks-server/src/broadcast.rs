//! Event fan-out to subscribed WebSocket clients.

use std::sync::Arc;

use futures::future::join_all;
use metrics::counter;
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::channels::ChannelSet;
use crate::metrics::{EVENT_DELIVERIES_TOTAL, EVENT_DELIVERY_DROPS_TOTAL};
use crate::registry::ConnectionRegistry;
use crate::websocket::connection::{Delivery, Frame};

/// Outcome of one fan-out.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FanOutReport {
    /// Connections whose interest intersected the target channels.
    pub matched: usize,
    /// Frames queued for a writer.
    pub delivered: usize,
    /// Frames discarded because the connection was gone.
    pub dropped: usize,
}

/// Deliver `frame` to every connection interested in any of `channels`.
///
/// Sends run concurrently; a full queue only delays its own send and a
/// closed one is counted as dropped.
pub async fn fan_out(
    registry: &ConnectionRegistry,
    channels: &ChannelSet,
    frame: Frame,
) -> FanOutReport {
    let recipients = registry.matching(channels);
    let matched = recipients.len();
    let results = join_all(recipients.iter().map(|conn| conn.send(Arc::clone(&frame)))).await;

    let delivered = results.iter().filter(|r| **r == Delivery::Queued).count();
    let report = FanOutReport {
        matched,
        delivered,
        dropped: matched - delivered,
    };
    counter!(EVENT_DELIVERIES_TOTAL).increment(report.delivered as u64);
    counter!(EVENT_DELIVERY_DROPS_TOTAL).increment(report.dropped as u64);
    report
}

/// Serialize `event` once and fan it out on a detached task.
pub fn spawn_fan_out(
    registry: Arc<ConnectionRegistry>,
    channels: ChannelSet,
    event: Value,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let frame: Frame = match serde_json::to_string(&event) {
            Ok(json) => Frame::from(json),
            Err(e) => {
                warn!(error = %e, "failed to serialize event");
                return;
            }
        };
        let report = fan_out(&registry, &channels, frame).await;
        debug!(
            channels = ?channels.to_sorted_vec(),
            matched = report.matched,
            delivered = report.delivered,
            dropped = report.dropped,
            "event fanned out"
        );
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::ConnectionId;
    use crate::websocket::connection::ClientConnection;
    use tokio::sync::mpsc;

    fn subscribe(
        registry: &ConnectionRegistry,
        id: &str,
        channels: &[&str],
    ) -> mpsc::Receiver<Frame> {
        let (tx, rx) = mpsc::channel(8);
        let conn = Arc::new(ClientConnection::new(ConnectionId::from_raw(id), tx));
        registry
            .register(conn, channels.iter().copied().collect())
            .unwrap();
        rx
    }

    fn set(names: &[&str]) -> ChannelSet {
        names.iter().copied().collect()
    }

    #[tokio::test]
    async fn reaches_only_intersecting_subscribers() {
        let registry = ConnectionRegistry::new();
        let mut x = subscribe(&registry, "x", &["a"]);
        let mut y = subscribe(&registry, "y", &["c"]);
        let mut z = subscribe(&registry, "z", &["a", "z"]);

        let report = fan_out(&registry, &set(&["a", "b"]), Frame::from(r#"{"n":1}"#)).await;
        assert_eq!(report, FanOutReport { matched: 2, delivered: 2, dropped: 0 });

        assert_eq!(&*x.recv().await.unwrap(), r#"{"n":1}"#);
        assert_eq!(&*z.recv().await.unwrap(), r#"{"n":1}"#);
        assert!(y.try_recv().is_err());
    }

    #[tokio::test]
    async fn one_frame_per_subscriber_despite_overlap() {
        let registry = ConnectionRegistry::new();
        let mut x = subscribe(&registry, "x", &["a", "b"]);

        let report = fan_out(&registry, &set(&["a", "b"]), Frame::from("e")).await;
        assert_eq!(report.matched, 1);
        assert_eq!(&*x.recv().await.unwrap(), "e");
        assert!(x.try_recv().is_err());
    }

    #[tokio::test]
    async fn broken_connection_does_not_affect_others() {
        let registry = ConnectionRegistry::new();
        let broken = subscribe(&registry, "broken", &["a"]);
        let mut healthy = subscribe(&registry, "healthy", &["a"]);
        drop(broken);

        let report = fan_out(&registry, &set(&["a"]), Frame::from("e")).await;
        assert_eq!(report, FanOutReport { matched: 2, delivered: 1, dropped: 1 });
        assert_eq!(&*healthy.recv().await.unwrap(), "e");
    }

    #[tokio::test]
    async fn no_subscribers_is_empty_report() {
        let registry = ConnectionRegistry::new();
        let report = fan_out(&registry, &set(&["a"]), Frame::from("e")).await;
        assert_eq!(report, FanOutReport::default());
    }

    #[tokio::test]
    async fn spawned_fan_out_serializes_event() {
        let registry = Arc::new(ConnectionRegistry::new());
        let mut x = subscribe(&registry, "x", &["news"]);

        spawn_fan_out(
            Arc::clone(&registry),
            set(&["news"]),
            serde_json::json!({"headline": "hi"}),
        )
        .await
        .unwrap();

        let frame = x.recv().await.unwrap();
        let parsed: Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(parsed["headline"], "hi");
    }

    #[tokio::test]
    async fn slow_subscriber_only_delays_itself() {
        let registry = ConnectionRegistry::new();
        let (tx, mut slow_rx) = mpsc::channel(1);
        let slow = Arc::new(ClientConnection::new(ConnectionId::from_raw("slow"), tx));
        registry.register(Arc::clone(&slow), set(&["a"])).unwrap();
        let mut fast = subscribe(&registry, "fast", &["a"]);

        // Fill the slow queue so the next send has to wait.
        assert_eq!(slow.send(Frame::from("backlog")).await, Delivery::Queued);

        let drain = tokio::spawn(async move {
            tokio::task::yield_now().await;
            let first = slow_rx.recv().await.unwrap();
            let second = slow_rx.recv().await.unwrap();
            (first, second)
        });

        let report = fan_out(&registry, &set(&["a"]), Frame::from("e")).await;
        assert_eq!(report.delivered, 2);
        assert_eq!(&*fast.recv().await.unwrap(), "e");

        let (first, second) = drain.await.unwrap();
        assert_eq!(&*first, "backlog");
        assert_eq!(&*second, "e");
    }
}
