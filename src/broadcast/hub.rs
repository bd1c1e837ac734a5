use super::events::OutboundEvent;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, trace, warn};

pub type ConnectionId = u64;
pub type EventReceiver = mpsc::Receiver<OutboundEvent>;

pub const DEFAULT_QUEUE_CAPACITY: usize = 128;

/// Sending side of one connection. Cloned into every topic it joins.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    pub id: ConnectionId,
    sender: mpsc::Sender<OutboundEvent>,
}

impl ConnectionHandle {
    /// Queues an event for this connection without waiting. A full queue
    /// drops the event; a closed one means the socket is gone.
    pub fn send(&self, event: OutboundEvent) -> bool {
        match self.sender.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(event)) => {
                warn!("Connection {}: queue full, dropping {}", self.id, event.kind());
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }
}

/// Process-wide topic registry. One instance is built at startup and shared
/// by every connection handler.
#[derive(Debug)]
pub struct BroadcastHub {
    next_id: AtomicU64,
    queue_capacity: usize,
    topics: RwLock<HashMap<String, HashMap<ConnectionId, ConnectionHandle>>>,
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::with_queue_capacity(DEFAULT_QUEUE_CAPACITY)
    }
}

impl BroadcastHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// `capacity` is clamped to at least one slot.
    pub fn with_queue_capacity(capacity: usize) -> Self {
        Self {
            next_id: AtomicU64::new(0),
            queue_capacity: capacity.max(1),
            topics: RwLock::new(HashMap::new()),
        }
    }

    /// A fresh connection with its own bounded event queue.
    pub fn open_connection(&self) -> (ConnectionHandle, EventReceiver) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let (sender, receiver) = mpsc::channel(self.queue_capacity);
        (ConnectionHandle { id, sender }, receiver)
    }

    pub async fn join(&self, topic: &str, connection: &ConnectionHandle) {
        self.topics
            .write()
            .await
            .entry(topic.to_string())
            .or_default()
            .insert(connection.id, connection.clone());
        debug!("Connection {} joined {}", connection.id, topic);
    }

    pub async fn leave(&self, topic: &str, connection_id: ConnectionId) {
        let mut topics = self.topics.write().await;
        if let Some(members) = topics.get_mut(topic) {
            members.remove(&connection_id);
            if members.is_empty() {
                topics.remove(topic);
            }
        }
        debug!("Connection {} left {}", connection_id, topic);
    }

    /// Drops a connection from every topic it is still in.
    pub async fn leave_all(&self, connection_id: ConnectionId) {
        let mut topics = self.topics.write().await;
        topics.retain(|_, members| {
            members.remove(&connection_id);
            !members.is_empty()
        });
    }

    /// Sends `event` to every current member of `topic` and returns how many
    /// queues accepted it. Members whose connection is gone or whose queue is
    /// full are skipped.
    pub async fn publish(&self, topic: &str, event: &OutboundEvent) -> usize {
        let topics = self.topics.read().await;
        let Some(members) = topics.get(topic) else {
            trace!("No members on {} for {}", topic, event.kind());
            return 0;
        };
        let delivered = members.values().filter(|m| m.send(event.clone())).count();
        debug!("Published {} to {} ({} members)", event.kind(), topic, delivered);
        delivered
    }

    pub async fn member_count(&self, topic: &str) -> usize {
        self.topics.read().await.get(topic).map_or(0, HashMap::len)
    }

    pub async fn topic_count(&self) -> usize {
        self.topics.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::events::TrackingStatus;
    use std::sync::Arc;

    fn waiting() -> OutboundEvent {
        OutboundEvent::status(TrackingStatus::Waiting)
    }

    #[tokio::test]
    async fn test_publish_reaches_members_only() {
        let hub = BroadcastHub::new();
        let (a, mut rx_a) = hub.open_connection();
        let (b, mut rx_b) = hub.open_connection();
        assert_ne!(a.id, b.id);

        hub.join("bus:7", &a).await;
        hub.join("bus:8", &b).await;

        assert_eq!(hub.publish("bus:7", &waiting()).await, 1);
        assert_eq!(rx_a.try_recv().unwrap(), waiting());
        assert!(rx_b.try_recv().is_err());
        assert_eq!(hub.publish("bus:9", &waiting()).await, 0);
    }

    #[tokio::test]
    async fn test_leave_and_cleanup() {
        let hub = BroadcastHub::new();
        let (a, mut rx_a) = hub.open_connection();
        hub.join("bus:7", &a).await;
        hub.join("user:1", &a).await;
        hub.leave("bus:7", a.id).await;

        assert_eq!(hub.publish("bus:7", &waiting()).await, 0);
        assert!(rx_a.try_recv().is_err());
        assert_eq!(hub.topic_count().await, 1);

        hub.leave_all(a.id).await;
        assert_eq!(hub.topic_count().await, 0);
    }

    #[tokio::test]
    async fn test_closed_receiver_is_skipped() {
        let hub = BroadcastHub::new();
        let (a, rx_a) = hub.open_connection();
        let (b, mut rx_b) = hub.open_connection();
        hub.join("bus:7", &a).await;
        hub.join("bus:7", &b).await;
        drop(rx_a);

        assert_eq!(hub.publish("bus:7", &waiting()).await, 1);
        assert!(rx_b.try_recv().is_ok());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_join_and_leave() {
        let hub = Arc::new(BroadcastHub::new());
        let mut tasks = Vec::new();
        for i in 0..64 {
            let hub = hub.clone();
            tasks.push(tokio::spawn(async move {
                let (conn, rx) = hub.open_connection();
                hub.join("bus:1", &conn).await;
                if i % 2 == 0 {
                    hub.leave("bus:1", conn.id).await;
                }
                (conn, rx)
            }));
        }
        let mut kept = Vec::new();
        for task in tasks {
            kept.push(task.await.unwrap());
        }

        assert_eq!(hub.member_count("bus:1").await, 32);
        assert_eq!(hub.publish("bus:1", &waiting()).await, 32);
        let received = kept.iter_mut().filter_map(|(_, rx)| rx.try_recv().ok()).count();
        assert_eq!(received, 32);
    }

    #[tokio::test]
    async fn test_full_queue_drops_instead_of_growing() {
        let hub = BroadcastHub::with_queue_capacity(2);
        let (slow, mut slow_rx) = hub.open_connection();
        let (fast, mut fast_rx) = hub.open_connection();
        hub.join("bus:7", &slow).await;
        hub.join("bus:7", &fast).await;

        assert_eq!(hub.publish("bus:7", &waiting()).await, 2);
        assert!(fast_rx.try_recv().is_ok());
        assert_eq!(hub.publish("bus:7", &waiting()).await, 2);
        assert!(fast_rx.try_recv().is_ok());
        // The slow reader never drained: only the fast one takes the third.
        assert_eq!(hub.publish("bus:7", &waiting()).await, 1);
        assert!(fast_rx.try_recv().is_ok());

        let mut queued = 0;
        while slow_rx.try_recv().is_ok() {
            queued += 1;
        }
        assert_eq!(queued, 2);
        assert_eq!(hub.publish("bus:7", &waiting()).await, 2);
        assert_eq!(hub.member_count("bus:7").await, 2);
    }
}
