//! Alert fan-out to connected listeners.
//!
//! Every alert listener owns a private unbounded queue; publishing pushes one
//! copy of the message into each registered queue under the registry lock.
//! The lock is distinct from the frame lock, so alert latency never couples
//! to frame-copy latency, and it is held only for the enqueue sweep, never
//! across I/O. Subscriptions deregister themselves on drop, so a disconnect
//! can never leak a registry entry.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

/// The one alert payload defined on the WebSocket surface.
pub const FALL_ALERT_TOKEN: &str = "FALLDETECTED";

/// Registry of per-listener delivery queues.
#[derive(Default)]
pub struct AlertFanout {
    subscribers: Mutex<HashMap<u64, mpsc::UnboundedSender<String>>>,
    next_id: AtomicU64,
}

impl AlertFanout {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a fresh delivery queue for a newly connected listener.
    pub fn subscribe(self: &Arc<Self>) -> AlertSubscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers.lock().insert(id, tx);
        debug!(subscriber = id, "Alert listener registered");
        AlertSubscription {
            id,
            rx,
            fanout: self.clone(),
        }
    }

    /// Push one copy of the message into every registered queue.
    ///
    /// Returns the number of listeners reached. Queues are unbounded; alert
    /// traffic is rare enough that the enqueue never blocks.
    pub fn publish(&self, message: &str) -> usize {
        let subscribers = self.subscribers.lock();
        let mut delivered = 0;
        for (id, tx) in subscribers.iter() {
            if tx.send(message.to_string()).is_ok() {
                delivered += 1;
            } else {
                debug!(subscriber = id, "Dropping alert for closed queue");
            }
        }
        delivered
    }

    /// Number of currently connected listeners.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    fn unsubscribe(&self, id: u64) {
        self.subscribers.lock().remove(&id);
        debug!(subscriber = id, "Alert listener deregistered");
    }
}

/// One connected listener's end of the fan-out.
///
/// Dropping the subscription removes its queue from the registry.
pub struct AlertSubscription {
    id: u64,
    rx: mpsc::UnboundedReceiver<String>,
    fanout: Arc<AlertFanout>,
}

impl AlertSubscription {
    /// Wait for the next alert message. Returns `None` once the registry
    /// side has been torn down.
    pub async fn recv(&mut self) -> Option<String> {
        self.rx.recv().await
    }

    /// Take a queued alert without waiting.
    pub fn try_recv(&mut self) -> Result<String, mpsc::error::TryRecvError> {
        self.rx.try_recv()
    }
}

impl Drop for AlertSubscription {
    fn drop(&mut self) {
        self.fanout.unsubscribe(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_reaches_every_listener_once() {
        let fanout = Arc::new(AlertFanout::new());
        let mut subs: Vec<_> = (0..3).map(|_| fanout.subscribe()).collect();

        assert_eq!(fanout.publish(FALL_ALERT_TOKEN), 3);

        for sub in subs.iter_mut() {
            assert_eq!(sub.recv().await.as_deref(), Some(FALL_ALERT_TOKEN));
        }
    }

    #[tokio::test]
    async fn test_per_listener_fifo_order() {
        let fanout = Arc::new(AlertFanout::new());
        let mut sub = fanout.subscribe();

        fanout.publish("first");
        fanout.publish("second");

        assert_eq!(sub.recv().await.as_deref(), Some("first"));
        assert_eq!(sub.recv().await.as_deref(), Some("second"));
    }

    #[tokio::test]
    async fn test_publish_with_no_listeners() {
        let fanout = Arc::new(AlertFanout::new());
        assert_eq!(fanout.publish(FALL_ALERT_TOKEN), 0);
    }

    #[tokio::test]
    async fn test_disconnect_before_publish() {
        let fanout = Arc::new(AlertFanout::new());
        let mut remaining = fanout.subscribe();
        let departed = fanout.subscribe();
        drop(departed);

        assert_eq!(fanout.publish(FALL_ALERT_TOKEN), 1);
        assert_eq!(remaining.recv().await.as_deref(), Some(FALL_ALERT_TOKEN));
    }

    #[tokio::test]
    async fn test_subscriber_count_tracks_connections() {
        let fanout = Arc::new(AlertFanout::new());
        assert_eq!(fanout.subscriber_count(), 0);

        let a = fanout.subscribe();
        let b = fanout.subscribe();
        assert_eq!(fanout.subscriber_count(), 2);

        drop(a);
        assert_eq!(fanout.subscriber_count(), 1);
        drop(b);
        assert_eq!(fanout.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_messages_survive_until_drained() {
        let fanout = Arc::new(AlertFanout::new());
        let mut sub = fanout.subscribe();

        // Published before the listener starts draining; the private queue
        // holds them.
        fanout.publish("a");
        fanout.publish("b");
        fanout.publish("c");

        assert_eq!(sub.recv().await.as_deref(), Some("a"));
        assert_eq!(sub.recv().await.as_deref(), Some("b"));
        assert_eq!(sub.recv().await.as_deref(), Some("c"));
    }
}
