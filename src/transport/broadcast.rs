//! Fan-out of inbound messages to subscribers.
//!
//! Every subscriber owns a bounded queue. A delivery is offered to all
//! subscribers concurrently; a subscriber that does not accept it within the
//! grace period (or whose receiving end is gone) is deregistered, so one
//! stalled consumer never holds back the others.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use futures_util::future::join_all;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::identifiers::SubscriberId;

use super::broker::Envelope;
use super::channel::millis;

// ============================================================================
// Subscription
// ============================================================================

/// Receiving end of a broadcast registration.
///
/// Dropping the subscription deregisters it on the next delivery.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriberId,
    rx: mpsc::Receiver<Envelope>,
}

impl Subscription {
    /// Returns the subscriber ID.
    #[inline]
    #[must_use]
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Waits for the next inbound message.
    ///
    /// Returns `None` once the subscriber was dropped for stalling or the
    /// channel closed.
    pub async fn recv(&mut self) -> Option<Envelope> {
        self.rx.recv().await
    }
}

// ============================================================================
// Broadcaster
// ============================================================================

/// Registry of subscribers.
pub(crate) struct Broadcaster {
    subscribers: Mutex<Vec<(SubscriberId, mpsc::Sender<Envelope>)>>,
    capacity: usize,
    grace: Duration,
}

impl Broadcaster {
    /// Creates an empty registry.
    pub(crate) fn new(capacity: usize, grace: Duration) -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
            capacity: capacity.max(1),
            grace,
        }
    }

    /// Registers a new subscriber.
    pub(crate) fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::channel(self.capacity);
        let id = SubscriberId::next();

        self.subscribers.lock().push((id, tx));
        debug!(subscriber_id = %id, "Subscriber registered");

        Subscription { id, rx }
    }

    /// Returns the number of registered subscribers.
    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.subscribers.lock().len()
    }

    /// Offers `envelope` to every subscriber; returns how many accepted it.
    pub(crate) async fn deliver(&self, envelope: &Envelope) -> usize {
        let targets = self.subscribers.lock().clone();
        if targets.is_empty() {
            debug!("Inbound message without subscribers, dropped");
            return 0;
        }

        let grace = self.grace;
        let outcomes = join_all(targets.iter().map(|(id, tx)| async move {
            (*id, tx.send_timeout(envelope.clone(), grace).await.is_ok())
        }))
        .await;

        let stalled: Vec<SubscriberId> = outcomes
            .iter()
            .filter(|(_, accepted)| !accepted)
            .map(|(id, _)| *id)
            .collect();

        if !stalled.is_empty() {
            self.subscribers
                .lock()
                .retain(|(id, _)| !stalled.contains(id));
            for id in &stalled {
                warn!(subscriber_id = %id, grace_ms = millis(grace), "Subscriber dropped");
            }
        }

        outcomes.len() - stalled.len()
    }

    /// Deregisters everyone; their subscriptions end.
    pub(crate) fn close_all(&self) {
        let count = {
            let mut subscribers = self.subscribers.lock();
            let count = subscribers.len();
            subscribers.clear();
            count
        };
        debug!(count, "Subscribers closed");
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(body: &str) -> Envelope {
        Envelope::new(body.as_bytes().to_vec())
    }

    #[tokio::test]
    async fn test_deliver_to_all() {
        let broadcaster = Broadcaster::new(4, Duration::from_millis(50));
        let mut a = broadcaster.subscribe();
        let mut b = broadcaster.subscribe();

        assert_eq!(broadcaster.deliver(&envelope("x")).await, 2);
        assert_eq!(a.recv().await.expect("a").data, b"x");
        assert_eq!(b.recv().await.expect("b").data, b"x");
    }

    #[tokio::test]
    async fn test_stalled_subscriber_is_dropped() {
        let broadcaster = Broadcaster::new(1, Duration::from_millis(20));
        let mut fast = broadcaster.subscribe();
        let _stalled = broadcaster.subscribe();

        assert_eq!(broadcaster.deliver(&envelope("1")).await, 2);
        assert_eq!(fast.recv().await.expect("first").data, b"1");

        // The stalled subscriber's single slot is still full.
        assert_eq!(broadcaster.deliver(&envelope("2")).await, 1);
        assert_eq!(broadcaster.len(), 1);
        assert_eq!(fast.recv().await.expect("second").data, b"2");
    }

    #[tokio::test]
    async fn test_dropped_subscription_is_removed() {
        let broadcaster = Broadcaster::new(4, Duration::from_millis(20));
        let gone = broadcaster.subscribe();
        drop(gone);

        assert_eq!(broadcaster.deliver(&envelope("x")).await, 0);
        assert_eq!(broadcaster.len(), 0);
    }

    #[tokio::test]
    async fn test_close_all_ends_subscriptions() {
        let broadcaster = Broadcaster::new(4, Duration::from_millis(20));
        let mut sub = broadcaster.subscribe();
        broadcaster.close_all();
        assert!(sub.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_order_preserved_per_subscriber() {
        let broadcaster = Broadcaster::new(8, Duration::from_millis(50));
        let mut sub = broadcaster.subscribe();

        for i in 0..5 {
            broadcaster.deliver(&envelope(&i.to_string())).await;
        }
        for i in 0..5 {
            assert_eq!(sub.recv().await.expect("message").data, i.to_string().as_bytes());
        }
    }
}
