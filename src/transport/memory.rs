//! In-process broker.
//!
//! Implements the broker seam without a network so that managers and
//! plugins can be exercised in tests and local runs. The broker behaves like
//! a single RabbitMQ node for the subset of AMQP the channel uses: queues
//! buffer messages while nobody consumes them, the default exchange routes
//! by queue name, topic exchanges route by exact routing key and exclusive
//! reply queues disappear with their session.
//!
//! Outages can be simulated with [`MemoryBroker::sever`] (every live session
//! is lost) and [`MemoryBroker::set_online`] (new connects are refused).
//!
//! # Example
//!
//! ```ignore
//! let broker = MemoryBroker::new();
//! broker.declare_queue("manager-register");
//!
//! let channel = Channel::open(Arc::new(broker.clone()), config).await?;
//! let registration = broker.next_message("manager-register").await;
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use async_trait::async_trait;
use futures_util::StreamExt;
use futures_util::stream;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tokio::sync::{Mutex as AsyncMutex, mpsc, watch};
use tracing::{debug, trace};

use crate::error::{Error, Result};

use super::broker::{
    Acker, Connector, Delivery, DeliveryStream, Envelope, Publish, Session, Topology,
};

// ============================================================================
// Types
// ============================================================================

/// Shared receiving end of a queue; competing consumers take turns.
type SharedReceiver = Arc<AsyncMutex<mpsc::UnboundedReceiver<Envelope>>>;

// ============================================================================
// MemoryQueue
// ============================================================================

struct MemoryQueue {
    tx: mpsc::UnboundedSender<Envelope>,
    rx: SharedReceiver,
}

impl MemoryQueue {
    fn new() -> Arc<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            tx,
            rx: Arc::new(AsyncMutex::new(rx)),
        })
    }
}

// ============================================================================
// BrokerState
// ============================================================================

struct SessionEntry {
    lost: Arc<watch::Sender<bool>>,
    exclusive: Vec<String>,
}

#[derive(Default)]
struct BrokerState {
    queues: FxHashMap<String, Arc<MemoryQueue>>,
    /// Exchange name to `(routing key, queue)` bindings.
    bindings: FxHashMap<String, Vec<(String, String)>>,
    sessions: FxHashMap<u64, SessionEntry>,
}

impl BrokerState {
    fn queue(&mut self, name: &str) -> Arc<MemoryQueue> {
        Arc::clone(
            self.queues
                .entry(name.to_string())
                .or_insert_with(MemoryQueue::new),
        )
    }

    fn drop_session(&mut self, session_id: u64) {
        if let Some(entry) = self.sessions.remove(&session_id) {
            entry.lost.send_replace(true);
            for queue in entry.exclusive {
                self.queues.remove(&queue);
            }
        }
    }
}

// ============================================================================
// BrokerInner
// ============================================================================

struct BrokerInner {
    state: Mutex<BrokerState>,
    online: AtomicBool,
    fail_acks: AtomicBool,
    connects: AtomicUsize,
    acks: AtomicUsize,
    next_id: AtomicU64,
}

impl BrokerInner {
    fn route(&self, publish: Publish) -> usize {
        let mut state = self.state.lock();

        let targets: Vec<Arc<MemoryQueue>> = if publish.exchange.is_empty() {
            state
                .queues
                .get(&publish.routing_key)
                .into_iter()
                .cloned()
                .collect()
        } else {
            let queues: Vec<String> = state
                .bindings
                .get(&publish.exchange)
                .into_iter()
                .flatten()
                .filter(|(key, _)| *key == publish.routing_key)
                .map(|(_, queue)| queue.clone())
                .collect();
            queues
                .iter()
                .filter_map(|queue| state.queues.get(queue).cloned())
                .collect()
        };
        drop(state);

        if targets.is_empty() {
            debug!(
                exchange = %publish.exchange,
                routing_key = %publish.routing_key,
                "Message unroutable, dropped"
            );
        }

        for queue in &targets {
            let _ = queue.tx.send(publish.envelope.clone());
        }

        targets.len()
    }
}

// ============================================================================
// MemoryBroker
// ============================================================================

/// In-process broker; cloning yields another handle to the same broker.
#[derive(Clone)]
pub struct MemoryBroker {
    inner: Arc<BrokerInner>,
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBroker {
    /// Creates an empty, online broker.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(BrokerInner {
                state: Mutex::new(BrokerState::default()),
                online: AtomicBool::new(true),
                fail_acks: AtomicBool::new(false),
                connects: AtomicUsize::new(0),
                acks: AtomicUsize::new(0),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Creates a broker with the given queues declared.
    #[must_use]
    pub fn with_queues(queues: &[&str]) -> Self {
        let broker = Self::new();
        for queue in queues {
            broker.declare_queue(queue);
        }
        broker
    }

    /// Declares a queue if it does not exist yet.
    pub fn declare_queue(&self, name: &str) {
        self.inner.state.lock().queue(name);
    }

    /// Returns `true` if `name` exists.
    #[must_use]
    pub fn has_queue(&self, name: &str) -> bool {
        self.inner.state.lock().queues.contains_key(name)
    }

    /// Publishes straight to a queue; returns `false` if it does not exist.
    pub fn publish(&self, queue: &str, envelope: Envelope) -> bool {
        self.inner.route(Publish::to_queue(queue, envelope)) > 0
    }

    /// Publishes through an exchange; returns the number of queues reached.
    pub fn publish_to_exchange(&self, exchange: &str, routing_key: &str, envelope: Envelope) -> usize {
        self.inner.route(Publish {
            exchange: exchange.to_string(),
            routing_key: routing_key.to_string(),
            envelope,
        })
    }

    /// Waits for the next message on `queue`, declaring it if needed.
    ///
    /// Competes with any other consumer of the queue.
    pub async fn next_message(&self, queue: &str) -> Option<Envelope> {
        let rx = Arc::clone(&self.inner.state.lock().queue(queue).rx);
        let mut guard = rx.lock().await;
        guard.recv().await
    }

    /// Takes a buffered message from `queue` without waiting.
    #[must_use]
    pub fn try_next_message(&self, queue: &str) -> Option<Envelope> {
        let rx = Arc::clone(&self.inner.state.lock().queues.get(queue)?.rx);
        let mut guard = rx.try_lock().ok()?;
        guard.try_recv().ok()
    }

    /// Drops every live session, as if the broker restarted.
    ///
    /// Queues and their buffered messages survive; exclusive queues do not.
    pub fn sever(&self) {
        let mut state = self.inner.state.lock();
        let ids: Vec<u64> = state.sessions.keys().copied().collect();
        for id in ids {
            state.drop_session(id);
        }
        debug!(sessions = state.sessions.len(), "Memory broker severed");
    }

    /// Accepts or refuses new connections.
    pub fn set_online(&self, online: bool) {
        self.inner.online.store(online, Ordering::SeqCst);
    }

    /// Makes every acknowledgement fail (or succeed again).
    pub fn set_fail_acks(&self, fail: bool) {
        self.inner.fail_acks.store(fail, Ordering::SeqCst);
    }

    /// Returns the number of successful connects so far.
    #[inline]
    #[must_use]
    pub fn connect_count(&self) -> usize {
        self.inner.connects.load(Ordering::SeqCst)
    }

    /// Returns the number of successful acknowledgements so far.
    #[inline]
    #[must_use]
    pub fn ack_count(&self) -> usize {
        self.inner.acks.load(Ordering::SeqCst)
    }

    /// Returns the number of live sessions.
    #[inline]
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.inner.state.lock().sessions.len()
    }
}

#[async_trait]
impl Connector for MemoryBroker {
    async fn connect(&self) -> Result<Arc<dyn Session>> {
        if !self.inner.online.load(Ordering::SeqCst) {
            return Err(Error::connection("memory broker offline"));
        }

        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (lost_tx, lost_rx) = watch::channel(false);

        self.inner.state.lock().sessions.insert(
            id,
            SessionEntry {
                lost: Arc::new(lost_tx),
                exclusive: Vec::new(),
            },
        );
        self.inner.connects.fetch_add(1, Ordering::SeqCst);

        trace!(session_id = id, "Memory session opened");

        Ok(Arc::new(MemorySession {
            id,
            broker: Arc::clone(&self.inner),
            lost: lost_rx,
        }))
    }
}

// ============================================================================
// MemorySession
// ============================================================================

struct MemorySession {
    id: u64,
    broker: Arc<BrokerInner>,
    lost: watch::Receiver<bool>,
}

impl MemorySession {
    fn ensure_live(&self) -> Result<()> {
        if *self.lost.borrow() {
            Err(Error::ConnectionClosed)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Session for MemorySession {
    async fn declare(&self, topology: &Topology) -> Result<()> {
        self.ensure_live()?;

        let mut state = self.broker.state.lock();
        state.queue(&topology.queue);

        let binding = (topology.routing_key().to_string(), topology.queue.clone());
        let bindings = state.bindings.entry(topology.exchange.clone()).or_default();
        if !bindings.contains(&binding) {
            bindings.push(binding);
        }

        Ok(())
    }

    async fn publish(&self, publish: Publish) -> Result<()> {
        self.ensure_live()?;
        self.broker.route(publish);
        Ok(())
    }

    async fn declare_reply_queue(&self) -> Result<String> {
        self.ensure_live()?;

        let name = format!(
            "amq.gen-{}",
            self.broker.next_id.fetch_add(1, Ordering::Relaxed)
        );

        let mut state = self.broker.state.lock();
        state.queue(&name);
        if let Some(entry) = state.sessions.get_mut(&self.id) {
            entry.exclusive.push(name.clone());
        }

        Ok(name)
    }

    async fn consume(&self, queue: &str) -> Result<DeliveryStream> {
        self.ensure_live()?;

        let rx = Arc::clone(&self.broker.state.lock().queue(queue).rx);
        let seed = (rx, self.lost.clone(), Arc::clone(&self.broker));

        let stream = stream::unfold(seed, |(rx, mut lost, broker)| async move {
            let next = {
                let mut guard = tokio::select! {
                    guard = rx.lock() => guard,
                    () = until_lost(&mut lost) => return None,
                };
                tokio::select! {
                    envelope = guard.recv() => envelope,
                    () = until_lost(&mut lost) => None,
                }
            };

            let envelope = next?;
            let acker = Box::new(MemoryAcker {
                broker: Arc::clone(&broker),
            });

            Some((Ok::<_, Error>(Delivery::new(envelope, acker)), (rx, lost, broker)))
        });

        Ok(stream.boxed())
    }

    async fn delete_queue(&self, queue: &str) -> Result<()> {
        self.ensure_live()?;

        let mut state = self.broker.state.lock();
        state.queues.remove(queue);
        if let Some(entry) = state.sessions.get_mut(&self.id) {
            entry.exclusive.retain(|name| name != queue);
        }

        Ok(())
    }

    async fn closed(&self) {
        until_lost(&mut self.lost.clone()).await;
    }

    async fn close(&self) -> Result<()> {
        self.broker.state.lock().drop_session(self.id);
        trace!(session_id = self.id, "Memory session closed");
        Ok(())
    }
}

/// Resolves once the session is marked lost or its sender is gone.
async fn until_lost(lost: &mut watch::Receiver<bool>) {
    let _ = lost.wait_for(|lost| *lost).await;
}

// ============================================================================
// MemoryAcker
// ============================================================================

struct MemoryAcker {
    broker: Arc<BrokerInner>,
}

#[async_trait]
impl Acker for MemoryAcker {
    async fn ack(&self) -> Result<()> {
        if self.broker.fail_acks.load(Ordering::SeqCst) {
            return Err(Error::connection("acknowledgement refused"));
        }
        self.broker.acks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::timeout;

    use super::*;

    fn topology(queue: &str) -> Topology {
        Topology {
            exchange: "openbaton-exchange".into(),
            queue: queue.into(),
            durable: true,
            auto_delete: true,
        }
    }

    #[tokio::test]
    async fn test_default_exchange_routes_by_queue_name() {
        let broker = MemoryBroker::with_queues(&["q1"]);
        assert!(broker.publish("q1", Envelope::new(b"hi".to_vec())));
        assert!(!broker.publish("missing", Envelope::new(b"lost".to_vec())));

        let message = broker.next_message("q1").await.expect("message");
        assert_eq!(message.data, b"hi");
    }

    #[tokio::test]
    async fn test_topic_exchange_routes_by_binding() {
        let broker = MemoryBroker::new();
        let session = broker.connect().await.expect("connect");
        session.declare(&topology("vnfm-dummy")).await.expect("declare");

        let reached = broker.publish_to_exchange(
            "openbaton-exchange",
            "vnfm-dummy",
            Envelope::new(b"{}".to_vec()),
        );
        assert_eq!(reached, 1);
        assert_eq!(
            broker.publish_to_exchange("openbaton-exchange", "other", Envelope::default()),
            0
        );
    }

    #[tokio::test]
    async fn test_consume_and_ack() {
        let broker = MemoryBroker::with_queues(&["q"]);
        let session = broker.connect().await.expect("connect");
        let mut deliveries = session.consume("q").await.expect("consume");

        broker.publish("q", Envelope::new(b"1".to_vec()));
        let delivery = deliveries.next().await.expect("item").expect("delivery");
        let (envelope, ack) = delivery.ack().await;

        assert_eq!(envelope.data, b"1");
        assert!(ack.is_ok());
        assert_eq!(broker.ack_count(), 1);
    }

    #[tokio::test]
    async fn test_sever_ends_streams_and_keeps_messages() {
        let broker = MemoryBroker::with_queues(&["q"]);
        let session = broker.connect().await.expect("connect");
        let mut deliveries = session.consume("q").await.expect("consume");

        broker.sever();
        let ended = timeout(Duration::from_secs(1), deliveries.next())
            .await
            .expect("stream ended");
        assert!(ended.is_none());
        assert!(session.publish(Publish::to_queue("q", Envelope::default())).await.is_err());

        broker.publish("q", Envelope::new(b"kept".to_vec()));
        let session = broker.connect().await.expect("reconnect");
        let mut deliveries = session.consume("q").await.expect("consume");
        let delivery = deliveries.next().await.expect("item").expect("delivery");
        assert_eq!(delivery.envelope.data, b"kept");
    }

    #[tokio::test]
    async fn test_reply_queue_dies_with_session() {
        let broker = MemoryBroker::new();
        let session = broker.connect().await.expect("connect");
        let queue = session.declare_reply_queue().await.expect("reply queue");
        assert!(broker.has_queue(&queue));

        session.close().await.expect("close");
        assert!(!broker.has_queue(&queue));
        assert_eq!(broker.session_count(), 0);
    }

    #[tokio::test]
    async fn test_offline_refuses_connect() {
        let broker = MemoryBroker::new();
        broker.set_online(false);
        assert!(broker.connect().await.is_err());

        broker.set_online(true);
        assert!(broker.connect().await.is_ok());
        assert_eq!(broker.connect_count(), 1);
    }

    #[tokio::test]
    async fn test_failed_ack_reports_error() {
        let broker = MemoryBroker::with_queues(&["q"]);
        broker.set_fail_acks(true);
        let session = broker.connect().await.expect("connect");
        let mut deliveries = session.consume("q").await.expect("consume");

        broker.publish("q", Envelope::new(b"x".to_vec()));
        let delivery = deliveries.next().await.expect("item").expect("delivery");
        let (_, ack) = delivery.ack().await;
        assert!(ack.is_err());
    }
}
