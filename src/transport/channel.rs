//! Broker channel: session supervision, I/O workers and inbound fan-out.
//!
//! # Tasks
//!
//! ```text
//!            send / reply / exchange
//!                      │
//!                      ▼
//!               ┌────────────┐   session watch   ┌────────────┐
//!               │  job queue │◄──────────────────│ supervisor │──► consume endpoint
//!               └────────────┘                   └────────────┘        queue
//!                 │   │   │                        reconnect             │
//!                 ▼   ▼   ▼                        every N s             ▼
//!              worker 0 … worker N-1                                 broadcast
//!                 │                                                      │
//!                 └──► publish / private reply queue                 subscribers
//! ```
//!
//! The supervisor is the only task that changes the session or the
//! [`ChannelState`]. It publishes the live session through a watch channel;
//! workers take jobs only while a session is published and finish any job
//! they already claimed. When the session is lost the supervisor retries at
//! a fixed interval, without limit, re-declaring the topology and
//! re-publishing the registration on every successful reconnect.
//!
//! # Example
//!
//! ```ignore
//! let channel = Channel::open(connector, ChannelConfig::new("vnfm-dummy")).await?;
//!
//! channel.send("manager-inbound-actions-reply", body).await?;
//! let reply = channel
//!     .exchange("manager-inbound-actions", request, Duration::from_secs(30))
//!     .await?;
//!
//! channel.close().await?;
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use futures_util::future::join_all;
use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep, timeout, timeout_at};
use tracing::{Instrument, debug, info, info_span, trace, warn};

use crate::config::ChannelConfig;
use crate::error::{Error, Result};
use crate::identifiers::{CorrelationId, WorkerId};

use super::broadcast::{Broadcaster, Subscription};
use super::broker::{Connector, Envelope, Publish, Session, Topology};
use super::correlation::PendingExchanges;

// ============================================================================
// Constants
// ============================================================================

/// Attempts made to publish the unregistration on close.
const UNREGISTER_ATTEMPTS: usize = 2;

// ============================================================================
// Types
// ============================================================================

/// Live session as seen by the workers; `None` while reconnecting.
type SessionSlot = Option<Arc<dyn Session>>;

// ============================================================================
// ChannelState
// ============================================================================

/// Connection state of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelState {
    /// Closed.
    Stopped,
    /// Connected; workers are serving jobs.
    Running,
    /// Session lost; the supervisor is redialing.
    Reconnecting,
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stopped => f.write_str("stopped"),
            Self::Running => f.write_str("running"),
            Self::Reconnecting => f.write_str("reconnecting"),
        }
    }
}

// ============================================================================
// Job
// ============================================================================

/// Work item taken by an I/O worker.
enum Job {
    /// Fire-and-forget publish.
    Publish {
        publish: Publish,
        done: oneshot::Sender<Result<()>>,
    },
    /// Request with correlated reply.
    Exchange {
        id: CorrelationId,
        queue: String,
        body: Vec<u8>,
        deadline: Instant,
        timeout: Duration,
        done: oneshot::Sender<Result<Vec<u8>>>,
    },
}

// ============================================================================
// Shared
// ============================================================================

/// State shared by the channel handle and its tasks.
struct Shared {
    config: ChannelConfig,
    connector: Arc<dyn Connector>,
    session_tx: watch::Sender<SessionSlot>,
    state_tx: watch::Sender<ChannelState>,
    shutdown_tx: watch::Sender<bool>,
    pending: Arc<PendingExchanges>,
    broadcaster: Broadcaster,
}

impl Shared {
    fn topology(&self) -> Topology {
        Topology {
            exchange: self.config.exchange.clone(),
            queue: self.config.endpoint_queue.clone(),
            durable: self.config.durable,
            auto_delete: self.config.auto_delete,
        }
    }

    /// Declares the topology and publishes the registration.
    async fn establish(&self, session: &Arc<dyn Session>) -> Result<()> {
        session.declare(&self.topology()).await?;

        if let Some(registration) = &self.config.registration {
            session
                .publish(Publish::to_queue(
                    &registration.register_queue,
                    Envelope::new(registration.payload.clone()),
                ))
                .await?;
            info!(queue = %registration.register_queue, "Endpoint registered");
        }

        Ok(())
    }

    fn is_shutting_down(&self) -> bool {
        *self.shutdown_tx.borrow()
    }
}

// ============================================================================
// Channel
// ============================================================================

/// A supervised broker channel.
///
/// `Channel` is `Send + Sync`; share it behind the returned `Arc`.
pub struct Channel {
    shared: Arc<Shared>,
    jobs: Mutex<Option<mpsc::Sender<Job>>>,
    supervisor_stop: Mutex<Option<oneshot::Sender<()>>>,
    supervisor: Mutex<Option<JoinHandle<()>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

// ============================================================================
// Channel - Constructor
// ============================================================================

impl Channel {
    /// Dials the broker and starts the channel.
    ///
    /// Declares the topic exchange and the endpoint queue, publishes the
    /// registration (if configured), then starts the supervisor, the
    /// inbound consumer and `config.workers` I/O workers.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the configuration is invalid
    /// - [`Error::Connection`] if the initial dial fails
    /// - any error raised while declaring the topology or registering
    pub async fn open(connector: Arc<dyn Connector>, config: ChannelConfig) -> Result<Arc<Self>> {
        config.validate()?;

        let session = connector.connect().await?;

        let (session_tx, _) = watch::channel(None);
        let (state_tx, _) = watch::channel(ChannelState::Stopped);
        let (shutdown_tx, _) = watch::channel(false);

        let shared = Arc::new(Shared {
            broadcaster: Broadcaster::new(config.subscriber_capacity, config.subscriber_grace),
            config,
            connector,
            session_tx,
            state_tx,
            shutdown_tx,
            pending: Arc::new(PendingExchanges::default()),
        });

        if let Err(e) = shared.establish(&session).await {
            let _ = session.close().await;
            return Err(e);
        }

        shared.session_tx.send_replace(Some(Arc::clone(&session)));
        shared.state_tx.send_replace(ChannelState::Running);

        let (jobs_tx, jobs_rx) = mpsc::channel(shared.config.job_capacity);
        let jobs_rx = Arc::new(AsyncMutex::new(jobs_rx));

        let workers = (0..shared.config.workers)
            .map(|index| {
                let worker_id = WorkerId::new(index);
                let span = info_span!("channel_worker", worker_id = %worker_id);
                tokio::spawn(
                    run_worker(Arc::clone(&shared), Arc::clone(&jobs_rx)).instrument(span),
                )
            })
            .collect();

        let (stop_tx, stop_rx) = oneshot::channel();
        let span = info_span!("channel_supervisor", queue = %shared.config.endpoint_queue);
        let supervisor = tokio::spawn(supervise(Arc::clone(&shared), session, stop_rx).instrument(span));

        info!(
            queue = %shared.config.endpoint_queue,
            workers = shared.config.workers,
            "Channel opened"
        );

        Ok(Arc::new(Self {
            shared,
            jobs: Mutex::new(Some(jobs_tx)),
            supervisor_stop: Mutex::new(Some(stop_tx)),
            supervisor: Mutex::new(Some(supervisor)),
            workers: Mutex::new(workers),
        }))
    }
}

// ============================================================================
// Channel - Public API
// ============================================================================

impl Channel {
    /// Publishes `body` to `queue` through the default exchange.
    ///
    /// Waits while the channel is reconnecting.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionClosed`] if the channel is closed
    /// - [`Error::Publish`] if the broker rejects the publish
    pub async fn send(&self, queue: &str, body: Vec<u8>) -> Result<()> {
        self.publish(Publish::to_queue(queue, Envelope::new(body)))
            .await
    }

    /// Publishes `body` to `queue` echoing a request's correlation ID.
    ///
    /// # Errors
    ///
    /// Same as [`send`](Self::send).
    pub async fn reply(&self, queue: &str, correlation_id: CorrelationId, body: Vec<u8>) -> Result<()> {
        self.publish(Publish::to_queue(
            queue,
            Envelope::new(body).with_correlation_id(correlation_id),
        ))
        .await
    }

    /// Sends `body` to `queue` and waits for the correlated reply.
    ///
    /// The request carries a fresh correlation ID and a private reply queue
    /// that is deleted afterwards. Replies arriving after the deadline are
    /// dropped.
    ///
    /// # Errors
    ///
    /// - [`Error::RequestTimeout`] if no reply arrives within `timeout`
    /// - [`Error::ConnectionClosed`] if the channel closes first
    /// - [`Error::Publish`] if the request cannot be published
    pub async fn exchange(&self, queue: &str, body: Vec<u8>, timeout: Duration) -> Result<Vec<u8>> {
        let id = CorrelationId::generate();
        let deadline = Instant::now() + timeout;
        let (done, rx) = oneshot::channel();

        self.submit(Job::Exchange {
            id: id.clone(),
            queue: queue.to_string(),
            body,
            deadline,
            timeout,
            done,
        })
        .await?;

        match timeout_at(deadline, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(Error::ConnectionClosed),
            Err(_) => Err(Error::request_timeout(id, millis(timeout))),
        }
    }

    /// Registers a new inbound subscriber.
    #[must_use]
    pub fn subscribe(&self) -> Subscription {
        self.shared.broadcaster.subscribe()
    }

    /// Returns the current state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> ChannelState {
        *self.shared.state_tx.borrow()
    }

    /// Returns a receiver following state changes.
    #[inline]
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<ChannelState> {
        self.shared.state_tx.subscribe()
    }

    /// Returns the number of in-flight exchanges.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.shared.pending.len()
    }

    /// Returns the number of registered subscribers.
    #[inline]
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.shared.broadcaster.len()
    }

    /// Returns the endpoint queue this channel consumes.
    #[inline]
    #[must_use]
    pub fn endpoint_queue(&self) -> &str {
        &self.shared.config.endpoint_queue
    }

    /// Shuts the channel down.
    ///
    /// Pending exchanges fail with [`Error::ConnectionClosed`], queued jobs
    /// are drained while a session is available, the unregistration is
    /// published (best effort, re-dialing once if needed) and every
    /// subscription ends. Calling `close` again is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CloseTimeout`] if the tasks did not stop within
    /// the configured close timeout; they are aborted in that case.
    pub async fn close(&self) -> Result<()> {
        let Some(jobs) = self.jobs.lock().take() else {
            return Ok(());
        };
        drop(jobs);

        info!(queue = %self.shared.config.endpoint_queue, "Closing channel");

        self.shared.shutdown_tx.send_replace(true);
        self.shared.pending.fail_all();

        let workers = std::mem::take(&mut *self.workers.lock());
        let supervisor = self.supervisor.lock().take();
        let stop = self.supervisor_stop.lock().take();

        let aborts: Vec<_> = workers
            .iter()
            .chain(supervisor.iter())
            .map(JoinHandle::abort_handle)
            .collect();

        let quiesce = async move {
            join_all(workers).await;
            if let Some(stop) = stop {
                let _ = stop.send(());
            }
            if let Some(supervisor) = supervisor {
                let _ = supervisor.await;
            }
        };

        let limit = self.shared.config.close_timeout;
        let result = match timeout(limit, quiesce).await {
            Ok(()) => Ok(()),
            Err(_) => {
                for handle in aborts {
                    handle.abort();
                }
                warn!(timeout_ms = millis(limit), "Channel did not close in time");
                Err(Error::close_timeout(millis(limit)))
            }
        };

        self.shared.session_tx.send_replace(None);
        self.shared.state_tx.send_replace(ChannelState::Stopped);
        self.shared.broadcaster.close_all();

        info!(queue = %self.shared.config.endpoint_queue, "Channel closed");
        result
    }
}

// ============================================================================
// Channel - Internal
// ============================================================================

impl Channel {
    async fn publish(&self, publish: Publish) -> Result<()> {
        let (done, rx) = oneshot::channel();
        self.submit(Job::Publish { publish, done }).await?;
        rx.await.map_err(|_| Error::ConnectionClosed)?
    }

    async fn submit(&self, job: Job) -> Result<()> {
        let sender = self.jobs.lock().clone().ok_or(Error::ConnectionClosed)?;
        sender.send(job).await.map_err(|_| Error::ConnectionClosed)
    }
}

// ============================================================================
// Supervisor
// ============================================================================

/// Owns the session: consumes inbound messages, detects loss, reconnects.
async fn supervise(
    shared: Arc<Shared>,
    mut session: Arc<dyn Session>,
    mut stop_rx: oneshot::Receiver<()>,
) {
    loop {
        let lost = tokio::select! {
            result = consume_inbound(&shared, &session) => {
                match result {
                    Ok(()) => debug!("Inbound stream ended"),
                    Err(e) => warn!(error = %e, "Inbound consumer failed"),
                }
                true
            }
            () = session.closed() => true,
            _ = &mut stop_rx => false,
        };

        if !lost {
            break;
        }

        shared.session_tx.send_replace(None);
        shared.state_tx.send_replace(ChannelState::Reconnecting);
        warn!("Broker session lost, reconnecting");
        let _ = session.close().await;

        match reconnect(&shared, &mut stop_rx).await {
            Some(fresh) => {
                session = fresh;
                shared.session_tx.send_replace(Some(Arc::clone(&session)));
                shared.state_tx.send_replace(ChannelState::Running);
                info!("Broker session restored");
            }
            None => {
                unregister(&shared, None).await;
                return;
            }
        }
    }

    shared.session_tx.send_replace(None);
    unregister(&shared, Some(session)).await;
}

/// Redials until a session is established or the channel stops.
async fn reconnect(
    shared: &Shared,
    stop_rx: &mut oneshot::Receiver<()>,
) -> Option<Arc<dyn Session>> {
    let interval = shared.config.retry_interval;
    let mut attempt: u64 = 0;

    loop {
        tokio::select! {
            () = sleep(interval) => {}
            _ = &mut *stop_rx => return None,
        }

        attempt += 1;
        let session = match shared.connector.connect().await {
            Ok(session) => session,
            Err(e) => {
                warn!(attempt, retry_ms = millis(interval), error = %e, "Reconnect failed");
                continue;
            }
        };

        match shared.establish(&session).await {
            Ok(()) => return Some(session),
            Err(e) => {
                warn!(attempt, error = %e, "Topology declaration failed after reconnect");
                let _ = session.close().await;
            }
        }
    }
}

/// Acknowledges and broadcasts every delivery on the endpoint queue.
async fn consume_inbound(shared: &Shared, session: &Arc<dyn Session>) -> Result<()> {
    let mut deliveries = session.consume(&shared.config.endpoint_queue).await?;

    while let Some(item) = deliveries.next().await {
        let (envelope, ack) = item?.ack().await;
        if let Err(e) = ack {
            warn!(error = %e, "Failed to acknowledge delivery");
        }

        trace!(bytes = envelope.data.len(), "Inbound message");
        shared.broadcaster.deliver(&envelope).await;
    }

    Ok(())
}

/// Publishes the unregistration, re-dialing once if the session is gone.
async fn unregister(shared: &Shared, mut session: Option<Arc<dyn Session>>) {
    let Some(registration) = &shared.config.registration else {
        if let Some(session) = session {
            let _ = session.close().await;
        }
        return;
    };

    for attempt in 1..=UNREGISTER_ATTEMPTS {
        let current = match session.take() {
            Some(current) => current,
            None => match shared.connector.connect().await {
                Ok(fresh) => fresh,
                Err(e) => {
                    warn!(attempt, error = %e, "Unregister dial failed");
                    continue;
                }
            },
        };

        let result = current
            .publish(Publish::to_queue(
                &registration.unregister_queue,
                Envelope::new(registration.payload.clone()),
            ))
            .await;
        let _ = current.close().await;

        match result {
            Ok(()) => {
                info!(queue = %registration.unregister_queue, "Endpoint unregistered");
                return;
            }
            Err(e) => warn!(attempt, error = %e, "Unregister publish failed"),
        }
    }

    warn!("Endpoint left registered");
}

// ============================================================================
// Workers
// ============================================================================

/// Takes jobs while a session is published.
async fn run_worker(shared: Arc<Shared>, jobs: Arc<AsyncMutex<mpsc::Receiver<Job>>>) {
    let mut session_rx = shared.session_tx.subscribe();
    let mut shutdown_rx = shared.shutdown_tx.subscribe();

    loop {
        let Some(session) = wait_for_session(&mut session_rx, &mut shutdown_rx).await else {
            break;
        };

        let job = {
            let mut jobs = jobs.lock().await;
            // A session change wins over a ready job so nothing is
            // published on a session that was just lost.
            tokio::select! {
                biased;
                _ = session_rx.changed() => continue,
                job = jobs.recv() => job,
            }
        };

        let Some(job) = job else {
            break;
        };

        run_job(&shared, &session, job).await;
    }

    trace!("Worker stopped");
}

/// Returns the live session, or `None` once the channel shuts down without
/// one.
async fn wait_for_session(
    session_rx: &mut watch::Receiver<SessionSlot>,
    shutdown_rx: &mut watch::Receiver<bool>,
) -> Option<Arc<dyn Session>> {
    loop {
        let current = session_rx.borrow_and_update().clone();
        if current.is_some() {
            return current;
        }
        if *shutdown_rx.borrow() {
            return None;
        }

        tokio::select! {
            changed = session_rx.changed() => {
                if changed.is_err() {
                    return None;
                }
            }
            _ = shutdown_rx.changed() => {}
        }
    }
}

async fn run_job(shared: &Shared, session: &Arc<dyn Session>, job: Job) {
    match job {
        Job::Publish { publish, done } => {
            let queue = publish.routing_key.clone();
            let result = session.publish(publish).await;
            match &result {
                Ok(()) => trace!(queue = %queue, "Published"),
                Err(e) => warn!(queue = %queue, error = %e, "Publish failed"),
            }
            let _ = done.send(result);
        }
        Job::Exchange {
            id,
            queue,
            body,
            deadline,
            timeout,
            done,
        } => {
            let result = if shared.is_shutting_down() {
                Err(Error::ConnectionClosed)
            } else if Instant::now() >= deadline {
                Err(Error::request_timeout(id, millis(timeout)))
            } else {
                exchange_on(shared, session, id, &queue, body, deadline, timeout).await
            };
            let _ = done.send(result);
        }
    }
}

/// Runs one exchange on a private reply queue.
async fn exchange_on(
    shared: &Shared,
    session: &Arc<dyn Session>,
    id: CorrelationId,
    queue: &str,
    body: Vec<u8>,
    deadline: Instant,
    timeout: Duration,
) -> Result<Vec<u8>> {
    let reply_queue = session.declare_reply_queue().await?;

    let result = async {
        let mut replies = session.consume(&reply_queue).await?;
        let (mut slot, guard) = shared.pending.register(id, &reply_queue, deadline)?;
        if shared.is_shutting_down() {
            return Err(Error::ConnectionClosed);
        }

        session
            .publish(Publish::to_queue(
                queue,
                Envelope::new(body)
                    .with_correlation_id(guard.id().clone())
                    .with_reply_to(&reply_queue),
            ))
            .await?;

        debug!(correlation_id = %guard.id(), queue, "Exchange request published");

        let waited = timeout_at(deadline, async {
            loop {
                tokio::select! {
                    outcome = &mut slot => {
                        return outcome.unwrap_or(Err(Error::ConnectionClosed));
                    }
                    delivery = replies.next() => match delivery {
                        Some(Ok(delivery)) => {
                            let (envelope, ack) = delivery.ack().await;
                            if let Err(e) = ack {
                                warn!(error = %e, "Failed to acknowledge reply");
                            }
                            match envelope.correlation_id {
                                Some(reply_id) => {
                                    shared.pending.resolve(&reply_id, envelope.data);
                                }
                                None => warn!(queue = %reply_queue, "Reply without correlation ID, dropped"),
                            }
                        }
                        Some(Err(e)) => return Err(e),
                        None => return Err(Error::ConnectionClosed),
                    }
                }
            }
        })
        .await;

        match waited {
            Ok(result) => result,
            Err(_) => {
                warn!(correlation_id = %guard.id(), queue, "Exchange timed out");
                Err(Error::request_timeout(guard.id().clone(), millis(timeout)))
            }
        }
    }
    .await;

    if let Err(e) = session.delete_queue(&reply_queue).await {
        debug!(queue = %reply_queue, error = %e, "Failed to delete reply queue");
    }

    result
}

// ============================================================================
// Helpers
// ============================================================================

#[inline]
pub(super) fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Registration;
    use crate::transport::MemoryBroker;
    use crate::transport::broker::DeliveryStream;

    const ENDPOINT: &str = "vnfm-test";
    const ACTIONS: &str = "manager-inbound-actions";

    fn config() -> ChannelConfig {
        ChannelConfig::new(ENDPOINT)
            .with_workers(2)
            .with_retry_interval(Duration::from_millis(20))
            .with_close_timeout(Duration::from_secs(2))
            .with_subscriber_grace(Duration::from_millis(50))
            .with_registration(Registration {
                register_queue: "manager-register".into(),
                unregister_queue: "manager-unregister".into(),
                payload: b"endpoint".to_vec(),
            })
    }

    fn broker() -> MemoryBroker {
        MemoryBroker::with_queues(&["manager-register", "manager-unregister", ACTIONS])
    }

    async fn open(broker: &MemoryBroker) -> Arc<Channel> {
        Channel::open(Arc::new(broker.clone()), config())
            .await
            .expect("open")
    }

    /// Answers every request on `ACTIONS` with `reply:<body>`.
    fn spawn_echo(broker: &MemoryBroker) -> JoinHandle<()> {
        let broker = broker.clone();
        tokio::spawn(async move {
            while let Some(request) = broker.next_message(ACTIONS).await {
                let mut reply = b"reply:".to_vec();
                reply.extend_from_slice(&request.data);
                let mut envelope = Envelope::new(reply);
                envelope.correlation_id = request.correlation_id;
                if let Some(reply_to) = request.reply_to {
                    broker.publish(&reply_to, envelope);
                }
            }
        })
    }

    #[tokio::test]
    async fn test_open_registers_endpoint() {
        let broker = broker();
        let channel = open(&broker).await;

        let registration = broker.next_message("manager-register").await.expect("registration");
        assert_eq!(registration.data, b"endpoint");
        assert!(broker.has_queue(ENDPOINT));
        assert_eq!(channel.state(), ChannelState::Running);

        channel.close().await.expect("close");
    }

    #[tokio::test]
    async fn test_open_fails_when_broker_offline() {
        let broker = broker();
        broker.set_online(false);
        let result = Channel::open(Arc::new(broker), config()).await;
        assert!(matches!(result, Err(Error::Connection { .. })));
    }

    #[tokio::test]
    async fn test_open_rejects_invalid_config() {
        let result = Channel::open(Arc::new(broker()), ChannelConfig::default()).await;
        assert!(matches!(result, Err(Error::Config { .. })));
    }

    #[tokio::test]
    async fn test_send_publishes_to_queue() {
        let broker = broker();
        broker.declare_queue("target");
        let channel = open(&broker).await;

        channel.send("target", b"hello".to_vec()).await.expect("send");
        let message = broker.next_message("target").await.expect("message");
        assert_eq!(message.data, b"hello");
        assert!(message.correlation_id.is_none());

        channel.close().await.expect("close");
    }

    #[tokio::test]
    async fn test_reply_carries_correlation_id() {
        let broker = broker();
        broker.declare_queue("caller");
        let channel = open(&broker).await;

        let id = CorrelationId::from_wire("abc");
        channel.reply("caller", id.clone(), b"{}".to_vec()).await.expect("reply");
        let message = broker.next_message("caller").await.expect("message");
        assert_eq!(message.correlation_id, Some(id));

        channel.close().await.expect("close");
    }

    #[tokio::test]
    async fn test_exchange_round_trip() {
        let broker = broker();
        let echo = spawn_echo(&broker);
        let channel = open(&broker).await;

        let reply = channel
            .exchange(ACTIONS, b"ping".to_vec(), Duration::from_secs(2))
            .await
            .expect("exchange");
        assert_eq!(reply, b"reply:ping");
        assert_eq!(channel.pending_count(), 0);

        channel.close().await.expect("close");
        echo.abort();
    }

    #[tokio::test]
    async fn test_exchange_ids_are_unique_hex() {
        let broker = broker();
        let channel = open(&broker).await;

        let first = Arc::clone(&channel);
        let a = tokio::spawn(async move {
            first.exchange(ACTIONS, b"a".to_vec(), Duration::from_millis(300)).await
        });
        let second = Arc::clone(&channel);
        let b = tokio::spawn(async move {
            second.exchange(ACTIONS, b"b".to_vec(), Duration::from_millis(300)).await
        });

        let one = broker.next_message(ACTIONS).await.expect("one");
        let two = broker.next_message(ACTIONS).await.expect("two");
        let one_id = one.correlation_id.expect("id");
        let two_id = two.correlation_id.expect("id");

        assert_ne!(one_id, two_id);
        for id in [&one_id, &two_id] {
            assert_eq!(id.as_str().len(), 32);
            assert!(id.as_str().chars().all(|c| c.is_ascii_hexdigit()));
        }

        let _ = a.await;
        let _ = b.await;
        channel.close().await.expect("close");
    }

    #[tokio::test]
    async fn test_exchange_timeout_leaves_nothing_behind() {
        let broker = broker();
        let channel = open(&broker).await;

        let err = channel
            .exchange(ACTIONS, b"void".to_vec(), Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(err.is_timeout());

        let request = broker.next_message(ACTIONS).await.expect("request");
        let reply_queue = request.reply_to.expect("reply queue");

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(channel.pending_count(), 0);
        assert!(!broker.has_queue(&reply_queue));

        channel.close().await.expect("close");
    }

    #[tokio::test]
    async fn test_inbound_messages_are_broadcast() {
        let broker = broker();
        let channel = open(&broker).await;
        let mut a = channel.subscribe();
        let mut b = channel.subscribe();
        assert_eq!(channel.subscriber_count(), 2);

        broker.publish(ENDPOINT, Envelope::new(b"event".to_vec()));
        assert_eq!(a.recv().await.expect("a").data, b"event");
        assert_eq!(b.recv().await.expect("b").data, b"event");

        channel.close().await.expect("close");
        assert!(a.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_ack_failure_does_not_stop_consumer() {
        let broker = broker();
        broker.set_fail_acks(true);
        let channel = open(&broker).await;
        let mut sub = channel.subscribe();

        broker.publish(ENDPOINT, Envelope::new(b"1".to_vec()));
        broker.publish(ENDPOINT, Envelope::new(b"2".to_vec()));
        assert_eq!(sub.recv().await.expect("1").data, b"1");
        assert_eq!(sub.recv().await.expect("2").data, b"2");

        channel.close().await.expect("close");
    }

    #[tokio::test]
    async fn test_reconnects_and_registers_again() {
        let broker = broker();
        let channel = open(&broker).await;
        let mut states = channel.watch_state();
        broker.next_message("manager-register").await.expect("first registration");

        broker.set_online(false);
        broker.sever();
        states
            .wait_for(|state| *state == ChannelState::Reconnecting)
            .await
            .expect("reconnecting");

        broker.set_online(true);
        states
            .wait_for(|state| *state == ChannelState::Running)
            .await
            .expect("running");

        broker.next_message("manager-register").await.expect("second registration");
        assert!(broker.connect_count() >= 2);

        channel.close().await.expect("close");
    }

    #[tokio::test]
    async fn test_close_unregisters_and_stops() {
        let broker = broker();
        let channel = open(&broker).await;

        channel.close().await.expect("close");
        assert_eq!(channel.state(), ChannelState::Stopped);

        let message = broker.next_message("manager-unregister").await.expect("unregister");
        assert_eq!(message.data, b"endpoint");

        let err = channel.send("x", Vec::new()).await.unwrap_err();
        assert!(matches!(err, Error::ConnectionClosed));
        assert!(channel.close().await.is_ok());
    }

    #[tokio::test]
    async fn test_close_fails_pending_exchange() {
        let broker = broker();
        let channel = open(&broker).await;

        let waiting = Arc::clone(&channel);
        let exchange = tokio::spawn(async move {
            waiting.exchange(ACTIONS, b"x".to_vec(), Duration::from_secs(10)).await
        });

        broker.next_message(ACTIONS).await.expect("request");
        channel.close().await.expect("close");

        let result = exchange.await.expect("join");
        assert!(matches!(result, Err(Error::ConnectionClosed)));
    }

    #[test]
    fn test_millis_saturates() {
        assert_eq!(millis(Duration::from_millis(1500)), 1500);
        assert_eq!(millis(Duration::MAX), u64::MAX);
    }

    /// Broker whose reply queues take a while to declare.
    struct SlowReplyQueues {
        broker: MemoryBroker,
        delay: Duration,
    }

    struct SlowSession {
        inner: Arc<dyn Session>,
        delay: Duration,
    }

    #[async_trait::async_trait]
    impl Connector for SlowReplyQueues {
        async fn connect(&self) -> Result<Arc<dyn Session>> {
            Ok(Arc::new(SlowSession {
                inner: self.broker.connect().await?,
                delay: self.delay,
            }))
        }
    }

    #[async_trait::async_trait]
    impl Session for SlowSession {
        async fn declare(&self, topology: &Topology) -> Result<()> {
            self.inner.declare(topology).await
        }

        async fn publish(&self, publish: Publish) -> Result<()> {
            self.inner.publish(publish).await
        }

        async fn declare_reply_queue(&self) -> Result<String> {
            sleep(self.delay).await;
            self.inner.declare_reply_queue().await
        }

        async fn consume(&self, queue: &str) -> Result<DeliveryStream> {
            self.inner.consume(queue).await
        }

        async fn delete_queue(&self, queue: &str) -> Result<()> {
            self.inner.delete_queue(queue).await
        }

        async fn closed(&self) {
            self.inner.closed().await;
        }

        async fn close(&self) -> Result<()> {
            self.inner.close().await
        }
    }

    #[tokio::test]
    async fn test_close_during_reply_queue_declare() {
        let broker = broker();
        let connector = SlowReplyQueues {
            broker: broker.clone(),
            delay: Duration::from_millis(200),
        };
        let channel = Channel::open(Arc::new(connector), config()).await.expect("open");

        let waiting = Arc::clone(&channel);
        let exchange = tokio::spawn(async move {
            waiting.exchange(ACTIONS, b"x".to_vec(), Duration::from_secs(5)).await
        });

        sleep(Duration::from_millis(50)).await;
        let started = Instant::now();
        channel.close().await.expect("close");
        assert!(started.elapsed() < Duration::from_secs(1));

        let result = exchange.await.expect("join");
        assert!(matches!(result, Err(Error::ConnectionClosed)));
        assert_eq!(channel.pending_count(), 0);
        assert!(broker.try_next_message(ACTIONS).is_none());
    }
}
