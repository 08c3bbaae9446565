//! Broker abstraction used by the channel.
//!
//! A [`Connector`] dials the broker and yields a [`Session`]; the session
//! performs the handful of AMQP operations the channel needs. Two
//! implementations ship with the crate:
//!
//! | Implementation | Description |
//! |----------------|-------------|
//! | [`AmqpConnector`](super::AmqpConnector) | RabbitMQ through `lapin` |
//! | [`MemoryBroker`](super::MemoryBroker) | In-process broker for tests and local runs |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::BoxStream;

use crate::error::Result;
use crate::identifiers::CorrelationId;

// ============================================================================
// Types
// ============================================================================

/// Stream of deliveries from one queue.
///
/// The stream ends when the session is lost or closed.
pub type DeliveryStream = BoxStream<'static, Result<Delivery>>;

// ============================================================================
// Topology
// ============================================================================

/// Exchange, queue and binding declared on every (re)connect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topology {
    /// Topic exchange, declared durable.
    pub exchange: String,
    /// Queue to declare and bind.
    pub queue: String,
    /// Declare the queue durable.
    pub durable: bool,
    /// Delete the queue once unused.
    pub auto_delete: bool,
}

impl Topology {
    /// Routing key of the binding; the queue name.
    #[inline]
    #[must_use]
    pub fn routing_key(&self) -> &str {
        &self.queue
    }
}

// ============================================================================
// Envelope
// ============================================================================

/// Message body plus the AMQP properties the protocol uses.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Envelope {
    /// Raw body.
    pub data: Vec<u8>,
    /// `correlation_id` property.
    pub correlation_id: Option<CorrelationId>,
    /// `reply_to` property.
    pub reply_to: Option<String>,
}

impl Envelope {
    /// Creates an envelope without properties.
    #[inline]
    #[must_use]
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data,
            ..Self::default()
        }
    }

    /// Sets the correlation ID.
    #[inline]
    #[must_use]
    pub fn with_correlation_id(mut self, id: CorrelationId) -> Self {
        self.correlation_id = Some(id);
        self
    }

    /// Sets the reply queue.
    #[inline]
    #[must_use]
    pub fn with_reply_to(mut self, queue: impl Into<String>) -> Self {
        self.reply_to = Some(queue.into());
        self
    }
}

// ============================================================================
// Publish
// ============================================================================

/// An outgoing publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Publish {
    /// Exchange; empty for the default exchange.
    pub exchange: String,
    /// Routing key; the queue name on the default exchange.
    pub routing_key: String,
    /// Body and properties.
    pub envelope: Envelope,
}

impl Publish {
    /// Publishes `envelope` straight to `queue` through the default exchange.
    #[inline]
    #[must_use]
    pub fn to_queue(queue: impl Into<String>, envelope: Envelope) -> Self {
        Self {
            exchange: String::new(),
            routing_key: queue.into(),
            envelope,
        }
    }
}

// ============================================================================
// Delivery
// ============================================================================

/// Acknowledges one delivery.
#[async_trait]
pub trait Acker: Send + Sync {
    /// Sends the acknowledgement.
    async fn ack(&self) -> Result<()>;
}

/// A consumed message awaiting acknowledgement.
pub struct Delivery {
    /// Body and properties.
    pub envelope: Envelope,
    /// Acknowledgement handle.
    acker: Box<dyn Acker>,
}

impl Delivery {
    /// Creates a delivery.
    #[must_use]
    pub fn new(envelope: Envelope, acker: Box<dyn Acker>) -> Self {
        Self { envelope, acker }
    }

    /// Acknowledges the delivery, returning its envelope.
    ///
    /// The envelope is returned even if the acknowledgement fails.
    pub async fn ack(self) -> (Envelope, Result<()>) {
        let result = self.acker.ack().await;
        (self.envelope, result)
    }
}

impl fmt::Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delivery")
            .field("envelope", &self.envelope)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Session
// ============================================================================

/// A live broker session.
///
/// Sessions are shared between the supervisor and the workers; every method
/// takes `&self`.
#[async_trait]
pub trait Session: Send + Sync {
    /// Declares the exchange and queue and binds them.
    async fn declare(&self, topology: &Topology) -> Result<()>;

    /// Publishes one message.
    async fn publish(&self, publish: Publish) -> Result<()>;

    /// Declares a private, exclusive reply queue with a broker-chosen name.
    async fn declare_reply_queue(&self) -> Result<String>;

    /// Starts consuming `queue`.
    async fn consume(&self, queue: &str) -> Result<DeliveryStream>;

    /// Deletes `queue`.
    async fn delete_queue(&self, queue: &str) -> Result<()>;

    /// Resolves once the session is lost or closed.
    async fn closed(&self);

    /// Closes the session.
    async fn close(&self) -> Result<()>;
}

// ============================================================================
// Connector
// ============================================================================

/// Dials the broker.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Opens a new session.
    async fn connect(&self) -> Result<Arc<dyn Session>>;
}
