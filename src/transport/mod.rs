//! Broker transport.
//!
//! A [`Channel`] owns one supervised broker session, a pool of I/O workers
//! and the fan-out of inbound messages. The broker itself sits behind the
//! [`Connector`] and [`Session`] traits so the same channel runs on
//! RabbitMQ ([`AmqpConnector`]) or in-process ([`MemoryBroker`]).
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐                          ┌──────────────────┐
//! │  Channel         │         AMQP 0-9-1       │  Broker          │
//! │                  │                          │                  │
//! │  workers ────────┼── publish / exchange ───►│  topic exchange  │
//! │  supervisor ◄────┼──── endpoint queue ──────│  endpoint queue  │
//! │  broadcaster     │                          │  reply queues    │
//! └──────────────────┘                          └──────────────────┘
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `broker` | Session and connector seam, envelopes, deliveries |
//! | `amqp` | `lapin` implementation of the seam |
//! | `memory` | In-process broker for tests and demos |
//! | `channel` | Supervisor, worker pool and exchange correlation |
//! | `broadcast` | Inbound fan-out to subscribers |
//! | `correlation` | Table of in-flight exchanges |

// ============================================================================
// Submodules
// ============================================================================

/// RabbitMQ connector.
pub mod amqp;

/// Broker seam.
pub mod broker;

/// Supervised channel.
pub mod channel;

/// In-process broker.
pub mod memory;

mod broadcast;
mod correlation;

// ============================================================================
// Re-exports
// ============================================================================

pub use amqp::AmqpConnector;
pub use broadcast::Subscription;
pub use broker::{
    Acker, Connector, Delivery, DeliveryStream, Envelope, Publish, Session, Topology,
};
pub use channel::{Channel, ChannelState};
pub use memory::MemoryBroker;
