//! AMQP runtime for ETSI-MANO VNF managers and VIM-driver plugins.
//!
//! This library lets a VNF Manager (VNFM) or a VIM driver talk to an NFV
//! Orchestrator (NFVO) over a RabbitMQ broker.
//!
//! # Architecture
//!
//! Three layers, each usable on its own:
//!
//! - **Codec** ([`protocol`]): flat JSON envelopes whose `action` and sender
//!   select a typed [`Payload`]
//! - **Transport** ([`transport`]): a supervised [`Channel`] that reconnects
//!   forever, publishes, runs correlated request/reply exchanges and fans
//!   inbound messages out to subscribers
//! - **Lifecycle** ([`manager`]): a [`Dispatcher`] worker pool that turns
//!   orchestrator messages into [`Handler`] calls and replies
//!
//! The [`plugin`] module serves VIM-driver calls on the same transport.
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use vnfm_amqp::{Manager, ManagerConfig, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let manager = Manager::builder()
//!         .config(ManagerConfig::new("dummy").with_description("dummy VNFM"))
//!         .handler(Arc::new(MyHandler))
//!         .start()
//!         .await?;
//!
//!     tokio::signal::ctrl_c().await.ok();
//!     manager.stop().await
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`catalogue`] | NFV records, descriptors and VIM types |
//! | [`config`] | Runtime configuration |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Correlation, subscriber and worker IDs |
//! | [`manager`] | VNF manager: [`Manager`], [`Dispatcher`], [`Handler`] |
//! | [`plugin`] | VIM-driver plugin: [`Plugin`], [`Driver`] |
//! | [`protocol`] | Messages and wire codec |
//! | [`transport`] | Broker seam and [`Channel`] |

// ============================================================================
// Modules
// ============================================================================

/// NFV data model subset.
pub mod catalogue;

/// Runtime configuration.
///
/// Every struct deserializes with defaults and validates itself.
pub mod config;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers.
pub mod identifiers;

/// VNF manager runtime.
pub mod manager;

/// VIM-driver plugin runtime.
pub mod plugin;

/// Lifecycle protocol messages and codec.
pub mod protocol;

/// Broker transport.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Configuration types
pub use config::{BrokerConfig, ChannelConfig, DispatcherConfig, ManagerConfig, PluginConfig};

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::{CorrelationId, SubscriberId, WorkerId};

// Manager types
pub use manager::{Dispatcher, Handler, Manager, ManagerBuilder, ManagerEndpoint, Scripts};

// Plugin types
pub use plugin::{Driver, LaunchRequest, Plugin, PluginRequest, PluginResponse};

// Protocol types
pub use protocol::{Action, Message, Payload, SenderType, Shape, decode, encode};

// Transport types
pub use transport::{AmqpConnector, Channel, ChannelState, Connector, MemoryBroker, Subscription};
