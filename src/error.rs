//! Error types for the VNFM runtime.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use vnfm_amqp::{Result, Error};
//!
//! async fn example(channel: &Channel) -> Result<()> {
//!     channel.send("manager-inbound-actions-reply", b"{}".to_vec()).await?;
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`] |
//! | Transport | [`Error::Connection`], [`Error::ConnectionClosed`], [`Error::Publish`], [`Error::RequestTimeout`], [`Error::CloseTimeout`] |
//! | Protocol | [`Error::MalformedMessage`], [`Error::UnexpectedPayload`], [`Error::Protocol`] |
//! | Business | [`Error::Handler`], [`Error::Orchestrator`] |
//! | External | [`Error::Json`], [`Error::Amqp`], [`Error::ChannelClosed`] |

// ============================================================================
// Imports
// ============================================================================

use std::result::Result as StdResult;

use thiserror::Error;
use tokio::sync::oneshot::error::RecvError;

use crate::identifiers::CorrelationId;
use crate::protocol::Action;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Each variant includes relevant context for debugging.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when runtime configuration is invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    // ========================================================================
    // Transport Errors
    // ========================================================================
    /// Broker connection failed.
    ///
    /// Returned when the broker cannot be dialed or the topology cannot be
    /// declared.
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// Broker connection closed.
    ///
    /// Returned when the channel is shut down or the session was lost
    /// while an operation was in flight.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Publish to a queue failed.
    #[error("Publish to '{queue}' failed: {message}")]
    Publish {
        /// Target queue (routing key).
        queue: String,
        /// Description of the failure.
        message: String,
    },

    /// RPC exchange timed out waiting for its reply.
    #[error("Exchange {correlation_id} timed out after {timeout_ms}ms")]
    RequestTimeout {
        /// Correlation ID of the abandoned exchange.
        correlation_id: CorrelationId,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// Shutdown did not quiesce in time.
    #[error("Close timed out after {timeout_ms}ms")]
    CloseTimeout {
        /// Milliseconds waited before giving up.
        timeout_ms: u64,
    },

    // ========================================================================
    // Protocol Errors
    // ========================================================================
    /// Envelope could not be decoded.
    ///
    /// Returned when the `action` field is missing or the body does not
    /// match the shape selected for it.
    #[error("Malformed message: {message}")]
    MalformedMessage {
        /// Description of the decoding failure.
        message: String,
    },

    /// A reply carried a payload other than the one the flow expects.
    #[error("Unexpected payload for {action}: expected {expected}")]
    UnexpectedPayload {
        /// Action of the payload that was received.
        action: Action,
        /// Name of the payload shape that was expected.
        expected: &'static str,
    },

    /// Protocol violation.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Description of the protocol violation.
        message: String,
    },

    // ========================================================================
    // Business Errors
    // ========================================================================
    /// Error returned by a handler or driver implementation.
    #[error("Handler error: {message}")]
    Handler {
        /// Message reported by the implementation.
        message: String,
    },

    /// Error reported by the orchestrator (ERROR reply or refused grant).
    #[error("Orchestrator error: {message}")]
    Orchestrator {
        /// Description of the refusal.
        message: String,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// AMQP client error.
    #[error("AMQP error: {0}")]
    Amqp(#[from] lapin::Error),

    /// Channel receive error.
    #[error("Channel closed")]
    ChannelClosed(#[from] RecvError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a publish error.
    #[inline]
    pub fn publish(queue: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Publish {
            queue: queue.into(),
            message: message.into(),
        }
    }

    /// Creates a request timeout error.
    #[inline]
    pub fn request_timeout(correlation_id: CorrelationId, timeout_ms: u64) -> Self {
        Self::RequestTimeout {
            correlation_id,
            timeout_ms,
        }
    }

    /// Creates a close timeout error.
    #[inline]
    pub fn close_timeout(timeout_ms: u64) -> Self {
        Self::CloseTimeout { timeout_ms }
    }

    /// Creates a malformed message error.
    #[inline]
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedMessage {
            message: message.into(),
        }
    }

    /// Creates an unexpected payload error.
    #[inline]
    pub fn unexpected_payload(action: Action, expected: &'static str) -> Self {
        Self::UnexpectedPayload { action, expected }
    }

    /// Creates a protocol error.
    #[inline]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Creates a handler error.
    #[inline]
    pub fn handler(message: impl Into<String>) -> Self {
        Self::Handler {
            message: message.into(),
        }
    }

    /// Creates an orchestrator error.
    #[inline]
    pub fn orchestrator(message: impl Into<String>) -> Self {
        Self::Orchestrator {
            message: message.into(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::RequestTimeout { .. } | Self::CloseTimeout { .. }
        )
    }

    /// Returns `true` if this is a transport error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. }
                | Self::ConnectionClosed
                | Self::Publish { .. }
                | Self::Amqp(_)
        )
    }

    /// Returns `true` if this error is a protocol violation.
    #[inline]
    #[must_use]
    pub fn is_protocol_error(&self) -> bool {
        matches!(
            self,
            Self::MalformedMessage { .. } | Self::UnexpectedPayload { .. } | Self::Protocol { .. }
        )
    }

    /// Returns `true` if this error is recoverable.
    ///
    /// Recoverable errors may succeed when the caller re-issues the operation.
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::RequestTimeout { .. } | Self::ConnectionClosed | Self::Publish { .. }
        )
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::connection("broker unreachable");
        assert_eq!(err.to_string(), "Connection failed: broker unreachable");
    }

    #[test]
    fn test_publish_error_display() {
        let err = Error::publish("manager-register", "channel closed");
        assert_eq!(
            err.to_string(),
            "Publish to 'manager-register' failed: channel closed"
        );
    }

    #[test]
    fn test_is_timeout() {
        let timeout_err = Error::request_timeout(CorrelationId::generate(), 5000);
        let close_err = Error::close_timeout(1000);
        let other_err = Error::connection("test");

        assert!(timeout_err.is_timeout());
        assert!(close_err.is_timeout());
        assert!(!other_err.is_timeout());
    }

    #[test]
    fn test_is_connection_error() {
        assert!(Error::connection("test").is_connection_error());
        assert!(Error::ConnectionClosed.is_connection_error());
        assert!(Error::publish("q", "x").is_connection_error());
        assert!(!Error::config("test").is_connection_error());
    }

    #[test]
    fn test_is_protocol_error() {
        assert!(Error::malformed("no action").is_protocol_error());
        assert!(Error::unexpected_payload(Action::Instantiate, "OrGrant").is_protocol_error());
        assert!(!Error::handler("boom").is_protocol_error());
    }

    #[test]
    fn test_is_recoverable() {
        let timeout_err = Error::request_timeout(CorrelationId::generate(), 1000);
        let config_err = Error::config("test");

        assert!(timeout_err.is_recoverable());
        assert!(!config_err.is_recoverable());
    }

    #[test]
    fn test_unexpected_payload_display() {
        let err = Error::unexpected_payload(Action::GrantOperation, "OrGrant");
        assert_eq!(
            err.to_string(),
            "Unexpected payload for GRANT_OPERATION: expected OrGrant"
        );
    }

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<String>("invalid").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Json(_)));
    }
}
