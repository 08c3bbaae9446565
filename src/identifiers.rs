//! Type-safe identifiers used across the runtime.
//!
//! Newtype wrappers prevent mixing incompatible IDs at compile time.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`CorrelationId`] | RPC correlation ID carried in AMQP properties |
//! | [`SubscriberId`] | Broadcast subscription handle |
//! | [`WorkerId`] | Index of a pool worker, used in log context |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// CorrelationId
// ============================================================================

/// Correlation ID pairing an RPC request with its reply.
///
/// Generated IDs are 32 lowercase hexadecimal characters (a v4 UUID without
/// hyphens). IDs received from the broker are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(String);

impl CorrelationId {
    /// Generates a fresh collision-resistant correlation ID.
    #[inline]
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Wraps an ID received from the wire.
    #[inline]
    #[must_use]
    pub fn from_wire(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the ID as a string slice.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// SubscriberId
// ============================================================================

/// Global counter for subscriber IDs.
static NEXT_SUBSCRIBER_ID: AtomicU64 = AtomicU64::new(1);

/// Handle identifying one broadcast subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Allocates the next subscriber ID.
    #[inline]
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_SUBSCRIBER_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw value.
    #[inline]
    #[must_use]
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// WorkerId
// ============================================================================

/// Index of a worker inside a fixed-size pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorkerId(usize);

impl WorkerId {
    /// Creates a worker ID from its pool index.
    #[inline]
    #[must_use]
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    /// Returns the pool index.
    #[inline]
    #[must_use]
    pub const fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_correlation_id_is_32_hex_chars() {
        let id = CorrelationId::generate();
        assert_eq!(id.as_str().len(), 32);
        assert!(id.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_correlation_ids_are_unique() {
        let a = CorrelationId::generate();
        let b = CorrelationId::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn test_correlation_id_from_wire_verbatim() {
        let id = CorrelationId::from_wire("amq.rabbitmq.reply-to.abc");
        assert_eq!(id.to_string(), "amq.rabbitmq.reply-to.abc");
    }

    #[test]
    fn test_subscriber_ids_increase() {
        let a = SubscriberId::next();
        let b = SubscriberId::next();
        assert!(b.as_u64() > a.as_u64());
    }

    #[test]
    fn test_worker_id_display() {
        assert_eq!(WorkerId::new(3).to_string(), "3");
        assert_eq!(WorkerId::new(3).index(), 3);
    }
}
