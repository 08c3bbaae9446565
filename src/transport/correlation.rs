//! Table of in-flight exchanges keyed by correlation ID.
//!
//! Each exchange registers a slot before publishing its request. The slot is
//! resolved at most once: by the matching reply, by the caller giving up at
//! its deadline, or by shutdown. The entry leaves the table on every one of
//! those paths; [`PendingGuard`] removes it even if the waiting task is
//! cancelled. Once [`PendingExchanges::fail_all`] has run the table is
//! closed and refuses new registrations.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::identifiers::CorrelationId;

// ============================================================================
// Constants
// ============================================================================

/// Maximum in-flight exchanges before new ones are rejected.
pub(crate) const MAX_PENDING_EXCHANGES: usize = 1024;

// ============================================================================
// Types
// ============================================================================

/// Slot resolved with the reply body.
pub(crate) type ReplySlot = oneshot::Sender<Result<Vec<u8>>>;

// ============================================================================
// PendingExchange
// ============================================================================

/// One in-flight exchange.
struct PendingExchange {
    /// Private queue the reply is expected on.
    reply_queue: String,
    /// Time after which the caller stops waiting.
    deadline: Instant,
    /// Completion slot.
    slot: ReplySlot,
}

// ============================================================================
// PendingExchanges
// ============================================================================

/// Shared correlation table.
#[derive(Default)]
pub(crate) struct PendingExchanges {
    entries: Mutex<Entries>,
}

#[derive(Default)]
struct Entries {
    map: FxHashMap<CorrelationId, PendingExchange>,
    /// Set by `fail_all`; no exchange registers afterwards.
    closed: bool,
}

impl PendingExchanges {
    /// Registers an exchange and returns the receiving end of its slot.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] once the table was failed on
    /// shutdown, and [`Error::Protocol`] if too many exchanges are in flight
    /// or the ID is already registered.
    pub(crate) fn register(
        self: &Arc<Self>,
        id: CorrelationId,
        reply_queue: impl Into<String>,
        deadline: Instant,
    ) -> Result<(oneshot::Receiver<Result<Vec<u8>>>, PendingGuard)> {
        let mut guarded = self.entries.lock();

        if guarded.closed {
            debug!(correlation_id = %id, "Exchange registered after shutdown");
            return Err(Error::ConnectionClosed);
        }

        let entries = &mut guarded.map;
        if entries.len() >= MAX_PENDING_EXCHANGES {
            warn!(
                pending = entries.len(),
                max = MAX_PENDING_EXCHANGES,
                "Too many pending exchanges"
            );
            return Err(Error::protocol(format!(
                "Too many pending exchanges: {}/{}",
                entries.len(),
                MAX_PENDING_EXCHANGES
            )));
        }

        if entries.contains_key(&id) {
            return Err(Error::protocol(format!("Duplicate correlation ID {id}")));
        }

        let (slot, rx) = oneshot::channel();
        entries.insert(
            id.clone(),
            PendingExchange {
                reply_queue: reply_queue.into(),
                deadline,
                slot,
            },
        );

        let guard = PendingGuard {
            table: Arc::clone(self),
            id,
        };

        Ok((rx, guard))
    }

    /// Completes the exchange registered under `id`.
    ///
    /// Returns `false` (and logs) if no such exchange is pending, which is
    /// the case for late replies.
    pub(crate) fn resolve(&self, id: &CorrelationId, body: Vec<u8>) -> bool {
        let entry = self.entries.lock().map.remove(id);

        match entry {
            Some(pending) => {
                if Instant::now() > pending.deadline {
                    debug!(
                        correlation_id = %id,
                        reply_queue = %pending.reply_queue,
                        "Reply arrived after deadline"
                    );
                }
                let _ = pending.slot.send(Ok(body));
                true
            }
            None => {
                warn!(correlation_id = %id, "Reply for unknown exchange, dropped");
                false
            }
        }
    }

    /// Removes an entry without resolving it.
    pub(crate) fn remove(&self, id: &CorrelationId) -> bool {
        self.entries.lock().map.remove(id).is_some()
    }

    /// Returns the number of in-flight exchanges.
    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.entries.lock().map.len()
    }

    /// Fails every pending exchange with [`Error::ConnectionClosed`] and
    /// closes the table.
    pub(crate) fn fail_all(&self) {
        let pending: Vec<_> = {
            let mut entries = self.entries.lock();
            entries.closed = true;
            entries.map.drain().collect()
        };
        let count = pending.len();

        for (_, exchange) in pending {
            let _ = exchange.slot.send(Err(Error::ConnectionClosed));
        }

        if count > 0 {
            debug!(count, "Failed pending exchanges on shutdown");
        }
    }
}

// ============================================================================
// PendingGuard
// ============================================================================

/// Removes its entry from the table when dropped.
pub(crate) struct PendingGuard {
    table: Arc<PendingExchanges>,
    id: CorrelationId,
}

impl PendingGuard {
    /// Returns the guarded correlation ID.
    #[inline]
    pub(crate) fn id(&self) -> &CorrelationId {
        &self.id
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.table.remove(&self.id);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn deadline() -> Instant {
        Instant::now() + Duration::from_secs(5)
    }

    #[tokio::test]
    async fn test_resolve_completes_slot() {
        let table = Arc::new(PendingExchanges::default());
        let id = CorrelationId::generate();
        let (rx, _guard) = table.register(id.clone(), "amq.gen-1", deadline()).expect("register");

        assert_eq!(table.len(), 1);
        assert!(table.resolve(&id, b"reply".to_vec()));
        assert_eq!(rx.await.expect("slot").expect("reply"), b"reply");
        assert_eq!(table.len(), 0);
    }

    #[tokio::test]
    async fn test_out_of_order_replies() {
        let table = Arc::new(PendingExchanges::default());
        let a = CorrelationId::generate();
        let b = CorrelationId::generate();
        let (rx_a, _ga) = table.register(a.clone(), "qa", deadline()).expect("a");
        let (rx_b, _gb) = table.register(b.clone(), "qb", deadline()).expect("b");

        assert!(table.resolve(&b, b"B".to_vec()));
        assert!(table.resolve(&a, b"A".to_vec()));

        assert_eq!(rx_a.await.expect("a").expect("a"), b"A");
        assert_eq!(rx_b.await.expect("b").expect("b"), b"B");
    }

    #[test]
    fn test_unknown_reply_is_dropped() {
        let table = PendingExchanges::default();
        assert!(!table.resolve(&CorrelationId::generate(), Vec::new()));
    }

    #[test]
    fn test_guard_removes_entry() {
        let table = Arc::new(PendingExchanges::default());
        let id = CorrelationId::generate();
        let (_rx, guard) = table.register(id.clone(), "q", deadline()).expect("register");
        assert_eq!(table.len(), 1);
        assert_eq!(guard.id(), &id);

        drop(guard);
        assert_eq!(table.len(), 0);
        assert!(!table.resolve(&id, Vec::new()));
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let table = Arc::new(PendingExchanges::default());
        let id = CorrelationId::generate();
        let _first = table.register(id.clone(), "q", deadline()).expect("register");
        assert!(table.register(id, "q", deadline()).is_err());
    }

    #[tokio::test]
    async fn test_fail_all() {
        let table = Arc::new(PendingExchanges::default());
        let (rx, _guard) = table
            .register(CorrelationId::generate(), "q", deadline())
            .expect("register");

        table.fail_all();
        let result = rx.await.expect("slot");
        assert!(matches!(result, Err(Error::ConnectionClosed)));
        assert_eq!(table.len(), 0);
    }

    #[test]
    fn test_register_after_fail_all_is_refused() {
        let table = Arc::new(PendingExchanges::default());
        table.fail_all();

        let result = table.register(CorrelationId::generate(), "q", deadline());
        assert!(matches!(result, Err(Error::ConnectionClosed)));
        assert_eq!(table.len(), 0);
    }
}
