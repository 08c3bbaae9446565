//! Lifecycle dispatcher worker pool.
//!
//! M workers share one channel subscription. Each worker takes the next
//! inbound message, decodes it as an orchestrator message and runs the
//! matching flow to completion before taking another, so messages handled
//! by different workers may complete in any order.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, watch};
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, debug_span, info, info_span, warn};

use crate::config::DispatcherConfig;
use crate::error::Result;
use crate::identifiers::WorkerId;
use crate::protocol::{SenderType, decode};
use crate::transport::{Channel, Subscription};

use super::flows::Lifecycle;
use super::handler::Handler;

// ============================================================================
// Dispatcher
// ============================================================================

/// Routes inbound orchestrator messages to a [`Handler`].
pub struct Dispatcher {
    shutdown_tx: watch::Sender<bool>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    worker_count: usize,
}

impl Dispatcher {
    /// Subscribes to `channel` and starts `config.workers` workers.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`](crate::Error::Config) if the configuration
    /// is invalid.
    pub fn start(channel: Arc<Channel>, handler: Arc<dyn Handler>, config: DispatcherConfig) -> Result<Self> {
        config.validate()?;

        let worker_count = config.workers;
        let subscription = Arc::new(AsyncMutex::new(channel.subscribe()));
        let lifecycle = Arc::new(Lifecycle::new(channel, handler, config));
        let (shutdown_tx, _) = watch::channel(false);

        let workers = (0..worker_count)
            .map(|index| {
                let worker_id = WorkerId::new(index);
                let span = info_span!("dispatcher_worker", worker_id = %worker_id);
                tokio::spawn(
                    run_worker(
                        Arc::clone(&lifecycle),
                        Arc::clone(&subscription),
                        shutdown_tx.subscribe(),
                    )
                    .instrument(span),
                )
            })
            .collect();

        info!(workers = worker_count, "Dispatcher started");

        Ok(Self {
            shutdown_tx,
            workers: Mutex::new(workers),
            worker_count,
        })
    }

    /// Returns the pool size.
    #[inline]
    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Stops taking messages and waits for in-flight flows to finish.
    pub async fn stop(&self) {
        self.shutdown_tx.send_replace(true);

        let workers = std::mem::take(&mut *self.workers.lock());
        for handle in workers {
            if let Err(e) = handle.await {
                warn!(error = %e, "Dispatcher worker ended abnormally");
            }
        }

        info!("Dispatcher stopped");
    }
}

// ============================================================================
// Worker
// ============================================================================

async fn run_worker(
    lifecycle: Arc<Lifecycle>,
    subscription: Arc<AsyncMutex<Subscription>>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        let next = {
            let mut subscription = subscription.lock().await;
            // Shutdown wins over a queued message.
            tokio::select! {
                biased;
                () = stopped(&mut shutdown_rx) => None,
                envelope = subscription.recv() => envelope,
            }
        };

        let Some(envelope) = next else {
            break;
        };

        let message = match decode(&envelope.data, SenderType::Nfvo) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "Dropping undecodable message");
                continue;
            }
        };

        let span = debug_span!(
            "lifecycle",
            action = %message.action(),
            correlation_id = envelope.correlation_id.as_ref().map(|id| id.as_str()).unwrap_or_default(),
        );
        lifecycle.handle(message).instrument(span).await;
    }

    debug!("Dispatcher worker stopped");
}

/// Resolves once shutdown is requested.
async fn stopped(shutdown_rx: &mut watch::Receiver<bool>) {
    // A dropped sender means the dispatcher is gone as well.
    let _ = shutdown_rx.wait_for(|stop| *stop).await;
}
