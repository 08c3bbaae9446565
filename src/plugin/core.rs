//! A running VIM-driver plugin.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, watch};
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::config::PluginConfig;
use crate::error::Result;
use crate::identifiers::WorkerId;
use crate::transport::{AmqpConnector, Channel, ChannelState, Connector, Envelope, Subscription};

use super::driver::Driver;
use super::request::serve;

// ============================================================================
// Plugin
// ============================================================================

/// Serves driver calls arriving on `vim-drivers.<type>.<name>`.
pub struct Plugin {
    queue: String,
    channel: Arc<Channel>,
    shutdown_tx: watch::Sender<bool>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Plugin {
    /// Starts a plugin on the configured RabbitMQ broker.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`](crate::Error::Config) if the configuration is
    ///   invalid
    /// - [`Error::Connection`](crate::Error::Connection) if the broker
    ///   cannot be reached
    pub async fn start(config: PluginConfig, driver: Arc<dyn Driver>) -> Result<Self> {
        let connector = Arc::new(AmqpConnector::from_config(&config.broker)?);
        Self::start_with(config, driver, connector).await
    }

    /// Starts a plugin on a custom connector.
    ///
    /// # Errors
    ///
    /// Same as [`start`](Self::start).
    pub async fn start_with(
        config: PluginConfig,
        driver: Arc<dyn Driver>,
        connector: Arc<dyn Connector>,
    ) -> Result<Self> {
        config.validate()?;

        let queue = config.endpoint_queue();
        let mut channel_config = config.channel.clone();
        channel_config.endpoint_queue = queue.clone();

        let channel = Channel::open(connector, channel_config).await?;
        let subscription = Arc::new(AsyncMutex::new(channel.subscribe()));
        let (shutdown_tx, _) = watch::channel(false);

        let workers = (0..config.workers)
            .map(|index| {
                let worker_id = WorkerId::new(index);
                let span = info_span!("plugin_worker", worker_id = %worker_id);
                tokio::spawn(
                    run_worker(
                        Arc::clone(&channel),
                        Arc::clone(&driver),
                        Arc::clone(&subscription),
                        shutdown_tx.subscribe(),
                    )
                    .instrument(span),
                )
            })
            .collect();

        info!(queue = %queue, workers = config.workers, "Plugin started");

        Ok(Self {
            queue,
            channel,
            shutdown_tx,
            workers: Mutex::new(workers),
        })
    }

    /// Returns the queue the plugin consumes.
    #[inline]
    #[must_use]
    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// Returns the connection state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> ChannelState {
        self.channel.state()
    }

    /// Finishes in-flight calls, then closes the channel.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CloseTimeout`](crate::Error::CloseTimeout) if the
    /// channel did not close in time.
    pub async fn stop(&self) -> Result<()> {
        self.shutdown_tx.send_replace(true);

        let workers = std::mem::take(&mut *self.workers.lock());
        for handle in workers {
            if let Err(e) = handle.await {
                warn!(error = %e, "Plugin worker ended abnormally");
            }
        }

        self.channel.close().await?;
        info!(queue = %self.queue, "Plugin stopped");
        Ok(())
    }
}

// ============================================================================
// Worker
// ============================================================================

async fn run_worker(
    channel: Arc<Channel>,
    driver: Arc<dyn Driver>,
    subscription: Arc<AsyncMutex<Subscription>>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        let next = {
            let mut subscription = subscription.lock().await;
            tokio::select! {
                envelope = subscription.recv() => envelope,
                () = stopped(&mut shutdown_rx) => None,
            }
        };

        let Some(envelope) = next else {
            break;
        };

        handle_call(&channel, driver.as_ref(), envelope).await;
    }

    debug!("Plugin worker stopped");
}

async fn handle_call(channel: &Channel, driver: &dyn Driver, envelope: Envelope) {
    let Envelope {
        data,
        correlation_id,
        reply_to,
    } = envelope;

    let Some(reply_to) = reply_to else {
        warn!("Driver call without reply queue, dropped");
        return;
    };

    let response = serve(driver, &data).await;
    let body = match serde_json::to_vec(&response) {
        Ok(body) => body,
        Err(e) => {
            error!(error = %e, "Failed to encode driver reply");
            return;
        }
    };

    let sent = match correlation_id {
        Some(id) => channel.reply(&reply_to, id, body).await,
        None => channel.send(&reply_to, body).await,
    };

    if let Err(e) = sent {
        error!(queue = %reply_to, error = %e, "Failed to publish driver reply");
    }
}

async fn stopped(shutdown_rx: &mut watch::Receiver<bool>) {
    let _ = shutdown_rx.wait_for(|stop| *stop).await;
}
