//! A running VNF manager: channel plus dispatcher.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use tracing::info;

use crate::config::{ManagerConfig, REGISTER_QUEUE, Registration, UNREGISTER_QUEUE};
use crate::error::Result;
use crate::transport::{Channel, ChannelState, Connector};

use super::builder::ManagerBuilder;
use super::dispatcher::Dispatcher;
use super::endpoint::ManagerEndpoint;
use super::handler::Handler;

// ============================================================================
// Manager
// ============================================================================

/// A VNF manager registered with the orchestrator.
///
/// Created through [`Manager::builder`]. Dropping a manager without calling
/// [`stop`](Self::stop) still unregisters it, but without waiting for
/// in-flight flows.
pub struct Manager {
    endpoint: ManagerEndpoint,
    channel: Arc<Channel>,
    dispatcher: Dispatcher,
}

impl fmt::Debug for Manager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Manager")
            .field("endpoint", &self.endpoint)
            .field("state", &self.channel.state())
            .finish_non_exhaustive()
    }
}

impl Manager {
    /// Creates a builder.
    #[inline]
    #[must_use]
    pub fn builder() -> ManagerBuilder {
        ManagerBuilder::new()
    }

    /// Opens the channel (registering the endpoint) and starts the
    /// dispatcher.
    pub(crate) async fn start(
        config: ManagerConfig,
        handler: Arc<dyn Handler>,
        connector: Arc<dyn Connector>,
    ) -> Result<Self> {
        config.validate()?;

        let endpoint = ManagerEndpoint::from_config(&config);
        let mut channel_config = config.channel.clone();
        channel_config.endpoint_queue = endpoint.endpoint.clone();
        let channel_config = channel_config.with_registration(Registration {
            register_queue: REGISTER_QUEUE.to_string(),
            unregister_queue: UNREGISTER_QUEUE.to_string(),
            payload: serde_json::to_vec(&endpoint)?,
        });

        let channel = Channel::open(connector, channel_config).await?;

        let dispatcher = match Dispatcher::start(Arc::clone(&channel), handler, config.dispatcher) {
            Ok(dispatcher) => dispatcher,
            Err(e) => {
                let _ = channel.close().await;
                return Err(e);
            }
        };

        info!(
            vnfm_type = %endpoint.vnfm_type,
            queue = %endpoint.endpoint,
            "Manager started"
        );

        Ok(Self {
            endpoint,
            channel,
            dispatcher,
        })
    }

    /// Returns the registered endpoint.
    #[inline]
    #[must_use]
    pub fn endpoint(&self) -> &ManagerEndpoint {
        &self.endpoint
    }

    /// Returns the underlying channel.
    #[inline]
    #[must_use]
    pub fn channel(&self) -> &Arc<Channel> {
        &self.channel
    }

    /// Returns the connection state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> ChannelState {
        self.channel.state()
    }

    /// Stops the dispatcher, then closes the channel (unregistering).
    ///
    /// # Errors
    ///
    /// Returns [`Error::CloseTimeout`](crate::Error::CloseTimeout) if the
    /// channel did not close in time.
    pub async fn stop(&self) -> Result<()> {
        self.dispatcher.stop().await;
        self.channel.close().await?;
        info!(vnfm_type = %self.endpoint.vnfm_type, "Manager stopped");
        Ok(())
    }
}
