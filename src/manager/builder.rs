//! Builder for [`Manager`].
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use vnfm_amqp::{Manager, ManagerConfig};
//!
//! let manager = Manager::builder()
//!     .config(ManagerConfig::new("dummy").with_description("dummy VNFM"))
//!     .handler(Arc::new(MyHandler))
//!     .start()
//!     .await?;
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use crate::config::ManagerConfig;
use crate::error::{Error, Result};
use crate::transport::{AmqpConnector, Connector};

use super::core::Manager;
use super::handler::Handler;

// ============================================================================
// ManagerBuilder
// ============================================================================

/// Fluent configuration of a [`Manager`].
#[derive(Default)]
pub struct ManagerBuilder {
    config: Option<ManagerConfig>,
    handler: Option<Arc<dyn Handler>>,
    connector: Option<Arc<dyn Connector>>,
}

impl ManagerBuilder {
    /// Creates an empty builder.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the configuration.
    #[inline]
    #[must_use]
    pub fn config(mut self, config: ManagerConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Sets the business handler.
    #[inline]
    #[must_use]
    pub fn handler(mut self, handler: Arc<dyn Handler>) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Sets the broker connector.
    ///
    /// Defaults to an [`AmqpConnector`] built from the broker settings.
    #[inline]
    #[must_use]
    pub fn connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Starts the manager.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the configuration or handler is missing or
    ///   invalid
    /// - [`Error::Connection`] if the broker cannot be reached
    pub async fn start(self) -> Result<Manager> {
        let config = self.config.ok_or_else(|| {
            Error::config("manager configuration is required. Use .config() to set it.")
        })?;
        let handler = self
            .handler
            .ok_or_else(|| Error::config("handler is required. Use .handler() to set it."))?;

        let connector = match self.connector {
            Some(connector) => connector,
            None => Arc::new(AmqpConnector::from_config(&config.broker)?),
        };

        Manager::start(config, handler, connector).await
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_start_requires_config() {
        let err = ManagerBuilder::new().start().await.unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[tokio::test]
    async fn test_start_requires_handler() {
        let err = Manager::builder()
            .config(ManagerConfig::new("dummy"))
            .start()
            .await
            .unwrap_err();
        assert!(err.to_string().contains("handler"));
    }
}
