//! Transport service - orchestrates different transport types.
//!
//! This service provides a unified interface for starting the gateway
//! with different transport mechanisms.

use std::sync::Arc;

use tracing::info;

use super::{TransportConfig, TransportResult};
use crate::core::server::Gateway;

#[cfg(feature = "stdio")]
use super::stdio::StdioTransport;

#[cfg(feature = "http")]
use super::http::HttpTransport;

/// Transport service - manages the transport layer for the gateway.
pub struct TransportService {
    config: TransportConfig,
}

impl TransportService {
    /// Create a new transport service with the given configuration.
    pub fn new(config: TransportConfig) -> Self {
        Self { config }
    }

    /// Get the transport configuration.
    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Start the transport in front of `gateway`.
    ///
    /// This method blocks until the transport is shut down.
    pub async fn run(self, gateway: Arc<Gateway>) -> TransportResult<()> {
        info!("Starting transport: {}", self.config.description());

        match self.config {
            #[cfg(feature = "stdio")]
            TransportConfig::Stdio => StdioTransport::run(gateway).await,
            #[cfg(feature = "http")]
            TransportConfig::Http(cfg) => HttpTransport::new(cfg).run(gateway).await,
        }
    }
}
