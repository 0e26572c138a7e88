//! STDIO transport implementation.
//!
//! Standard input/output transport for MCP - the default and recommended mode.
//! Calls run with the gateway's local credential.

use std::sync::Arc;

use rmcp::ServiceExt;
use tracing::info;

use super::{TransportError, TransportResult};
use crate::core::server::{Gateway, McpServer};

/// STDIO transport handler.
pub struct StdioTransport;

impl StdioTransport {
    /// Run the STDIO transport.
    pub async fn run(gateway: Arc<Gateway>) -> TransportResult<()> {
        info!(
            credential = gateway.local_credential().kind(),
            "Ready - communicating via stdin/stdout"
        );

        let service = McpServer::new(gateway)
            .serve(rmcp::transport::stdio())
            .await
            .map_err(|e| TransportError::init(e.to_string()))?;

        service
            .waiting()
            .await
            .map_err(|e| TransportError::ServiceError(e.to_string()))?;

        info!("STDIO transport finished");
        Ok(())
    }
}
