//! Market Data MCP Gateway
//!
//! This crate exposes a financial market-data REST API as Model Context
//! Protocol tools. Every call is authorized against a scope, validated
//! against its descriptor, served from a response cache when possible, and
//! otherwise sent upstream through a shared rate limiter with retries.
//!
//! # Architecture
//!
//! - **core**: configuration, error handling, the injected clock, the
//!   [`Gateway`] wiring and the STDIO/HTTP transports
//! - **domains**: business logic organized by bounded contexts
//!   - **upstream**: `RateLimiter` and `RetryingTransport`
//!   - **cache**: `CacheLayer` (local LRU, optional Redis)
//!   - **auth**: `AuthGate` and credentials
//!   - **tools**: descriptors, `ToolRegistry`, `RequestDispatcher`,
//!     `BatchCoordinator` and the aggregate tools
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use market_data_mcp_server::core::{Config, Gateway, TransportService};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env();
//!     let transport = TransportService::new(config.transport.clone());
//!     let gateway = Arc::new(Gateway::from_config(config).await?);
//!     transport.run(gateway).await?;
//!     Ok(())
//! }
//! ```

pub mod core;
pub mod domains;

#[cfg(test)]
mod test_support;

// Re-export commonly used types for convenience
pub use core::{Config, Error, Gateway, McpServer, Result};
