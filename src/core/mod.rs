//! Core module containing shared infrastructure components.
//!
//! This module provides the foundational building blocks for the gateway,
//! including error handling, configuration, the injected clock, server
//! wiring and transport layer abstractions.

pub mod clock;
pub mod config;
pub mod error;
pub mod server;
pub mod transport;

pub use config::Config;
pub use error::{Error, Result};
pub use server::{Gateway, McpServer};
pub use transport::{TransportConfig, TransportService};
