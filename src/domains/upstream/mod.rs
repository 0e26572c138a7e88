//! Upstream domain: everything that talks to the market-data REST API.
//!
//! - `rate_limiter.rs` - global minimum spacing between attempts
//! - `client.rs` - request model and the single-exchange HTTP backend
//! - `transport.rs` - retries, backoff and failure classification
//! - `error.rs` - network and classified upstream errors

mod client;
mod error;
mod rate_limiter;
mod transport;

pub use client::{HttpBackend, Method, RawResponse, ReqwestBackend, UpstreamRequest, build_url};
pub use error::{FailureClass, NetworkError, UpstreamError};
pub use rate_limiter::RateLimiter;
pub use transport::{
    RetryPolicy, RetryingTransport, UpstreamResponse, normalize_body, parse_retry_after,
};
