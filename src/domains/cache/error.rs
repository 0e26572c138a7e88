//! Cache backend errors.
//!
//! These never leave the cache domain: the layer logs them and degrades to
//! its local store.

use thiserror::Error;

/// Failure of a remote cache operation.
#[derive(Debug, Error)]
pub enum CacheBackendError {
    /// The backend could not be reached or rejected the command.
    #[error("Cache backend unavailable: {0}")]
    Unavailable(String),

    /// The operation did not finish within the configured timeout.
    #[error("Cache operation timed out after {0} ms")]
    Timeout(u64),
}

impl CacheBackendError {
    /// Create an "unavailable" error.
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }
}
