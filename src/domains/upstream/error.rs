//! Upstream error types.

use std::time::Duration;

use thiserror::Error;

/// Whether a failed upstream call may succeed if repeated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Timeouts, connection failures, 5xx and 429 responses.
    Transient,
    /// 4xx responses other than 429 and malformed payloads.
    Permanent,
}

/// Failure raised by an [`HttpBackend`](super::HttpBackend) before any HTTP
/// status was received.
#[derive(Debug, Error)]
pub enum NetworkError {
    /// The request did not complete within the configured timeout.
    #[error("Request timed out")]
    Timeout,

    /// The connection could not be established.
    #[error("Connection failed: {0}")]
    Connect(String),

    /// Any other transport-level failure.
    #[error("Request failed: {0}")]
    Other(String),
}

impl NetworkError {
    /// Map a reqwest error onto the network taxonomy.
    pub fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_connect() {
            Self::Connect(err.to_string())
        } else {
            Self::Other(err.to_string())
        }
    }
}

/// Final, classified outcome of a failed logical upstream call.
#[derive(Debug, Clone, Error)]
#[error("{message} (after {attempts} attempt(s) in {elapsed:?})")]
pub struct UpstreamError {
    /// Transient or permanent.
    pub class: FailureClass,

    /// HTTP status of the last attempt, if one was received.
    pub status: Option<u16>,

    /// Description of the last failure.
    pub message: String,

    /// Number of attempts made, including the first.
    pub attempts: u32,

    /// Time spent across all attempts and backoff delays.
    pub elapsed: Duration,
}

impl UpstreamError {
    /// Create a transient error.
    pub fn transient(
        status: Option<u16>,
        message: impl Into<String>,
        attempts: u32,
        elapsed: Duration,
    ) -> Self {
        Self {
            class: FailureClass::Transient,
            status,
            message: message.into(),
            attempts,
            elapsed,
        }
    }

    /// Create a permanent error.
    pub fn permanent(
        status: Option<u16>,
        message: impl Into<String>,
        attempts: u32,
        elapsed: Duration,
    ) -> Self {
        Self {
            class: FailureClass::Permanent,
            status,
            message: message.into(),
            attempts,
            elapsed,
        }
    }

    /// Whether retrying later could succeed.
    pub fn is_transient(&self) -> bool {
        self.class == FailureClass::Transient
    }
}
