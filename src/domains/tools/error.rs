//! Tool-specific error types.

use serde::Serialize;
use thiserror::Error;

use super::schema::{FieldError, describe};
use crate::domains::auth::{AuthError, Challenge};
use crate::domains::upstream::UpstreamError;

/// Errors that can occur while invoking a tool.
#[derive(Debug, Clone, Error)]
pub enum ToolError {
    /// Arguments failed validation, or a tool-level precondition was not met.
    #[error("Invalid arguments: {message}")]
    InvalidArguments {
        message: String,
        fields: Vec<FieldError>,
    },

    /// No valid credential was presented.
    #[error("Authentication required: {reason}")]
    Unauthenticated { reason: String, challenge: Challenge },

    /// The credential lacks the tool's scope.
    #[error("Forbidden: {reason}")]
    Forbidden { reason: String, challenge: Challenge },

    /// The requested tool was not found.
    #[error("Tool not found: {0}")]
    NotFound(String),

    /// The upstream call failed in a way that may succeed later.
    #[error("Upstream temporarily unavailable: {0}")]
    UpstreamTransient(UpstreamError),

    /// The upstream rejected the request.
    #[error("Upstream request failed: {0}")]
    UpstreamPermanent(UpstreamError),

    /// An internal error occurred.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Serializable form of a [`ToolError`] returned to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorReport {
    pub kind: &'static str,
    pub message: String,
    pub retryable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub challenge: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<FieldError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempts: Option<u32>,
}

impl ToolError {
    /// Create a new "not found" error.
    pub fn not_found(name: impl Into<String>) -> Self {
        Self::NotFound(name.into())
    }

    /// Create a new "invalid arguments" error without field detail.
    pub fn invalid_arguments(msg: impl Into<String>) -> Self {
        Self::InvalidArguments {
            message: msg.into(),
            fields: Vec::new(),
        }
    }

    /// Create an "invalid arguments" error from field errors.
    pub fn validation(fields: Vec<FieldError>) -> Self {
        Self::InvalidArguments {
            message: describe(&fields),
            fields,
        }
    }

    /// Create a new "internal" error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Stable machine-readable kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidArguments { .. } => "validation_error",
            Self::Unauthenticated { .. } => "authentication_error",
            Self::Forbidden { .. } => "authorization_error",
            Self::NotFound(_) => "not_found",
            Self::UpstreamTransient(_) => "upstream_transient",
            Self::UpstreamPermanent(_) => "upstream_permanent",
            Self::Internal(_) => "internal_error",
        }
    }

    /// Whether the caller may retry the same call later.
    pub fn retryable(&self) -> bool {
        matches!(self, Self::UpstreamTransient(_))
    }

    /// `WWW-Authenticate` challenge for auth failures.
    pub fn challenge(&self) -> Option<&Challenge> {
        match self {
            Self::Unauthenticated { challenge, .. } | Self::Forbidden { challenge, .. } => {
                Some(challenge)
            }
            _ => None,
        }
    }

    pub fn report(&self) -> ErrorReport {
        let attempts = match self {
            Self::UpstreamTransient(e) | Self::UpstreamPermanent(e) => Some(e.attempts),
            _ => None,
        };
        let fields = match self {
            Self::InvalidArguments { fields, .. } => fields.clone(),
            _ => Vec::new(),
        };
        ErrorReport {
            kind: self.kind(),
            message: self.to_string(),
            retryable: self.retryable(),
            challenge: self.challenge().map(Challenge::header_value),
            fields,
            attempts,
        }
    }
}

impl From<AuthError> for ToolError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Unauthenticated { reason, challenge } => {
                Self::Unauthenticated { reason, challenge }
            }
            AuthError::Forbidden {
                reason, challenge, ..
            } => Self::Forbidden { reason, challenge },
        }
    }
}

impl From<UpstreamError> for ToolError {
    fn from(err: UpstreamError) -> Self {
        if err.is_transient() {
            Self::UpstreamTransient(err)
        } else {
            Self::UpstreamPermanent(err)
        }
    }
}
