//! Authentication and authorization errors.

use thiserror::Error;

use super::challenge::Challenge;

#[derive(Debug, Clone, Error)]
pub enum AuthError {
    /// No valid credential was presented.
    #[error("Authentication required: {reason}")]
    Unauthenticated { reason: String, challenge: Challenge },

    /// The credential is valid but lacks the required scope.
    #[error("Insufficient scope: {reason}")]
    Forbidden {
        reason: String,
        required_scope: String,
        challenge: Challenge,
    },
}

impl AuthError {
    /// Challenge to return to the caller.
    pub fn challenge(&self) -> &Challenge {
        match self {
            Self::Unauthenticated { challenge, .. } | Self::Forbidden { challenge, .. } => challenge,
        }
    }

    pub fn reason(&self) -> &str {
        match self {
            Self::Unauthenticated { reason, .. } | Self::Forbidden { reason, .. } => reason,
        }
    }
}
