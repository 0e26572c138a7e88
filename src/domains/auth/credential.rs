//! Caller credentials as presented to the gateway.

use std::fmt;

use sha2::{Digest, Sha256};

/// Longest `Authorization` header value that will be parsed.
const MAX_AUTH_HEADER_BYTES: usize = 8 * 1024;

/// What the caller presented.
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    /// `Authorization: Bearer <token>`.
    Bearer(String),
    /// The legacy shared API token (query parameter or STDIO environment).
    Legacy(String),
    /// Nothing usable was presented.
    Anonymous,
}

impl Credential {
    /// Build a credential from HTTP request parts.
    ///
    /// A well-formed bearer header wins over an `api_token` query parameter.
    /// Malformed headers are ignored.
    pub fn from_http(auth_header: Option<&str>, api_token: Option<&str>) -> Self {
        if let Some(token) = auth_header.and_then(parse_bearer_token) {
            return Self::Bearer(token);
        }
        match api_token.map(str::trim) {
            Some(token) if !token.is_empty() => Self::Legacy(token.to_string()),
            _ => Self::Anonymous,
        }
    }

    /// Credential for a process-local caller holding the legacy token.
    pub fn legacy_or_anonymous(token: Option<&str>) -> Self {
        match token {
            Some(token) if !token.is_empty() => Self::Legacy(token.to_string()),
            _ => Self::Anonymous,
        }
    }

    /// The raw secret, if any.
    pub fn secret(&self) -> Option<&str> {
        match self {
            Self::Bearer(token) | Self::Legacy(token) => Some(token),
            Self::Anonymous => None,
        }
    }

    /// Short label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Bearer(_) => "bearer",
            Self::Legacy(_) => "legacy",
            Self::Anonymous => "anonymous",
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Anonymous => f.write_str("Anonymous"),
            other => write!(f, "{}([REDACTED])", other.kind()),
        }
    }
}

/// Extract the token from a `Bearer` authorization header.
pub fn parse_bearer_token(header: &str) -> Option<String> {
    if header.len() > MAX_AUTH_HEADER_BYTES {
        return None;
    }
    let mut parts = header.trim().splitn(2, ' ');
    let scheme = parts.next().unwrap_or_default();
    let token = parts.next().unwrap_or_default().trim();
    if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() {
        return None;
    }
    Some(token.to_string())
}

/// Non-reversible token identifier for logs and cache keys.
pub fn fingerprint(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}
