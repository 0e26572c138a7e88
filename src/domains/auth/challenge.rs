//! `WWW-Authenticate` challenges.

use std::fmt;

/// A `Bearer` challenge as sent in the `WWW-Authenticate` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Challenge {
    pub realm: String,
    pub resource_metadata: Option<String>,
    pub scope: Option<String>,
    pub error: Option<&'static str>,
    pub error_description: Option<String>,
}

impl Challenge {
    pub fn new(realm: impl Into<String>, resource_metadata: Option<String>) -> Self {
        Self {
            realm: realm.into(),
            resource_metadata,
            scope: None,
            error: None,
            error_description: None,
        }
    }

    /// Challenge for a missing, unknown or expired token.
    pub fn invalid_token(mut self, description: impl Into<String>) -> Self {
        self.error = Some("invalid_token");
        self.error_description = Some(description.into());
        self
    }

    /// Challenge for a valid token lacking `scope`.
    pub fn insufficient_scope(mut self, scope: impl Into<String>, description: impl Into<String>) -> Self {
        self.error = Some("insufficient_scope");
        self.scope = Some(scope.into());
        self.error_description = Some(description.into());
        self
    }

    /// Header value.
    pub fn header_value(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Challenge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Bearer realm=\"{}\"", quote_safe(&self.realm))?;
        if let Some(url) = &self.resource_metadata {
            write!(f, ", resource_metadata=\"{}\"", quote_safe(url))?;
        }
        if let Some(scope) = &self.scope {
            write!(f, ", scope=\"{}\"", quote_safe(scope))?;
        }
        if let Some(error) = self.error {
            write!(f, ", error=\"{error}\"")?;
        }
        if let Some(description) = &self.error_description {
            write!(f, ", error_description=\"{}\"", quote_safe(description))?;
        }
        Ok(())
    }
}

fn quote_safe(value: &str) -> String {
    value.replace(['"', '\\'], "'")
}
