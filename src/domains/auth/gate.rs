//! Authorization gate applied before any tool work.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use subtle::ConstantTimeEq;
use tracing::{debug, info, warn};

use super::challenge::Challenge;
use super::credential::{Credential, fingerprint};
use super::error::AuthError;
use super::introspection::{
    CachingIntrospector, HttpIntrospector, StaticTokens, TokenInfo, TokenIntrospector,
};
use super::scopes;
use crate::core::clock::ClockHandle;
use crate::core::config::AuthConfig;
use crate::core::{Error, Result};

/// How the caller was authenticated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMethod {
    Bearer,
    Legacy,
}

/// Authenticated caller. Lives for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthContext {
    pub principal: String,
    pub method: AuthMethod,
    pub scopes: BTreeSet<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl AuthContext {
    /// `full-access` satisfies every scope.
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.contains(scopes::FULL_ACCESS) || self.scopes.contains(scope)
    }
}

/// Maps credentials to scopes and checks them against a tool's requirement.
pub struct AuthGate {
    introspector: Option<Arc<dyn TokenIntrospector>>,
    legacy_token: Option<String>,
    legacy_scopes: BTreeSet<String>,
    realm: String,
    resource_url: Option<String>,
    authorization_servers: Vec<String>,
}

impl AuthGate {
    pub fn new(
        introspector: Option<Arc<dyn TokenIntrospector>>,
        legacy_token: Option<String>,
        legacy_scopes: BTreeSet<String>,
    ) -> Self {
        Self {
            introspector,
            legacy_token: legacy_token.filter(|t| !t.is_empty()),
            legacy_scopes,
            realm: "market-data-mcp".to_string(),
            resource_url: None,
            authorization_servers: Vec::new(),
        }
    }

    /// Set the values advertised in challenges and resource metadata.
    pub fn with_resource(
        mut self,
        realm: impl Into<String>,
        resource_url: Option<String>,
        authorization_servers: Vec<String>,
    ) -> Self {
        self.realm = realm.into();
        self.resource_url = resource_url.map(|url| url.trim_end_matches('/').to_string());
        self.authorization_servers = authorization_servers;
        self
    }

    /// Build the gate described by `config`.
    pub fn from_config(config: &AuthConfig, clock: ClockHandle) -> Result<Self> {
        let source: Option<Arc<dyn TokenIntrospector>> = match &config.introspection_url {
            Some(url) => {
                let credentials = config
                    .introspection_client_id
                    .clone()
                    .zip(config.introspection_client_secret.clone());
                let http = HttpIntrospector::new(
                    url.clone(),
                    credentials,
                    Duration::from_secs(config.introspection_timeout_secs),
                )
                .map_err(|e| Error::config(e.to_string()))?;
                info!("Bearer tokens validated via introspection endpoint");
                Some(Arc::new(http))
            }
            None if !config.static_tokens.is_empty() => {
                let table = StaticTokens::new(
                    config
                        .static_tokens
                        .iter()
                        .map(|(token, scopes)| (token.clone(), scopes.clone())),
                );
                info!("Bearer tokens validated against {} static token(s)", table.len());
                Some(Arc::new(table))
            }
            None => None,
        };

        let introspector = source.map(|inner| {
            Arc::new(CachingIntrospector::new(
                inner,
                config.introspection_cache_capacity,
                Duration::from_secs(config.introspection_cache_ttl_secs),
                clock,
            )) as Arc<dyn TokenIntrospector>
        });

        if introspector.is_none() && config.legacy_token.is_none() {
            warn!("No credentials configured - every tool call will be rejected");
        }

        Ok(Self::new(
            introspector,
            config.legacy_token.clone(),
            config.legacy_scopes.iter().cloned().collect(),
        )
        .with_resource(
            config.realm.clone(),
            config.resource_url.clone(),
            config.authorization_servers.clone(),
        ))
    }

    /// Validate the credential without checking any scope.
    pub async fn authenticate(&self, credential: &Credential) -> std::result::Result<AuthContext, AuthError> {
        match credential {
            Credential::Anonymous => Err(self.unauthenticated("Missing credentials")),
            Credential::Bearer(token) => {
                if let Some(context) = self.introspect(token).await? {
                    return Ok(context);
                }
                self.match_legacy(token)
                    .ok_or_else(|| self.unauthenticated("Invalid or unknown token"))
            }
            Credential::Legacy(token) => self
                .match_legacy(token)
                .ok_or_else(|| self.unauthenticated("Invalid API token")),
        }
    }

    /// Validate the credential and require `scope`.
    pub async fn authorize(
        &self,
        credential: &Credential,
        scope: &str,
    ) -> std::result::Result<AuthContext, AuthError> {
        let context = self.authenticate(credential).await?;
        if context.has_scope(scope) {
            debug!(principal = %context.principal, scope, "Caller authorized");
            return Ok(context);
        }

        warn!(principal = %context.principal, scope, "Caller lacks required scope");
        let reason = format!("Scope \"{scope}\" is required");
        Err(AuthError::Forbidden {
            challenge: self.base_challenge().insufficient_scope(scope, reason.clone()),
            reason,
            required_scope: scope.to_string(),
        })
    }

    /// Challenge for requests that carried no credential.
    pub fn base_challenge(&self) -> Challenge {
        Challenge::new(self.realm.clone(), self.metadata_url())
    }

    /// OAuth 2.0 protected resource metadata (RFC 9728).
    pub fn protected_resource_metadata(&self) -> Value {
        json!({
            "resource": self.resource_url,
            "authorization_servers": self.authorization_servers,
            "scopes_supported": scopes::ALL,
            "bearer_methods_supported": ["header"],
            "resource_name": self.realm,
        })
    }

    fn metadata_url(&self) -> Option<String> {
        self.resource_url
            .as_ref()
            .map(|url| format!("{url}/.well-known/oauth-protected-resource"))
    }

    async fn introspect(&self, token: &str) -> std::result::Result<Option<AuthContext>, AuthError> {
        let Some(introspector) = &self.introspector else {
            return Ok(None);
        };

        let info = match introspector.introspect(token).await {
            Ok(info) => info,
            Err(e) => {
                warn!("Treating token as invalid: {}", e);
                None
            }
        };
        let Some(info) = info else {
            return Ok(None);
        };

        if info.is_expired(Utc::now()) {
            return Err(self.unauthenticated("Token expired"));
        }
        Ok(Some(self.bearer_context(token, info)))
    }

    fn bearer_context(&self, token: &str, info: TokenInfo) -> AuthContext {
        AuthContext {
            principal: info
                .subject
                .unwrap_or_else(|| format!("bearer:{}", &fingerprint(token)[..12])),
            method: AuthMethod::Bearer,
            scopes: info.scopes,
            expires_at: info.expires_at,
        }
    }

    fn match_legacy(&self, presented: &str) -> Option<AuthContext> {
        let expected = self.legacy_token.as_deref()?;
        let equal: bool = expected.as_bytes().ct_eq(presented.as_bytes()).into();
        equal.then(|| AuthContext {
            principal: "legacy".to_string(),
            method: AuthMethod::Legacy,
            scopes: self.legacy_scopes.clone(),
            expires_at: None,
        })
    }

    fn unauthenticated(&self, reason: &str) -> AuthError {
        AuthError::Unauthenticated {
            reason: reason.to_string(),
            challenge: self.base_challenge().invalid_token(reason),
        }
    }
}
