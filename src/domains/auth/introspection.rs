//! Bearer token validation.
//!
//! [`TokenIntrospector`] turns a bearer token into [`TokenInfo`] or reports
//! it as unknown. Two implementations are provided: [`HttpIntrospector`]
//! calls an RFC 7662 introspection endpoint, [`StaticTokens`] serves a fixed
//! table from configuration. [`CachingIntrospector`] memoizes positive
//! answers by token fingerprint.

use std::collections::{BTreeSet, HashMap};
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lru::LruCache;
use parking_lot::Mutex;
use serde::Deserialize;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::credential::fingerprint;
use crate::core::clock::ClockHandle;

/// Validated token attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenInfo {
    pub subject: Option<String>,
    pub scopes: BTreeSet<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl TokenInfo {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|exp| exp <= now)
    }
}

/// The introspection source could not answer.
#[derive(Debug, Error)]
#[error("Token introspection failed: {0}")]
pub struct IntrospectionError(pub String);

/// Resolves bearer tokens.
#[async_trait]
pub trait TokenIntrospector: Send + Sync {
    /// `Ok(None)` means the token is unknown or inactive.
    async fn introspect(&self, token: &str) -> Result<Option<TokenInfo>, IntrospectionError>;
}

// ============================================================================
// RFC 7662 endpoint
// ============================================================================

#[derive(Debug, Deserialize)]
struct IntrospectionResponse {
    active: bool,
    #[serde(default)]
    scope: Option<String>,
    #[serde(default)]
    sub: Option<String>,
    #[serde(default)]
    client_id: Option<String>,
    #[serde(default)]
    exp: Option<i64>,
}

impl IntrospectionResponse {
    fn into_token_info(self) -> Option<TokenInfo> {
        if !self.active {
            return None;
        }
        Some(TokenInfo {
            subject: self.sub.or(self.client_id),
            scopes: parse_scopes(self.scope.as_deref().unwrap_or_default()),
            expires_at: self.exp.and_then(|exp| DateTime::from_timestamp(exp, 0)),
        })
    }
}

/// Introspector backed by an RFC 7662 HTTP endpoint.
pub struct HttpIntrospector {
    client: reqwest::Client,
    url: String,
    client_credentials: Option<(String, String)>,
}

impl HttpIntrospector {
    pub fn new(
        url: impl Into<String>,
        client_credentials: Option<(String, String)>,
        timeout: Duration,
    ) -> Result<Self, IntrospectionError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| IntrospectionError(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            url: url.into(),
            client_credentials,
        })
    }
}

#[async_trait]
impl TokenIntrospector for HttpIntrospector {
    async fn introspect(&self, token: &str) -> Result<Option<TokenInfo>, IntrospectionError> {
        let mut request = self
            .client
            .post(&self.url)
            .form(&[("token", token), ("token_type_hint", "access_token")]);
        if let Some((id, secret)) = &self.client_credentials {
            request = request.basic_auth(id, Some(secret));
        }

        let response = request
            .send()
            .await
            .map_err(|e| IntrospectionError(e.to_string()))?;
        if !response.status().is_success() {
            return Err(IntrospectionError(format!(
                "endpoint returned HTTP {}",
                response.status().as_u16()
            )));
        }

        let body: IntrospectionResponse = response
            .json()
            .await
            .map_err(|e| IntrospectionError(format!("invalid response: {e}")))?;
        Ok(body.into_token_info())
    }
}

// ============================================================================
// Static table
// ============================================================================

/// Fixed token table, typically from `MCP_AUTH_BEARER_TOKENS`.
#[derive(Default)]
pub struct StaticTokens {
    tokens: HashMap<String, TokenInfo>,
}

impl StaticTokens {
    /// Build the table from `(token, scopes)` pairs.
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (String, S)>,
        S: IntoIterator<Item = String>,
    {
        let tokens = entries
            .into_iter()
            .map(|(token, scopes)| {
                let info = TokenInfo {
                    subject: Some(format!("static:{}", &fingerprint(&token)[..12])),
                    scopes: scopes.into_iter().collect(),
                    expires_at: None,
                };
                (token, info)
            })
            .collect();
        Self { tokens }
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

#[async_trait]
impl TokenIntrospector for StaticTokens {
    async fn introspect(&self, token: &str) -> Result<Option<TokenInfo>, IntrospectionError> {
        Ok(self.tokens.get(token).cloned())
    }
}

// ============================================================================
// Caching wrapper
// ============================================================================

/// Memoizes active tokens for a fixed period, keyed by fingerprint.
///
/// Unknown tokens and introspection failures are not cached.
pub struct CachingIntrospector {
    inner: Arc<dyn TokenIntrospector>,
    cache: Mutex<LruCache<String, (TokenInfo, Instant)>>,
    ttl: Duration,
    clock: ClockHandle,
}

impl CachingIntrospector {
    pub fn new(
        inner: Arc<dyn TokenIntrospector>,
        capacity: usize,
        ttl: Duration,
        clock: ClockHandle,
    ) -> Self {
        let cap = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner,
            cache: Mutex::new(LruCache::new(cap)),
            ttl,
            clock,
        }
    }
}

#[async_trait]
impl TokenIntrospector for CachingIntrospector {
    async fn introspect(&self, token: &str) -> Result<Option<TokenInfo>, IntrospectionError> {
        let key = fingerprint(token);
        let now = self.clock.now();

        {
            let mut cache = self.cache.lock();
            let fresh = match cache.get(&key) {
                Some((info, stored_at)) if now.saturating_duration_since(*stored_at) < self.ttl => {
                    Some(info.clone())
                }
                _ => None,
            };
            if let Some(info) = fresh {
                debug!(token = &key[..12], "Token introspection cache hit");
                return Ok(Some(info));
            }
            cache.pop(&key);
        }

        let result = self.inner.introspect(token).await;
        match &result {
            Ok(Some(info)) => {
                self.cache.lock().put(key, (info.clone(), now));
            }
            Ok(None) => {}
            Err(e) => warn!(token = &key[..12], "{}", e),
        }
        result
    }
}

/// Split a space-separated scope string.
pub fn parse_scopes(raw: &str) -> BTreeSet<String> {
    raw.split_whitespace().map(str::to_string).collect()
}
