//! Single-invocation pipeline.
//!
//! resolve → authorize → validate → cache lookup → upstream call → cache
//! store. The scope check runs before any cache or upstream work, so a
//! rejected caller never learns whether a response was cached.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, instrument};

use super::error::ToolError;
use super::observer::{DispatchObserver, DispatchRecord, TracingObserver};
use super::registry::ToolRegistry;
use super::schema;
use crate::core::clock::ClockHandle;
use crate::domains::auth::{AuthGate, Credential};
use crate::domains::cache::{CacheKey, CacheLayer};
use crate::domains::upstream::{RetryingTransport, UpstreamError};

/// How the cache took part in a dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheStatus {
    Hit,
    Miss,
    /// The tool is not cacheable.
    Bypass,
}

impl CacheStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hit => "hit",
            Self::Miss => "miss",
            Self::Bypass => "bypass",
        }
    }
}

/// Successful tool result.
#[derive(Debug, Clone)]
pub struct ToolResponse {
    pub tool: String,
    /// Serialized, normalized JSON.
    pub body: Bytes,
    pub cache: CacheStatus,
    /// Upstream attempts made; zero on a cache hit.
    pub attempts: u32,
    pub elapsed: Duration,
}

impl ToolResponse {
    /// Parse the body back into JSON.
    pub fn json(&self) -> Result<Value, ToolError> {
        serde_json::from_slice(&self.body)
            .map_err(|e| ToolError::internal(format!("Stored response is not valid JSON: {e}")))
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// What a dispatch did before it finished, for the dispatch record.
#[derive(Debug, Clone, Copy)]
struct Progress {
    cache: CacheStatus,
    attempts: u32,
}

/// Executes tool invocations against the shared components.
pub struct RequestDispatcher {
    registry: Arc<ToolRegistry>,
    gate: Arc<AuthGate>,
    cache: Arc<CacheLayer>,
    transport: Arc<RetryingTransport>,
    observer: Arc<dyn DispatchObserver>,
    clock: ClockHandle,
}

impl RequestDispatcher {
    pub fn new(
        registry: Arc<ToolRegistry>,
        gate: Arc<AuthGate>,
        cache: Arc<CacheLayer>,
        transport: Arc<RetryingTransport>,
        clock: ClockHandle,
    ) -> Self {
        Self {
            registry,
            gate,
            cache,
            transport,
            observer: Arc::new(TracingObserver),
            clock,
        }
    }

    /// Replace the default [`TracingObserver`].
    pub fn with_observer(mut self, observer: Arc<dyn DispatchObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn gate(&self) -> &AuthGate {
        &self.gate
    }

    pub fn cache(&self) -> &CacheLayer {
        &self.cache
    }

    /// Invoke `tool` with `args` on behalf of `credential`.
    #[instrument(skip_all, fields(tool = %tool, credential = credential.kind()))]
    pub async fn invoke(
        &self,
        tool: &str,
        args: &Map<String, Value>,
        credential: &Credential,
    ) -> Result<ToolResponse, ToolError> {
        let started = self.clock.now();
        let mut progress = Progress {
            cache: CacheStatus::Bypass,
            attempts: 0,
        };

        let result = self.dispatch(tool, args, credential, &mut progress).await;

        self.observer.record(&DispatchRecord {
            tool: tool.to_string(),
            cache: progress.cache,
            attempts: progress.attempts,
            outcome: match &result {
                Ok(_) => "ok",
                Err(e) => e.kind(),
            },
            latency: self.clock.now().saturating_duration_since(started),
        });
        result
    }

    async fn dispatch(
        &self,
        tool: &str,
        args: &Map<String, Value>,
        credential: &Credential,
        progress: &mut Progress,
    ) -> Result<ToolResponse, ToolError> {
        let descriptor = self.registry.resolve(tool)?;
        self.gate.authorize(credential, &descriptor.scope).await?;
        let params = schema::validate(&descriptor, args).map_err(ToolError::validation)?;

        let ttl = descriptor.cache.ttl();
        let key = match ttl {
            Some(_) => Some(
                CacheKey::derive(&descriptor.name, &params)
                    .map_err(|e| ToolError::internal(format!("Failed to derive cache key: {e}")))?,
            ),
            None => None,
        };

        if let Some(key) = &key {
            progress.cache = CacheStatus::Miss;
            if let Some(body) = self.cache.get(key).await {
                debug!("Serving cached response");
                progress.cache = CacheStatus::Hit;
                return Ok(ToolResponse {
                    tool: descriptor.name.clone(),
                    body,
                    cache: CacheStatus::Hit,
                    attempts: 0,
                    elapsed: Duration::ZERO,
                });
            }
        }

        let request = descriptor
            .build_request(&params)
            .map_err(ToolError::internal)?;
        let response = self.transport.send(&request).await.map_err(|e| {
            progress.attempts = e.attempts;
            ToolError::from(e)
        })?;
        progress.attempts = response.attempts;

        if let Some(message) = embedded_error(&response.body) {
            return Err(ToolError::UpstreamPermanent(UpstreamError::permanent(
                Some(response.status),
                format!("Upstream reported an error: {message}"),
                response.attempts,
                response.elapsed,
            )));
        }

        let body = serde_json::to_vec(&response.body)
            .map(Bytes::from)
            .map_err(|e| ToolError::internal(format!("Failed to serialize response: {e}")))?;

        if let (Some(key), Some(ttl)) = (&key, ttl) {
            self.cache.put(key, body.clone(), ttl).await;
        }

        Ok(ToolResponse {
            tool: descriptor.name.clone(),
            body,
            cache: progress.cache,
            attempts: response.attempts,
            elapsed: response.elapsed,
        })
    }
}

/// Error message carried in a 2xx body such as `{"error": "Ticker not found"}`.
fn embedded_error(body: &Value) -> Option<String> {
    match body.as_object()?.get("error")? {
        Value::Null | Value::Bool(false) => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}
