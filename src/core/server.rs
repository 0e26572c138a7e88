//! Gateway wiring and the MCP server handler.
//!
//! [`Gateway`] owns every shared component (rate limiter, transport, cache,
//! auth gate, registry, dispatcher, batch coordinator) and is the single
//! entry point both transports call into. [`McpServer`] adapts it to the
//! rmcp `ServerHandler` used by the STDIO transport.
//!
//! The ToolRouter is built from the registry in `domains/tools/router.rs`.
//! **Adding a new tool does NOT require modifying this file!**

use rmcp::{ServerHandler, handler::server::tool::ToolRouter, model::*, tool_handler};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument};

use super::clock::{ClockHandle, TokioClock};
use super::config::Config;
use super::error::Result as GatewayResult;
use crate::domains::{
    auth::{AuthGate, Credential},
    cache::{CacheLayer, CacheStats},
    tools::{
        BatchCoordinator, BatchResult, RequestDispatcher, ToolError, ToolRegistry, aggregate,
        all_tools, build_tool_router, catalog,
    },
    upstream::{HttpBackend, RateLimiter, ReqwestBackend, RetryPolicy, RetryingTransport},
};

/// Shared state behind every transport.
pub struct Gateway {
    config: Arc<Config>,
    dispatcher: Arc<RequestDispatcher>,
    batch: BatchCoordinator,
    local_credential: Credential,
}

impl Gateway {
    /// Build the production gateway: reqwest upstream, real clock and the
    /// cache (optionally Redis-backed) described by `config`.
    pub async fn from_config(config: Config) -> GatewayResult<Self> {
        let clock = TokioClock::shared();
        let backend = Arc::new(ReqwestBackend::new(&config.upstream)?);
        let cache = CacheLayer::from_config(&config.cache, clock.clone()).await;
        Self::assemble(config, backend, cache, clock)
    }

    /// Wire the components around an arbitrary backend and cache.
    pub fn assemble(
        config: Config,
        backend: Arc<dyn HttpBackend>,
        cache: CacheLayer,
        clock: ClockHandle,
    ) -> GatewayResult<Self> {
        let limiter = Arc::new(RateLimiter::new(
            Duration::from_millis(config.rate_limit.min_interval_ms),
            clock.clone(),
        ));
        let transport = RetryingTransport::new(
            backend,
            limiter,
            RetryPolicy::from_config(&config.retry),
            clock.clone(),
        );
        let gate = AuthGate::from_config(&config.auth, clock.clone())?;
        let registry = ToolRegistry::new(catalog::descriptors())?;

        let dispatcher = Arc::new(RequestDispatcher::new(
            Arc::new(registry),
            Arc::new(gate),
            Arc::new(cache),
            Arc::new(transport),
            clock,
        ));
        let batch = BatchCoordinator::new(
            dispatcher.clone(),
            config.batch.max_concurrency,
            config.batch.max_size,
        );
        let local_credential = Credential::legacy_or_anonymous(config.auth.legacy_token.as_deref());

        info!(
            tools = dispatcher.registry().len() + 2,
            local_credential = local_credential.kind(),
            "Gateway assembled"
        );

        Ok(Self {
            config: Arc::new(config),
            dispatcher,
            batch,
            local_credential,
        })
    }

    pub fn config(&self) -> &Arc<Config> {
        &self.config
    }

    pub fn registry(&self) -> &ToolRegistry {
        self.dispatcher.registry()
    }

    pub fn gate(&self) -> &AuthGate {
        self.dispatcher.gate()
    }

    pub fn dispatcher(&self) -> &RequestDispatcher {
        &self.dispatcher
    }

    /// Credential used for callers that cannot present one (STDIO).
    pub fn local_credential(&self) -> &Credential {
        &self.local_credential
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.dispatcher.cache().stats()
    }

    /// Every exposed tool, sorted by name.
    pub fn list_tools(&self) -> Vec<Tool> {
        all_tools(self.registry())
    }

    /// Call a tool by name and return its JSON result.
    ///
    /// Aggregate tools run their own fan-out; every other name goes through
    /// the dispatcher.
    #[instrument(skip(self, args, credential))]
    pub async fn call_tool(
        &self,
        name: &str,
        args: Map<String, Value>,
        credential: &Credential,
    ) -> std::result::Result<Value, ToolError> {
        match name {
            aggregate::BATCH_QUOTES => aggregate::batch_quotes(&self.batch, args, credential).await,
            aggregate::COMPARE_STOCKS => {
                aggregate::compare_stocks(&self.batch, args, credential).await
            }
            _ => self.dispatcher.invoke(name, &args, credential).await?.json(),
        }
    }

    /// Run `tool` over many argument sets. `None` uses the configured
    /// concurrency.
    pub async fn run_batch(
        &self,
        tool: &str,
        args: Vec<Map<String, Value>>,
        credential: &Credential,
        max_concurrency: Option<usize>,
    ) -> BatchResult {
        let limit = max_concurrency.unwrap_or(self.batch.max_concurrency());
        self.batch.run_batch(tool, args, credential, limit).await
    }

    /// Gateway over a fake backend that answers `200 {}`.
    #[cfg(test)]
    pub(crate) fn for_tests() -> Self {
        use crate::core::clock::ManualClock;
        use crate::test_support::{FakeBackend, test_gateway};

        let clock: ClockHandle = Arc::new(ManualClock::new());
        test_gateway(Arc::new(FakeBackend::scripted(clock.clone(), Vec::new())), clock)
    }
}

/// The MCP server handler.
///
/// Implements `ServerHandler` from rmcp; tool calls are routed through the
/// tool router into the [`Gateway`].
#[derive(Clone)]
pub struct McpServer {
    gateway: Arc<Gateway>,

    /// Tool router for handling tool calls.
    tool_router: ToolRouter<Self>,
}

impl McpServer {
    pub fn new(gateway: Arc<Gateway>) -> Self {
        Self {
            tool_router: build_tool_router::<Self>(gateway.clone()),
            gateway,
        }
    }

    /// Get the server name.
    pub fn name(&self) -> &str {
        &self.gateway.config().server.name
    }

    /// Get the server version.
    pub fn version(&self) -> &str {
        &self.gateway.config().server.version
    }

    pub fn gateway(&self) -> &Arc<Gateway> {
        &self.gateway
    }
}

/// ServerHandler implementation with tool_handler macro for automatic tool routing.
#[tool_handler]
impl ServerHandler for McpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "Market data gateway: end-of-day, intraday and live prices, fundamentals, \
                 news and screening tools backed by a cached, rate-limited upstream API."
                    .to_string(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}
