//! Configuration management for the gateway.
//!
//! All settings have defaults and can be overridden through `MCP_`-prefixed
//! environment variables (a `.env` file is honored). Sections mirror the
//! components they configure.

use super::transport::TransportConfig;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::{info, warn};

/// Main configuration structure for the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server identification and metadata.
    pub server: ServerConfig,

    /// Logging configuration.
    pub logging: LoggingConfig,

    /// Transport configuration.
    pub transport: TransportConfig,

    /// Upstream market-data API.
    pub upstream: UpstreamConfig,

    /// Spacing between upstream attempts.
    pub rate_limit: RateLimitConfig,

    /// Retry and backoff for upstream calls.
    pub retry: RetryConfig,

    /// Response cache.
    pub cache: CacheConfig,

    /// Caller authentication and scopes.
    pub auth: AuthConfig,

    /// Batch fan-out limits.
    pub batch: BatchConfig,
}

/// Server identification configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// The name of the server as reported to clients.
    pub name: String,

    /// The version of the server.
    pub version: String,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "trace").
    pub level: String,

    /// Whether to include timestamps in log output.
    pub with_timestamps: bool,
}

/// Upstream API configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Base URL every endpoint path is appended to.
    pub base_url: String,

    /// API key sent as `api_token` on every request.
    pub api_key: Option<String>,

    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

/// Custom Debug implementation to redact secrets from logs.
impl std::fmt::Debug for UpstreamConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// Upstream rate limit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Minimum milliseconds between two upstream attempts. 0 disables spacing.
    pub min_interval_ms: u64,
}

/// Upstream retry policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts per logical call, including the first.
    pub max_attempts: u32,

    /// Backoff after the first failure, in milliseconds.
    pub base_backoff_ms: u64,

    /// Backoff ceiling, in milliseconds.
    pub max_backoff_ms: u64,

    /// Add random jitter to backoff delays.
    pub jitter: bool,
}

/// Response cache configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Maximum entries held in the local LRU.
    pub capacity: usize,

    /// Redis connection URL. When set, Redis is the source of truth.
    pub redis_url: Option<String>,

    /// Prefix prepended to every Redis key.
    pub redis_prefix: String,

    /// Timeout for each Redis operation, in milliseconds.
    pub remote_timeout_ms: u64,
}

impl std::fmt::Debug for CacheConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Redis URLs may embed a password.
        f.debug_struct("CacheConfig")
            .field("capacity", &self.capacity)
            .field("redis_url", &self.redis_url.as_ref().map(|_| "[REDACTED]"))
            .field("redis_prefix", &self.redis_prefix)
            .field("remote_timeout_ms", &self.remote_timeout_ms)
            .finish()
    }
}

/// Authentication configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Shared secret accepted as a legacy credential.
    pub legacy_token: Option<String>,

    /// Scopes granted to the legacy credential.
    pub legacy_scopes: Vec<String>,

    /// Bearer tokens accepted without introspection, with their scopes.
    pub static_tokens: Vec<(String, Vec<String>)>,

    /// RFC 7662 introspection endpoint. Takes precedence over static tokens.
    pub introspection_url: Option<String>,
    pub introspection_client_id: Option<String>,
    pub introspection_client_secret: Option<String>,
    pub introspection_timeout_secs: u64,

    /// Bound and lifetime of the introspection result cache.
    pub introspection_cache_capacity: usize,
    pub introspection_cache_ttl_secs: u64,

    /// Realm advertised in `WWW-Authenticate` challenges.
    pub realm: String,

    /// Public URL of this server, advertised in resource metadata.
    pub resource_url: Option<String>,

    /// Authorization servers advertised in resource metadata.
    pub authorization_servers: Vec<String>,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("legacy_token", &self.legacy_token.as_ref().map(|_| "[REDACTED]"))
            .field("legacy_scopes", &self.legacy_scopes)
            .field("static_tokens", &format_args!("[{} REDACTED]", self.static_tokens.len()))
            .field("introspection_url", &self.introspection_url)
            .field("introspection_client_id", &self.introspection_client_id)
            .field(
                "introspection_client_secret",
                &self.introspection_client_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .field("introspection_timeout_secs", &self.introspection_timeout_secs)
            .field("introspection_cache_capacity", &self.introspection_cache_capacity)
            .field("introspection_cache_ttl_secs", &self.introspection_cache_ttl_secs)
            .field("realm", &self.realm)
            .field("resource_url", &self.resource_url)
            .field("authorization_servers", &self.authorization_servers)
            .finish()
    }
}

/// Batch configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Maximum invocations in flight per batch.
    pub max_concurrency: usize,

    /// Maximum number of items accepted by the batch tools.
    pub max_size: usize,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: "https://eodhd.com/api".to_string(),
            api_key: None,
            timeout_secs: 30,
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self { min_interval_ms: 100 }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff_ms: 1_000,
            max_backoff_ms: 10_000,
            jitter: true,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: 1000,
            redis_url: None,
            redis_prefix: "market-data:".to_string(),
            remote_timeout_ms: 500,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            legacy_token: None,
            legacy_scopes: vec!["full-access".to_string()],
            static_tokens: Vec::new(),
            introspection_url: None,
            introspection_client_id: None,
            introspection_client_secret: None,
            introspection_timeout_secs: 10,
            introspection_cache_capacity: 1024,
            introspection_cache_ttl_secs: 300,
            realm: "market-data-mcp".to_string(),
            resource_url: None,
            authorization_servers: Vec::new(),
        }
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 10,
            max_size: 50,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                name: "market-data-mcp".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                with_timestamps: true,
            },
            transport: TransportConfig::default(),
            upstream: UpstreamConfig::default(),
            rate_limit: RateLimitConfig::default(),
            retry: RetryConfig::default(),
            cache: CacheConfig::default(),
            auth: AuthConfig::default(),
            batch: BatchConfig::default(),
        }
    }
}

impl Config {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from environment variables.
    ///
    /// Environment variables are expected to be prefixed with `MCP_`.
    /// For example: `MCP_SERVER_NAME`, `MCP_UPSTREAM_API_KEY`.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let mut config = Self::default();

        if let Ok(name) = std::env::var("MCP_SERVER_NAME") {
            config.server.name = name;
        }

        if let Ok(level) = std::env::var("MCP_LOG_LEVEL") {
            config.logging.level = level;
        }
        config.logging.with_timestamps =
            env_parse("MCP_LOG_TIMESTAMPS", config.logging.with_timestamps);

        // Load transport configuration from environment
        config.transport = TransportConfig::from_env();

        // Upstream
        if let Ok(url) = std::env::var("MCP_UPSTREAM_BASE_URL") {
            config.upstream.base_url = url;
        }
        config.upstream.api_key = env_secret("MCP_UPSTREAM_API_KEY").or_else(|| env_secret("EODHD_API_KEY"));
        if config.upstream.api_key.is_some() {
            info!("Upstream API key loaded from environment");
        } else {
            warn!("MCP_UPSTREAM_API_KEY not set - upstream requests will be unauthenticated");
        }
        config.upstream.timeout_secs = env_parse("MCP_UPSTREAM_TIMEOUT_SECS", config.upstream.timeout_secs);

        // Rate limit and retries
        config.rate_limit.min_interval_ms = env_parse("MCP_RATE_LIMIT_MS", config.rate_limit.min_interval_ms);
        config.retry.max_attempts = env_parse("MCP_RETRY_MAX_ATTEMPTS", config.retry.max_attempts);
        config.retry.base_backoff_ms = env_parse("MCP_RETRY_BASE_BACKOFF_MS", config.retry.base_backoff_ms);
        config.retry.max_backoff_ms = env_parse("MCP_RETRY_MAX_BACKOFF_MS", config.retry.max_backoff_ms);
        config.retry.jitter = env_parse("MCP_RETRY_JITTER", config.retry.jitter);

        // Cache
        config.cache.capacity = env_parse("MCP_CACHE_CAPACITY", config.cache.capacity);
        config.cache.redis_url = env_secret("MCP_REDIS_URL");
        if let Ok(prefix) = std::env::var("MCP_REDIS_PREFIX") {
            config.cache.redis_prefix = prefix;
        }
        config.cache.remote_timeout_ms = env_parse("MCP_REDIS_TIMEOUT_MS", config.cache.remote_timeout_ms);

        // Auth. The upstream key doubles as the legacy credential unless a
        // dedicated one is configured.
        config.auth.legacy_token = env_secret("MCP_AUTH_LEGACY_TOKEN").or_else(|| config.upstream.api_key.clone());
        if let Ok(scopes) = std::env::var("MCP_AUTH_LEGACY_SCOPES") {
            config.auth.legacy_scopes = split_list(&scopes);
        }
        if let Ok(tokens) = std::env::var("MCP_AUTH_BEARER_TOKENS") {
            config.auth.static_tokens = parse_static_tokens(&tokens);
            info!("Loaded {} static bearer token(s)", config.auth.static_tokens.len());
        }
        config.auth.introspection_url = env_secret("MCP_AUTH_INTROSPECTION_URL");
        config.auth.introspection_client_id = env_secret("MCP_AUTH_INTROSPECTION_CLIENT_ID");
        config.auth.introspection_client_secret = env_secret("MCP_AUTH_INTROSPECTION_CLIENT_SECRET");
        config.auth.introspection_timeout_secs =
            env_parse("MCP_AUTH_INTROSPECTION_TIMEOUT_SECS", config.auth.introspection_timeout_secs);
        config.auth.introspection_cache_ttl_secs =
            env_parse("MCP_AUTH_INTROSPECTION_CACHE_TTL_SECS", config.auth.introspection_cache_ttl_secs);
        if let Ok(realm) = std::env::var("MCP_AUTH_REALM") {
            config.auth.realm = realm;
        }
        config.auth.resource_url = env_secret("MCP_AUTH_RESOURCE_URL");
        if let Ok(servers) = std::env::var("MCP_AUTH_AUTHORIZATION_SERVERS") {
            config.auth.authorization_servers = split_list(&servers);
        }

        // Batch
        config.batch.max_concurrency = env_parse("MCP_BATCH_MAX_CONCURRENCY", config.batch.max_concurrency);
        config.batch.max_size = env_parse("MCP_BATCH_MAX_SIZE", config.batch.max_size);

        config
    }
}

/// Non-empty value of `key`.
fn env_secret(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Parse `key`, keeping `current` when unset or invalid.
fn env_parse<T: FromStr + std::fmt::Display>(key: &str, current: T) -> T {
    match std::env::var(key) {
        Ok(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                warn!("Ignoring invalid value for {}: '{}' (using {})", key, raw, current);
                current
            }
        },
        Err(_) => current,
    }
}

/// Comma- or whitespace-separated list.
fn split_list(raw: &str) -> Vec<String> {
    raw.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// `token=scope1,scope2;token2=read:eod` pairs. Entries without `=` are
/// skipped.
fn parse_static_tokens(raw: &str) -> Vec<(String, Vec<String>)> {
    raw.split(';')
        .filter_map(|entry| {
            let (token, scopes) = entry.trim().split_once('=')?;
            let token = token.trim();
            if token.is_empty() {
                return None;
            }
            Some((token.to_string(), split_list(scopes)))
        })
        .collect()
}
