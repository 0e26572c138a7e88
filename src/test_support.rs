//! Shared fakes for unit tests.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::time::Instant;

use crate::core::clock::ClockHandle;
use crate::core::config::Config;
use crate::core::server::Gateway;
use crate::domains::auth::{AuthGate, StaticTokens};
use crate::domains::cache::{CacheBackendError, CacheLayer, RemoteCache};
use crate::domains::tools::{
    DispatchObserver, DispatchRecord, RequestDispatcher, ToolRegistry, catalog,
};
use crate::domains::upstream::{
    HttpBackend, NetworkError, RateLimiter, RawResponse, RetryPolicy, RetryingTransport,
    UpstreamRequest,
};

/// Legacy secret accepted by [`test_gate`]; grants `full-access`.
pub const LEGACY_TOKEN: &str = "legacy-secret";

/// Gate with the legacy secret plus two scoped bearer tokens,
/// `news-reader` (`read:news`) and `eod-reader` (`read:eod`).
pub fn test_gate() -> AuthGate {
    let tokens = StaticTokens::new([
        ("news-reader".to_string(), vec!["read:news".to_string()]),
        ("eod-reader".to_string(), vec!["read:eod".to_string()]),
    ]);
    AuthGate::new(
        Some(Arc::new(tokens)),
        Some(LEGACY_TOKEN.to_string()),
        BTreeSet::from(["full-access".to_string()]),
    )
}

/// Dispatcher over the built-in catalog with no rate limiting and
/// jitter-free retries.
pub fn test_dispatcher(backend: Arc<FakeBackend>, clock: ClockHandle) -> RequestDispatcher {
    let transport = RetryingTransport::new(
        backend,
        Arc::new(RateLimiter::new(Duration::ZERO, clock.clone())),
        RetryPolicy {
            jitter: false,
            ..RetryPolicy::default()
        },
        clock.clone(),
    );
    RequestDispatcher::new(
        Arc::new(ToolRegistry::new(catalog::descriptors()).expect("catalog is valid")),
        Arc::new(test_gate()),
        Arc::new(CacheLayer::new(100, clock.clone())),
        Arc::new(transport),
        clock,
    )
}

/// Configuration matching [`test_gate`], with no rate limiting and
/// jitter-free retries.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.rate_limit.min_interval_ms = 0;
    config.retry.jitter = false;
    config.auth.legacy_token = Some(LEGACY_TOKEN.to_string());
    config.auth.static_tokens = vec![
        ("news-reader".to_string(), vec!["read:news".to_string()]),
        ("eod-reader".to_string(), vec!["read:eod".to_string()]),
    ];
    config
}

/// Gateway over `backend` with [`test_config`] and a local-only cache.
pub fn test_gateway(backend: Arc<FakeBackend>, clock: ClockHandle) -> Gateway {
    Gateway::assemble(test_config(), backend, CacheLayer::new(100, clock.clone()), clock)
        .expect("test gateway assembles")
}

type Handler = dyn Fn(&UpstreamRequest) -> Result<RawResponse, NetworkError> + Send + Sync;

/// Scriptable [`HttpBackend`] that records every call.
pub struct FakeBackend {
    clock: ClockHandle,
    script: Mutex<VecDeque<Result<RawResponse, NetworkError>>>,
    handler: Option<Box<Handler>>,
    latency: Duration,
    calls: Mutex<Vec<(UpstreamRequest, Instant)>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeBackend {
    fn base(clock: ClockHandle) -> Self {
        Self {
            clock,
            script: Mutex::new(VecDeque::new()),
            handler: None,
            latency: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Replies with the scripted outcomes in order, then with `200 {}`.
    pub fn scripted(clock: ClockHandle, script: Vec<Result<RawResponse, NetworkError>>) -> Self {
        let backend = Self::base(clock);
        *backend.script.lock() = script.into();
        backend
    }

    /// Replies with the same response to every call.
    pub fn always(clock: ClockHandle, response: RawResponse) -> Self {
        Self::with_handler(clock, move |_| Ok(response.clone()))
    }

    /// Replies through a closure inspecting the request.
    pub fn with_handler<F>(clock: ClockHandle, handler: F) -> Self
    where
        F: Fn(&UpstreamRequest) -> Result<RawResponse, NetworkError> + Send + Sync + 'static,
    {
        let mut backend = Self::base(clock);
        backend.handler = Some(Box::new(handler));
        backend
    }

    /// Hold every call open for `latency` before replying.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn call_times(&self) -> Vec<Instant> {
        self.calls.lock().iter().map(|(_, at)| *at).collect()
    }

    pub fn requests(&self) -> Vec<UpstreamRequest> {
        self.calls.lock().iter().map(|(r, _)| r.clone()).collect()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HttpBackend for FakeBackend {
    async fn execute(&self, request: &UpstreamRequest) -> Result<RawResponse, NetworkError> {
        self.calls.lock().push((request.clone(), self.clock.now()));

        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        if !self.latency.is_zero() {
            self.clock.sleep(self.latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if let Some(handler) = &self.handler {
            return handler(request);
        }
        self.script
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(RawResponse::json(200, "{}")))
    }
}

/// In-memory [`RemoteCache`] that can be switched into a failing state.
#[derive(Default)]
pub struct FakeRemote {
    entries: Mutex<HashMap<String, Bytes>>,
    failing: AtomicBool,
    gets: AtomicUsize,
    sets: AtomicUsize,
}

impl FakeRemote {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.lock().contains_key(key)
    }

    pub fn insert(&self, key: &str, value: impl Into<Bytes>) {
        self.entries.lock().insert(key.to_string(), value.into());
    }

    pub fn get_count(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn set_count(&self) -> usize {
        self.sets.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<(), CacheBackendError> {
        if self.failing.load(Ordering::SeqCst) {
            Err(CacheBackendError::unavailable("fake remote is down"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl RemoteCache for FakeRemote {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, CacheBackendError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        Ok(self.entries.lock().get(key).cloned())
    }

    async fn set(&self, key: &str, value: Bytes, _ttl: Duration) -> Result<(), CacheBackendError> {
        self.sets.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        self.entries.lock().insert(key.to_string(), value);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}

/// [`DispatchObserver`] that keeps every record.
#[derive(Default)]
pub struct RecordingObserver {
    records: Mutex<Vec<DispatchRecord>>,
}

impl RecordingObserver {
    pub fn records(&self) -> Vec<DispatchRecord> {
        self.records.lock().clone()
    }
}

impl DispatchObserver for RecordingObserver {
    fn record(&self, record: &DispatchRecord) {
        self.records.lock().push(record.clone());
    }
}
