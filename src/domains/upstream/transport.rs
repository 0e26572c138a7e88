//! Retrying, rate-limited transport over an [`HttpBackend`].
//!
//! Every attempt (including retries) first passes through the shared
//! [`RateLimiter`]. Failures are classified as transient (network errors,
//! 429, 5xx) or permanent (other 4xx, malformed payloads); only transient
//! failures are retried, up to [`RetryPolicy::max_attempts`].

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde_json::{Value, json};
use tracing::{debug, instrument, warn};

use super::client::{HttpBackend, RawResponse, UpstreamRequest};
use super::error::UpstreamError;
use super::rate_limiter::RateLimiter;
use crate::core::clock::ClockHandle;
use crate::core::config::RetryConfig;

/// Longest body excerpt carried in an error message.
const ERROR_SNIPPET_LEN: usize = 200;

// ============================================================================
// Retry Policy
// ============================================================================

/// Retry and backoff parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,

    /// Delay after the first failed attempt.
    pub base_backoff: Duration,

    /// Upper bound for computed backoff delays.
    pub max_backoff: Duration,

    /// Add a uniform random jitter in `[0, base_backoff)`.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(10),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Build a policy from configuration.
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_backoff: Duration::from_millis(config.base_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
            jitter: config.jitter,
        }
    }

    /// Delay before the attempt following failed attempt `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let exponential = self.base_backoff.saturating_mul(1u32 << exponent);

        let base_ms = self.base_backoff.as_millis() as u64;
        let jitter = if self.jitter && base_ms > 0 {
            Duration::from_millis(rand::thread_rng().gen_range(0..base_ms))
        } else {
            Duration::ZERO
        };

        exponential.saturating_add(jitter).min(self.max_backoff)
    }
}

// ============================================================================
// Transport
// ============================================================================

/// Successful upstream call.
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    /// HTTP status of the successful attempt.
    pub status: u16,

    /// Normalized JSON body.
    pub body: Value,

    /// Attempts made, including the successful one.
    pub attempts: u32,

    /// Time spent across all attempts.
    pub elapsed: Duration,
}

/// Outcome of a single attempt that may be retried.
struct RetryableFailure {
    status: Option<u16>,
    message: String,
    retry_after: Option<Duration>,
}

/// Upstream transport with rate limiting, retries and classification.
pub struct RetryingTransport {
    backend: Arc<dyn HttpBackend>,
    limiter: Arc<RateLimiter>,
    policy: RetryPolicy,
    clock: ClockHandle,
}

impl RetryingTransport {
    /// Create a transport around the given backend.
    pub fn new(
        backend: Arc<dyn HttpBackend>,
        limiter: Arc<RateLimiter>,
        policy: RetryPolicy,
        clock: ClockHandle,
    ) -> Self {
        Self {
            backend,
            limiter,
            policy,
            clock,
        }
    }

    /// Retry policy in use.
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Perform one logical upstream call.
    #[instrument(skip_all, fields(request = %request.describe()))]
    pub async fn send(&self, request: &UpstreamRequest) -> Result<UpstreamResponse, UpstreamError> {
        let started = self.clock.now();
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            self.limiter.acquire().await;

            let outcome = self.backend.execute(request).await;
            let elapsed = self.clock.now().saturating_duration_since(started);

            let failure = match outcome {
                Ok(raw) if (200..300).contains(&raw.status) => {
                    debug!(attempt, status = raw.status, "Upstream call succeeded");
                    return match normalize_body(&raw) {
                        Ok(body) => Ok(UpstreamResponse {
                            status: raw.status,
                            body,
                            attempts: attempt,
                            elapsed,
                        }),
                        Err(message) => Err(UpstreamError::permanent(
                            Some(raw.status),
                            message,
                            attempt,
                            elapsed,
                        )),
                    };
                }
                Ok(raw) if raw.status == 429 => RetryableFailure {
                    status: Some(429),
                    message: "Upstream rate limit exceeded (HTTP 429)".to_string(),
                    retry_after: raw
                        .retry_after
                        .as_deref()
                        .and_then(|v| parse_retry_after(v, Utc::now())),
                },
                Ok(raw) if raw.status >= 500 => RetryableFailure {
                    status: Some(raw.status),
                    message: format!(
                        "Upstream server error (HTTP {}): {}",
                        raw.status,
                        snippet(&raw)
                    ),
                    retry_after: None,
                },
                Ok(raw) => {
                    warn!(attempt, status = raw.status, "Upstream rejected request");
                    return Err(UpstreamError::permanent(
                        Some(raw.status),
                        format!("Upstream returned HTTP {}: {}", raw.status, snippet(&raw)),
                        attempt,
                        elapsed,
                    ));
                }
                Err(e) => RetryableFailure {
                    status: None,
                    message: e.to_string(),
                    retry_after: None,
                },
            };

            if attempt >= max_attempts {
                warn!(
                    attempts = attempt,
                    status = failure.status,
                    "Upstream call failed after exhausting retries: {}",
                    failure.message
                );
                return Err(UpstreamError::transient(
                    failure.status,
                    failure.message,
                    attempt,
                    elapsed,
                ));
            }

            let delay = failure
                .retry_after
                .unwrap_or_else(|| self.policy.backoff(attempt));
            warn!(
                attempt,
                status = failure.status,
                delay_ms = delay.as_millis() as u64,
                "Upstream attempt failed, retrying: {}",
                failure.message
            );
            self.clock.sleep(delay).await;
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Parse a `Retry-After` value given as delta-seconds or an HTTP-date.
///
/// Dates in the past yield a zero delay.
pub fn parse_retry_after(value: &str, now: DateTime<Utc>) -> Option<Duration> {
    let value = value.trim();
    if let Ok(seconds) = value.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }

    let at = DateTime::parse_from_rfc2822(value).ok()?;
    Some(
        at.with_timezone(&Utc)
            .signed_duration_since(now)
            .to_std()
            .unwrap_or(Duration::ZERO),
    )
}

/// Normalize a successful response body to JSON.
///
/// JSON bodies are parsed, CSV and plain text are wrapped as `{"csv": ...}`,
/// anything else is parsed as JSON when possible and wrapped as
/// `{"text": ...}` otherwise.
pub fn normalize_body(raw: &RawResponse) -> Result<Value, String> {
    if raw.body.is_empty() {
        return Ok(Value::Null);
    }

    let content_type = raw
        .content_type
        .as_deref()
        .unwrap_or_default()
        .to_ascii_lowercase();

    if content_type.contains("json") {
        serde_json::from_slice(&raw.body)
            .map_err(|e| format!("Upstream returned malformed JSON: {e}"))
    } else if content_type.contains("text/csv") || content_type.contains("text/plain") {
        Ok(json!({ "csv": String::from_utf8_lossy(&raw.body) }))
    } else {
        Ok(serde_json::from_slice(&raw.body)
            .unwrap_or_else(|_| json!({ "text": String::from_utf8_lossy(&raw.body) })))
    }
}

fn snippet(raw: &RawResponse) -> String {
    let text = String::from_utf8_lossy(&raw.body);
    let trimmed = text.trim();
    if trimmed.chars().count() > ERROR_SNIPPET_LEN {
        let cut: String = trimmed.chars().take(ERROR_SNIPPET_LEN).collect();
        format!("{cut}...")
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::{Clock, ManualClock, TokioClock};
    use crate::domains::upstream::error::NetworkError;
    use crate::test_support::FakeBackend;
    use bytes::Bytes;

    fn no_jitter() -> RetryPolicy {
        RetryPolicy {
            jitter: false,
            ..RetryPolicy::default()
        }
    }

    fn transport(
        backend: Arc<FakeBackend>,
        clock: Arc<ManualClock>,
        interval: Duration,
        policy: RetryPolicy,
    ) -> RetryingTransport {
        let limiter = Arc::new(RateLimiter::new(interval, clock.clone()));
        RetryingTransport::new(backend, limiter, policy, clock)
    }

    fn request() -> UpstreamRequest {
        UpstreamRequest::get(["eod", "AAPL.US"]).with_query("fmt", "json")
    }

    #[test]
    fn test_backoff_without_jitter_doubles_and_caps() {
        let policy = no_jitter();
        assert_eq!(policy.backoff(1), Duration::from_secs(1));
        assert_eq!(policy.backoff(2), Duration::from_secs(2));
        assert_eq!(policy.backoff(3), Duration::from_secs(4));
        assert_eq!(policy.backoff(5), Duration::from_secs(10));
        assert_eq!(policy.backoff(40), Duration::from_secs(10));
    }

    #[test]
    fn test_backoff_jitter_stays_within_base() {
        let policy = RetryPolicy::default();
        for _ in 0..50 {
            let delay = policy.backoff(2);
            assert!(delay >= Duration::from_secs(2));
            assert!(delay < Duration::from_secs(3));
        }
    }

    #[test]
    fn test_parse_retry_after_seconds() {
        assert_eq!(
            parse_retry_after(" 7 ", Utc::now()),
            Some(Duration::from_secs(7))
        );
    }

    #[test]
    fn test_parse_retry_after_http_date() {
        let now = DateTime::parse_from_rfc2822("Wed, 21 Oct 2015 07:28:00 GMT")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(
            parse_retry_after("Wed, 21 Oct 2015 07:28:30 GMT", now),
            Some(Duration::from_secs(30))
        );
        assert_eq!(
            parse_retry_after("Wed, 21 Oct 2015 07:27:00 GMT", now),
            Some(Duration::ZERO)
        );
        assert_eq!(parse_retry_after("soon", now), None);
    }

    #[test]
    fn test_normalize_body_variants() {
        let json_body = RawResponse::json(200, r#"{"close": 10.5}"#);
        assert_eq!(normalize_body(&json_body).unwrap(), json!({"close": 10.5}));

        let csv = RawResponse {
            status: 200,
            content_type: Some("text/csv; charset=utf-8".to_string()),
            retry_after: None,
            body: Bytes::from_static(b"Date,Close\n2024-01-02,10"),
        };
        assert_eq!(
            normalize_body(&csv).unwrap(),
            json!({"csv": "Date,Close\n2024-01-02,10"})
        );

        let unknown = RawResponse {
            content_type: None,
            body: Bytes::from_static(b"not json"),
            ..csv.clone()
        };
        assert_eq!(normalize_body(&unknown).unwrap(), json!({"text": "not json"}));

        let sniffed = RawResponse {
            content_type: Some("application/octet-stream".to_string()),
            body: Bytes::from_static(b"[1,2]"),
            ..csv
        };
        assert_eq!(normalize_body(&sniffed).unwrap(), json!([1, 2]));
    }

    #[test]
    fn test_normalize_rejects_malformed_json() {
        let raw = RawResponse::json(200, "{oops");
        assert!(normalize_body(&raw).is_err());
    }

    #[tokio::test]
    async fn test_success_on_first_attempt() {
        let clock = Arc::new(ManualClock::new());
        let backend = Arc::new(FakeBackend::scripted(
            clock.clone(),
            vec![Ok(RawResponse::json(200, r#"{"ok":true}"#))],
        ));
        let transport = transport(backend.clone(), clock.clone(), Duration::ZERO, no_jitter());

        let response = transport.send(&request()).await.unwrap();

        assert_eq!(response.body, json!({"ok": true}));
        assert_eq!(response.attempts, 1);
        assert_eq!(backend.call_count(), 1);
        assert!(clock.sleeps().is_empty());
    }

    #[tokio::test]
    async fn test_not_found_is_never_retried() {
        let clock = Arc::new(ManualClock::new());
        let backend = Arc::new(FakeBackend::scripted(
            clock.clone(),
            vec![Ok(RawResponse::json(404, r#"{"error":"Ticker not found"}"#))],
        ));
        let transport = transport(backend.clone(), clock, Duration::ZERO, no_jitter());

        let err = transport.send(&request()).await.unwrap_err();

        assert!(!err.is_transient());
        assert_eq!(err.status, Some(404));
        assert_eq!(err.attempts, 1);
        assert!(err.message.contains("Ticker not found"));
        assert_eq!(backend.call_count(), 1);
    }

    #[tokio::test]
    async fn test_server_errors_retry_with_backoff_then_succeed() {
        let clock = Arc::new(ManualClock::new());
        let backend = Arc::new(FakeBackend::scripted(
            clock.clone(),
            vec![
                Ok(RawResponse::json(503, "unavailable")),
                Err(NetworkError::Timeout),
                Ok(RawResponse::json(200, "[]")),
            ],
        ));
        let transport = transport(backend.clone(), clock.clone(), Duration::ZERO, no_jitter());

        let response = transport.send(&request()).await.unwrap();

        assert_eq!(response.attempts, 3);
        assert_eq!(backend.call_count(), 3);
        assert_eq!(
            clock.sleeps(),
            vec![Duration::from_secs(1), Duration::from_secs(2)]
        );
        assert_eq!(response.elapsed, Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_exhausted_retries_surface_transient_error() {
        let clock = Arc::new(ManualClock::new());
        let backend = Arc::new(FakeBackend::scripted(
            clock.clone(),
            vec![
                Ok(RawResponse::json(500, "boom")),
                Ok(RawResponse::json(502, "bad gateway")),
                Ok(RawResponse::json(500, "still down")),
            ],
        ));
        let transport = transport(backend.clone(), clock, Duration::ZERO, no_jitter());

        let err = transport.send(&request()).await.unwrap_err();

        assert!(err.is_transient());
        assert_eq!(err.attempts, 3);
        assert_eq!(err.status, Some(500));
        assert_eq!(err.elapsed, Duration::from_secs(3));
        assert_eq!(backend.call_count(), 3);
    }

    #[tokio::test]
    async fn test_retry_after_is_honored_exactly() {
        let clock = Arc::new(ManualClock::new());
        let backend = Arc::new(FakeBackend::scripted(
            clock.clone(),
            vec![
                Ok(RawResponse::json(429, "slow down").with_retry_after("7")),
                Ok(RawResponse::json(200, "{}")),
            ],
        ));
        let transport = transport(
            backend.clone(),
            clock.clone(),
            Duration::from_millis(100),
            RetryPolicy::default(),
        );

        transport.send(&request()).await.unwrap();

        let calls = backend.call_times();
        assert_eq!(calls.len(), 2);
        assert!(calls[1] - calls[0] >= Duration::from_secs(7));
        assert_eq!(clock.sleeps(), vec![Duration::from_secs(7)]);
    }

    #[tokio::test]
    async fn test_rate_limited_without_header_uses_backoff() {
        let clock = Arc::new(ManualClock::new());
        let backend = Arc::new(FakeBackend::scripted(
            clock.clone(),
            vec![
                Ok(RawResponse::json(429, "")),
                Ok(RawResponse::json(200, "{}")),
            ],
        ));
        let transport = transport(backend, clock.clone(), Duration::ZERO, no_jitter());

        transport.send(&request()).await.unwrap();

        assert_eq!(clock.sleeps(), vec![Duration::from_secs(1)]);
    }

    #[tokio::test]
    async fn test_malformed_success_payload_is_permanent() {
        let clock = Arc::new(ManualClock::new());
        let backend = Arc::new(FakeBackend::scripted(
            clock.clone(),
            vec![Ok(RawResponse::json(200, "{not json"))],
        ));
        let transport = transport(backend.clone(), clock, Duration::ZERO, no_jitter());

        let err = transport.send(&request()).await.unwrap_err();

        assert!(!err.is_transient());
        assert_eq!(backend.call_count(), 1);
    }

    #[tokio::test]
    async fn test_every_attempt_passes_the_rate_limiter() {
        let clock = Arc::new(ManualClock::new());
        let backend = Arc::new(FakeBackend::scripted(
            clock.clone(),
            vec![
                Err(NetworkError::Connect("refused".to_string())),
                Ok(RawResponse::json(200, "{}")),
            ],
        ));
        let policy = RetryPolicy {
            base_backoff: Duration::from_millis(10),
            ..no_jitter()
        };
        let transport = transport(backend.clone(), clock, Duration::from_millis(100), policy);

        transport.send(&request()).await.unwrap();

        let calls = backend.call_times();
        assert!(calls[1] - calls[0] >= Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_sends_are_spaced_globally() {
        let interval = Duration::from_millis(100);
        let clock = TokioClock::shared();
        let backend = Arc::new(FakeBackend::always(
            clock.clone(),
            RawResponse::json(200, "{}"),
        ));
        let limiter = Arc::new(RateLimiter::new(interval, clock.clone()));
        let transport = Arc::new(RetryingTransport::new(
            backend.clone(),
            limiter,
            no_jitter(),
            clock.clone(),
        ));

        let handles: Vec<_> = (0..6)
            .map(|_| {
                let transport = transport.clone();
                tokio::spawn(async move { transport.send(&request()).await })
            })
            .collect();
        for handle in handles {
            assert!(handle.await.unwrap().is_ok());
        }

        let mut calls = backend.call_times();
        calls.sort();
        assert_eq!(calls.len(), 6);
        for pair in calls.windows(2) {
            assert!(pair[1] - pair[0] >= interval);
        }
        assert!(clock.now() >= calls[0]);
    }
}
