//! Upstream request model and the HTTP backend seam.
//!
//! [`HttpBackend`] performs exactly one HTTP exchange and knows nothing about
//! retries or spacing; [`RetryingTransport`](super::RetryingTransport) wraps
//! it. [`ReqwestBackend`] is the production implementation.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Url;
use reqwest::header::{CONTENT_TYPE, RETRY_AFTER};
use tracing::debug;

use super::error::NetworkError;
use crate::core::config::UpstreamConfig;
use crate::core::{Error, Result};

/// HTTP method of an upstream call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// One logical call to the upstream API, before the API key is injected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamRequest {
    pub method: Method,

    /// Unencoded path segments appended to the configured base URL.
    pub path: Vec<String>,

    /// Query parameters in the order they should be sent.
    pub query: Vec<(String, String)>,
}

impl UpstreamRequest {
    /// Create a GET request for the given path segments.
    pub fn get<I, S>(path: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            method: Method::Get,
            path: path.into_iter().map(Into::into).collect(),
            query: Vec::new(),
        }
    }

    /// Append a query parameter.
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Loggable form of the request. Never contains credentials.
    pub fn describe(&self) -> String {
        format!("/{}", self.path.join("/"))
    }
}

/// Raw HTTP response as seen by the transport.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub retry_after: Option<String>,
    pub body: Bytes,
}

impl RawResponse {
    /// Convenience constructor for a JSON response.
    pub fn json(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            content_type: Some("application/json".to_string()),
            retry_after: None,
            body: body.into(),
        }
    }

    /// Attach a `Retry-After` header value.
    pub fn with_retry_after(mut self, value: impl Into<String>) -> Self {
        self.retry_after = Some(value.into());
        self
    }
}

/// Performs a single HTTP exchange with the upstream API.
#[async_trait]
pub trait HttpBackend: Send + Sync {
    async fn execute(&self, request: &UpstreamRequest) -> std::result::Result<RawResponse, NetworkError>;
}

/// [`HttpBackend`] built on `reqwest`.
pub struct ReqwestBackend {
    client: reqwest::Client,
    base_url: Url,
    api_key: Option<String>,
}

impl ReqwestBackend {
    /// Build a backend from the upstream configuration.
    pub fn new(config: &UpstreamConfig) -> Result<Self> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| Error::config(format!("Invalid upstream base URL: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(Error::config(format!(
                "Upstream base URL cannot carry a path: {}",
                config.base_url
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url,
            api_key: config.api_key.clone(),
        })
    }
}

#[async_trait]
impl HttpBackend for ReqwestBackend {
    async fn execute(&self, request: &UpstreamRequest) -> std::result::Result<RawResponse, NetworkError> {
        let url = build_url(&self.base_url, request, self.api_key.as_deref());

        let builder = match request.method {
            Method::Get => self.client.get(url),
            Method::Post => self.client.post(url),
        };

        let response = builder.send().await.map_err(NetworkError::from_reqwest)?;

        let status = response.status().as_u16();
        let header = |name| {
            response
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        let content_type = header(CONTENT_TYPE);
        let retry_after = header(RETRY_AFTER);

        let body = response.bytes().await.map_err(NetworkError::from_reqwest)?;

        debug!(
            request = %request.describe(),
            status,
            bytes = body.len(),
            "Upstream response received"
        );

        Ok(RawResponse {
            status,
            content_type,
            retry_after,
            body,
        })
    }
}

/// Build the final URL: base + encoded path segments + query + API key.
pub fn build_url(base: &Url, request: &UpstreamRequest, api_key: Option<&str>) -> Url {
    let mut url = base.clone();

    if let Ok(mut segments) = url.path_segments_mut() {
        segments.pop_if_empty();
        segments.extend(request.path.iter());
    }

    if !request.query.is_empty() || api_key.is_some() {
        let mut pairs = url.query_pairs_mut();
        for (key, value) in &request.query {
            pairs.append_pair(key, value);
        }
        if let Some(key) = api_key {
            pairs.append_pair("api_token", key);
        }
    }

    url
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://eodhd.com/api").unwrap()
    }

    #[test]
    fn test_build_url_appends_segments_and_key() {
        let request = UpstreamRequest::get(["fundamentals", "AAPL.US"])
            .with_query("filter", "Financials::Ratios");

        let url = build_url(&base(), &request, Some("secret"));

        assert_eq!(
            url.as_str(),
            "https://eodhd.com/api/fundamentals/AAPL.US?filter=Financials%3A%3ARatios&api_token=secret"
        );
    }

    #[test]
    fn test_build_url_encodes_path_segments() {
        let request = UpstreamRequest::get(["eod", "BRK/B US"]);
        let url = build_url(&base(), &request, None);
        assert_eq!(url.as_str(), "https://eodhd.com/api/eod/BRK%2FB%20US");
    }

    #[test]
    fn test_build_url_tolerates_trailing_slash() {
        let base = Url::parse("https://eodhd.com/api/").unwrap();
        let request = UpstreamRequest::get(["exchanges-list"]);
        let url = build_url(&base, &request, None);
        assert_eq!(url.as_str(), "https://eodhd.com/api/exchanges-list");
    }

    #[test]
    fn test_describe_never_contains_key() {
        let request = UpstreamRequest::get(["real-time", "AAPL.US"]).with_query("fmt", "json");
        assert_eq!(request.describe(), "/real-time/AAPL.US");
    }

    #[test]
    fn test_backend_rejects_invalid_base_url() {
        let config = UpstreamConfig {
            base_url: "not a url".to_string(),
            ..UpstreamConfig::default()
        };
        assert!(ReqwestBackend::new(&config).is_err());
    }
}
