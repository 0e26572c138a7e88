//! Bounded fan-out of one tool over many argument sets.

use std::sync::Arc;

use futures::StreamExt;
use futures::stream;
use serde_json::{Map, Value, json};
use tracing::{info, instrument};

use super::dispatcher::{RequestDispatcher, ToolResponse};
use super::error::ToolError;
use crate::domains::auth::Credential;

/// Outcome of one batch element.
#[derive(Debug)]
pub struct BatchItem {
    /// Position in the submitted batch.
    pub index: usize,
    pub params: Map<String, Value>,
    pub outcome: Result<ToolResponse, ToolError>,
}

/// Per-item outcomes in submission order.
#[derive(Debug)]
pub struct BatchResult {
    pub tool: String,
    pub items: Vec<BatchItem>,
}

impl BatchResult {
    pub fn succeeded(&self) -> usize {
        self.items.iter().filter(|i| i.outcome.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.items.len() - self.succeeded()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// JSON summary with either the data or the error report of every item.
    pub fn to_json(&self) -> Value {
        let results: Vec<Value> = self
            .items
            .iter()
            .map(|item| match &item.outcome {
                Ok(response) => json!({
                    "index": item.index,
                    "params": item.params,
                    "data": response.json().unwrap_or(Value::Null),
                    "cache": response.cache,
                }),
                Err(e) => json!({
                    "index": item.index,
                    "params": item.params,
                    "error": e.report(),
                }),
            })
            .collect();

        json!({
            "tool": self.tool,
            "total": self.len(),
            "succeeded": self.succeeded(),
            "failed": self.failed(),
            "results": results,
        })
    }
}

/// Runs batches through a shared dispatcher.
pub struct BatchCoordinator {
    dispatcher: Arc<RequestDispatcher>,
    max_concurrency: usize,
    max_size: usize,
}

impl BatchCoordinator {
    pub fn new(dispatcher: Arc<RequestDispatcher>, max_concurrency: usize, max_size: usize) -> Self {
        Self {
            dispatcher,
            max_concurrency: max_concurrency.max(1),
            max_size: max_size.max(1),
        }
    }

    pub fn dispatcher(&self) -> &RequestDispatcher {
        &self.dispatcher
    }

    /// Default fan-out.
    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Largest batch accepted by the batch tools.
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Invoke `tool` once per argument set with at most `max_concurrency`
    /// invocations in flight. One item failing never affects the others.
    #[instrument(skip_all, fields(tool = %tool, items = args.len()))]
    pub async fn run_batch(
        &self,
        tool: &str,
        args: Vec<Map<String, Value>>,
        credential: &Credential,
        max_concurrency: usize,
    ) -> BatchResult {
        let dispatcher = &self.dispatcher;
        let items: Vec<BatchItem> = stream::iter(args.into_iter().enumerate())
            .map(|(index, params)| async move {
                let outcome = dispatcher.invoke(tool, &params, credential).await;
                BatchItem {
                    index,
                    params,
                    outcome,
                }
            })
            .buffered(max_concurrency.max(1))
            .collect()
            .await;

        let result = BatchResult {
            tool: tool.to_string(),
            items,
        };
        info!(
            succeeded = result.succeeded(),
            failed = result.failed(),
            "Batch completed"
        );
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::{ClockHandle, ManualClock, TokioClock};
    use crate::domains::tools::catalog;
    use crate::domains::upstream::RawResponse;
    use crate::test_support::{FakeBackend, LEGACY_TOKEN, test_dispatcher};
    use std::time::Duration;

    fn quote_backend(clock: ClockHandle) -> FakeBackend {
        FakeBackend::with_handler(clock, |request| {
            let ticker = request.path.last().cloned().unwrap_or_default();
            if ticker == "BAD.US" {
                Ok(RawResponse::json(404, r#"{"message":"not found"}"#))
            } else {
                Ok(RawResponse::json(200, format!(r#"{{"code":"{ticker}","close":1.0}}"#)))
            }
        })
    }

    fn coordinator(backend: Arc<FakeBackend>, clock: ClockHandle) -> BatchCoordinator {
        BatchCoordinator::new(Arc::new(test_dispatcher(backend, clock)), 10, 50)
    }

    fn tickers(symbols: &[&str]) -> Vec<Map<String, Value>> {
        symbols
            .iter()
            .map(|s| json!({ "ticker": s }).as_object().cloned().unwrap())
            .collect()
    }

    fn legacy() -> Credential {
        Credential::Legacy(LEGACY_TOKEN.to_string())
    }

    #[tokio::test]
    async fn test_failing_item_is_isolated_and_order_preserved() {
        let clock: ClockHandle = Arc::new(ManualClock::new());
        let backend = Arc::new(quote_backend(clock.clone()));
        let batch = coordinator(backend.clone(), clock);

        let result = batch
            .run_batch(
                catalog::LIVE_PRICE,
                tickers(&["A.US", "B.US", "BAD.US", "D.US", "E.US"]),
                &legacy(),
                3,
            )
            .await;

        assert_eq!(result.len(), 5);
        assert_eq!(result.succeeded(), 4);
        for (position, item) in result.items.iter().enumerate() {
            assert_eq!(item.index, position);
        }
        let failed = result.items[2].outcome.as_ref().unwrap_err();
        assert_eq!(failed.kind(), "upstream_permanent");
        let fourth = result.items[3].outcome.as_ref().unwrap();
        assert_eq!(fourth.json().unwrap()["code"], "D.US");
        assert_eq!(backend.call_count(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_flight_calls_never_exceed_limit() {
        let clock = TokioClock::shared();
        let backend =
            Arc::new(quote_backend(clock.clone()).with_latency(Duration::from_millis(100)));
        let batch = coordinator(backend.clone(), clock);
        let symbols: Vec<String> = (0..8).map(|i| format!("T{i}.US")).collect();
        let refs: Vec<&str> = symbols.iter().map(String::as_str).collect();

        let result = batch
            .run_batch(catalog::LIVE_PRICE, tickers(&refs), &legacy(), 3)
            .await;

        assert_eq!(result.succeeded(), 8);
        assert_eq!(backend.max_in_flight(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_concurrency_runs_sequentially() {
        let clock = TokioClock::shared();
        let backend =
            Arc::new(quote_backend(clock.clone()).with_latency(Duration::from_millis(10)));
        let batch = coordinator(backend.clone(), clock);

        batch
            .run_batch(catalog::LIVE_PRICE, tickers(&["A.US", "B.US", "C.US"]), &legacy(), 0)
            .await;

        assert_eq!(backend.max_in_flight(), 1);
    }

    #[tokio::test]
    async fn test_empty_batch_and_summary() {
        let clock: ClockHandle = Arc::new(ManualClock::new());
        let batch = coordinator(Arc::new(quote_backend(clock.clone())), clock);

        let empty = batch.run_batch(catalog::LIVE_PRICE, Vec::new(), &legacy(), 4).await;
        assert!(empty.is_empty());

        let result = batch
            .run_batch(catalog::LIVE_PRICE, tickers(&["A.US", "BAD.US"]), &legacy(), 4)
            .await;
        let summary = result.to_json();
        assert_eq!(summary["succeeded"], 1);
        assert_eq!(summary["failed"], 1);
        assert_eq!(summary["results"][0]["data"]["code"], "A.US");
        assert_eq!(summary["results"][1]["error"]["kind"], "upstream_permanent");
    }

    #[tokio::test]
    async fn test_auth_is_checked_per_item() {
        let clock: ClockHandle = Arc::new(ManualClock::new());
        let backend = Arc::new(quote_backend(clock.clone()));
        let batch = coordinator(backend.clone(), clock);

        let result = batch
            .run_batch(
                catalog::LIVE_PRICE,
                tickers(&["A.US", "B.US"]),
                &Credential::Bearer("news-reader".to_string()),
                2,
            )
            .await;

        assert_eq!(result.failed(), 2);
        assert_eq!(backend.call_count(), 0);
    }
}
