//! Aggregate tools built on top of batches.
//!
//! `get_batch_quotes` fans out live quotes; `compare_stocks` fans out
//! fundamentals and flattens them into one comparison row per ticker. Both
//! require their own scope up front and then go through the dispatcher per
//! ticker, so caching and rate limiting apply to every element.

use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tracing::{info, instrument};

use super::batch::{BatchCoordinator, BatchItem, BatchResult};
use super::catalog;
use super::error::ToolError;
use crate::domains::auth::{Credential, scopes};

pub const BATCH_QUOTES: &str = "get_batch_quotes";
pub const COMPARE_STOCKS: &str = "compare_stocks";

pub const BATCH_QUOTES_DESCRIPTION: &str = "Live quotes for up to 50 tickers in one call. Returns a map of ticker to quote plus any per-ticker errors.";
pub const COMPARE_STOCKS_DESCRIPTION: &str = "Side-by-side comparison of 2 to 10 stocks: sector, market cap, P/E, PEG, EPS, dividend yield, margins, ROE, revenue, growth, target price and valuation ratios.";

const MIN_COMPARE: usize = 2;
const MAX_COMPARE: usize = 10;

/// Columns of a comparison row, after `ticker`, `name`, `sector` and `industry`.
pub const COMPARISON_METRICS: &[&str] = &[
    "market_cap",
    "pe_ratio",
    "peg_ratio",
    "eps",
    "dividend_yield",
    "profit_margin",
    "roe",
    "revenue",
    "revenue_growth",
    "target_price",
    "forward_pe",
    "price_to_book",
    "ev_ebitda",
];

/// Metric name to `(fundamentals section, field)`.
const METRIC_SOURCES: &[(&str, &str, &str)] = &[
    ("market_cap", "Highlights", "MarketCapitalization"),
    ("pe_ratio", "Highlights", "PERatio"),
    ("peg_ratio", "Highlights", "PEGRatio"),
    ("eps", "Highlights", "EarningsShare"),
    ("dividend_yield", "Highlights", "DividendYield"),
    ("profit_margin", "Highlights", "ProfitMargin"),
    ("roe", "Highlights", "ReturnOnEquityTTM"),
    ("revenue", "Highlights", "RevenueTTM"),
    ("revenue_growth", "Highlights", "QuarterlyRevenueGrowthYOY"),
    ("target_price", "Highlights", "WallStreetTargetPrice"),
    ("forward_pe", "Valuation", "ForwardPE"),
    ("price_to_book", "Valuation", "PriceBookMRQ"),
    ("ev_ebitda", "Valuation", "EnterpriseValueEbitda"),
];

// ============================================================================
// Parameters
// ============================================================================

/// Tickers as a comma-separated string or a list.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum Symbols {
    List(Vec<String>),
    Csv(String),
}

impl Symbols {
    /// Trimmed, non-empty tickers in the given order.
    pub fn tickers(&self) -> Vec<String> {
        let raw: Vec<&str> = match self {
            Self::List(items) => items.iter().map(String::as_str).collect(),
            Self::Csv(s) => s.split(',').collect(),
        };
        raw.into_iter()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// Parameters shared by the aggregate tools.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct SymbolsParams {
    /// Tickers with exchange suffix, e.g. "AAPL.US,MSFT.US" or ["AAPL.US", "MSFT.US"].
    pub symbols: Symbols,
}

impl SymbolsParams {
    pub fn from_args(args: Map<String, Value>) -> Result<Self, ToolError> {
        serde_json::from_value(Value::Object(args)).map_err(|e| ToolError::invalid_arguments(e.to_string()))
    }
}

// ============================================================================
// Tools
// ============================================================================

/// Live quotes for many tickers.
#[instrument(skip_all)]
pub async fn batch_quotes(
    batch: &BatchCoordinator,
    args: Map<String, Value>,
    credential: &Credential,
) -> Result<Value, ToolError> {
    batch
        .dispatcher()
        .gate()
        .authorize(credential, scopes::READ_LIVE)
        .await?;

    let tickers = SymbolsParams::from_args(args)?.symbols.tickers();
    if tickers.is_empty() {
        return Err(ToolError::invalid_arguments("No valid symbols provided"));
    }
    if tickers.len() > batch.max_size() {
        return Err(ToolError::invalid_arguments(format!(
            "At most {} symbols are allowed per request (got {})",
            batch.max_size(),
            tickers.len()
        )));
    }

    let result = fan_out(batch, catalog::LIVE_PRICE, &tickers, None, credential).await;

    let mut quotes = Map::new();
    let mut errors = Vec::new();
    for (ticker, item) in tickers.iter().zip(&result.items) {
        match item.outcome.as_ref().ok().and_then(|r| r.json().ok()) {
            Some(data) if !data.is_null() => {
                quotes.insert(ticker.clone(), data);
            }
            _ => errors.push(item_error(ticker, item)),
        }
    }

    info!(requested = tickers.len(), returned = quotes.len(), "Batch quotes assembled");
    let mut response = json!({
        "quotes": quotes,
        "count": quotes.len(),
        "requested": tickers.len(),
    });
    if !errors.is_empty() {
        response["errors"] = json!(errors);
    }
    Ok(response)
}

/// Flattened fundamentals comparison.
#[instrument(skip_all)]
pub async fn compare_stocks(
    batch: &BatchCoordinator,
    args: Map<String, Value>,
    credential: &Credential,
) -> Result<Value, ToolError> {
    batch
        .dispatcher()
        .gate()
        .authorize(credential, scopes::READ_FUNDAMENTALS)
        .await?;

    let tickers = SymbolsParams::from_args(args)?.symbols.tickers();
    if tickers.len() < MIN_COMPARE {
        return Err(ToolError::invalid_arguments(format!(
            "At least {MIN_COMPARE} symbols are required for comparison"
        )));
    }
    if tickers.len() > MAX_COMPARE {
        return Err(ToolError::invalid_arguments(format!(
            "At most {MAX_COMPARE} symbols are allowed for comparison (got {})",
            tickers.len()
        )));
    }

    let result = fan_out(
        batch,
        catalog::FUNDAMENTALS,
        &tickers,
        Some(catalog::COMPARISON_FILTER),
        credential,
    )
    .await;

    let mut comparison = Vec::new();
    let mut errors = Vec::new();
    for (ticker, item) in tickers.iter().zip(&result.items) {
        match item.outcome.as_ref().ok().and_then(|r| r.json().ok()) {
            Some(data) if data.is_object() => comparison.push(comparison_row(ticker, &data)),
            _ => errors.push(item_error(ticker, item)),
        }
    }

    if comparison.is_empty() {
        return Err(ToolError::invalid_arguments(format!(
            "Could not fetch data for any symbols: {}",
            errors.join("; ")
        )));
    }

    let mut response = json!({
        "comparison": comparison,
        "count": comparison.len(),
        "metrics": COMPARISON_METRICS,
    });
    if !errors.is_empty() {
        response["errors"] = json!(errors);
    }
    Ok(response)
}

async fn fan_out(
    batch: &BatchCoordinator,
    tool: &str,
    tickers: &[String],
    filter: Option<&str>,
    credential: &Credential,
) -> BatchResult {
    let args = tickers
        .iter()
        .map(|ticker| {
            let mut args = Map::new();
            args.insert("ticker".to_string(), json!(ticker));
            if let Some(filter) = filter {
                args.insert("filter".to_string(), json!(filter));
            }
            args
        })
        .collect();
    batch
        .run_batch(tool, args, credential, batch.max_concurrency())
        .await
}

fn item_error(ticker: &str, item: &BatchItem) -> String {
    match &item.outcome {
        Err(e) => format!("{ticker}: {e}"),
        Ok(_) => format!("{ticker}: unexpected response shape"),
    }
}

fn comparison_row(ticker: &str, data: &Value) -> Value {
    let pick = |section: &str, field: &str| data.get(section).and_then(|s| s.get(field)).cloned().unwrap_or(Value::Null);

    let mut row = Map::new();
    row.insert("ticker".to_string(), json!(ticker));
    row.insert("name".to_string(), pick("General", "Name"));
    row.insert("sector".to_string(), pick("General", "Sector"));
    row.insert("industry".to_string(), pick("General", "Industry"));
    for (metric, section, field) in METRIC_SOURCES {
        row.insert(metric.to_string(), pick(section, field));
    }
    Value::Object(row)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::{ClockHandle, ManualClock};
    use crate::domains::upstream::{RawResponse, UpstreamRequest};
    use crate::test_support::{FakeBackend, LEGACY_TOKEN, test_dispatcher};
    use std::sync::Arc;
    use tokio_test::{assert_err, assert_ok};

    fn respond(request: &UpstreamRequest) -> RawResponse {
        let ticker = request.path.last().cloned().unwrap_or_default();
        match (request.path[0].as_str(), ticker.as_str()) {
            (_, "BAD.US") => RawResponse::json(404, r#"{"message":"Ticker not found"}"#),
            ("real-time", t) => RawResponse::json(200, format!(r#"{{"code":"{t}","close":10.5}}"#)),
            ("fundamentals", t) => RawResponse::json(
                200,
                format!(
                    r#"{{"General":{{"Name":"{t} Inc","Sector":"Technology"}},
                        "Highlights":{{"MarketCapitalization":1000,"PERatio":25.5}},
                        "Valuation":{{"ForwardPE":22.1}}}}"#
                ),
            ),
            _ => RawResponse::json(404, "{}"),
        }
    }

    fn setup() -> (BatchCoordinator, Arc<FakeBackend>) {
        let clock: ClockHandle = Arc::new(ManualClock::new());
        let backend = Arc::new(FakeBackend::with_handler(clock.clone(), |r| Ok(respond(r))));
        let dispatcher = test_dispatcher(backend.clone(), clock);
        (BatchCoordinator::new(Arc::new(dispatcher), 4, 50), backend)
    }

    fn symbols(value: Value) -> Map<String, Value> {
        json!({ "symbols": value }).as_object().cloned().unwrap()
    }

    fn legacy() -> Credential {
        Credential::Legacy(LEGACY_TOKEN.to_string())
    }

    #[test]
    fn test_symbols_accept_csv_and_lists() {
        let parse = |value: Value| SymbolsParams::from_args(symbols(value)).unwrap().symbols.tickers();

        assert_eq!(parse(json!(" A.US, ,B.US ")), vec!["A.US", "B.US"]);
        assert_eq!(parse(json!(["A.US", " "])), vec!["A.US"]);
        assert_err!(SymbolsParams::from_args(Map::new()));
        assert_err!(SymbolsParams::from_args(json!({"symbols": "A", "x": 1}).as_object().cloned().unwrap()));
    }

    #[tokio::test]
    async fn test_batch_quotes_collects_partial_failures() {
        let (batch, backend) = setup();

        let response = assert_ok!(
            batch_quotes(&batch, symbols(json!("AAPL.US,BAD.US,MSFT.US")), &legacy()).await
        );

        assert_eq!(response["count"], 2);
        assert_eq!(response["requested"], 3);
        assert_eq!(response["quotes"]["MSFT.US"]["close"], 10.5);
        let errors = response["errors"].as_array().unwrap();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].as_str().unwrap().starts_with("BAD.US:"));
        assert_eq!(backend.call_count(), 3);
    }

    #[tokio::test]
    async fn test_batch_quotes_limits() {
        let (batch, backend) = setup();
        let many: Vec<String> = (0..51).map(|i| format!("T{i}.US")).collect();

        let err = assert_err!(batch_quotes(&batch, symbols(json!(many)), &legacy()).await);
        assert_eq!(err.kind(), "validation_error");
        assert_err!(batch_quotes(&batch, symbols(json!(" , ")), &legacy()).await);
        assert_eq!(backend.call_count(), 0);
    }

    #[tokio::test]
    async fn test_batch_quotes_requires_live_scope() {
        let (batch, backend) = setup();

        let err = assert_err!(
            batch_quotes(
                &batch,
                symbols(json!("AAPL.US")),
                &Credential::Bearer("news-reader".to_string())
            )
            .await
        );
        assert_eq!(err.kind(), "authorization_error");
        assert_eq!(backend.call_count(), 0);
    }

    #[tokio::test]
    async fn test_compare_stocks_builds_rows() {
        let (batch, backend) = setup();

        let response = assert_ok!(
            compare_stocks(&batch, symbols(json!(["AAPL.US", "MSFT.US", "BAD.US"])), &legacy()).await
        );

        assert_eq!(response["count"], 2);
        let rows = response["comparison"].as_array().unwrap();
        assert_eq!(rows[0]["ticker"], "AAPL.US");
        assert_eq!(rows[0]["name"], "AAPL.US Inc");
        assert_eq!(rows[0]["pe_ratio"], 25.5);
        assert_eq!(rows[0]["forward_pe"], 22.1);
        assert_eq!(rows[0]["ev_ebitda"], Value::Null);
        assert_eq!(response["metrics"].as_array().unwrap().len(), COMPARISON_METRICS.len());
        assert_eq!(response["errors"].as_array().unwrap().len(), 1);

        let request = &backend.requests()[0];
        assert!(request
            .query
            .contains(&("filter".to_string(), catalog::COMPARISON_FILTER.to_string())));
    }

    #[tokio::test]
    async fn test_compare_stocks_bounds_and_total_failure() {
        let (batch, _) = setup();

        assert_err!(compare_stocks(&batch, symbols(json!("AAPL.US")), &legacy()).await);
        let eleven: Vec<String> = (0..11).map(|i| format!("T{i}.US")).collect();
        assert_err!(compare_stocks(&batch, symbols(json!(eleven)), &legacy()).await);

        let err = assert_err!(
            compare_stocks(&batch, symbols(json!("BAD.US,BAD.US")), &legacy()).await
        );
        assert_eq!(err.kind(), "validation_error");
        assert!(err.to_string().contains("Could not fetch data for any symbols"));
    }
}
