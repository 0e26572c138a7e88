//! Built-in tool catalog.
//!
//! Each entry maps one tool name onto one upstream endpoint. Tools that read
//! a slice of the fundamentals document share the `/fundamentals/{ticker}`
//! endpoint with a fixed `filter`.

use super::descriptor::{CachePolicy, ParamSpec, ToolDescriptor};
use crate::domains::auth::scopes;

pub const HISTORICAL_PRICES: &str = "get_historical_stock_prices";
pub const LIVE_PRICE: &str = "get_live_price_data";
pub const INTRADAY: &str = "get_intraday_historical_data";
pub const FUNDAMENTALS: &str = "get_fundamentals_data";

/// Fundamentals sections read by `compare_stocks`.
pub const COMPARISON_FILTER: &str = "General,Highlights,Valuation";

const TICKER_HELP: &str = "Ticker with exchange suffix (e.g. 'AAPL.US')";
const EXCHANGE_HELP: &str = "Exchange code (e.g. 'US', 'LSE', 'XETRA')";

fn ticker() -> ParamSpec {
    ParamSpec::string("ticker", TICKER_HELP).in_path()
}

fn exchange() -> ParamSpec {
    ParamSpec::string("exchange", EXCHANGE_HELP).in_path()
}

fn exchange_or_us() -> ParamSpec {
    exchange().default_value("US")
}

fn from_date() -> ParamSpec {
    ParamSpec::date("start_date", "Start date (YYYY-MM-DD)").query_as("from")
}

fn to_date() -> ParamSpec {
    ParamSpec::date("end_date", "End date (YYYY-MM-DD)").query_as("to")
}

/// A tool reading one section of the fundamentals document.
fn fundamentals_slice(name: &str, description: &str, filter: &str) -> ToolDescriptor {
    ToolDescriptor::new(
        name,
        description,
        "/fundamentals/{ticker}",
        scopes::READ_FUNDAMENTALS,
        CachePolicy::FUNDAMENTALS,
    )
    .param(ticker())
    .fixed("filter", filter)
}

/// Every built-in descriptor.
pub fn descriptors() -> Vec<ToolDescriptor> {
    vec![
        // End of day
        ToolDescriptor::new(
            HISTORICAL_PRICES,
            "Historical end-of-day OHLCV prices for a ticker.",
            "/eod/{ticker}",
            scopes::READ_EOD,
            CachePolicy::EOD,
        )
        .param(ticker())
        .param(from_date())
        .param(to_date())
        .param(
            ParamSpec::string("period", "Aggregation period: d, w or m")
                .one_of(&["d", "w", "m"])
                .default_value("d"),
        )
        .param(ParamSpec::string("order", "Sort order: a (ascending) or d (descending)").one_of(&["a", "d"]))
        .param(ParamSpec::integer("limit", "Maximum number of rows").range(1.0, 5000.0))
        .fixed("fmt", "json")
        .date_range("start_date", "end_date"),
        ToolDescriptor::new(
            "get_historical_dividends",
            "Dividend history for a ticker.",
            "/div/{ticker}",
            scopes::READ_EOD,
            CachePolicy::EOD,
        )
        .param(ticker())
        .param(from_date())
        .param(to_date())
        .fixed("fmt", "json")
        .date_range("start_date", "end_date"),
        ToolDescriptor::new(
            "get_historical_splits",
            "Stock split history for a ticker.",
            "/splits/{ticker}",
            scopes::READ_EOD,
            CachePolicy::EOD,
        )
        .param(ticker())
        .param(from_date())
        .param(to_date())
        .fixed("fmt", "json")
        .date_range("start_date", "end_date"),
        ToolDescriptor::new(
            "get_bulk_eod",
            "Last trading day's prices, splits or dividends for every ticker on an exchange.",
            "/eod-bulk-last-day/{exchange}",
            scopes::READ_EOD,
            CachePolicy::EOD,
        )
        .param(exchange())
        .param(ParamSpec::date("date", "Trading date (YYYY-MM-DD); latest when omitted"))
        .param(
            ParamSpec::string("data_type", "eod, splits or dividends")
                .query_as("type")
                .one_of(&["eod", "splits", "dividends"])
                .default_value("eod"),
        )
        .param(ParamSpec::list("symbols", "Restrict to these tickers").max_items(500))
        .fixed("fmt", "json"),
        ToolDescriptor::new(
            "get_exchanges_list",
            "Supported exchanges with codes, countries and currencies.",
            "/exchanges-list",
            scopes::READ_EOD,
            CachePolicy::STATIC,
        )
        .fixed("fmt", "json"),
        ToolDescriptor::new(
            "get_market_status",
            "Trading hours, holidays and open/closed status of an exchange.",
            "/exchange-details/{exchange}",
            scopes::READ_EOD,
            CachePolicy::INTRADAY,
        )
        .param(exchange_or_us())
        .fixed("fmt", "json"),
        ToolDescriptor::new(
            "get_delisted_stocks",
            "Delisted tickers of an exchange.",
            "/exchange-symbol-list/{exchange}",
            scopes::READ_EOD,
            CachePolicy::STATIC,
        )
        .param(exchange_or_us())
        .fixed("type", "delisted")
        .fixed("fmt", "json"),
        ToolDescriptor::new(
            "get_crypto_list",
            "Cryptocurrency pairs available on the virtual CC exchange.",
            "/exchange-symbol-list/CC",
            scopes::READ_EOD,
            CachePolicy::STATIC,
        )
        .fixed("fmt", "json"),
        ToolDescriptor::new(
            "get_forex_list",
            "Currency pairs available on the virtual FOREX exchange.",
            "/exchange-symbol-list/FOREX",
            scopes::READ_EOD,
            CachePolicy::STATIC,
        )
        .fixed("fmt", "json"),
        // Intraday and live
        ToolDescriptor::new(
            INTRADAY,
            "Intraday OHLCV bars for a ticker.",
            "/intraday/{ticker}",
            scopes::READ_INTRADAY,
            CachePolicy::INTRADAY,
        )
        .param(ticker())
        .param(
            ParamSpec::string("interval", "Bar size: 1m, 5m or 1h")
                .one_of(&["1m", "5m", "1h"])
                .default_value("5m"),
        )
        .param(ParamSpec::integer("from_timestamp", "Start as Unix seconds").query_as("from").range(0.0, 4_102_444_800.0))
        .param(ParamSpec::integer("to_timestamp", "End as Unix seconds").query_as("to").range(0.0, 4_102_444_800.0))
        .fixed("fmt", "json"),
        ToolDescriptor::new(
            LIVE_PRICE,
            "Real-time (delayed) quote for a ticker, optionally with more tickers in one call.",
            "/real-time/{ticker}",
            scopes::READ_LIVE,
            CachePolicy::REALTIME,
        )
        .param(ticker())
        .param(ParamSpec::list("additional_symbols", "Extra tickers to quote").query_as("s").max_items(20))
        .fixed("fmt", "json"),
        // Fundamentals
        ToolDescriptor::new(
            FUNDAMENTALS,
            "Company fundamentals: profile, highlights, valuation, financial statements.",
            "/fundamentals/{ticker}",
            scopes::READ_FUNDAMENTALS,
            CachePolicy::FUNDAMENTALS,
        )
        .param(ticker())
        .param(ParamSpec::string("filter", "Comma-separated sections, e.g. 'General,Highlights'"))
        .fixed("fmt", "json"),
        ToolDescriptor::new(
            "get_bulk_fundamentals",
            "Fundamentals for many tickers of one exchange, paginated.",
            "/bulk-fundamentals/{exchange}",
            scopes::READ_FUNDAMENTALS,
            CachePolicy::FUNDAMENTALS,
        )
        .param(exchange())
        .param(ParamSpec::list("symbols", "Restrict to these tickers").max_items(500))
        .param(ParamSpec::integer("offset", "Pagination offset").range(0.0, 1_000_000.0).default_value(0))
        .param(ParamSpec::integer("limit", "Page size").range(1.0, 1000.0).default_value(500))
        .fixed("fmt", "json"),
        fundamentals_slice("get_esg_scores", "Environmental, social and governance scores.", "ESGScores"),
        fundamentals_slice(
            "get_insider_summary",
            "Recent insider transactions.",
            "InsiderTransactions",
        ),
        fundamentals_slice(
            "get_institutional_holders",
            "Largest institutional holders.",
            "Holders::Institutions",
        ),
        fundamentals_slice(
            "get_short_interest",
            "Share statistics including short interest and float.",
            "SharesStats",
        ),
        fundamentals_slice(
            "get_analyst_ratings",
            "Analyst consensus rating and target price.",
            "AnalystRatings",
        ),
        fundamentals_slice(
            "get_financial_ratios",
            "Financial ratios from the company's statements.",
            "Financials::Ratios",
        ),
        fundamentals_slice(
            "get_stock_logo",
            "Company logo URL, name and code.",
            "General::LogoURL,General::Name,General::Code",
        ),
        ToolDescriptor::new(
            "get_historical_constituents",
            "Historical constituents of an index (e.g. 'GSPC.INDX').",
            "/fundamentals/{index_code}",
            scopes::READ_FUNDAMENTALS,
            CachePolicy::FUNDAMENTALS,
        )
        .param(ParamSpec::string("index_code", "Index code, e.g. 'GSPC.INDX'").in_path())
        .param(from_date())
        .param(to_date())
        .fixed("historical", "1")
        .date_range("start_date", "end_date"),
        ToolDescriptor::new(
            "get_bond_fundamentals",
            "Bond reference data by ISIN or CUSIP.",
            "/bond-fundamentals/{identifier}",
            scopes::READ_FUNDAMENTALS,
            CachePolicy::FUNDAMENTALS,
        )
        .param(ParamSpec::string("identifier", "Bond ISIN or CUSIP").in_path())
        .fixed("fmt", "json"),
        ToolDescriptor::new(
            "get_id_mapping",
            "Map a security identifier (ISIN, CUSIP, FIGI, LEI, CIK) to tickers.",
            "/search-by-{id_type}/{identifier}",
            scopes::READ_FUNDAMENTALS,
            CachePolicy::STATIC,
        )
        .param(ParamSpec::string("identifier", "Identifier value, e.g. 'US0378331005'").in_path())
        .param(
            ParamSpec::string("id_type", "Identifier type")
                .in_path()
                .one_of(&["isin", "cusip", "figi", "lei", "cik"])
                .default_value("isin"),
        )
        .fixed("fmt", "json"),
        // News
        ToolDescriptor::new(
            "get_company_news",
            "News articles for a ticker or topic tag.",
            "/news",
            scopes::READ_NEWS,
            CachePolicy::INTRADAY,
        )
        .param(ParamSpec::string("ticker", TICKER_HELP).query_as("s"))
        .param(ParamSpec::string("tag", "Topic tag, e.g. 'earnings'").query_as("t"))
        .param(from_date())
        .param(to_date())
        .param(ParamSpec::integer("limit", "Maximum articles").range(1.0, 1000.0).default_value(50))
        .param(ParamSpec::integer("offset", "Pagination offset").range(0.0, 100_000.0))
        .fixed("fmt", "json")
        .date_range("start_date", "end_date"),
        // Screener
        ToolDescriptor::new(
            "get_sector_performance",
            "Largest companies of an exchange ranked by market capitalization, for sector analysis.",
            "/screener",
            scopes::READ_SCREENER,
            CachePolicy::EOD,
        )
        .param(ParamSpec::string("filters", "Screener filter expression").default_value(r#"[["exchange","=","us"]]"#))
        .param(ParamSpec::integer("limit", "Maximum rows").range(1.0, 100.0).default_value(100))
        .fixed("sort", "market_capitalization.desc"),
        // Account
        ToolDescriptor::new(
            "get_user_details",
            "API subscription details and remaining request quota.",
            "/user",
            scopes::READ_USER,
            CachePolicy::Bypass,
        )
        .fixed("fmt", "json"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::tools::descriptor::{ParamValue, ValidatedParams};
    use std::collections::HashSet;

    #[test]
    fn test_catalog_descriptors_are_well_formed() {
        let all = descriptors();
        let names: HashSet<&str> = all.iter().map(|d| d.name.as_str()).collect();

        assert_eq!(names.len(), all.len());
        for descriptor in &all {
            assert!(descriptor.check().is_ok(), "{} is malformed", descriptor.name);
            assert!(scopes::ALL.contains(&descriptor.scope.as_str()));
        }
    }

    #[test]
    fn test_fundamentals_slices_fix_their_filter() {
        let esg = descriptors().into_iter().find(|d| d.name == "get_esg_scores").unwrap();
        let mut params = ValidatedParams::new();
        params.insert("ticker", ParamValue::Text("MSFT.US".into()));

        let request = esg.build_request(&params).unwrap();
        assert_eq!(request.describe(), "/fundamentals/MSFT.US");
        assert_eq!(request.query, vec![("filter".to_string(), "ESGScores".to_string())]);
    }

    #[test]
    fn test_id_mapping_renders_type_into_segment() {
        let mapping = descriptors().into_iter().find(|d| d.name == "get_id_mapping").unwrap();
        let mut params = ValidatedParams::new();
        params.insert("identifier", ParamValue::Text("037833100".into()));
        params.insert("id_type", ParamValue::Text("cusip".into()));

        let request = mapping.build_request(&params).unwrap();
        assert_eq!(request.path, vec!["search-by-cusip", "037833100"]);
    }

    #[test]
    fn test_user_details_are_never_cached() {
        let user = descriptors().into_iter().find(|d| d.name == "get_user_details").unwrap();
        assert_eq!(user.cache.ttl(), None);
    }
}
