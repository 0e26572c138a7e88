//! Scope names understood by the gateway.

/// Grants every other scope.
pub const FULL_ACCESS: &str = "full-access";

pub const READ_EOD: &str = "read:eod";
pub const READ_INTRADAY: &str = "read:intraday";
pub const READ_LIVE: &str = "read:live";
pub const READ_FUNDAMENTALS: &str = "read:fundamentals";
pub const READ_NEWS: &str = "read:news";
pub const READ_TECHNICALS: &str = "read:technicals";
pub const READ_OPTIONS: &str = "read:options";
pub const READ_MARKETPLACE: &str = "read:marketplace";
pub const READ_SCREENER: &str = "read:screener";
pub const READ_MACRO: &str = "read:macro";
pub const READ_USER: &str = "read:user";

/// Every scope, in the order advertised in resource metadata.
pub const ALL: &[&str] = &[
    READ_EOD,
    READ_INTRADAY,
    READ_LIVE,
    READ_FUNDAMENTALS,
    READ_NEWS,
    READ_TECHNICALS,
    READ_OPTIONS,
    READ_MARKETPLACE,
    READ_SCREENER,
    READ_MACRO,
    READ_USER,
    FULL_ACCESS,
];
