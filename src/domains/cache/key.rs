//! Deterministic cache keys.

use std::fmt;

use serde::Serialize;
use sha2::{Digest, Sha256};

/// Cache key of the form `"{tool}:{sha256-hex}"`.
///
/// The hash covers the canonical JSON encoding of the validated parameters.
/// Parameters are held in ordered maps, so argument order never changes the
/// key.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey {
    raw: String,
}

impl CacheKey {
    /// Derive the key for a tool invocation.
    pub fn derive<P: Serialize + ?Sized>(tool: &str, params: &P) -> Result<Self, serde_json::Error> {
        let canonical = serde_json::to_vec(params)?;
        let digest = Sha256::digest(&canonical);
        Ok(Self {
            raw: format!("{tool}:{}", hex::encode(digest)),
        })
    }

    /// Wrap an already formed key.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self { raw: raw.into() }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_key_is_order_independent() {
        let mut a = BTreeMap::new();
        a.insert("ticker", "AAPL.US");
        a.insert("period", "d");

        let mut b = BTreeMap::new();
        b.insert("period", "d");
        b.insert("ticker", "AAPL.US");

        assert_eq!(
            CacheKey::derive("get_eod", &a).unwrap(),
            CacheKey::derive("get_eod", &b).unwrap()
        );
    }

    #[test]
    fn test_key_is_namespaced_by_tool() {
        let params: BTreeMap<&str, &str> = [("ticker", "AAPL.US")].into_iter().collect();
        let eod = CacheKey::derive("get_eod", &params).unwrap();
        let live = CacheKey::derive("get_live_price", &params).unwrap();

        assert_ne!(eod, live);
        assert!(eod.as_str().starts_with("get_eod:"));
        assert_eq!(eod.as_str().len(), "get_eod:".len() + 64);
    }

    #[test]
    fn test_key_distinguishes_values() {
        let a: BTreeMap<&str, i64> = [("limit", 10)].into_iter().collect();
        let b: BTreeMap<&str, i64> = [("limit", 11)].into_iter().collect();
        assert_ne!(
            CacheKey::derive("t", &a).unwrap(),
            CacheKey::derive("t", &b).unwrap()
        );
    }
}
