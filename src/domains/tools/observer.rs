//! Per-dispatch records.

use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

use super::dispatcher::CacheStatus;

/// Summary of one tool invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchRecord {
    pub tool: String,
    pub cache: CacheStatus,
    pub attempts: u32,
    /// `"ok"` or the error kind.
    pub outcome: &'static str,
    #[serde(rename = "latency_ms", serialize_with = "as_millis")]
    pub latency: Duration,
}

impl DispatchRecord {
    pub fn is_success(&self) -> bool {
        self.outcome == "ok"
    }
}

fn as_millis<S: serde::Serializer>(latency: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(latency.as_millis() as u64)
}

/// Receives one record per dispatch.
pub trait DispatchObserver: Send + Sync {
    fn record(&self, record: &DispatchRecord);
}

/// Emits each record as a structured `tracing` event.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl DispatchObserver for TracingObserver {
    fn record(&self, record: &DispatchRecord) {
        let latency_ms = record.latency.as_millis() as u64;
        if record.is_success() {
            info!(
                tool = %record.tool,
                cache = record.cache.as_str(),
                attempts = record.attempts,
                outcome = record.outcome,
                latency_ms,
                "Tool dispatched"
            );
        } else {
            warn!(
                tool = %record.tool,
                cache = record.cache.as_str(),
                attempts = record.attempts,
                outcome = record.outcome,
                latency_ms,
                "Tool dispatch failed"
            );
        }
    }
}
