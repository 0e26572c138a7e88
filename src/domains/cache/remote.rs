use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use super::error::CacheBackendError;

/// Shared, out-of-process cache store.
#[async_trait]
pub trait RemoteCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, CacheBackendError>;
    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), CacheBackendError>;

    /// Short backend name for logs.
    fn name(&self) -> &'static str;
}

pub type RemoteHandle = Arc<dyn RemoteCache + 'static>;
