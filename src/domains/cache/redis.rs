//! Redis-backed [`RemoteCache`].

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use redis::aio::ConnectionManager;
use tracing::info;

use super::error::CacheBackendError;
use super::remote::RemoteCache;

#[derive(Clone)]
pub struct RedisCache {
    manager: ConnectionManager,
    prefix: String,
}

impl RedisCache {
    /// Open a managed connection to `url`. Keys are stored under `prefix`.
    pub async fn connect(url: &str, prefix: impl Into<String>) -> Result<Self, CacheBackendError> {
        let client = redis::Client::open(url)
            .map_err(|e| CacheBackendError::unavailable(format!("redis client: {e}")))?;
        let manager = ConnectionManager::new(client)
            .await
            .map_err(|e| CacheBackendError::unavailable(format!("redis connect: {e}")))?;

        info!("Connected to Redis cache");
        Ok(Self {
            manager,
            prefix: prefix.into(),
        })
    }

    fn namespaced_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }
}

#[async_trait]
impl RemoteCache for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, CacheBackendError> {
        let mut conn = self.manager.clone();
        let data: Option<Vec<u8>> = redis::cmd("GET")
            .arg(self.namespaced_key(key))
            .query_async(&mut conn)
            .await
            .map_err(|e| CacheBackendError::unavailable(format!("redis get: {e}")))?;
        Ok(data.map(Bytes::from))
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), CacheBackendError> {
        let mut conn = self.manager.clone();
        let ttl_ms = (ttl.as_millis() as u64).max(1);
        redis::cmd("SET")
            .arg(self.namespaced_key(key))
            .arg(value.as_ref())
            .arg("PX")
            .arg(ttl_ms)
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(|e| CacheBackendError::unavailable(format!("redis set: {e}")))?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}
