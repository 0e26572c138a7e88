//! Response cache domain.
//!
//! - `key.rs` - deterministic keys over tool name and validated parameters
//! - `local_lru.rs` - bounded in-process LRU with TTL
//! - `remote.rs` - out-of-process store seam
//! - `redis.rs` - Redis implementation (feature `redis`)
//! - `layer.rs` - the two-tier cache used by the dispatcher

mod error;
mod key;
mod layer;
mod local_lru;
#[cfg(feature = "redis")]
mod redis;
mod remote;

pub use error::CacheBackendError;
pub use key::CacheKey;
pub use layer::{CacheLayer, CacheStats};
pub use local_lru::{CacheEntry, LocalLru};
#[cfg(feature = "redis")]
pub use redis::RedisCache;
pub use remote::{RemoteCache, RemoteHandle};
