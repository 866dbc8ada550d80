//! Fast key-value cache tier for provider lookups
//!
//! Providers read through this tier first and write back on every successful
//! fetch, promoting slower backends' results. Two implementations exist
//! behind the [`FastCache`] trait: a Redis-backed cache for deployments and
//! an in-memory TTL map for tests and redis-less setups.

pub mod connection;
pub mod memory;

pub use connection::RedisCache;
pub use memory::MemoryCache;

use async_trait::async_trait;

/// Cache result type alias
pub type CacheResult<T> = Result<T, CacheError>;

/// Cache-specific error types
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Redis connection error: {0}")]
    ConnectionError(String),

    #[error("Operation failed: {0}")]
    OperationError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Deserialization error: {0}")]
    DeserializationError(String),
}

impl From<CacheError> for crate::Error {
    fn from(err: CacheError) -> Self {
        crate::Error::Cache(err.to_string())
    }
}

/// String key → JSON value cache with per-key TTL
#[async_trait]
pub trait FastCache: Send + Sync {
    /// Fetch a cached JSON payload, `None` on miss or expiry
    async fn get_json(&self, key: &str) -> CacheResult<Option<serde_json::Value>>;

    /// Store a JSON payload under `key` for `ttl_seconds`
    async fn set_json(
        &self,
        key: &str,
        payload: &serde_json::Value,
        ttl_seconds: u64,
    ) -> CacheResult<()>;
}
