//! Redis-backed fast cache

use async_trait::async_trait;
use redis::{aio::ConnectionManager, Client as RedisClient};
use tracing::{debug, info};

use crate::cache::{CacheError, CacheResult, FastCache};

/// Redis connection wrapper implementing [`FastCache`].
///
/// The [`ConnectionManager`] multiplexes one connection and reconnects on
/// failure, so the cache is cheap to clone and share across providers.
#[derive(Clone)]
pub struct RedisCache {
    manager: ConnectionManager,
}

impl RedisCache {
    /// Connect to Redis and validate the connection with a PING
    pub async fn connect(url: &str) -> CacheResult<Self> {
        let client = RedisClient::open(url)
            .map_err(|e| CacheError::ConnectionError(e.to_string()))?;

        let mut manager = ConnectionManager::new(client)
            .await
            .map_err(|e| CacheError::ConnectionError(e.to_string()))?;

        let pong: String = redis::cmd("PING")
            .query_async(&mut manager)
            .await
            .map_err(|e| CacheError::ConnectionError(e.to_string()))?;
        if pong != "PONG" {
            return Err(CacheError::ConnectionError("Redis PING failed".to_string()));
        }

        info!("Redis cache connected: url={}", url);
        Ok(Self { manager })
    }
}

#[async_trait]
impl FastCache for RedisCache {
    async fn get_json(&self, key: &str) -> CacheResult<Option<serde_json::Value>> {
        let mut conn = self.manager.clone();
        let raw: Option<String> = redis::cmd("GET")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| CacheError::OperationError(e.to_string()))?;

        match raw {
            None => Ok(None),
            Some(text) => {
                let value = serde_json::from_str(&text)
                    .map_err(|e| CacheError::DeserializationError(e.to_string()))?;
                debug!("cache hit: key={}", key);
                Ok(Some(value))
            }
        }
    }

    async fn set_json(
        &self,
        key: &str,
        payload: &serde_json::Value,
        ttl_seconds: u64,
    ) -> CacheResult<()> {
        let text = serde_json::to_string(payload)
            .map_err(|e| CacheError::SerializationError(e.to_string()))?;

        let mut conn = self.manager.clone();
        let result: String = redis::cmd("SETEX")
            .arg(key)
            .arg(ttl_seconds)
            .arg(text)
            .query_async(&mut conn)
            .await
            .map_err(|e| CacheError::OperationError(e.to_string()))?;

        if result != "OK" {
            return Err(CacheError::OperationError("SETEX failed".to_string()));
        }
        Ok(())
    }
}
