//! In-memory fast cache with TTL expiry

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::cache::{CacheResult, FastCache};

/// Process-local TTL cache. Keys expire lazily on read; last writer wins.
#[derive(Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, (Instant, serde_json::Value)>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live (non-expired) entries
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .read()
            .await
            .values()
            .filter(|(expires_at, _)| *expires_at > now)
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl FastCache for MemoryCache {
    async fn get_json(&self, key: &str) -> CacheResult<Option<serde_json::Value>> {
        let expired = {
            let entries = self.entries.read().await;
            match entries.get(key) {
                None => return Ok(None),
                Some((expires_at, value)) => {
                    if *expires_at > Instant::now() {
                        return Ok(Some(value.clone()));
                    }
                    true
                }
            }
        };

        if expired {
            self.entries.write().await.remove(key);
        }
        Ok(None)
    }

    async fn set_json(
        &self,
        key: &str,
        payload: &serde_json::Value,
        ttl_seconds: u64,
    ) -> CacheResult<()> {
        let expires_at = Instant::now() + Duration::from_secs(ttl_seconds);
        self.entries
            .write()
            .await
            .insert(key.to_string(), (expires_at, payload.clone()));
        Ok(())
    }
}
