use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

use crate::models::enums::ProviderType;

/// Durable per-shipment copy of a raw provider response.
///
/// Keyed by `(shipment_id, provider, request_key)`; a snapshot answers reads
/// until `fetched_at + ttl_seconds` passes.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RateSnapshot {
    pub id: Uuid,
    pub shipment_id: Uuid,

    pub provider: ProviderType,
    pub request_key: Json<serde_json::Value>,
    pub response_payload: Json<serde_json::Value>,
    pub fetched_at: DateTime<Utc>,
    pub ttl_seconds: i32,
}

impl RateSnapshot {
    /// A snapshot is valid while `now` precedes its expiry
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        self.fetched_at + Duration::seconds(self.ttl_seconds as i64) > now
    }
}
