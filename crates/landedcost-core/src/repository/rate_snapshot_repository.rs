//! Rate Snapshot Repository
//!
//! Durable per-shipment provider responses with TTL-based validity.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::types::Json;
use uuid::Uuid;

use crate::models::{ProviderType, RateSnapshot};
use crate::Result;

/// Rate snapshot repository trait - database agnostic
#[async_trait]
pub trait RateSnapshotRepository: Send + Sync {
    /// Most recent unexpired snapshot for the given request, if any
    async fn get_valid(
        &self,
        shipment_id: Uuid,
        provider: ProviderType,
        request_key: &serde_json::Value,
    ) -> Result<Option<RateSnapshot>>;

    /// Persist a fresh provider response
    async fn create(
        &self,
        shipment_id: Uuid,
        provider: ProviderType,
        request_key: serde_json::Value,
        response_payload: serde_json::Value,
        ttl_seconds: i32,
    ) -> Result<RateSnapshot>;
}

/// PostgreSQL implementation of RateSnapshotRepository
pub struct PostgresRateSnapshotRepository {
    db: sqlx::PgPool,
}

impl PostgresRateSnapshotRepository {
    pub fn new(db: sqlx::PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl RateSnapshotRepository for PostgresRateSnapshotRepository {
    async fn get_valid(
        &self,
        shipment_id: Uuid,
        provider: ProviderType,
        request_key: &serde_json::Value,
    ) -> Result<Option<RateSnapshot>> {
        let snapshot = sqlx::query_as::<_, RateSnapshot>(
            r#"
            SELECT * FROM rate_snapshots
            WHERE shipment_id = $1 AND provider = $2 AND request_key = $3
            ORDER BY fetched_at DESC
            LIMIT 1
            "#,
        )
        .bind(shipment_id)
        .bind(provider)
        .bind(Json(request_key))
        .fetch_optional(&self.db)
        .await?;

        // Expiry check happens here rather than in SQL so the validity rule
        // lives next to RateSnapshot::is_valid
        Ok(snapshot.filter(|s| s.is_valid(Utc::now())))
    }

    async fn create(
        &self,
        shipment_id: Uuid,
        provider: ProviderType,
        request_key: serde_json::Value,
        response_payload: serde_json::Value,
        ttl_seconds: i32,
    ) -> Result<RateSnapshot> {
        let created = sqlx::query_as::<_, RateSnapshot>(
            r#"
            INSERT INTO rate_snapshots (id, shipment_id, provider, request_key, response_payload, ttl_seconds)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(shipment_id)
        .bind(provider)
        .bind(Json(request_key))
        .bind(Json(response_payload))
        .bind(ttl_seconds)
        .fetch_one(&self.db)
        .await?;

        Ok(created)
    }
}
