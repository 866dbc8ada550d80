//! Shipment Repository
//!
//! Database repository for shipments, their items, and their cost rows.

use async_trait::async_trait;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::models::shipment::ShipmentDetail;
use crate::models::{Shipment, ShipmentCosts, ShipmentItem, ShipmentStatus};
use crate::Result;

/// Shipment repository trait - database agnostic
#[async_trait]
pub trait ShipmentRepository: Send + Sync {
    /// Create a new shipment
    async fn create(&self, shipment: &Shipment) -> Result<Shipment>;

    /// Fetch a shipment with items and costs, scoped to its owner
    async fn get(&self, shipment_id: Uuid, user_id: Uuid) -> Result<Option<ShipmentDetail>>;

    /// List a user's shipments
    async fn list(&self, user_id: Uuid) -> Result<Vec<Shipment>>;

    /// Update a shipment's mutable fields (status, FX overrides, terms)
    async fn update(&self, shipment: &Shipment) -> Result<Shipment>;

    /// Update only the lifecycle status
    async fn update_status(&self, shipment_id: Uuid, status: ShipmentStatus) -> Result<()>;

    /// Insert or replace the 1:1 costs row
    async fn upsert_costs(&self, costs: &ShipmentCosts) -> Result<ShipmentCosts>;

    /// Add an item to a shipment
    async fn add_item(&self, item: &ShipmentItem) -> Result<ShipmentItem>;

    /// Update an existing item
    async fn update_item(&self, item: &ShipmentItem) -> Result<ShipmentItem>;

    /// Persist a materialized goods value for an item
    async fn set_item_goods_value(&self, item_id: Uuid, goods_value: Decimal) -> Result<()>;
}

/// PostgreSQL implementation of ShipmentRepository
pub struct PostgresShipmentRepository {
    db: sqlx::PgPool,
}

impl PostgresShipmentRepository {
    pub fn new(db: sqlx::PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ShipmentRepository for PostgresShipmentRepository {
    async fn create(&self, shipment: &Shipment) -> Result<Shipment> {
        let created = sqlx::query_as::<_, Shipment>(
            r#"
            INSERT INTO shipments
                (id, user_id, direction, destination_country, origin_country_default,
                 incoterm, currency, import_date, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
            "#,
        )
        .bind(shipment.id)
        .bind(shipment.user_id)
        .bind(shipment.direction)
        .bind(&shipment.destination_country)
        .bind(&shipment.origin_country_default)
        .bind(shipment.incoterm)
        .bind(&shipment.currency)
        .bind(shipment.import_date)
        .bind(shipment.status)
        .fetch_one(&self.db)
        .await?;

        Ok(created)
    }

    async fn get(&self, shipment_id: Uuid, user_id: Uuid) -> Result<Option<ShipmentDetail>> {
        let shipment = sqlx::query_as::<_, Shipment>(
            "SELECT * FROM shipments WHERE id = $1 AND user_id = $2",
        )
        .bind(shipment_id)
        .bind(user_id)
        .fetch_optional(&self.db)
        .await?;

        let Some(shipment) = shipment else {
            return Ok(None);
        };

        let items = sqlx::query_as::<_, ShipmentItem>(
            "SELECT * FROM shipment_items WHERE shipment_id = $1 ORDER BY created_at",
        )
        .bind(shipment_id)
        .fetch_all(&self.db)
        .await?;

        let costs = sqlx::query_as::<_, ShipmentCosts>(
            "SELECT * FROM shipment_costs WHERE shipment_id = $1",
        )
        .bind(shipment_id)
        .fetch_optional(&self.db)
        .await?;

        Ok(Some(ShipmentDetail {
            shipment,
            items,
            costs,
        }))
    }

    async fn list(&self, user_id: Uuid) -> Result<Vec<Shipment>> {
        let shipments = sqlx::query_as::<_, Shipment>(
            "SELECT * FROM shipments WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.db)
        .await?;

        Ok(shipments)
    }

    async fn update(&self, shipment: &Shipment) -> Result<Shipment> {
        let updated = sqlx::query_as::<_, Shipment>(
            r#"
            UPDATE shipments SET
                direction = $2,
                destination_country = $3,
                origin_country_default = $4,
                incoterm = $5,
                currency = $6,
                import_date = $7,
                fx_rate_to_gbp = $8,
                fx_rate_to_eur = $9,
                status = $10,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(shipment.id)
        .bind(shipment.direction)
        .bind(&shipment.destination_country)
        .bind(&shipment.origin_country_default)
        .bind(shipment.incoterm)
        .bind(&shipment.currency)
        .bind(shipment.import_date)
        .bind(shipment.fx_rate_to_gbp)
        .bind(shipment.fx_rate_to_eur)
        .bind(shipment.status)
        .fetch_one(&self.db)
        .await?;

        Ok(updated)
    }

    async fn update_status(&self, shipment_id: Uuid, status: ShipmentStatus) -> Result<()> {
        sqlx::query("UPDATE shipments SET status = $2, updated_at = NOW() WHERE id = $1")
            .bind(shipment_id)
            .bind(status)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    async fn upsert_costs(&self, costs: &ShipmentCosts) -> Result<ShipmentCosts> {
        let saved = sqlx::query_as::<_, ShipmentCosts>(
            r#"
            INSERT INTO shipment_costs
                (shipment_id, freight_amount, insurance_amount, insurance_is_estimated,
                 brokerage_amount, port_fees_amount, inland_transport_amount,
                 other_incidental_amount, notes)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (shipment_id) DO UPDATE SET
                freight_amount = EXCLUDED.freight_amount,
                insurance_amount = EXCLUDED.insurance_amount,
                insurance_is_estimated = EXCLUDED.insurance_is_estimated,
                brokerage_amount = EXCLUDED.brokerage_amount,
                port_fees_amount = EXCLUDED.port_fees_amount,
                inland_transport_amount = EXCLUDED.inland_transport_amount,
                other_incidental_amount = EXCLUDED.other_incidental_amount,
                notes = EXCLUDED.notes,
                updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(costs.shipment_id)
        .bind(costs.freight_amount)
        .bind(costs.insurance_amount)
        .bind(costs.insurance_is_estimated)
        .bind(costs.brokerage_amount)
        .bind(costs.port_fees_amount)
        .bind(costs.inland_transport_amount)
        .bind(costs.other_incidental_amount)
        .bind(&costs.notes)
        .fetch_one(&self.db)
        .await?;

        Ok(saved)
    }

    async fn add_item(&self, item: &ShipmentItem) -> Result<ShipmentItem> {
        let created = sqlx::query_as::<_, ShipmentItem>(
            r#"
            INSERT INTO shipment_items
                (id, shipment_id, description, hs_code, origin_country, additional_code,
                 quantity, unit_price, goods_value, weight_net_kg)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING *
            "#,
        )
        .bind(item.id)
        .bind(item.shipment_id)
        .bind(&item.description)
        .bind(&item.hs_code)
        .bind(&item.origin_country)
        .bind(&item.additional_code)
        .bind(item.quantity)
        .bind(item.unit_price)
        .bind(item.goods_value)
        .bind(item.weight_net_kg)
        .fetch_one(&self.db)
        .await?;

        Ok(created)
    }

    async fn update_item(&self, item: &ShipmentItem) -> Result<ShipmentItem> {
        let updated = sqlx::query_as::<_, ShipmentItem>(
            r#"
            UPDATE shipment_items SET
                description = $2,
                hs_code = $3,
                origin_country = $4,
                additional_code = $5,
                quantity = $6,
                unit_price = $7,
                goods_value = $8,
                weight_net_kg = $9,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(item.id)
        .bind(&item.description)
        .bind(&item.hs_code)
        .bind(&item.origin_country)
        .bind(&item.additional_code)
        .bind(item.quantity)
        .bind(item.unit_price)
        .bind(item.goods_value)
        .bind(item.weight_net_kg)
        .fetch_one(&self.db)
        .await?;

        Ok(updated)
    }

    async fn set_item_goods_value(&self, item_id: Uuid, goods_value: Decimal) -> Result<()> {
        sqlx::query("UPDATE shipment_items SET goods_value = $2, updated_at = NOW() WHERE id = $1")
            .bind(item_id)
            .bind(goods_value)
            .execute(&self.db)
            .await?;
        Ok(())
    }
}
