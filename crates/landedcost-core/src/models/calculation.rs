use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

/// Persisted result of a successful landed-cost calculation, 1:1 with its
/// shipment. All monetary fields are quantized half-up to 4 dp.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Calculation {
    pub shipment_id: Uuid,

    pub customs_value: Decimal,
    pub duty_total: Decimal,
    pub vat_base: Decimal,
    pub vat_total: Decimal,
    pub other_duties_total: Decimal,
    pub authorities_total: Decimal,
    pub landed_cost_total: Decimal,
    pub landed_cost_per_unit: Decimal,

    pub assumptions: Json<Vec<String>>,
    pub warnings: Json<Vec<String>>,

    pub calculated_at: DateTime<Utc>,
    pub engine_version: String,
}
