//! Calculation Repository
//!
//! Upsert persistence for the 1:1 calculation row written at the end of a
//! successful landed-cost run.

use async_trait::async_trait;
use sqlx::types::Json;

use crate::models::Calculation;
use crate::Result;

/// Calculation repository trait - database agnostic
#[async_trait]
pub trait CalculationRepository: Send + Sync {
    /// Insert or replace the calculation for its shipment
    async fn upsert(&self, calculation: &Calculation) -> Result<Calculation>;
}

/// PostgreSQL implementation of CalculationRepository
pub struct PostgresCalculationRepository {
    db: sqlx::PgPool,
}

impl PostgresCalculationRepository {
    pub fn new(db: sqlx::PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl CalculationRepository for PostgresCalculationRepository {
    async fn upsert(&self, calculation: &Calculation) -> Result<Calculation> {
        let saved = sqlx::query_as::<_, Calculation>(
            r#"
            INSERT INTO calculations
                (shipment_id, customs_value, duty_total, vat_base, vat_total,
                 other_duties_total, authorities_total, landed_cost_total,
                 landed_cost_per_unit, assumptions, warnings, engine_version)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (shipment_id) DO UPDATE SET
                customs_value = EXCLUDED.customs_value,
                duty_total = EXCLUDED.duty_total,
                vat_base = EXCLUDED.vat_base,
                vat_total = EXCLUDED.vat_total,
                other_duties_total = EXCLUDED.other_duties_total,
                authorities_total = EXCLUDED.authorities_total,
                landed_cost_total = EXCLUDED.landed_cost_total,
                landed_cost_per_unit = EXCLUDED.landed_cost_per_unit,
                assumptions = EXCLUDED.assumptions,
                warnings = EXCLUDED.warnings,
                calculated_at = NOW(),
                engine_version = EXCLUDED.engine_version
            RETURNING *
            "#,
        )
        .bind(calculation.shipment_id)
        .bind(calculation.customs_value)
        .bind(calculation.duty_total)
        .bind(calculation.vat_base)
        .bind(calculation.vat_total)
        .bind(calculation.other_duties_total)
        .bind(calculation.authorities_total)
        .bind(calculation.landed_cost_total)
        .bind(calculation.landed_cost_per_unit)
        .bind(Json(&calculation.assumptions.0))
        .bind(Json(&calculation.warnings.0))
        .bind(&calculation.engine_version)
        .fetch_one(&self.db)
        .await?;

        Ok(saved)
    }
}
