//! Fallback Rate Repositories
//!
//! Lookups against the locally maintained rate tables that answer when the
//! remote APIs are unreachable or unconfigured.

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::models::{EuTaricRate, FxRateDaily, TariffRateOverride, VatRate};
use crate::Result;

/// Manual tariff overrides keyed by destination region and commodity code
#[async_trait]
pub trait TariffOverrideRepository: Send + Sync {
    async fn get_rate(
        &self,
        destination_region: &str,
        commodity_code: &str,
        origin_country: Option<&str>,
        preference_flag: bool,
    ) -> Result<Option<TariffRateOverride>>;
}

/// Standard VAT rates per country
#[async_trait]
pub trait VatRateRepository: Send + Sync {
    async fn get_standard_rate(&self, country: &str) -> Result<Option<VatRate>>;
}

/// Locally cached EU TARIC rates
#[async_trait]
pub trait EuTaricRateRepository: Send + Sync {
    async fn get_rate(
        &self,
        hs_code: &str,
        origin_country: Option<&str>,
        preference_flag: bool,
    ) -> Result<Option<EuTaricRate>>;
}

/// Daily FX rates persisted from ECB fetches
#[async_trait]
pub trait FxRateRepository: Send + Sync {
    async fn get_rate(
        &self,
        base: &str,
        quote: &str,
        rate_date: NaiveDate,
    ) -> Result<Option<FxRateDaily>>;

    async fn upsert(
        &self,
        base: &str,
        quote: &str,
        rate: rust_decimal::Decimal,
        rate_date: NaiveDate,
    ) -> Result<FxRateDaily>;
}

/// PostgreSQL implementation of TariffOverrideRepository
pub struct PostgresTariffOverrideRepository {
    db: sqlx::PgPool,
}

impl PostgresTariffOverrideRepository {
    pub fn new(db: sqlx::PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl TariffOverrideRepository for PostgresTariffOverrideRepository {
    async fn get_rate(
        &self,
        destination_region: &str,
        commodity_code: &str,
        origin_country: Option<&str>,
        preference_flag: bool,
    ) -> Result<Option<TariffRateOverride>> {
        let row = sqlx::query_as::<_, TariffRateOverride>(
            r#"
            SELECT * FROM tariff_rate_overrides
            WHERE destination_region = $1
              AND commodity_code = $2
              AND origin_country IS NOT DISTINCT FROM $3
              AND preference_flag = $4
            "#,
        )
        .bind(destination_region)
        .bind(commodity_code)
        .bind(origin_country)
        .bind(preference_flag)
        .fetch_optional(&self.db)
        .await?;

        Ok(row)
    }
}

/// PostgreSQL implementation of VatRateRepository
pub struct PostgresVatRateRepository {
    db: sqlx::PgPool,
}

impl PostgresVatRateRepository {
    pub fn new(db: sqlx::PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl VatRateRepository for PostgresVatRateRepository {
    async fn get_standard_rate(&self, country: &str) -> Result<Option<VatRate>> {
        let row = sqlx::query_as::<_, VatRate>(
            "SELECT * FROM vat_rates WHERE country = $1 AND rate_type = 'standard'",
        )
        .bind(country)
        .fetch_optional(&self.db)
        .await?;

        Ok(row)
    }
}

/// PostgreSQL implementation of EuTaricRateRepository
pub struct PostgresEuTaricRateRepository {
    db: sqlx::PgPool,
}

impl PostgresEuTaricRateRepository {
    pub fn new(db: sqlx::PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl EuTaricRateRepository for PostgresEuTaricRateRepository {
    async fn get_rate(
        &self,
        hs_code: &str,
        origin_country: Option<&str>,
        preference_flag: bool,
    ) -> Result<Option<EuTaricRate>> {
        let row = sqlx::query_as::<_, EuTaricRate>(
            r#"
            SELECT * FROM eu_taric_rates
            WHERE hs_code = $1
              AND origin_country IS NOT DISTINCT FROM $2
              AND preference_flag = $3
            "#,
        )
        .bind(hs_code)
        .bind(origin_country)
        .bind(preference_flag)
        .fetch_optional(&self.db)
        .await?;

        Ok(row)
    }
}

/// PostgreSQL implementation of FxRateRepository
pub struct PostgresFxRateRepository {
    db: sqlx::PgPool,
}

impl PostgresFxRateRepository {
    pub fn new(db: sqlx::PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl FxRateRepository for PostgresFxRateRepository {
    async fn get_rate(
        &self,
        base: &str,
        quote: &str,
        rate_date: NaiveDate,
    ) -> Result<Option<FxRateDaily>> {
        let row = sqlx::query_as::<_, FxRateDaily>(
            "SELECT * FROM fx_rates_daily WHERE base = $1 AND quote = $2 AND rate_date = $3",
        )
        .bind(base)
        .bind(quote)
        .bind(rate_date)
        .fetch_optional(&self.db)
        .await?;

        Ok(row)
    }

    async fn upsert(
        &self,
        base: &str,
        quote: &str,
        rate: rust_decimal::Decimal,
        rate_date: NaiveDate,
    ) -> Result<FxRateDaily> {
        let row = sqlx::query_as::<_, FxRateDaily>(
            r#"
            INSERT INTO fx_rates_daily (id, base, quote, rate, rate_date)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (base, quote, rate_date) DO UPDATE SET rate = EXCLUDED.rate
            RETURNING *
            "#,
        )
        .bind(uuid::Uuid::new_v4())
        .bind(base)
        .bind(quote)
        .bind(rate)
        .bind(rate_date)
        .fetch_one(&self.db)
        .await?;

        Ok(row)
    }
}
