//! Database fallback tables for rate providers.
//!
//! Rows in these tables answer lookups when the remote APIs are unreachable
//! or unconfigured; rates served from them are flagged as estimates.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Manually maintained tariff override for a destination region
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TariffRateOverride {
    pub id: Uuid,
    pub destination_region: String,
    pub commodity_code: String,
    pub origin_country: Option<String>,
    pub preference_flag: bool,
    pub duty_rate: Decimal,
    pub created_at: DateTime<Utc>,
}

/// Standard VAT rate per country
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct VatRate {
    pub id: Uuid,
    pub country: String,
    pub rate_type: String,
    pub rate: Decimal,
    pub created_at: DateTime<Utc>,
}

/// Cached EU TARIC duty rate keyed by HS code and origin
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct EuTaricRate {
    pub id: Uuid,
    pub hs_code: String,
    pub origin_country: Option<String>,
    pub preference_flag: bool,
    pub duty_rate: Decimal,
    pub created_at: DateTime<Utc>,
}

/// Daily FX rate persisted from successful ECB fetches
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct FxRateDaily {
    pub id: Uuid,
    pub base: String,
    pub quote: String,
    pub rate: Decimal,
    pub rate_date: NaiveDate,
    pub created_at: DateTime<Utc>,
}
