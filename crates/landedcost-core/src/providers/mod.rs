//! Rate Providers
//!
//! Uniform lookup abstractions over external rate sources. Every provider
//! walks the same tier order, short-circuiting on the first hit:
//! fast cache → per-shipment snapshot (UK tariff only) → database
//! fallback/override table → remote API (circuit-breaker gated) → missing.
//!
//! On a successful remote fetch, providers always write the fast cache and
//! additionally persist a [`crate::models::RateSnapshot`] when a shipment
//! context is supplied.

pub mod eu_taric;
pub mod fx_ecb;
pub mod uk_tariff;
pub mod vat;

pub use eu_taric::EuTaricProvider;
pub use fx_ecb::FxProvider;
pub use uk_tariff::UkTariffProvider;
pub use vat::VatProvider;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::Result;

/// Cache TTL for provider responses, fast tier and snapshots alike
pub const TTL_SECONDS: u64 = 86400;

/// Duty rate lookup result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DutyRateResult {
    pub rate: Option<Decimal>,
    pub source: String,
    pub is_estimated: bool,
    pub missing: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_payload: Option<serde_json::Value>,
}

impl DutyRateResult {
    /// A lookup that found nothing at any tier
    pub fn missing(source: impl Into<String>) -> Self {
        Self {
            rate: None,
            source: source.into(),
            is_estimated: true,
            missing: true,
            raw_payload: None,
        }
    }
}

/// FX rate lookup result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FxRateResult {
    pub rate: Option<Decimal>,
    pub source: String,
    pub rate_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_payload: Option<serde_json::Value>,
}

/// VAT rate lookup result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VatRateResult {
    pub rate: Option<Decimal>,
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_payload: Option<serde_json::Value>,
}

/// Source of ad-valorem duty rates for a destination
#[async_trait]
pub trait DutySource: Send + Sync {
    async fn get_duty_rate(
        &self,
        shipment_id: Option<Uuid>,
        hs_code: &str,
        origin_country: Option<&str>,
        preference_flag: bool,
    ) -> Result<DutyRateResult>;
}

/// Source of standard VAT rates per country
#[async_trait]
pub trait VatSource: Send + Sync {
    async fn get_standard_rate(
        &self,
        country: &str,
        shipment_id: Option<Uuid>,
    ) -> Result<VatRateResult>;
}

/// Source of base→quote FX rates
#[async_trait]
pub trait FxSource: Send + Sync {
    async fn get_rate(
        &self,
        base: &str,
        quote: &str,
        shipment_id: Option<Uuid>,
    ) -> Result<FxRateResult>;
}

/// Parse a decimal out of a JSON number or string without a float round-trip
pub(crate) fn json_decimal(value: &serde_json::Value) -> Option<Decimal> {
    match value {
        serde_json::Value::Number(n) => n.to_string().parse().ok(),
        serde_json::Value::String(s) => s.parse().ok(),
        _ => None,
    }
}
