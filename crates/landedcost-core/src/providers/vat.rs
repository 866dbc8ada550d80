//! VAT rate provider
//!
//! Standard VAT rates per destination country from a keyed VAT API, fronted
//! by the fast cache and the local `vat_rates` table.

use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::json;
use tracing::warn;
use uuid::Uuid;

use crate::cache::FastCache;
use crate::http::{CircuitBreaker, HttpFetcher};
use crate::models::ProviderType;
use crate::providers::{json_decimal, TTL_SECONDS, VatRateResult, VatSource};
use crate::repository::{RateSnapshotRepository, VatRateRepository};
use crate::Result;

pub struct VatProvider {
    cache: Arc<dyn FastCache>,
    fetcher: HttpFetcher,
    breaker: CircuitBreaker,
    rates: Arc<dyn VatRateRepository>,
    snapshots: Arc<dyn RateSnapshotRepository>,
    api_base: Option<String>,
    api_key: Option<String>,
}

impl VatProvider {
    pub fn new(
        cache: Arc<dyn FastCache>,
        fetcher: HttpFetcher,
        rates: Arc<dyn VatRateRepository>,
        snapshots: Arc<dyn RateSnapshotRepository>,
        api_base: Option<String>,
        api_key: Option<String>,
    ) -> Self {
        Self {
            cache,
            fetcher,
            breaker: CircuitBreaker::default(),
            rates,
            snapshots,
            api_base,
            api_key,
        }
    }

    /// Pull the standard rate out of the known VAT API response shapes:
    /// `rates.standard.rate`, `rates.goods.rate`, or top-level
    /// `standard_rate`
    fn extract_standard_rate(payload: &serde_json::Value) -> Option<Decimal> {
        let rates = payload.get("rates").or_else(|| payload.get("rate"));
        if let Some(rates) = rates.and_then(|r| r.as_object()) {
            let standard = rates.get("standard").or_else(|| rates.get("STANDARD"));
            if let Some(rate) = standard
                .and_then(|s| s.get("rate"))
                .and_then(json_decimal)
            {
                return Some(Self::normalize_rate(rate));
            }
            if let Some(rate) = rates
                .get("goods")
                .and_then(|g| g.get("rate"))
                .and_then(json_decimal)
            {
                return Some(Self::normalize_rate(rate));
            }
        }
        payload
            .get("standard_rate")
            .and_then(json_decimal)
            .map(Self::normalize_rate)
    }

    /// Values above 1 are percentages, otherwise already fractions
    fn normalize_rate(rate: Decimal) -> Decimal {
        if rate > Decimal::ONE {
            rate / Decimal::from(100)
        } else {
            rate
        }
    }
}

#[async_trait]
impl VatSource for VatProvider {
    async fn get_standard_rate(
        &self,
        country: &str,
        shipment_id: Option<Uuid>,
    ) -> Result<VatRateResult> {
        let cache_key = format!("vat:{}:standard", country);
        if let Some(cached) = self.cache.get_json(&cache_key).await? {
            if let Some(rate) = cached.get("rate").and_then(json_decimal) {
                return Ok(VatRateResult {
                    rate: Some(rate),
                    source: "redis".to_string(),
                    raw_payload: Some(cached),
                });
            }
        }

        if let Some(row) = self.rates.get_standard_rate(country).await? {
            self.cache
                .set_json(&cache_key, &json!({"rate": row.rate.to_string()}), TTL_SECONDS)
                .await?;
            return Ok(VatRateResult {
                rate: Some(row.rate),
                source: "db".to_string(),
                raw_payload: None,
            });
        }

        let (Some(api_base), Some(api_key)) = (&self.api_base, &self.api_key) else {
            return Ok(VatRateResult {
                rate: None,
                source: "missing".to_string(),
                raw_payload: None,
            });
        };
        if !self.breaker.allow() {
            return Ok(VatRateResult {
                rate: None,
                source: "missing".to_string(),
                raw_payload: None,
            });
        }

        let url = format!("{}/vat-rate-check", api_base);
        let params = [("country_code", country), ("rate_type", "GOODS")];
        match self
            .fetcher
            .get_json(&url, &[("x-api-key", api_key.as_str())], &params)
            .await
        {
            Ok(payload) => {
                let Some(rate) = Self::extract_standard_rate(&payload) else {
                    warn!("Unable to extract standard VAT rate for {}", country);
                    self.breaker.record_failure();
                    return Ok(VatRateResult {
                        rate: None,
                        source: "missing".to_string(),
                        raw_payload: Some(payload),
                    });
                };
                self.cache
                    .set_json(&cache_key, &json!({"rate": rate.to_string()}), TTL_SECONDS)
                    .await?;
                if let Some(shipment_id) = shipment_id {
                    self.snapshots
                        .create(
                            shipment_id,
                            ProviderType::Vat,
                            json!({"country": country}),
                            payload.clone(),
                            TTL_SECONDS as i32,
                        )
                        .await?;
                }
                self.breaker.record_success();
                Ok(VatRateResult {
                    rate: Some(rate),
                    source: "vatapi".to_string(),
                    raw_payload: Some(payload),
                })
            }
            Err(e) => {
                warn!("VAT fetch failed for {}: {}", country, e);
                self.breaker.record_failure();
                Ok(VatRateResult {
                    rate: None,
                    source: "missing".to_string(),
                    raw_payload: None,
                })
            }
        }
    }
}
