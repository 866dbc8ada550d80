//! EU TARIC fallback provider
//!
//! Flat duty-rate lookups against a third-party TARIC API and the local
//! `eu_taric_rates` table. The primary EU path goes through the TARIC
//! resolver; this provider only answers when the resolver is bypassed.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::warn;
use uuid::Uuid;

use crate::cache::FastCache;
use crate::http::{CircuitBreaker, HttpFetcher};
use crate::models::ProviderType;
use crate::providers::{json_decimal, DutyRateResult, DutySource, TTL_SECONDS};
use crate::repository::{EuTaricRateRepository, RateSnapshotRepository};
use crate::Result;

pub struct EuTaricProvider {
    cache: Arc<dyn FastCache>,
    fetcher: HttpFetcher,
    breaker: CircuitBreaker,
    rates: Arc<dyn EuTaricRateRepository>,
    snapshots: Arc<dyn RateSnapshotRepository>,
    api_base: Option<String>,
    api_key: Option<String>,
}

impl EuTaricProvider {
    pub fn new(
        cache: Arc<dyn FastCache>,
        fetcher: HttpFetcher,
        rates: Arc<dyn EuTaricRateRepository>,
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
}

#[async_trait]
impl DutySource for EuTaricProvider {
    async fn get_duty_rate(
        &self,
        shipment_id: Option<Uuid>,
        hs_code: &str,
        origin_country: Option<&str>,
        preference_flag: bool,
    ) -> Result<DutyRateResult> {
        let cache_key = format!(
            "eu_taric:{}:{}:{}",
            hs_code,
            origin_country.unwrap_or("None"),
            preference_flag
        );
        if let Some(cached) = self.cache.get_json(&cache_key).await? {
            if let Some(rate) = cached.get("rate").and_then(json_decimal) {
                return Ok(DutyRateResult {
                    rate: Some(rate),
                    source: "redis".to_string(),
                    is_estimated: false,
                    missing: false,
                    raw_payload: Some(cached),
                });
            }
        }

        if let Some(row) = self
            .rates
            .get_rate(hs_code, origin_country, preference_flag)
            .await?
        {
            self.cache
                .set_json(&cache_key, &json!({"rate": row.duty_rate.to_string()}), TTL_SECONDS)
                .await?;
            return Ok(DutyRateResult {
                rate: Some(row.duty_rate),
                source: "db".to_string(),
                is_estimated: true,
                missing: false,
                raw_payload: None,
            });
        }

        let (Some(api_base), Some(api_key)) = (&self.api_base, &self.api_key) else {
            return Ok(DutyRateResult::missing("missing"));
        };
        if !self.breaker.allow() {
            return Ok(DutyRateResult::missing("missing"));
        }

        let url = format!("{}/taric", api_base);
        let auth = format!("Bearer {}", api_key);
        let preference = preference_flag.to_string();
        let params = [
            ("hs_code", hs_code),
            ("origin", origin_country.unwrap_or("")),
            ("preference", preference.as_str()),
        ];
        match self
            .fetcher
            .get_json(&url, &[("Authorization", auth.as_str())], &params)
            .await
        {
            Ok(payload) => {
                let Some(rate) = payload.get("duty_rate").and_then(json_decimal) else {
                    warn!("EU TARIC response missing duty_rate for HS {}", hs_code);
                    self.breaker.record_failure();
                    return Ok(DutyRateResult::missing("missing"));
                };
                self.cache
                    .set_json(&cache_key, &json!({"rate": rate.to_string()}), TTL_SECONDS)
                    .await?;
                if let Some(shipment_id) = shipment_id {
                    self.snapshots
                        .create(
                            shipment_id,
                            ProviderType::EuTaric,
                            json!({"hs_code": hs_code, "origin": origin_country}),
                            payload.clone(),
                            TTL_SECONDS as i32,
                        )
                        .await?;
                }
                self.breaker.record_success();
                Ok(DutyRateResult {
                    rate: Some(rate),
                    source: "api".to_string(),
                    is_estimated: false,
                    missing: false,
                    raw_payload: Some(payload),
                })
            }
            Err(e) => {
                warn!("EU TARIC fetch failed for HS {}: {}", hs_code, e);
                self.breaker.record_failure();
                Ok(DutyRateResult::missing("missing"))
            }
        }
    }
}
