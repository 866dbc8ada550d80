//! UK Trade Tariff provider
//!
//! Resolves ad-valorem duty rates for UK imports from the public trade
//! tariff API, with fast-cache, per-shipment snapshot, and override-table
//! tiers in front of it.

use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use serde_json::json;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::cache::FastCache;
use crate::http::{CircuitBreaker, HttpFetcher};
use crate::models::ProviderType;
use crate::providers::{DutyRateResult, DutySource, TTL_SECONDS};
use crate::repository::{RateSnapshotRepository, TariffOverrideRepository};
use crate::Result;

static AD_VALOREM_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([0-9.]+)\s*%").expect("valid ad-valorem regex"));

pub struct UkTariffProvider {
    cache: Arc<dyn FastCache>,
    fetcher: HttpFetcher,
    breaker: CircuitBreaker,
    snapshots: Arc<dyn RateSnapshotRepository>,
    overrides: Arc<dyn TariffOverrideRepository>,
    api_base: String,
}

impl UkTariffProvider {
    pub fn new(
        cache: Arc<dyn FastCache>,
        fetcher: HttpFetcher,
        snapshots: Arc<dyn RateSnapshotRepository>,
        overrides: Arc<dyn TariffOverrideRepository>,
        api_base: String,
    ) -> Self {
        Self {
            cache,
            fetcher,
            breaker: CircuitBreaker::default(),
            snapshots,
            overrides,
            api_base,
        }
    }

    /// Raw commodity payload, cached under its own key
    pub async fn get_commodity_details(&self, commodity_code: &str) -> Result<serde_json::Value> {
        let cache_key = format!("uk_tariff:commodity:{}", commodity_code);
        if let Some(cached) = self.cache.get_json(&cache_key).await? {
            return Ok(cached);
        }

        let url = format!("{}/commodities/{}", self.api_base, commodity_code);
        let payload = self.fetcher.get_json(&url, &[], &[]).await?;
        self.cache.set_json(&cache_key, &payload, TTL_SECONDS).await?;
        Ok(payload)
    }

    async fn db_fallback(
        &self,
        commodity_code: &str,
        origin_country: Option<&str>,
        preference_flag: bool,
    ) -> Result<Option<DutyRateResult>> {
        let row = self
            .overrides
            .get_rate("UK", commodity_code, origin_country, preference_flag)
            .await?;

        Ok(row.map(|o| DutyRateResult {
            rate: Some(o.duty_rate),
            source: "override".to_string(),
            is_estimated: true,
            missing: false,
            raw_payload: None,
        }))
    }

    /// Scan `included[]` for measure entries and parse the first percentage
    /// duty expression
    fn extract_ad_valorem(payload: &serde_json::Value) -> Option<Decimal> {
        let included = payload.get("included")?.as_array()?;
        for entry in included {
            if entry.get("type").and_then(|t| t.as_str()) != Some("measure") {
                continue;
            }
            let expression = entry
                .get("attributes")
                .and_then(|a| a.get("duty_expression"))
                .and_then(|e| e.as_str())
                .unwrap_or("");
            if let Some(caps) = AD_VALOREM_RE.captures(expression) {
                if let Ok(value) = caps[1].parse::<Decimal>() {
                    return Some(value / Decimal::from(100));
                }
            }
        }
        None
    }
}

#[async_trait]
impl DutySource for UkTariffProvider {
    async fn get_duty_rate(
        &self,
        shipment_id: Option<Uuid>,
        hs_code: &str,
        origin_country: Option<&str>,
        preference_flag: bool,
    ) -> Result<DutyRateResult> {
        let cache_key = format!("uk_tariff:{}", hs_code);
        if let Some(cached) = self.cache.get_json(&cache_key).await? {
            let rate = Self::extract_ad_valorem(&cached);
            return Ok(DutyRateResult {
                rate,
                source: "redis".to_string(),
                is_estimated: false,
                missing: rate.is_none(),
                raw_payload: Some(cached),
            });
        }

        let request_key = json!({"commodity_code": hs_code});
        if let Some(shipment_id) = shipment_id {
            if let Some(snapshot) = self
                .snapshots
                .get_valid(shipment_id, ProviderType::UkTariff, &request_key)
                .await?
            {
                let rate = Self::extract_ad_valorem(&snapshot.response_payload.0);
                return Ok(DutyRateResult {
                    rate,
                    source: "snapshot".to_string(),
                    is_estimated: false,
                    missing: rate.is_none(),
                    raw_payload: None,
                });
            }
        }

        if let Some(result) = self
            .db_fallback(hs_code, origin_country, preference_flag)
            .await?
        {
            return Ok(result);
        }

        if !self.breaker.allow() {
            debug!("UK tariff breaker open, skipping remote fetch for {}", hs_code);
            return Ok(DutyRateResult::missing("override_missing"));
        }

        let url = format!("{}/commodities/{}", self.api_base, hs_code);
        match self.fetcher.get_json(&url, &[], &[]).await {
            Ok(payload) => {
                self.cache.set_json(&cache_key, &payload, TTL_SECONDS).await?;
                if let Some(shipment_id) = shipment_id {
                    self.snapshots
                        .create(
                            shipment_id,
                            ProviderType::UkTariff,
                            request_key,
                            payload.clone(),
                            TTL_SECONDS as i32,
                        )
                        .await?;
                }
                self.breaker.record_success();
                let rate = Self::extract_ad_valorem(&payload);
                Ok(DutyRateResult {
                    rate,
                    source: "uk_api".to_string(),
                    is_estimated: false,
                    missing: rate.is_none(),
                    raw_payload: Some(payload),
                })
            }
            Err(e) => {
                warn!("UK tariff fetch failed for {}: {}", hs_code, e);
                self.breaker.record_failure();
                Ok(DutyRateResult::missing("override_missing"))
            }
        }
    }
}
