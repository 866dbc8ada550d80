//! ECB FX provider
//!
//! Daily reference rates from the ECB SDMX API. Successful fetches are
//! persisted into `fx_rates_daily` so later lookups for the same day never
//! leave the database tier.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde_json::json;
use tracing::warn;
use uuid::Uuid;

use crate::cache::FastCache;
use crate::http::{CircuitBreaker, HttpFetcher};
use crate::models::ProviderType;
use crate::providers::{json_decimal, FxRateResult, FxSource, TTL_SECONDS};
use crate::repository::{FxRateRepository, RateSnapshotRepository};
use crate::Result;

pub struct FxProvider {
    cache: Arc<dyn FastCache>,
    fetcher: HttpFetcher,
    breaker: CircuitBreaker,
    rates: Arc<dyn FxRateRepository>,
    snapshots: Arc<dyn RateSnapshotRepository>,
    api_base: String,
}

impl FxProvider {
    pub fn new(
        cache: Arc<dyn FastCache>,
        fetcher: HttpFetcher,
        rates: Arc<dyn FxRateRepository>,
        snapshots: Arc<dyn RateSnapshotRepository>,
        api_base: String,
    ) -> Self {
        Self {
            cache,
            fetcher,
            breaker: CircuitBreaker::default(),
            rates,
            snapshots,
            api_base,
        }
    }

    /// Walk the SDMX JSON shape: the last observation (by lexicographic key
    /// order) of the first series carries the newest rate; its date comes
    /// from the observation dimension values.
    fn extract_rate(payload: &serde_json::Value) -> (Option<Decimal>, Option<String>) {
        let observations = payload
            .get("dataSets")
            .and_then(|d| d.get(0))
            .and_then(|d| d.get("series"))
            .and_then(|s| s.as_object())
            .and_then(|s| s.values().next())
            .and_then(|series| series.get("observations"))
            .and_then(|o| o.as_object());

        let Some(observations) = observations else {
            return (None, None);
        };

        // serde_json objects iterate in key order, so the last entry is the
        // lexicographically greatest observation key
        let Some((last_key, values)) = observations.iter().last() else {
            return (None, None);
        };
        let rate = values.get(0).and_then(json_decimal);

        let rate_date = last_key.parse::<usize>().ok().and_then(|idx| {
            payload
                .get("structure")
                .and_then(|s| s.get("dimensions"))
                .and_then(|d| d.get("observation"))
                .and_then(|o| o.get(0))
                .and_then(|o| o.get("values"))
                .and_then(|v| v.get(idx))
                .and_then(|v| v.get("id"))
                .and_then(|id| id.as_str())
                .map(|s| s.to_string())
        });

        match rate {
            Some(rate) => (Some(rate), rate_date),
            None => (None, None),
        }
    }
}

#[async_trait]
impl FxSource for FxProvider {
    async fn get_rate(
        &self,
        base: &str,
        quote: &str,
        shipment_id: Option<Uuid>,
    ) -> Result<FxRateResult> {
        if base == quote {
            return Ok(FxRateResult {
                rate: Some(Decimal::ONE),
                source: "identity".to_string(),
                rate_date: Some(Utc::now().date_naive().to_string()),
                raw_payload: None,
            });
        }

        let cache_key = format!("fx:{}:{}", base, quote);
        if let Some(cached) = self.cache.get_json(&cache_key).await? {
            if let Some(rate) = cached.get("rate").and_then(json_decimal) {
                let rate_date = cached
                    .get("rate_date")
                    .and_then(|d| d.as_str())
                    .map(|s| s.to_string());
                return Ok(FxRateResult {
                    rate: Some(rate),
                    source: "redis".to_string(),
                    rate_date,
                    raw_payload: Some(cached),
                });
            }
        }

        let today = Utc::now().date_naive();
        if let Some(row) = self.rates.get_rate(base, quote, today).await? {
            return Ok(FxRateResult {
                rate: Some(row.rate),
                source: "db".to_string(),
                rate_date: Some(row.rate_date.to_string()),
                raw_payload: None,
            });
        }

        if !self.breaker.allow() {
            return Ok(FxRateResult {
                rate: None,
                source: "unavailable".to_string(),
                rate_date: None,
                raw_payload: None,
            });
        }

        let url = format!("{}/D.{}.{}.SP00.A", self.api_base, base, quote);
        match self
            .fetcher
            .get_json(&url, &[], &[("format", "jsondata")])
            .await
        {
            Ok(payload) => {
                let (rate, rate_date) = Self::extract_rate(&payload);
                let Some(rate) = rate else {
                    return Ok(FxRateResult {
                        rate: None,
                        source: "ecb_missing".to_string(),
                        rate_date,
                        raw_payload: Some(payload),
                    });
                };

                self.cache
                    .set_json(
                        &cache_key,
                        &json!({"rate": rate.to_string(), "rate_date": rate_date}),
                        TTL_SECONDS,
                    )
                    .await?;
                if let Some(date_str) = &rate_date {
                    if let Ok(date) = date_str.parse::<NaiveDate>() {
                        self.rates.upsert(base, quote, rate, date).await?;
                    }
                }
                if let Some(shipment_id) = shipment_id {
                    self.snapshots
                        .create(
                            shipment_id,
                            ProviderType::Fx,
                            json!({"base": base, "quote": quote}),
                            payload.clone(),
                            TTL_SECONDS as i32,
                        )
                        .await?;
                }
                self.breaker.record_success();
                Ok(FxRateResult {
                    rate: Some(rate),
                    source: "ecb".to_string(),
                    rate_date,
                    raw_payload: Some(payload),
                })
            }
            Err(e) => {
                warn!("ECB fetch failed for {}/{}: {}", base, quote, e);
                self.breaker.record_failure();
                Ok(FxRateResult {
                    rate: None,
                    source: "ecb_error".to_string(),
                    rate_date: None,
                    raw_payload: None,
                })
            }
        }
    }
}
