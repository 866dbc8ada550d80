//! Landed-Cost Calculator
//!
//! Orchestrates rate providers and the TARIC resolver to turn a shipment
//! into a deterministic landed-cost breakdown. Data-quality problems never
//! abort the main path: the calculator substitutes neutral defaults and
//! records every substitution in `assumptions` and `warnings`, which are
//! persisted with the calculation.

pub mod result;

#[cfg(test)]
mod tests;

pub use result::{
    Breakdown, CalculationResult, CalculationStatus, DutyComponentLine, PerItemResult,
};

use std::sync::Arc;

use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sqlx::types::Json;
use tracing::{debug, info};
use uuid::Uuid;

use crate::models::shipment::ShipmentDetail;
use crate::models::{Calculation, Direction, ShipmentCosts, ShipmentStatus};
use crate::money::{convert, round_money};
use crate::providers::{DutySource, FxRateResult, FxSource, VatRateResult, VatSource};
use crate::repository::{CalculationRepository, ShipmentRepository};
use crate::taric::{DutyKind, TaricResolve};
use crate::Result;

/// Stamped onto every persisted calculation
pub const ENGINE_VERSION: &str = "1.0.0";

/// Insurance estimate applied when no insurance amount is supplied
const INSURANCE_ESTIMATE_RATE: Decimal = dec!(0.005);

static SPECIFIC_AMOUNT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([0-9]+(?:\.[0-9]+)?)").expect("valid amount regex"));
static SPECIFIC_UNIT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/\s*([0-9]+(?:\.[0-9]+)?)\s*kg").expect("valid unit regex"));

/// Landed-cost calculation service
pub struct CalculatorService {
    shipments: Arc<dyn ShipmentRepository>,
    calculations: Arc<dyn CalculationRepository>,
    uk_tariff: Arc<dyn DutySource>,
    vat: Arc<dyn VatSource>,
    fx: Arc<dyn FxSource>,
    taric: Arc<dyn TaricResolve>,
}

impl CalculatorService {
    pub fn new(
        shipments: Arc<dyn ShipmentRepository>,
        calculations: Arc<dyn CalculationRepository>,
        uk_tariff: Arc<dyn DutySource>,
        vat: Arc<dyn VatSource>,
        fx: Arc<dyn FxSource>,
        taric: Arc<dyn TaricResolve>,
    ) -> Self {
        Self {
            shipments,
            calculations,
            uk_tariff,
            vat,
            fx,
            taric,
        }
    }

    /// Compute and persist the landed cost for a shipment
    pub async fn calculate(&self, shipment_id: Uuid, user_id: Uuid) -> Result<CalculationResult> {
        let Some(detail) = self.shipments.get(shipment_id, user_id).await? else {
            return Ok(CalculationResult::not_found("Shipment not found"));
        };
        let ShipmentDetail {
            mut shipment,
            mut items,
            costs,
        } = detail;
        let mut costs = costs.unwrap_or_else(|| ShipmentCosts::empty(shipment.id));

        let mut assumptions: Vec<String> = Vec::new();
        let mut warnings: Vec<String> = Vec::new();

        // Incoterm gating: EXW/FOB cannot produce a customs value without
        // explicit freight and insurance
        if shipment.incoterm.requires_freight_and_insurance() {
            let mut required_fields = Vec::new();
            if costs.freight_amount.is_none() {
                required_fields.push("freight_amount".to_string());
            }
            if costs.insurance_amount.is_none() {
                required_fields.push("insurance_amount".to_string());
            }
            if !required_fields.is_empty() {
                self.shipments
                    .update_status(shipment.id, ShipmentStatus::NeedsInput)
                    .await?;
                return Ok(CalculationResult {
                    status: CalculationStatus::NeedsInput,
                    required_fields,
                    message: Some(
                        "Freight and insurance are required for EXW/FOB to compute customs value."
                            .to_string(),
                    ),
                    breakdown: None,
                    per_item: None,
                    assumptions,
                    warnings,
                });
            }
        }

        if shipment.incoterm.implies_shipping_included() {
            assumptions
                .push("Incoterm implies shipping/insurance included unless overridden.".to_string());
        }

        // Materialize goods values so every later sum reads the same numbers
        for item in items.iter_mut() {
            if item.goods_value.is_none() {
                let value = round_money(item.quantity * item.unit_price);
                self.shipments.set_item_goods_value(item.id, value).await?;
                item.goods_value = Some(value);
            }
        }
        let total_goods: Decimal = items.iter().map(|i| i.effective_goods_value()).sum();

        if costs.insurance_amount.is_none() {
            costs.insurance_amount = Some(round_money(total_goods * INSURANCE_ESTIMATE_RATE));
            costs.insurance_is_estimated = true;
            self.shipments.upsert_costs(&costs).await?;
            assumptions.push("Insurance estimated at 0.5% of goods value.".to_string());
        }

        let fx_result = self.ensure_fx_rate(&mut shipment).await?;
        let fx_rate = match fx_result.rate {
            Some(rate) => rate,
            None => {
                warnings.push("FX rate unavailable; calculation uses 1.0.".to_string());
                Decimal::ONE
            }
        };
        debug!("FX {} → rate {} ({})", shipment.currency, fx_rate, fx_result.source);

        let total_goods_value = convert(total_goods, fx_rate);
        let freight = convert(costs.freight_amount.unwrap_or(Decimal::ZERO), fx_rate);
        let insurance = convert(costs.insurance_amount.unwrap_or(Decimal::ZERO), fx_rate);

        let customs_value = total_goods_value + freight + insurance;

        // Per-item pass stays serial: each item folds into the running duty
        // total and warning list
        let mut per_item_results = Vec::new();
        let mut total_duty = Decimal::ZERO;

        for item in &items {
            let item_goods_value = convert(item.effective_goods_value(), fx_rate);
            let allocation_ratio = if total_goods_value > Decimal::ZERO {
                item_goods_value / total_goods_value
            } else {
                Decimal::ZERO
            };
            let item_customs_value =
                item_goods_value + freight * allocation_ratio + insurance * allocation_ratio;

            let mut duty_components = Vec::new();
            let mut item_duty = Decimal::ZERO;
            let mut duty_rate = Decimal::ZERO;

            match shipment.direction {
                Direction::ImportEu => {
                    let as_of = shipment
                        .import_date
                        .unwrap_or_else(|| Utc::now().date_naive());
                    let resolved = self
                        .taric
                        .resolve_taric(
                            &item.hs_code,
                            &item.origin_country,
                            as_of,
                            item.additional_code.as_deref(),
                        )
                        .await?;

                    match resolved.effective_duty_rate {
                        None => warnings.push(format!(
                            "No TARIC duty rate found for HS {}; treated as 0.",
                            item.hs_code
                        )),
                        Some(rate) => {
                            duty_rate = rate;
                            let base_amount = round_money(item_customs_value * rate);
                            item_duty += base_amount;
                            duty_components.push(DutyComponentLine {
                                kind: "ad_valorem".to_string(),
                                rate: Some(rate),
                                amount: base_amount,
                                expression: None,
                                measure_uid: None,
                                source: Some("taric_base".to_string()),
                            });
                        }
                    }

                    for comp in &resolved.duties {
                        if comp.requires_additional_code {
                            warnings.push(format!(
                                "Additional code required for measure {} on HS {}.",
                                comp.measure_uid, item.hs_code
                            ));
                        }
                        if comp.kind == DutyKind::AdValorem && comp.is_anti_dumping() {
                            if let Some(rate) = comp.rate {
                                let amount = round_money(item_customs_value * rate);
                                item_duty += amount;
                                duty_components.push(DutyComponentLine {
                                    kind: "anti_dumping".to_string(),
                                    rate: Some(rate),
                                    amount,
                                    expression: None,
                                    measure_uid: Some(comp.measure_uid.clone()),
                                    source: None,
                                });
                            }
                        }
                        if comp.kind == DutyKind::Specific {
                            let (amount, reason) =
                                compute_specific_duty(&comp.expression, item.weight_net_kg);
                            match amount {
                                None => {
                                    if let Some(reason) = reason {
                                        warnings.push(reason);
                                    }
                                }
                                Some(amount) => {
                                    item_duty += amount;
                                    duty_components.push(DutyComponentLine {
                                        kind: "specific".to_string(),
                                        rate: None,
                                        amount,
                                        expression: Some(comp.expression.clone()),
                                        measure_uid: Some(comp.measure_uid.clone()),
                                        source: None,
                                    });
                                }
                            }
                        }
                    }
                }
                Direction::ImportUk => {
                    let duty_result = self
                        .uk_tariff
                        .get_duty_rate(
                            Some(shipment.id),
                            &item.hs_code,
                            Some(item.origin_country.as_str()),
                            false,
                        )
                        .await?;

                    match duty_result.rate {
                        None => warnings.push(format!(
                            "Missing duty rate for HS {}; treated as 0.",
                            item.hs_code
                        )),
                        Some(_) if duty_result.missing => warnings.push(format!(
                            "Missing duty rate for HS {}; treated as 0.",
                            item.hs_code
                        )),
                        Some(rate) => {
                            duty_rate = rate;
                            if duty_result.is_estimated {
                                warnings.push(format!(
                                    "Duty rate for HS {} is estimated.",
                                    item.hs_code
                                ));
                            }
                        }
                    }

                    item_duty = round_money(item_customs_value * duty_rate);
                    duty_components.push(DutyComponentLine {
                        kind: "ad_valorem".to_string(),
                        rate: Some(duty_rate),
                        amount: item_duty,
                        expression: None,
                        measure_uid: None,
                        source: None,
                    });
                }
                Direction::ExportUk | Direction::ExportEu => {
                    // Exports carry no import duty
                    item_duty = Decimal::ZERO;
                    duty_components.push(DutyComponentLine {
                        kind: "ad_valorem".to_string(),
                        rate: Some(Decimal::ZERO),
                        amount: Decimal::ZERO,
                        expression: None,
                        measure_uid: None,
                        source: None,
                    });
                }
            }

            total_duty += item_duty;

            per_item_results.push(PerItemResult {
                item_id: item.id,
                hs_code: item.hs_code.clone(),
                customs_value: item_customs_value,
                duty_rate,
                duty_amount: item_duty,
                duty_components,
            });
        }

        let other_duties = Decimal::ZERO;
        let incidental = convert(costs.brokerage_amount.unwrap_or(Decimal::ZERO), fx_rate)
            + convert(costs.port_fees_amount.unwrap_or(Decimal::ZERO), fx_rate)
            + convert(costs.inland_transport_amount.unwrap_or(Decimal::ZERO), fx_rate)
            + convert(costs.other_incidental_amount.unwrap_or(Decimal::ZERO), fx_rate);

        let vat_result = self.get_vat_rate(&shipment).await?;
        let vat_rate = match vat_result.rate {
            Some(rate) => rate,
            None => {
                warnings.push("Missing VAT rate; treated as 0.".to_string());
                Decimal::ZERO
            }
        };

        let vat_base = customs_value + total_duty + other_duties + incidental;
        let vat_total = round_money(vat_base * vat_rate);

        let authorities_total = total_duty + vat_total + other_duties;
        let landed_cost_total =
            total_goods_value + freight + insurance + incidental + authorities_total;

        let mut total_units: Decimal = items.iter().map(|i| i.quantity).sum();
        if items.is_empty() {
            total_units = Decimal::ONE;
        }
        if total_units <= Decimal::ZERO {
            total_units = Decimal::ONE;
            warnings.push("Total quantity is zero; per-unit cost uses 1 as divisor.".to_string());
        }
        let landed_cost_per_unit = round_money(landed_cost_total / total_units);

        let calculation = Calculation {
            shipment_id: shipment.id,
            customs_value,
            duty_total: total_duty,
            vat_base,
            vat_total,
            other_duties_total: other_duties,
            authorities_total,
            landed_cost_total,
            landed_cost_per_unit,
            assumptions: Json(assumptions.clone()),
            warnings: Json(warnings.clone()),
            calculated_at: Utc::now(),
            engine_version: ENGINE_VERSION.to_string(),
        };
        self.calculations.upsert(&calculation).await?;
        self.shipments
            .update_status(shipment.id, ShipmentStatus::Calculated)
            .await?;

        info!(
            "calculation complete: shipment={} landed_cost_total={}",
            shipment.id, landed_cost_total
        );

        Ok(CalculationResult {
            status: CalculationStatus::Ok,
            required_fields: Vec::new(),
            message: None,
            breakdown: Some(Breakdown {
                customs_value,
                duty_total: total_duty,
                vat_base,
                vat_total,
                other_duties_total: other_duties,
                authorities_total,
                landed_cost_total,
                landed_cost_per_unit,
            }),
            per_item: Some(per_item_results),
            assumptions,
            warnings,
        })
    }

    /// Resolve the shipment's FX rate, preferring a persisted override and
    /// writing a fresh provider rate back onto the shipment
    async fn ensure_fx_rate(
        &self,
        shipment: &mut crate::models::Shipment,
    ) -> Result<FxRateResult> {
        let quote = match shipment.direction {
            Direction::ImportUk => "GBP",
            _ => "EUR",
        };

        if let Some(rate) = shipment.fx_override(quote) {
            return Ok(FxRateResult {
                rate: Some(rate),
                source: "shipment".to_string(),
                rate_date: None,
                raw_payload: None,
            });
        }

        let result = self
            .fx
            .get_rate(&shipment.currency, quote, Some(shipment.id))
            .await?;
        let Some(rate) = result.rate else {
            return Ok(result);
        };

        match quote {
            "GBP" => shipment.fx_rate_to_gbp = Some(rate),
            _ => shipment.fx_rate_to_eur = Some(rate),
        }
        self.shipments.update(shipment).await?;
        Ok(result)
    }

    async fn get_vat_rate(&self, shipment: &crate::models::Shipment) -> Result<VatRateResult> {
        match shipment.direction {
            Direction::ImportUk => self.vat.get_standard_rate("GB", Some(shipment.id)).await,
            Direction::ImportEu => match &shipment.destination_country {
                None => Ok(VatRateResult {
                    rate: None,
                    source: "missing_country".to_string(),
                    raw_payload: None,
                }),
                Some(country) => self.vat.get_standard_rate(country, Some(shipment.id)).await,
            },
            Direction::ExportUk | Direction::ExportEu => Ok(VatRateResult {
                rate: Some(Decimal::ZERO),
                source: "export".to_string(),
                raw_payload: None,
            }),
        }
    }
}

/// Compute a mass-based specific duty from an expression like
/// `"35.1 EUR / 100 kg"` and the item's net weight.
///
/// Returns the rounded amount, or `None` with the reason the duty could not
/// be computed.
pub fn compute_specific_duty(
    expression: &str,
    weight_net_kg: Option<Decimal>,
) -> (Option<Decimal>, Option<String>) {
    let expr = expression.to_lowercase();
    if !expr.contains("kg") {
        return (
            None,
            Some("Specific duty requires quantity/weight to compute.".to_string()),
        );
    }
    let Some(weight) = weight_net_kg.filter(|w| *w > Decimal::ZERO) else {
        return (
            None,
            Some("Specific duty requires weight_kg to compute.".to_string()),
        );
    };

    let amount = SPECIFIC_AMOUNT_RE
        .captures(&expr)
        .and_then(|caps| caps[1].parse::<Decimal>().ok());
    let Some(amount) = amount else {
        return (
            None,
            Some("Specific duty expression could not be parsed.".to_string()),
        );
    };

    let unit = SPECIFIC_UNIT_RE
        .captures(&expr)
        .and_then(|caps| caps[1].parse::<Decimal>().ok())
        .unwrap_or(Decimal::ONE);

    (Some(round_money(amount * weight / unit)), None)
}
