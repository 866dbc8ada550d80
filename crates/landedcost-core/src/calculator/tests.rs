use std::sync::Arc;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use uuid::Uuid;

use crate::calculator::{compute_specific_duty, CalculationStatus, CalculatorService};
use crate::models::shipment::ShipmentDetail;
use crate::models::{
    Calculation, Direction, Incoterm, Shipment, ShipmentCosts, ShipmentItem, ShipmentStatus,
};
use crate::providers::{DutyRateResult, DutySource, FxRateResult, FxSource, VatRateResult, VatSource};
use crate::repository::{CalculationRepository, ShipmentRepository};
use crate::taric::{DutyComponent, DutyKind, ResolvedTaric, TaricResolve};

struct FakeShipmentRepo {
    detail: Mutex<Option<ShipmentDetail>>,
    status_updates: Mutex<Vec<ShipmentStatus>>,
    upserted_costs: Mutex<Vec<ShipmentCosts>>,
}

impl FakeShipmentRepo {
    fn new(detail: Option<ShipmentDetail>) -> Self {
        Self {
            detail: Mutex::new(detail),
            status_updates: Mutex::new(Vec::new()),
            upserted_costs: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ShipmentRepository for FakeShipmentRepo {
    async fn create(&self, shipment: &Shipment) -> crate::Result<Shipment> {
        Ok(shipment.clone())
    }

    async fn get(&self, _shipment_id: Uuid, _user_id: Uuid) -> crate::Result<Option<ShipmentDetail>> {
        Ok(self.detail.lock().unwrap().clone())
    }

    async fn list(&self, _user_id: Uuid) -> crate::Result<Vec<Shipment>> {
        Ok(Vec::new())
    }

    async fn update(&self, shipment: &Shipment) -> crate::Result<Shipment> {
        if let Some(detail) = self.detail.lock().unwrap().as_mut() {
            detail.shipment = shipment.clone();
        }
        Ok(shipment.clone())
    }

    async fn update_status(&self, _shipment_id: Uuid, status: ShipmentStatus) -> crate::Result<()> {
        self.status_updates.lock().unwrap().push(status);
        if let Some(detail) = self.detail.lock().unwrap().as_mut() {
            detail.shipment.status = status;
        }
        Ok(())
    }

    async fn upsert_costs(&self, costs: &ShipmentCosts) -> crate::Result<ShipmentCosts> {
        self.upserted_costs.lock().unwrap().push(costs.clone());
        if let Some(detail) = self.detail.lock().unwrap().as_mut() {
            detail.costs = Some(costs.clone());
        }
        Ok(costs.clone())
    }

    async fn add_item(&self, item: &ShipmentItem) -> crate::Result<ShipmentItem> {
        Ok(item.clone())
    }

    async fn update_item(&self, item: &ShipmentItem) -> crate::Result<ShipmentItem> {
        Ok(item.clone())
    }

    async fn set_item_goods_value(&self, item_id: Uuid, goods_value: Decimal) -> crate::Result<()> {
        if let Some(detail) = self.detail.lock().unwrap().as_mut() {
            if let Some(item) = detail.items.iter_mut().find(|i| i.id == item_id) {
                item.goods_value = Some(goods_value);
            }
        }
        Ok(())
    }
}

#[derive(Default)]
struct FakeCalculationRepo {
    saved: Mutex<Option<Calculation>>,
}

#[async_trait]
impl CalculationRepository for FakeCalculationRepo {
    async fn upsert(&self, calculation: &Calculation) -> crate::Result<Calculation> {
        *self.saved.lock().unwrap() = Some(calculation.clone());
        Ok(calculation.clone())
    }
}

struct StubDuty {
    result: DutyRateResult,
}

#[async_trait]
impl DutySource for StubDuty {
    async fn get_duty_rate(
        &self,
        _shipment_id: Option<Uuid>,
        _hs_code: &str,
        _origin_country: Option<&str>,
        _preference_flag: bool,
    ) -> crate::Result<DutyRateResult> {
        Ok(self.result.clone())
    }
}

struct StubVat {
    rate: Option<Decimal>,
}

#[async_trait]
impl VatSource for StubVat {
    async fn get_standard_rate(
        &self,
        _country: &str,
        _shipment_id: Option<Uuid>,
    ) -> crate::Result<VatRateResult> {
        Ok(VatRateResult {
            rate: self.rate,
            source: "test".to_string(),
            raw_payload: None,
        })
    }
}

struct StubFx {
    rate: Option<Decimal>,
    calls: Mutex<u32>,
}

impl StubFx {
    fn new(rate: Option<Decimal>) -> Self {
        Self {
            rate,
            calls: Mutex::new(0),
        }
    }
}

#[async_trait]
impl FxSource for StubFx {
    async fn get_rate(
        &self,
        _base: &str,
        _quote: &str,
        _shipment_id: Option<Uuid>,
    ) -> crate::Result<FxRateResult> {
        *self.calls.lock().unwrap() += 1;
        Ok(FxRateResult {
            rate: self.rate,
            source: "test".to_string(),
            rate_date: None,
            raw_payload: None,
        })
    }
}

/// Resolver stub answering a fixed ad-valorem rate per HS code
struct StubTaric {
    rates: Vec<(String, Decimal)>,
}

#[async_trait]
impl TaricResolve for StubTaric {
    async fn resolve_taric(
        &self,
        goods_code: &str,
        _origin_country_code: &str,
        _as_of: NaiveDate,
        _additional_code: Option<&str>,
    ) -> crate::Result<ResolvedTaric> {
        let rate = self
            .rates
            .iter()
            .find(|(code, _)| code == goods_code)
            .map(|(_, rate)| *rate);
        let duties = rate
            .map(|rate| {
                vec![DutyComponent {
                    measure_uid: "m1".to_string(),
                    measure_type_code: "103".to_string(),
                    expression: format!("{}%", rate * dec!(100)),
                    kind: DutyKind::AdValorem,
                    rate: Some(rate),
                    uom: None,
                    requires_additional_code: false,
                }]
            })
            .unwrap_or_default();
        Ok(ResolvedTaric {
            goods_code: goods_code.to_string(),
            matched_goods_code: Some(goods_code.to_string()),
            duties,
            requirements: Vec::new(),
            legal_refs: Vec::new(),
            effective_duty_rate: rate,
            notes: Vec::new(),
        })
    }
}

fn shipment(direction: Direction, incoterm: Incoterm, currency: &str) -> Shipment {
    let now = Utc::now();
    Shipment {
        id: Uuid::new_v4(),
        user_id: Uuid::new_v4(),
        direction,
        destination_country: None,
        origin_country_default: "CN".to_string(),
        incoterm,
        currency: currency.to_string(),
        import_date: None,
        fx_rate_to_gbp: None,
        fx_rate_to_eur: None,
        status: ShipmentStatus::Draft,
        created_at: now,
        updated_at: now,
    }
}

fn item(shipment_id: Uuid, hs_code: &str, quantity: Decimal, unit_price: Decimal) -> ShipmentItem {
    let now = Utc::now();
    ShipmentItem {
        id: Uuid::new_v4(),
        shipment_id,
        description: "goods".to_string(),
        hs_code: hs_code.to_string(),
        origin_country: "CN".to_string(),
        additional_code: None,
        quantity,
        unit_price,
        goods_value: None,
        weight_net_kg: None,
        created_at: now,
        updated_at: now,
    }
}

fn costs(shipment_id: Uuid, freight: Decimal, insurance: Decimal, brokerage: Decimal) -> ShipmentCosts {
    ShipmentCosts {
        freight_amount: Some(freight),
        insurance_amount: Some(insurance),
        brokerage_amount: Some(brokerage),
        ..ShipmentCosts::empty(shipment_id)
    }
}

struct Harness {
    shipments: Arc<FakeShipmentRepo>,
    calculations: Arc<FakeCalculationRepo>,
    fx: Arc<StubFx>,
    service: CalculatorService,
}

fn harness(
    detail: ShipmentDetail,
    duty: DutyRateResult,
    vat: Option<Decimal>,
    fx: Option<Decimal>,
    taric_rates: Vec<(String, Decimal)>,
) -> Harness {
    let shipments = Arc::new(FakeShipmentRepo::new(Some(detail)));
    let calculations = Arc::new(FakeCalculationRepo::default());
    let fx = Arc::new(StubFx::new(fx));
    let service = CalculatorService::new(
        shipments.clone(),
        calculations.clone(),
        Arc::new(StubDuty { result: duty }),
        Arc::new(StubVat { rate: vat }),
        fx.clone(),
        Arc::new(StubTaric { rates: taric_rates }),
    );
    Harness {
        shipments,
        calculations,
        fx,
        service,
    }
}

fn uk_duty(rate: Decimal) -> DutyRateResult {
    DutyRateResult {
        rate: Some(rate),
        source: "test".to_string(),
        is_estimated: false,
        missing: false,
        raw_payload: None,
    }
}

#[tokio::test]
async fn test_exw_missing_freight_insurance_needs_input() {
    let shipment = shipment(Direction::ImportUk, Incoterm::Exw, "USD");
    let (shipment_id, user_id) = (shipment.id, shipment.user_id);
    let detail = ShipmentDetail {
        shipment,
        items: Vec::new(),
        costs: None,
    };
    let h = harness(detail, uk_duty(dec!(0.1)), Some(dec!(0.2)), Some(dec!(0.8)), Vec::new());

    let result = h.service.calculate(shipment_id, user_id).await.unwrap();

    assert_eq!(result.status, CalculationStatus::NeedsInput);
    assert!(result.required_fields.contains(&"freight_amount".to_string()));
    assert!(result.required_fields.contains(&"insurance_amount".to_string()));
    assert_eq!(
        h.shipments.status_updates.lock().unwrap().as_slice(),
        &[ShipmentStatus::NeedsInput]
    );
    assert!(h.calculations.saved.lock().unwrap().is_none());
}

#[tokio::test]
async fn test_cif_full_data_calculates() {
    let shipment = shipment(Direction::ImportUk, Incoterm::Cif, "USD");
    let (shipment_id, user_id) = (shipment.id, shipment.user_id);
    let detail = ShipmentDetail {
        items: vec![item(shipment_id, "0101", dec!(10), dec!(100))],
        costs: Some(costs(shipment_id, dec!(50), dec!(10), dec!(5))),
        shipment,
    };
    let h = harness(detail, uk_duty(dec!(0.1)), Some(dec!(0.2)), Some(dec!(0.8)), Vec::new());

    let result = h.service.calculate(shipment_id, user_id).await.unwrap();

    assert_eq!(result.status, CalculationStatus::Ok);
    let breakdown = result.breakdown.unwrap();
    assert_eq!(breakdown.customs_value, dec!(848.0000));
    assert_eq!(breakdown.duty_total, dec!(84.8000));
    assert!(breakdown.vat_total > Decimal::ZERO);

    // authorities_total is an exact sum
    assert_eq!(
        breakdown.authorities_total,
        breakdown.duty_total + breakdown.vat_total + breakdown.other_duties_total
    );

    // CIF carries the shipping-included assumption
    assert!(result
        .assumptions
        .iter()
        .any(|a| a.contains("Incoterm implies shipping/insurance included")));

    let saved = h.calculations.saved.lock().unwrap().clone().unwrap();
    assert_eq!(saved.engine_version, "1.0.0");
    assert_eq!(saved.customs_value, dec!(848.0000));
    assert_eq!(
        h.shipments.status_updates.lock().unwrap().last(),
        Some(&ShipmentStatus::Calculated)
    );
}

#[tokio::test]
async fn test_multi_item_different_rates() {
    let mut shipment = shipment(Direction::ImportEu, Incoterm::Cif, "EUR");
    shipment.destination_country = Some("FR".to_string());
    let (shipment_id, user_id) = (shipment.id, shipment.user_id);
    let detail = ShipmentDetail {
        items: vec![
            item(shipment_id, "0101", dec!(5), dec!(100)),
            item(shipment_id, "0202", dec!(5), dec!(200)),
        ],
        costs: Some(costs(shipment_id, dec!(100), dec!(20), dec!(0))),
        shipment,
    };
    let h = harness(
        detail,
        uk_duty(dec!(0)),
        Some(dec!(0.2)),
        Some(dec!(1)),
        vec![("0101".to_string(), dec!(0.05)), ("0202".to_string(), dec!(0.2))],
    );

    let result = h.service.calculate(shipment_id, user_id).await.unwrap();
    assert_eq!(result.status, CalculationStatus::Ok);

    let per_item = result.per_item.unwrap();
    let duty_0101 = per_item.iter().find(|i| i.hs_code == "0101").unwrap().duty_amount;
    let duty_0202 = per_item.iter().find(|i| i.hs_code == "0202").unwrap().duty_amount;
    assert!(duty_0101 > Decimal::ZERO);
    assert!(duty_0202 > duty_0101);

    // Allocated customs values sum back to the shipment customs value
    let breakdown = result.breakdown.unwrap();
    let allocated: Decimal = per_item.iter().map(|i| i.customs_value).sum();
    assert!((allocated - breakdown.customs_value).abs() <= dec!(0.0001));
}

#[tokio::test]
async fn test_eu_missing_destination_uses_zero_vat() {
    let shipment = shipment(Direction::ImportEu, Incoterm::Cif, "EUR");
    let (shipment_id, user_id) = (shipment.id, shipment.user_id);
    let detail = ShipmentDetail {
        items: vec![item(shipment_id, "0101", dec!(1), dec!(100))],
        costs: Some(costs(shipment_id, dec!(10), dec!(1), dec!(0))),
        shipment,
    };
    let h = harness(
        detail,
        uk_duty(dec!(0)),
        Some(dec!(0.2)),
        Some(dec!(1)),
        vec![("0101".to_string(), dec!(0.05))],
    );

    let result = h.service.calculate(shipment_id, user_id).await.unwrap();
    let breakdown = result.breakdown.unwrap();
    assert_eq!(breakdown.vat_total, Decimal::ZERO);
    assert!(result.warnings.iter().any(|w| w.contains("Missing VAT rate")));
}

#[tokio::test]
async fn test_insurance_estimated_when_absent() {
    let shipment = shipment(Direction::ImportUk, Incoterm::Cif, "USD");
    let (shipment_id, user_id) = (shipment.id, shipment.user_id);
    let detail = ShipmentDetail {
        items: vec![item(shipment_id, "0101", dec!(10), dec!(100))],
        costs: Some(ShipmentCosts {
            freight_amount: Some(dec!(50)),
            ..ShipmentCosts::empty(shipment_id)
        }),
        shipment,
    };
    let h = harness(detail, uk_duty(dec!(0.1)), Some(dec!(0.2)), Some(dec!(1)), Vec::new());

    let result = h.service.calculate(shipment_id, user_id).await.unwrap();
    assert_eq!(result.status, CalculationStatus::Ok);
    assert!(result
        .assumptions
        .iter()
        .any(|a| a.contains("Insurance estimated at 0.5%")));

    let upserted = h.shipments.upserted_costs.lock().unwrap();
    let costs = upserted.last().unwrap();
    // 0.5% of 1000
    assert_eq!(costs.insurance_amount, Some(dec!(5.0000)));
    assert!(costs.insurance_is_estimated);
}

#[tokio::test]
async fn test_missing_fx_uses_identity_and_warns() {
    let shipment = shipment(Direction::ImportUk, Incoterm::Cif, "USD");
    let (shipment_id, user_id) = (shipment.id, shipment.user_id);
    let detail = ShipmentDetail {
        items: vec![item(shipment_id, "0101", dec!(10), dec!(100))],
        costs: Some(costs(shipment_id, dec!(50), dec!(10), dec!(0))),
        shipment,
    };
    let h = harness(detail, uk_duty(dec!(0)), Some(dec!(0.2)), None, Vec::new());

    let result = h.service.calculate(shipment_id, user_id).await.unwrap();
    assert_eq!(result.status, CalculationStatus::Ok);
    assert!(result
        .warnings
        .iter()
        .any(|w| w.contains("FX rate unavailable")));
    // Rate 1: customs value stays in the shipment currency
    assert_eq!(result.breakdown.unwrap().customs_value, dec!(1060));
}

#[tokio::test]
async fn test_persisted_fx_override_skips_provider() {
    let mut shipment = shipment(Direction::ImportUk, Incoterm::Cif, "USD");
    shipment.fx_rate_to_gbp = Some(dec!(0.5));
    let (shipment_id, user_id) = (shipment.id, shipment.user_id);
    let detail = ShipmentDetail {
        items: vec![item(shipment_id, "0101", dec!(10), dec!(100))],
        costs: Some(costs(shipment_id, dec!(50), dec!(10), dec!(0))),
        shipment,
    };
    let h = harness(detail, uk_duty(dec!(0)), Some(dec!(0.2)), Some(dec!(0.8)), Vec::new());

    let result = h.service.calculate(shipment_id, user_id).await.unwrap();
    assert_eq!(*h.fx.calls.lock().unwrap(), 0);
    assert_eq!(result.breakdown.unwrap().customs_value, dec!(530.0));
}

#[tokio::test]
async fn test_missing_duty_rate_warns_and_treats_as_zero() {
    let shipment = shipment(Direction::ImportUk, Incoterm::Cif, "GBP");
    let (shipment_id, user_id) = (shipment.id, shipment.user_id);
    let detail = ShipmentDetail {
        items: vec![item(shipment_id, "0101", dec!(10), dec!(100))],
        costs: Some(costs(shipment_id, dec!(50), dec!(10), dec!(0))),
        shipment,
    };
    let h = harness(
        detail,
        DutyRateResult::missing("override_missing"),
        Some(dec!(0.2)),
        Some(dec!(1)),
        Vec::new(),
    );

    let result = h.service.calculate(shipment_id, user_id).await.unwrap();
    assert_eq!(result.status, CalculationStatus::Ok);
    assert_eq!(result.breakdown.unwrap().duty_total, Decimal::ZERO);
    assert!(result
        .warnings
        .iter()
        .any(|w| w.contains("Missing duty rate for HS 0101")));
}

#[tokio::test]
async fn test_zero_quantity_per_unit_divisor() {
    let shipment = shipment(Direction::ImportUk, Incoterm::Cif, "GBP");
    let (shipment_id, user_id) = (shipment.id, shipment.user_id);
    let detail = ShipmentDetail {
        items: vec![item(shipment_id, "0101", dec!(0), dec!(100))],
        costs: Some(costs(shipment_id, dec!(50), dec!(10), dec!(0))),
        shipment,
    };
    let h = harness(detail, uk_duty(dec!(0)), Some(dec!(0.2)), Some(dec!(1)), Vec::new());

    let result = h.service.calculate(shipment_id, user_id).await.unwrap();
    let breakdown = result.breakdown.unwrap();
    assert_eq!(breakdown.landed_cost_per_unit, breakdown.landed_cost_total);
    assert!(result
        .warnings
        .iter()
        .any(|w| w.contains("Total quantity is zero")));
}

#[tokio::test]
async fn test_export_direction_has_no_duty_or_vat() {
    let shipment = shipment(Direction::ExportUk, Incoterm::Fca, "GBP");
    let (shipment_id, user_id) = (shipment.id, shipment.user_id);
    let detail = ShipmentDetail {
        items: vec![item(shipment_id, "0101", dec!(10), dec!(100))],
        costs: Some(costs(shipment_id, dec!(50), dec!(10), dec!(0))),
        shipment,
    };
    let h = harness(detail, uk_duty(dec!(0.1)), Some(dec!(0.2)), Some(dec!(1)), Vec::new());

    let result = h.service.calculate(shipment_id, user_id).await.unwrap();
    let breakdown = result.breakdown.unwrap();
    assert_eq!(breakdown.duty_total, Decimal::ZERO);
    assert_eq!(breakdown.vat_total, Decimal::ZERO);
    assert_eq!(breakdown.authorities_total, Decimal::ZERO);
}

#[tokio::test]
async fn test_not_found_shipment() {
    let shipments = Arc::new(FakeShipmentRepo::new(None));
    let service = CalculatorService::new(
        shipments,
        Arc::new(FakeCalculationRepo::default()),
        Arc::new(StubDuty {
            result: uk_duty(dec!(0)),
        }),
        Arc::new(StubVat { rate: None }),
        Arc::new(StubFx::new(None)),
        Arc::new(StubTaric { rates: Vec::new() }),
    );

    let result = service.calculate(Uuid::new_v4(), Uuid::new_v4()).await.unwrap();
    assert_eq!(result.status, CalculationStatus::NotFound);
}

#[test]
fn test_specific_duty_requires_kg_expression() {
    let (amount, reason) = compute_specific_duty("100 EUR / tonne", Some(dec!(50)));
    assert!(amount.is_none());
    assert_eq!(
        reason.as_deref(),
        Some("Specific duty requires quantity/weight to compute.")
    );
}

#[test]
fn test_specific_duty_requires_weight() {
    let (amount, reason) = compute_specific_duty("35.1 EUR / 100 kg", None);
    assert!(amount.is_none());
    assert_eq!(
        reason.as_deref(),
        Some("Specific duty requires weight_kg to compute.")
    );
}

#[test]
fn test_specific_duty_with_unit_divisor() {
    let (amount, reason) = compute_specific_duty("35.1 EUR / 100 kg", Some(dec!(200)));
    assert_eq!(amount, Some(dec!(70.2000)));
    assert!(reason.is_none());
}

#[test]
fn test_specific_duty_defaults_unit_to_one() {
    let (amount, reason) = compute_specific_duty("2 EUR per kg", Some(dec!(10)));
    assert_eq!(amount, Some(dec!(20.0000)));
    assert!(reason.is_none());
}
