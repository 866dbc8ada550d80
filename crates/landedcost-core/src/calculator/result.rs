//! Calculation result DTOs

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Outcome of a calculation request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalculationStatus {
    Ok,
    NeedsInput,
    NotFound,
}

/// Monetary breakdown of a completed calculation, quote currency
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Breakdown {
    pub customs_value: Decimal,
    pub duty_total: Decimal,
    pub vat_base: Decimal,
    pub vat_total: Decimal,
    pub other_duties_total: Decimal,
    pub authorities_total: Decimal,
    pub landed_cost_total: Decimal,
    pub landed_cost_per_unit: Decimal,
}

/// One duty component applied to an item
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DutyComponentLine {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate: Option<Decimal>,
    pub amount: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expression: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub measure_uid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

/// Per-item allocation and duty outcome
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerItemResult {
    pub item_id: Uuid,
    pub hs_code: String,
    pub customs_value: Decimal,
    pub duty_rate: Decimal,
    pub duty_amount: Decimal,
    pub duty_components: Vec<DutyComponentLine>,
}

/// Full calculation response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalculationResult {
    pub status: CalculationStatus,
    pub required_fields: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub breakdown: Option<Breakdown>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub per_item: Option<Vec<PerItemResult>>,
    pub assumptions: Vec<String>,
    pub warnings: Vec<String>,
}

impl CalculationResult {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: CalculationStatus::NotFound,
            required_fields: Vec::new(),
            message: Some(message.into()),
            breakdown: None,
            per_item: None,
            assumptions: Vec::new(),
            warnings: Vec::new(),
        }
    }
}
