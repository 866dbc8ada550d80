use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::models::enums::{Direction, Incoterm, ShipmentStatus};
use crate::money::round_money;
use crate::{Error, Result};

/// Strip everything but digits from an HS code, capped at the 10-digit
/// TARIC width.
pub fn normalize_hs_code(raw: &str) -> String {
    raw.chars().filter(|c| c.is_ascii_digit()).take(10).collect()
}

/// Uppercase a country code and reject anything that is not ISO-2
pub fn normalize_country_code(raw: &str) -> Result<String> {
    let code = raw.trim().to_uppercase();
    if code.len() != 2 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(Error::validation(format!("Invalid country code: {:?}", raw)));
    }
    Ok(code)
}

/// Reject negative monetary and quantity inputs before they reach the
/// arithmetic
pub fn require_non_negative(field: &str, value: Option<Decimal>) -> Result<()> {
    if let Some(value) = value {
        if value < Decimal::ZERO {
            return Err(Error::validation(format!("{} must be >= 0", field)));
        }
    }
    Ok(())
}

/// A shipment owned by a user
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Shipment {
    pub id: Uuid,
    pub user_id: Uuid,

    pub direction: Direction,
    pub destination_country: Option<String>,
    pub origin_country_default: String,
    pub incoterm: Incoterm,
    pub currency: String,
    pub import_date: Option<NaiveDate>,
    pub fx_rate_to_gbp: Option<Decimal>,
    pub fx_rate_to_eur: Option<Decimal>,

    pub status: ShipmentStatus,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Shipment {
    /// Persisted FX override toward the given quote currency, if any
    pub fn fx_override(&self, quote: &str) -> Option<Decimal> {
        match quote {
            "GBP" => self.fx_rate_to_gbp,
            "EUR" => self.fx_rate_to_eur,
            _ => None,
        }
    }
}

/// A line item within a shipment
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ShipmentItem {
    pub id: Uuid,
    pub shipment_id: Uuid,

    pub description: String,
    pub hs_code: String,
    pub origin_country: String,
    pub additional_code: Option<String>,

    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub goods_value: Option<Decimal>,
    pub weight_net_kg: Option<Decimal>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ShipmentItem {
    /// Goods value, materializing quantity × unit_price when unset
    pub fn effective_goods_value(&self) -> Decimal {
        match self.goods_value {
            Some(value) => value,
            None => round_money(self.quantity * self.unit_price),
        }
    }
}

/// Freight, insurance, and incidental costs attached 1:1 to a shipment
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ShipmentCosts {
    pub shipment_id: Uuid,

    pub freight_amount: Option<Decimal>,
    pub insurance_amount: Option<Decimal>,
    pub insurance_is_estimated: bool,
    pub brokerage_amount: Option<Decimal>,
    pub port_fees_amount: Option<Decimal>,
    pub inland_transport_amount: Option<Decimal>,
    pub other_incidental_amount: Option<Decimal>,
    pub notes: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ShipmentCosts {
    /// Empty costs row for a shipment that has none persisted yet
    pub fn empty(shipment_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            shipment_id,
            freight_amount: None,
            insurance_amount: None,
            insurance_is_estimated: false,
            brokerage_amount: None,
            port_fees_amount: None,
            inland_transport_amount: None,
            other_incidental_amount: None,
            notes: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A shipment together with its items and costs, as the calculator loads it
#[derive(Debug, Clone)]
pub struct ShipmentDetail {
    pub shipment: Shipment,
    pub items: Vec<ShipmentItem>,
    pub costs: Option<ShipmentCosts>,
}
