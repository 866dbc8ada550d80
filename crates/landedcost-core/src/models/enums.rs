use serde::{Deserialize, Serialize};

use crate::Error;

/// Shipment direction
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "direction", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    ImportUk,
    ImportEu,
    ExportUk,
    ExportEu,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::ImportUk => "IMPORT_UK",
            Direction::ImportEu => "IMPORT_EU",
            Direction::ExportUk => "EXPORT_UK",
            Direction::ExportEu => "EXPORT_EU",
        }
    }

    pub fn is_import(&self) -> bool {
        matches!(self, Direction::ImportUk | Direction::ImportEu)
    }
}

impl std::str::FromStr for Direction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "IMPORT_UK" => Ok(Direction::ImportUk),
            "IMPORT_EU" => Ok(Direction::ImportEu),
            "EXPORT_UK" => Ok(Direction::ExportUk),
            "EXPORT_EU" => Ok(Direction::ExportEu),
            other => Err(Error::contract(format!("Unparseable direction: {}", other))),
        }
    }
}

/// Trade term defining who pays freight and insurance
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "incoterm", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum Incoterm {
    Exw,
    Fob,
    Cif,
    Cfr,
    Ddp,
    Fca,
    Cpt,
    Cip,
    Dap,
}

impl Incoterm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Incoterm::Exw => "EXW",
            Incoterm::Fob => "FOB",
            Incoterm::Cif => "CIF",
            Incoterm::Cfr => "CFR",
            Incoterm::Ddp => "DDP",
            Incoterm::Fca => "FCA",
            Incoterm::Cpt => "CPT",
            Incoterm::Cip => "CIP",
            Incoterm::Dap => "DAP",
        }
    }

    /// Buyer arranges main carriage: freight and insurance must be supplied
    /// before a customs value can be computed.
    pub fn requires_freight_and_insurance(&self) -> bool {
        matches!(self, Incoterm::Exw | Incoterm::Fob)
    }

    /// Seller's price already carries shipping/insurance up to the border
    pub fn implies_shipping_included(&self) -> bool {
        matches!(self, Incoterm::Cif | Incoterm::Cfr | Incoterm::Ddp)
    }
}

impl std::str::FromStr for Incoterm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "EXW" => Ok(Incoterm::Exw),
            "FOB" => Ok(Incoterm::Fob),
            "CIF" => Ok(Incoterm::Cif),
            "CFR" => Ok(Incoterm::Cfr),
            "DDP" => Ok(Incoterm::Ddp),
            "FCA" => Ok(Incoterm::Fca),
            "CPT" => Ok(Incoterm::Cpt),
            "CIP" => Ok(Incoterm::Cip),
            "DAP" => Ok(Incoterm::Dap),
            other => Err(Error::contract(format!("Unparseable incoterm: {}", other))),
        }
    }
}

/// Shipment lifecycle status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "shipment_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ShipmentStatus {
    Draft,
    NeedsInput,
    Ready,
    Calculated,
}

impl ShipmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShipmentStatus::Draft => "DRAFT",
            ShipmentStatus::NeedsInput => "NEEDS_INPUT",
            ShipmentStatus::Ready => "READY",
            ShipmentStatus::Calculated => "CALCULATED",
        }
    }
}

/// External rate provider identity, used to key rate snapshots
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "provider_type", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProviderType {
    UkTariff,
    EuTaric,
    Vat,
    Fx,
}

impl ProviderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderType::UkTariff => "UK_TARIFF",
            ProviderType::EuTaric => "EU_TARIC",
            ProviderType::Vat => "VAT",
            ProviderType::Fx => "FX",
        }
    }
}
