//! TARIC resolution engine
//!
//! Given a commodity code, an origin country, and a date, walks the
//! goods-code hierarchy, filters measures by geographic applicability,
//! parses duty expressions, and selects a single effective ad-valorem rate.

pub mod resolver;

pub use resolver::{TaricResolve, TaricResolver};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Measure types carrying preferential (trade-agreement) rates
pub const PREFERENTIAL_CODES: [&str; 7] = ["103", "105", "106", "142", "143", "144", "145"];

/// Measure types carrying anti-dumping duties
pub const ANTI_DUMPING_CODES: [&str; 4] = ["551", "552", "553", "554"];

/// Parsed shape of a duty expression
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DutyKind {
    /// Percentage of customs value
    AdValorem,
    /// Fixed amount per unit of measure
    Specific,
    /// Anything the parser does not understand
    Unknown,
}

/// One duty carried by an applicable measure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DutyComponent {
    pub measure_uid: String,
    pub measure_type_code: String,
    pub expression: String,
    pub kind: DutyKind,
    pub rate: Option<Decimal>,
    pub uom: Option<String>,
    #[serde(default)]
    pub requires_additional_code: bool,
}

impl DutyComponent {
    pub fn is_anti_dumping(&self) -> bool {
        ANTI_DUMPING_CODES.contains(&self.measure_type_code.as_str())
    }

    pub fn is_preferential(&self) -> bool {
        PREFERENTIAL_CODES.contains(&self.measure_type_code.as_str())
    }
}

/// Certificate/action requirement attached to an applicable measure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeasureRequirement {
    pub measure_uid: String,
    pub condition_code: Option<String>,
    pub action_code: Option<String>,
    pub certificate_type_code: Option<String>,
}

/// Full resolver output; its serialized form is exactly what the resolved
/// cache stores
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedTaric {
    pub goods_code: String,
    pub matched_goods_code: Option<String>,
    pub duties: Vec<DutyComponent>,
    pub requirements: Vec<MeasureRequirement>,
    pub legal_refs: Vec<String>,
    pub effective_duty_rate: Option<Decimal>,
    pub notes: Vec<String>,
}

impl ResolvedTaric {
    /// Empty result for a goods code nothing matched
    pub fn empty(goods_code: &str, notes: Vec<String>) -> Self {
        Self {
            goods_code: goods_code.to_string(),
            matched_goods_code: None,
            duties: Vec::new(),
            requirements: Vec::new(),
            legal_refs: Vec::new(),
            effective_duty_rate: None,
            notes,
        }
    }
}
