//! TARIC reference entities.
//!
//! Every row is validity-windowed by nullable half-open date bounds; the
//! single predicate [`valid_on`] decides whether a row applies on a date.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

/// Validity predicate shared by all temporal TARIC queries: a row is valid
/// on `as_of` iff neither bound excludes it.
pub fn valid_on(valid_from: Option<NaiveDate>, valid_to: Option<NaiveDate>, as_of: NaiveDate) -> bool {
    valid_from.map_or(true, |from| from <= as_of) && valid_to.map_or(true, |to| to >= as_of)
}

/// One imported TARIC data set, unique over `(snapshot_date, files_hash)`
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TaricSnapshot {
    pub id: Uuid,
    pub snapshot_date: NaiveDate,
    pub source_label: String,
    pub imported_at: DateTime<Utc>,
    pub files_hash: String,
    pub notes: Option<String>,
}

/// Goods nomenclature node in the commodity-code hierarchy
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct GoodsNomenclature {
    pub goods_code: String,
    pub parent_goods_code: Option<String>,
    pub level: Option<i32>,
    pub suffix: Option<String>,
    pub valid_from: Option<NaiveDate>,
    pub valid_to: Option<NaiveDate>,
    pub source_record_id: Option<String>,
}

/// Language-tagged description of a goods code
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct GoodsDescription {
    pub id: Uuid,
    pub goods_code: String,
    pub lang: String,
    pub description: String,
    pub valid_from: Option<NaiveDate>,
    pub valid_to: Option<NaiveDate>,
}

/// Geographic area (country or group)
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct GeoArea {
    pub geo_code: String,
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub area_type: Option<String>,
    pub description: Option<String>,
    pub valid_from: Option<NaiveDate>,
    pub valid_to: Option<NaiveDate>,
}

/// Membership of a country in a geographic group
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct GeoAreaMember {
    pub id: Uuid,
    pub group_geo_code: String,
    pub member_geo_code: String,
    pub valid_from: Option<NaiveDate>,
    pub valid_to: Option<NaiveDate>,
}

/// A tariff measure binding a duty/restriction to goods code, geo area, and
/// date window
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Measure {
    pub measure_uid: String,
    pub goods_code: String,
    pub measure_type_code: String,
    pub geo_code: String,
    pub regulation_ref: Option<String>,
    pub valid_from: Option<NaiveDate>,
    pub valid_to: Option<NaiveDate>,
    pub raw_payload_json: Option<Json<serde_json::Value>>,
    pub orphan_goods_code: bool,
}

/// Reusable duty expression text
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DutyExpression {
    pub id: Uuid,
    pub expression_text: String,
    pub currency: Option<String>,
    pub uom: Option<String>,
    pub valid_from: Option<NaiveDate>,
    pub valid_to: Option<NaiveDate>,
}

/// Link from a measure to its duty expression, either inline text or a
/// reference into `duty_expression`
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MeasureDutyExpression {
    pub id: Uuid,
    pub measure_uid: String,
    pub expression_id: Option<Uuid>,
    pub expression_text: Option<String>,
    pub seq_no: Option<i32>,
}

/// Additional code catalogue entry
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AdditionalCode {
    pub id: Uuid,
    pub code_type: String,
    pub code: String,
    pub description: Option<String>,
    pub valid_from: Option<NaiveDate>,
    pub valid_to: Option<NaiveDate>,
}

/// Additional code required by a measure
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MeasureAdditionalCode {
    pub id: Uuid,
    pub measure_uid: String,
    pub additional_code_type: String,
    pub additional_code: String,
}

/// Condition (certificate/action requirement) attached to a measure
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MeasureCondition {
    pub id: Uuid,
    pub measure_uid: String,
    pub condition_code: Option<String>,
    pub action_code: Option<String>,
    pub certificate_type_code: Option<String>,
    pub valid_from: Option<NaiveDate>,
    pub valid_to: Option<NaiveDate>,
}

/// Legal regulation backing one or more measures
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Regulation {
    pub regulation_ref: String,
    pub published_date: Option<NaiveDate>,
    pub valid_from: Option<NaiveDate>,
    pub valid_to: Option<NaiveDate>,
    pub url: Option<String>,
}

/// Resolved-result cache row, unique by
/// `(snapshot_date, goods_code, origin_country, as_of_date, additional_code)`
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TaricResolvedCache {
    pub id: Uuid,
    pub snapshot_date: NaiveDate,
    pub goods_code: String,
    pub origin_country: String,
    pub as_of_date: NaiveDate,
    pub additional_code: Option<String>,
    pub payload: Json<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}
