//! TARIC Repository
//!
//! Temporal queries over the TARIC reference tables. Every validity-filtered
//! lookup applies the same predicate as [`crate::models::taric::valid_on`]:
//! `(valid_from IS NULL OR valid_from <= as_of) AND
//!  (valid_to IS NULL OR valid_to >= as_of)`.

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::types::Json;
use uuid::Uuid;

use crate::models::{
    DutyExpression, GeoAreaMember, GoodsDescription, GoodsNomenclature, Measure,
    MeasureAdditionalCode, MeasureCondition, MeasureDutyExpression, Regulation,
    TaricResolvedCache,
};
use crate::Result;

/// TARIC repository trait - database agnostic
#[async_trait]
pub trait TaricRepository: Send + Sync {
    /// Date of the most recently imported snapshot
    async fn get_latest_snapshot_date(&self) -> Result<Option<NaiveDate>>;

    /// Goods rows among `codes` valid on `as_of`
    async fn get_goods_candidates(
        &self,
        codes: &[String],
        as_of: NaiveDate,
    ) -> Result<Vec<GoodsNomenclature>>;

    /// Description of a goods code in the given language, valid on `as_of`
    async fn get_goods_description(
        &self,
        goods_code: &str,
        as_of: NaiveDate,
        lang: &str,
    ) -> Result<Option<GoodsDescription>>;

    /// Measures attached to any of `goods_codes`, valid on `as_of`
    async fn get_measures(&self, goods_codes: &[String], as_of: NaiveDate) -> Result<Vec<Measure>>;

    /// Whether a measure's geo code covers the origin country on `as_of`:
    /// direct match, ERGA_OMNES, or group membership
    async fn geo_applies(&self, geo_code: &str, origin: &str, as_of: NaiveDate) -> Result<bool>;

    async fn get_measure_duty_expressions(
        &self,
        measure_uids: &[String],
    ) -> Result<Vec<MeasureDutyExpression>>;

    async fn get_duty_expressions(&self, expression_ids: &[Uuid]) -> Result<Vec<DutyExpression>>;

    async fn get_measure_additional_codes(
        &self,
        measure_uids: &[String],
    ) -> Result<Vec<MeasureAdditionalCode>>;

    async fn get_measure_conditions(
        &self,
        measure_uids: &[String],
    ) -> Result<Vec<MeasureCondition>>;

    async fn get_regulations(&self, refs: &[String]) -> Result<Vec<Regulation>>;

    /// Cached resolver result for the exact composite key, if present
    async fn get_cached(
        &self,
        snapshot_date: NaiveDate,
        goods_code: &str,
        origin: &str,
        as_of: NaiveDate,
        additional_code: Option<&str>,
    ) -> Result<Option<TaricResolvedCache>>;

    /// Get-or-create a resolved-cache row for the composite key
    async fn upsert_cache(
        &self,
        snapshot_date: NaiveDate,
        goods_code: &str,
        origin: &str,
        as_of: NaiveDate,
        additional_code: Option<&str>,
        payload: serde_json::Value,
    ) -> Result<TaricResolvedCache>;
}

/// PostgreSQL implementation of TaricRepository
pub struct PostgresTaricRepository {
    db: sqlx::PgPool,
}

impl PostgresTaricRepository {
    pub fn new(db: sqlx::PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl TaricRepository for PostgresTaricRepository {
    async fn get_latest_snapshot_date(&self) -> Result<Option<NaiveDate>> {
        let date: Option<(NaiveDate,)> = sqlx::query_as(
            "SELECT snapshot_date FROM taric_snapshot ORDER BY snapshot_date DESC LIMIT 1",
        )
        .fetch_optional(&self.db)
        .await?;

        Ok(date.map(|(d,)| d))
    }

    async fn get_goods_candidates(
        &self,
        codes: &[String],
        as_of: NaiveDate,
    ) -> Result<Vec<GoodsNomenclature>> {
        let rows = sqlx::query_as::<_, GoodsNomenclature>(
            r#"
            SELECT * FROM goods_nomenclature
            WHERE goods_code = ANY($1)
              AND (valid_from IS NULL OR valid_from <= $2)
              AND (valid_to IS NULL OR valid_to >= $2)
            "#,
        )
        .bind(codes)
        .bind(as_of)
        .fetch_all(&self.db)
        .await?;

        Ok(rows)
    }

    async fn get_goods_description(
        &self,
        goods_code: &str,
        as_of: NaiveDate,
        lang: &str,
    ) -> Result<Option<GoodsDescription>> {
        let row = sqlx::query_as::<_, GoodsDescription>(
            r#"
            SELECT * FROM goods_description
            WHERE goods_code = $1
              AND lang = $2
              AND (valid_from IS NULL OR valid_from <= $3)
              AND (valid_to IS NULL OR valid_to >= $3)
            LIMIT 1
            "#,
        )
        .bind(goods_code)
        .bind(lang)
        .bind(as_of)
        .fetch_optional(&self.db)
        .await?;

        Ok(row)
    }

    async fn get_measures(&self, goods_codes: &[String], as_of: NaiveDate) -> Result<Vec<Measure>> {
        let rows = sqlx::query_as::<_, Measure>(
            r#"
            SELECT * FROM measure
            WHERE goods_code = ANY($1)
              AND (valid_from IS NULL OR valid_from <= $2)
              AND (valid_to IS NULL OR valid_to >= $2)
            "#,
        )
        .bind(goods_codes)
        .bind(as_of)
        .fetch_all(&self.db)
        .await?;

        Ok(rows)
    }

    async fn geo_applies(&self, geo_code: &str, origin: &str, as_of: NaiveDate) -> Result<bool> {
        if geo_code == origin || geo_code == "ERGA_OMNES" {
            return Ok(true);
        }

        let member = sqlx::query_as::<_, GeoAreaMember>(
            r#"
            SELECT * FROM geo_area_member
            WHERE group_geo_code = $1
              AND member_geo_code = $2
              AND (valid_from IS NULL OR valid_from <= $3)
              AND (valid_to IS NULL OR valid_to >= $3)
            LIMIT 1
            "#,
        )
        .bind(geo_code)
        .bind(origin)
        .bind(as_of)
        .fetch_optional(&self.db)
        .await?;

        Ok(member.is_some())
    }

    async fn get_measure_duty_expressions(
        &self,
        measure_uids: &[String],
    ) -> Result<Vec<MeasureDutyExpression>> {
        if measure_uids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query_as::<_, MeasureDutyExpression>(
            "SELECT * FROM measure_duty_expression WHERE measure_uid = ANY($1) ORDER BY seq_no",
        )
        .bind(measure_uids)
        .fetch_all(&self.db)
        .await?;

        Ok(rows)
    }

    async fn get_duty_expressions(&self, expression_ids: &[Uuid]) -> Result<Vec<DutyExpression>> {
        if expression_ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query_as::<_, DutyExpression>(
            "SELECT * FROM duty_expression WHERE id = ANY($1)",
        )
        .bind(expression_ids)
        .fetch_all(&self.db)
        .await?;

        Ok(rows)
    }

    async fn get_measure_additional_codes(
        &self,
        measure_uids: &[String],
    ) -> Result<Vec<MeasureAdditionalCode>> {
        if measure_uids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query_as::<_, MeasureAdditionalCode>(
            "SELECT * FROM measure_additional_code WHERE measure_uid = ANY($1)",
        )
        .bind(measure_uids)
        .fetch_all(&self.db)
        .await?;

        Ok(rows)
    }

    async fn get_measure_conditions(
        &self,
        measure_uids: &[String],
    ) -> Result<Vec<MeasureCondition>> {
        if measure_uids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query_as::<_, MeasureCondition>(
            "SELECT * FROM measure_condition WHERE measure_uid = ANY($1)",
        )
        .bind(measure_uids)
        .fetch_all(&self.db)
        .await?;

        Ok(rows)
    }

    async fn get_regulations(&self, refs: &[String]) -> Result<Vec<Regulation>> {
        if refs.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query_as::<_, Regulation>(
            "SELECT * FROM regulation WHERE regulation_ref = ANY($1)",
        )
        .bind(refs)
        .fetch_all(&self.db)
        .await?;

        Ok(rows)
    }

    async fn get_cached(
        &self,
        snapshot_date: NaiveDate,
        goods_code: &str,
        origin: &str,
        as_of: NaiveDate,
        additional_code: Option<&str>,
    ) -> Result<Option<TaricResolvedCache>> {
        let row = sqlx::query_as::<_, TaricResolvedCache>(
            r#"
            SELECT * FROM taric_resolved_cache
            WHERE snapshot_date = $1
              AND goods_code = $2
              AND origin_country = $3
              AND as_of_date = $4
              AND additional_code IS NOT DISTINCT FROM $5
            "#,
        )
        .bind(snapshot_date)
        .bind(goods_code)
        .bind(origin)
        .bind(as_of)
        .bind(additional_code)
        .fetch_optional(&self.db)
        .await?;

        Ok(row)
    }

    async fn upsert_cache(
        &self,
        snapshot_date: NaiveDate,
        goods_code: &str,
        origin: &str,
        as_of: NaiveDate,
        additional_code: Option<&str>,
        payload: serde_json::Value,
    ) -> Result<TaricResolvedCache> {
        // The unique index is declared NULLS NOT DISTINCT so a null
        // additional_code still conflicts; first writer wins
        let row = sqlx::query_as::<_, TaricResolvedCache>(
            r#"
            INSERT INTO taric_resolved_cache
                (id, snapshot_date, goods_code, origin_country, as_of_date, additional_code, payload)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (snapshot_date, goods_code, origin_country, as_of_date, additional_code)
                DO UPDATE SET payload = taric_resolved_cache.payload
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(snapshot_date)
        .bind(goods_code)
        .bind(origin)
        .bind(as_of)
        .bind(additional_code)
        .bind(Json(payload))
        .fetch_one(&self.db)
        .await?;

        Ok(row)
    }
}
