//! TARIC resolver
//!
//! Resolution runs against one snapshot of the reference data and is
//! memoized in `taric_resolved_cache` keyed by
//! `(snapshot_date, goods_code, origin, as_of, additional_code)`.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use tracing::debug;

use crate::repository::TaricRepository;
use crate::taric::{DutyComponent, DutyKind, MeasureRequirement, ResolvedTaric};
use crate::{Error, Result};

static PERCENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([0-9]+(?:\.[0-9]+)?)\s*%$").expect("valid percent regex"));

/// Resolution seam used by the calculator; lets tests substitute a stub
#[async_trait]
pub trait TaricResolve: Send + Sync {
    async fn resolve_taric(
        &self,
        goods_code: &str,
        origin_country_code: &str,
        as_of: NaiveDate,
        additional_code: Option<&str>,
    ) -> Result<ResolvedTaric>;
}

pub struct TaricResolver {
    repo: Arc<dyn TaricRepository>,
}

impl TaricResolver {
    pub fn new(repo: Arc<dyn TaricRepository>) -> Self {
        Self { repo }
    }

    /// Resolve duties for a goods code / origin / date, optionally pinned to
    /// a specific snapshot
    pub async fn resolve(
        &self,
        goods_code: &str,
        origin_country_code: &str,
        as_of: NaiveDate,
        additional_code: Option<&str>,
        snapshot_date: Option<NaiveDate>,
    ) -> Result<ResolvedTaric> {
        let snapshot_date = match snapshot_date {
            Some(date) => date,
            None => match self.repo.get_latest_snapshot_date().await? {
                Some(date) => date,
                None => {
                    return Ok(ResolvedTaric::empty(
                        goods_code,
                        vec!["No TARIC snapshot loaded.".to_string()],
                    ))
                }
            },
        };

        if let Some(cached) = self
            .repo
            .get_cached(snapshot_date, goods_code, origin_country_code, as_of, additional_code)
            .await?
        {
            debug!(
                "resolved cache hit: goods={} origin={} as_of={}",
                goods_code, origin_country_code, as_of
            );
            return serde_json::from_value(cached.payload.0)
                .map_err(|e| Error::Contract(format!("Corrupt resolved-cache payload: {}", e)));
        }

        let codes = candidate_codes(goods_code);
        let goods_rows = self.repo.get_goods_candidates(&codes, as_of).await?;
        let matched_codes: HashSet<String> =
            goods_rows.iter().map(|row| row.goods_code.clone()).collect();
        let matched_code = codes.iter().find(|code| matched_codes.contains(*code)).cloned();

        // Fall back to the full candidate list when nothing matched, so
        // measures hung on codes absent from the nomenclature still apply
        let measure_codes: Vec<String> = if matched_codes.is_empty() {
            codes.clone()
        } else {
            matched_codes.iter().cloned().collect()
        };
        let measures = self.repo.get_measures(&measure_codes, as_of).await?;

        let mut applicable = Vec::new();
        for measure in measures {
            if self
                .repo
                .geo_applies(&measure.geo_code, origin_country_code, as_of)
                .await?
            {
                applicable.push(measure);
            }
        }

        let measure_uids: Vec<String> =
            applicable.iter().map(|m| m.measure_uid.clone()).collect();

        let duty_links = self.repo.get_measure_duty_expressions(&measure_uids).await?;
        let expression_ids: Vec<uuid::Uuid> =
            duty_links.iter().filter_map(|link| link.expression_id).collect();
        let expression_rows = self.repo.get_duty_expressions(&expression_ids).await?;
        let expression_map: HashMap<uuid::Uuid, String> = expression_rows
            .into_iter()
            .map(|row| (row.id, row.expression_text))
            .collect();

        let mut expressions_by_measure: HashMap<String, Vec<String>> = HashMap::new();
        for link in &duty_links {
            let text = match &link.expression_text {
                Some(text) => Some(text.clone()),
                None => link.expression_id.and_then(|id| expression_map.get(&id).cloned()),
            };
            if let Some(text) = text {
                expressions_by_measure
                    .entry(link.measure_uid.clone())
                    .or_default()
                    .push(text);
            }
        }

        let additional_links = self.repo.get_measure_additional_codes(&measure_uids).await?;
        let mut allowed_codes_by_measure: HashMap<String, HashSet<String>> = HashMap::new();
        for link in additional_links {
            allowed_codes_by_measure
                .entry(link.measure_uid)
                .or_default()
                .insert(link.additional_code);
        }

        let conditions = self.repo.get_measure_conditions(&measure_uids).await?;
        let requirements: Vec<MeasureRequirement> = conditions
            .into_iter()
            .map(|cond| MeasureRequirement {
                measure_uid: cond.measure_uid,
                condition_code: cond.condition_code,
                action_code: cond.action_code,
                certificate_type_code: cond.certificate_type_code,
            })
            .collect();

        let mut legal_refs = Vec::new();
        for measure in &applicable {
            if let Some(reg_ref) = &measure.regulation_ref {
                if !legal_refs.contains(reg_ref) {
                    legal_refs.push(reg_ref.clone());
                }
            }
        }

        let mut duties = Vec::new();
        for measure in &applicable {
            let exprs = expressions_by_measure
                .get(&measure.measure_uid)
                .filter(|list| !list.is_empty())
                .cloned()
                .unwrap_or_else(|| vec!["0%".to_string()]);

            let requires_additional = match allowed_codes_by_measure.get(&measure.measure_uid) {
                None => false,
                Some(allowed) => match additional_code {
                    None => true,
                    Some(code) => !allowed.contains(code),
                },
            };

            for expr in exprs {
                let (kind, rate, uom) = parse_expression(&expr);
                duties.push(DutyComponent {
                    measure_uid: measure.measure_uid.clone(),
                    measure_type_code: measure.measure_type_code.clone(),
                    expression: expr,
                    kind,
                    rate,
                    uom,
                    requires_additional_code: requires_additional,
                });
            }
        }

        let effective_duty_rate = select_effective_rate(&duties);

        let resolved = ResolvedTaric {
            goods_code: goods_code.to_string(),
            matched_goods_code: matched_code,
            duties,
            requirements,
            legal_refs,
            effective_duty_rate,
            notes: Vec::new(),
        };

        let payload = serde_json::to_value(&resolved)?;
        self.repo
            .upsert_cache(
                snapshot_date,
                goods_code,
                origin_country_code,
                as_of,
                additional_code,
                payload,
            )
            .await?;

        Ok(resolved)
    }
}

#[async_trait]
impl TaricResolve for TaricResolver {
    async fn resolve_taric(
        &self,
        goods_code: &str,
        origin_country_code: &str,
        as_of: NaiveDate,
        additional_code: Option<&str>,
    ) -> Result<ResolvedTaric> {
        self.resolve(goods_code, origin_country_code, as_of, additional_code, None)
            .await
    }
}

/// Hierarchy fallback: digits-only truncations of lengths 10, 8, 6, 4, 2
/// that fit the cleaned code, longest first
pub fn candidate_codes(goods_code: &str) -> Vec<String> {
    let cleaned: String = goods_code.chars().filter(|c| c.is_ascii_digit()).collect();
    [10usize, 8, 6, 4, 2]
        .iter()
        .filter(|&&len| cleaned.len() >= len)
        .map(|&len| cleaned[..len].to_string())
        .collect()
}

/// Classify a duty expression as ad-valorem, specific, or unknown
pub fn parse_expression(expr: &str) -> (DutyKind, Option<Decimal>, Option<String>) {
    let expr = expr.trim();
    if expr.contains('%') {
        if let Some(caps) = PERCENT_RE.captures(expr) {
            if let Ok(value) = caps[1].parse::<Decimal>() {
                return (DutyKind::AdValorem, Some(value / Decimal::from(100)), None);
            }
        }
        return (DutyKind::Unknown, None, None);
    }
    if expr.to_uppercase().contains("EUR") {
        return (DutyKind::Specific, None, Some("EUR".to_string()));
    }
    (DutyKind::Unknown, None, None)
}

/// Tie-break policy: a preferential ad-valorem rate wins, then the first
/// non-anti-dumping ad-valorem rate; anti-dumping duties are never the base
/// rate
pub fn select_effective_rate(duties: &[DutyComponent]) -> Option<Decimal> {
    if let Some(pref) = duties
        .iter()
        .find(|d| d.kind == DutyKind::AdValorem && d.is_preferential())
    {
        return pref.rate;
    }
    duties
        .iter()
        .find(|d| d.kind == DutyKind::AdValorem && !d.is_anti_dumping())
        .and_then(|d| d.rate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        DutyExpression, GoodsDescription, GoodsNomenclature, Measure,
        MeasureAdditionalCode, MeasureCondition, MeasureDutyExpression, Regulation,
        TaricResolvedCache,
    };
    use crate::repository::TaricRepository;
    use rust_decimal_macros::dec;
    use sqlx::types::Json;
    use std::sync::Mutex;
    use uuid::Uuid;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn goods(code: &str) -> GoodsNomenclature {
        GoodsNomenclature {
            goods_code: code.to_string(),
            parent_goods_code: None,
            level: None,
            suffix: None,
            valid_from: None,
            valid_to: None,
            source_record_id: None,
        }
    }

    fn measure(uid: &str, code: &str, type_code: &str, geo: &str) -> Measure {
        Measure {
            measure_uid: uid.to_string(),
            goods_code: code.to_string(),
            measure_type_code: type_code.to_string(),
            geo_code: geo.to_string(),
            regulation_ref: None,
            valid_from: None,
            valid_to: None,
            raw_payload_json: None,
            orphan_goods_code: false,
        }
    }

    #[derive(Default)]
    struct FakeTaricRepo {
        snapshot_date: Option<NaiveDate>,
        goods: Vec<GoodsNomenclature>,
        measures: Vec<Measure>,
        geo_members: Vec<(String, String)>,
        duty_exprs: Vec<MeasureDutyExpression>,
        expressions: Vec<DutyExpression>,
        additional: Vec<MeasureAdditionalCode>,
        cache: Mutex<Vec<TaricResolvedCache>>,
        goods_queries: Mutex<u32>,
        measure_queries: Mutex<u32>,
    }

    impl FakeTaricRepo {
        fn with_snapshot() -> Self {
            Self {
                snapshot_date: Some(d(2025, 1, 1)),
                ..Default::default()
            }
        }

        fn link_expr(&mut self, measure_uid: &str, text: &str) {
            self.duty_exprs.push(MeasureDutyExpression {
                id: Uuid::new_v4(),
                measure_uid: measure_uid.to_string(),
                expression_id: None,
                expression_text: Some(text.to_string()),
                seq_no: Some(1),
            });
        }
    }

    #[async_trait]
    impl TaricRepository for FakeTaricRepo {
        async fn get_latest_snapshot_date(&self) -> crate::Result<Option<NaiveDate>> {
            Ok(self.snapshot_date)
        }

        async fn get_goods_candidates(
            &self,
            codes: &[String],
            _as_of: NaiveDate,
        ) -> crate::Result<Vec<GoodsNomenclature>> {
            *self.goods_queries.lock().unwrap() += 1;
            Ok(self
                .goods
                .iter()
                .filter(|g| codes.contains(&g.goods_code))
                .cloned()
                .collect())
        }

        async fn get_goods_description(
            &self,
            _goods_code: &str,
            _as_of: NaiveDate,
            _lang: &str,
        ) -> crate::Result<Option<GoodsDescription>> {
            Ok(None)
        }

        async fn get_measures(
            &self,
            goods_codes: &[String],
            _as_of: NaiveDate,
        ) -> crate::Result<Vec<Measure>> {
            *self.measure_queries.lock().unwrap() += 1;
            Ok(self
                .measures
                .iter()
                .filter(|m| goods_codes.contains(&m.goods_code))
                .cloned()
                .collect())
        }

        async fn geo_applies(
            &self,
            geo_code: &str,
            origin: &str,
            _as_of: NaiveDate,
        ) -> crate::Result<bool> {
            if geo_code == origin || geo_code == "ERGA_OMNES" {
                return Ok(true);
            }
            Ok(self
                .geo_members
                .iter()
                .any(|(group, member)| group == geo_code && member == origin))
        }

        async fn get_measure_duty_expressions(
            &self,
            measure_uids: &[String],
        ) -> crate::Result<Vec<MeasureDutyExpression>> {
            Ok(self
                .duty_exprs
                .iter()
                .filter(|e| measure_uids.contains(&e.measure_uid))
                .cloned()
                .collect())
        }

        async fn get_duty_expressions(
            &self,
            expression_ids: &[Uuid],
        ) -> crate::Result<Vec<DutyExpression>> {
            Ok(self
                .expressions
                .iter()
                .filter(|e| expression_ids.contains(&e.id))
                .cloned()
                .collect())
        }

        async fn get_measure_additional_codes(
            &self,
            measure_uids: &[String],
        ) -> crate::Result<Vec<MeasureAdditionalCode>> {
            Ok(self
                .additional
                .iter()
                .filter(|a| measure_uids.contains(&a.measure_uid))
                .cloned()
                .collect())
        }

        async fn get_measure_conditions(
            &self,
            _measure_uids: &[String],
        ) -> crate::Result<Vec<MeasureCondition>> {
            Ok(Vec::new())
        }

        async fn get_regulations(&self, _refs: &[String]) -> crate::Result<Vec<Regulation>> {
            Ok(Vec::new())
        }

        async fn get_cached(
            &self,
            snapshot_date: NaiveDate,
            goods_code: &str,
            origin: &str,
            as_of: NaiveDate,
            additional_code: Option<&str>,
        ) -> crate::Result<Option<TaricResolvedCache>> {
            Ok(self
                .cache
                .lock()
                .unwrap()
                .iter()
                .find(|row| {
                    row.snapshot_date == snapshot_date
                        && row.goods_code == goods_code
                        && row.origin_country == origin
                        && row.as_of_date == as_of
                        && row.additional_code.as_deref() == additional_code
                })
                .cloned())
        }

        async fn upsert_cache(
            &self,
            snapshot_date: NaiveDate,
            goods_code: &str,
            origin: &str,
            as_of: NaiveDate,
            additional_code: Option<&str>,
            payload: serde_json::Value,
        ) -> crate::Result<TaricResolvedCache> {
            let row = TaricResolvedCache {
                id: Uuid::new_v4(),
                snapshot_date,
                goods_code: goods_code.to_string(),
                origin_country: origin.to_string(),
                as_of_date: as_of,
                additional_code: additional_code.map(|s| s.to_string()),
                payload: Json(payload),
                created_at: chrono::Utc::now(),
            };
            self.cache.lock().unwrap().push(row.clone());
            Ok(row)
        }
    }

    #[test]
    fn test_candidate_codes_full_width() {
        assert_eq!(
            candidate_codes("1234567890"),
            vec!["1234567890", "12345678", "123456", "1234", "12"]
        );
    }

    #[test]
    fn test_candidate_codes_strips_non_digits() {
        assert_eq!(candidate_codes("0101.21"), vec!["0101", "01"]);
        assert_eq!(candidate_codes("ex 12"), vec!["12"]);
        assert!(candidate_codes("x").is_empty());
    }

    #[test]
    fn test_parse_expression_kinds() {
        assert_eq!(
            parse_expression("5%"),
            (DutyKind::AdValorem, Some(dec!(0.05)), None)
        );
        assert_eq!(
            parse_expression(" 12.5 %"),
            (DutyKind::AdValorem, Some(dec!(0.125)), None)
        );
        assert_eq!(
            parse_expression("35.1 EUR / 100 kg"),
            (DutyKind::Specific, None, Some("EUR".to_string()))
        );
        assert_eq!(parse_expression("see regulation"), (DutyKind::Unknown, None, None));
        // A percent sign with trailing junk stays unknown, not specific
        assert_eq!(parse_expression("5% + 2 EUR/kg"), (DutyKind::Unknown, None, None));
    }

    fn duty(uid: &str, type_code: &str, kind: DutyKind, rate: Option<Decimal>) -> DutyComponent {
        DutyComponent {
            measure_uid: uid.to_string(),
            measure_type_code: type_code.to_string(),
            expression: String::new(),
            kind,
            rate,
            uom: None,
            requires_additional_code: false,
        }
    }

    #[test]
    fn test_effective_rate_prefers_preferential() {
        let duties = vec![
            duty("m1", "142", DutyKind::AdValorem, Some(dec!(0.02))),
            duty("m2", "999", DutyKind::AdValorem, Some(dec!(0.08))),
        ];
        assert_eq!(select_effective_rate(&duties), Some(dec!(0.02)));
    }

    #[test]
    fn test_effective_rate_skips_anti_dumping() {
        let duties = vec![
            duty("m1", "552", DutyKind::AdValorem, Some(dec!(0.35))),
            duty("m2", "999", DutyKind::AdValorem, Some(dec!(0.08))),
        ];
        assert_eq!(select_effective_rate(&duties), Some(dec!(0.08)));

        let only_dumping = vec![duty("m1", "551", DutyKind::AdValorem, Some(dec!(0.35)))];
        assert_eq!(select_effective_rate(&only_dumping), None);
    }

    #[tokio::test]
    async fn test_resolver_no_snapshot_loaded() {
        let resolver = TaricResolver::new(Arc::new(FakeTaricRepo::default()));
        let result = resolver
            .resolve("0101", "CN", d(2025, 1, 2), None, None)
            .await
            .unwrap();
        assert!(result.duties.is_empty());
        assert_eq!(result.notes, vec!["No TARIC snapshot loaded.".to_string()]);
        assert!(result.effective_duty_rate.is_none());
    }

    #[tokio::test]
    async fn test_resolver_hierarchy_inheritance() {
        let mut repo = FakeTaricRepo::with_snapshot();
        repo.goods.push(goods("1234"));
        repo.measures.push(measure("m1", "1234", "103", "ERGA_OMNES"));
        repo.link_expr("m1", "5%");

        let resolver = TaricResolver::new(Arc::new(repo));
        let result = resolver
            .resolve("1234567890", "CN", d(2025, 1, 2), None, None)
            .await
            .unwrap();

        assert_eq!(result.matched_goods_code.as_deref(), Some("1234"));
        assert_eq!(result.effective_duty_rate, Some(dec!(0.05)));
    }

    #[tokio::test]
    async fn test_resolver_geo_membership() {
        let mut repo = FakeTaricRepo::with_snapshot();
        repo.goods.push(goods("0101"));
        repo.measures.push(measure("m2", "0101", "103", "GRP1"));
        repo.link_expr("m2", "10%");
        repo.geo_members.push(("GRP1".to_string(), "CN".to_string()));

        let resolver = TaricResolver::new(Arc::new(repo));
        let result = resolver
            .resolve("0101", "CN", d(2025, 1, 2), None, None)
            .await
            .unwrap();
        assert_eq!(result.effective_duty_rate, Some(dec!(0.1)));
    }

    #[tokio::test]
    async fn test_resolver_filters_out_non_matching_geo() {
        let mut repo = FakeTaricRepo::with_snapshot();
        repo.goods.push(goods("0101"));
        repo.measures.push(measure("m2", "0101", "103", "GRP1"));
        repo.link_expr("m2", "10%");

        let resolver = TaricResolver::new(Arc::new(repo));
        let result = resolver
            .resolve("0101", "CN", d(2025, 1, 2), None, None)
            .await
            .unwrap();
        assert!(result.duties.is_empty());
        assert!(result.effective_duty_rate.is_none());
    }

    #[tokio::test]
    async fn test_resolver_defaults_missing_expression_to_zero_percent() {
        let mut repo = FakeTaricRepo::with_snapshot();
        repo.goods.push(goods("0101"));
        repo.measures.push(measure("m1", "0101", "999", "ERGA_OMNES"));

        let resolver = TaricResolver::new(Arc::new(repo));
        let result = resolver
            .resolve("0101", "CN", d(2025, 1, 2), None, None)
            .await
            .unwrap();
        assert_eq!(result.duties.len(), 1);
        assert_eq!(result.duties[0].expression, "0%");
        assert_eq!(result.effective_duty_rate, Some(dec!(0)));
    }

    #[tokio::test]
    async fn test_resolver_resolves_expression_by_id() {
        let mut repo = FakeTaricRepo::with_snapshot();
        repo.goods.push(goods("0101"));
        repo.measures.push(measure("m1", "0101", "103", "ERGA_OMNES"));
        let expr_id = Uuid::new_v4();
        repo.expressions.push(DutyExpression {
            id: expr_id,
            expression_text: "7.5%".to_string(),
            currency: None,
            uom: None,
            valid_from: None,
            valid_to: None,
        });
        repo.duty_exprs.push(MeasureDutyExpression {
            id: Uuid::new_v4(),
            measure_uid: "m1".to_string(),
            expression_id: Some(expr_id),
            expression_text: None,
            seq_no: Some(1),
        });

        let resolver = TaricResolver::new(Arc::new(repo));
        let result = resolver
            .resolve("0101", "CN", d(2025, 1, 2), None, None)
            .await
            .unwrap();
        assert_eq!(result.effective_duty_rate, Some(dec!(0.075)));
    }

    #[tokio::test]
    async fn test_resolver_additional_code_gating() {
        let mut repo = FakeTaricRepo::with_snapshot();
        repo.goods.push(goods("0101"));
        repo.measures.push(measure("m1", "0101", "103", "ERGA_OMNES"));
        repo.link_expr("m1", "5%");
        repo.additional.push(MeasureAdditionalCode {
            id: Uuid::new_v4(),
            measure_uid: "m1".to_string(),
            additional_code_type: "C".to_string(),
            additional_code: "C490".to_string(),
        });

        let resolver = TaricResolver::new(Arc::new(repo));

        // No code supplied
        let result = resolver
            .resolve("0101", "CN", d(2025, 1, 2), None, None)
            .await
            .unwrap();
        assert!(result.duties[0].requires_additional_code);

        // Wrong code supplied
        let result = resolver
            .resolve("0101", "CN", d(2025, 1, 2), Some("C999"), None)
            .await
            .unwrap();
        assert!(result.duties[0].requires_additional_code);

        // Matching code supplied
        let result = resolver
            .resolve("0101", "CN", d(2025, 1, 2), Some("C490"), None)
            .await
            .unwrap();
        assert!(!result.duties[0].requires_additional_code);
    }

    #[tokio::test]
    async fn test_resolver_second_call_served_from_cache() {
        let mut repo = FakeTaricRepo::with_snapshot();
        repo.goods.push(goods("0101"));
        repo.measures.push(measure("m1", "0101", "103", "ERGA_OMNES"));
        repo.link_expr("m1", "5%");
        let repo = Arc::new(repo);

        let resolver = TaricResolver::new(repo.clone());
        let first = resolver
            .resolve("0101", "CN", d(2025, 1, 2), None, None)
            .await
            .unwrap();
        let second = resolver
            .resolve("0101", "CN", d(2025, 1, 2), None, None)
            .await
            .unwrap();

        // The second call touched neither goods nor measure queries
        assert_eq!(*repo.goods_queries.lock().unwrap(), 1);
        assert_eq!(*repo.measure_queries.lock().unwrap(), 1);

        // And the rehydrated payload round-trips byte-equal
        assert_eq!(
            serde_json::to_vec(&first).unwrap(),
            serde_json::to_vec(&second).unwrap()
        );
    }
}
