use crate::constraints::ConstraintContext;
use crate::predicates::{self, RejectReason};
use mealrec_catalog::{Meal, MealManifest};
use mealrec_protocol::{CandidateSummary, FilterResponse};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

pub const DEFAULT_POOL_LIMIT: usize = 200;
pub const MAX_POOL_LIMIT: usize = 500;
pub const DEFAULT_MAX_SKUS: usize = 3;

/// Pool limit bounds; the filter clamps caller limits into `[1, max]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolLimits {
    pub default_limit: usize,
    pub max_limit: usize,
}

impl Default for PoolLimits {
    fn default() -> Self {
        Self {
            default_limit: DEFAULT_POOL_LIMIT,
            max_limit: MAX_POOL_LIMIT,
        }
    }
}

impl PoolLimits {
    pub fn clamp(&self, limit: Option<usize>) -> usize {
        let max = self.max_limit.max(1);
        limit.unwrap_or(self.default_limit).clamp(1, max)
    }
}

/// A retained meal, tagged with the archetype it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateMealDetail {
    pub archetype_id: Option<String>,
    pub meal: Meal,
}

#[derive(Debug, Clone)]
pub struct CandidatePool {
    pub candidate_pool_id: String,
    pub total_candidates: usize,
    pub details: Vec<CandidateMealDetail>,
    pub summaries: Vec<CandidateSummary>,
    pub rejected: BTreeMap<RejectReason, usize>,
}

impl CandidatePool {
    pub fn returned_count(&self) -> usize {
        self.details.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total_candidates == 0
    }

    pub fn to_response(&self) -> FilterResponse {
        FilterResponse {
            candidate_pool_id: self.candidate_pool_id.clone(),
            total_candidates: self.total_candidates,
            returned_count: self.summaries.len(),
            candidate_meals: self.summaries.clone(),
        }
    }
}

/// Scans the manifest in stored order and keeps every meal that satisfies the context.
pub struct CandidatePoolFilter<'a> {
    manifest: &'a MealManifest,
    limits: PoolLimits,
    max_skus: usize,
}

impl<'a> CandidatePoolFilter<'a> {
    pub fn new(manifest: &'a MealManifest) -> Self {
        Self {
            manifest,
            limits: PoolLimits::default(),
            max_skus: DEFAULT_MAX_SKUS,
        }
    }

    #[must_use]
    pub fn with_limits(mut self, limits: PoolLimits) -> Self {
        self.limits = limits;
        self
    }

    #[must_use]
    pub fn with_max_skus(mut self, max_skus: usize) -> Self {
        self.max_skus = max_skus;
        self
    }

    /// Every match counts toward `total_candidates`; only the first `limit` are materialised.
    pub fn filter(&self, ctx: &ConstraintContext, limit: Option<usize>) -> CandidatePool {
        let limit = self.limits.clamp(limit);
        let mut total = 0usize;
        let mut details = Vec::new();
        let mut rejected: BTreeMap<RejectReason, usize> = BTreeMap::new();

        for (archetype, meal) in self.manifest.iter_meals() {
            if let Some(reason) = predicates::first_rejection(meal, ctx) {
                *rejected.entry(reason).or_insert(0) += 1;
                continue;
            }
            total += 1;
            if details.len() < limit {
                details.push(CandidateMealDetail {
                    archetype_id: Some(archetype.uid.clone()),
                    meal: meal.clone(),
                });
            }
        }

        let summaries = details
            .iter()
            .map(|detail| summarize(detail, self.max_skus))
            .collect();

        log::debug!(
            "Candidate pool: {} matches, {} returned (limit {}), rejected {:?}",
            total,
            details.len(),
            limit,
            rejected
                .iter()
                .map(|(reason, count)| format!("{}={}", reason.as_str(), count))
                .collect::<Vec<_>>()
        );

        CandidatePool {
            candidate_pool_id: candidate_pool_id(self.manifest, ctx, limit),
            total_candidates: total,
            details,
            summaries,
            rejected,
        }
    }
}

pub fn summarize(detail: &CandidateMealDetail, max_skus: usize) -> CandidateSummary {
    let meal = &detail.meal;
    CandidateSummary {
        meal_id: meal.meal_id.clone(),
        name: meal.name.clone(),
        archetype_id: detail.archetype_id.clone(),
        tags: meal.tags.clone(),
        heat_level: predicates::heat_label(meal),
        prep_minutes: meal.estimated_prep_minutes(),
        complexity: meal.metadata.complexity.clone(),
        skus: meal.metadata.skus.iter().take(max_skus).cloned().collect(),
    }
}

/// Deterministic id for a (manifest, constraints, limit) combination.
pub fn candidate_pool_id(manifest: &MealManifest, ctx: &ConstraintContext, limit: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(manifest.manifest_id().as_bytes());
    hasher.update(b"\0");
    hasher.update(manifest.tags_version().as_bytes());
    hasher.update(b"\0");
    // BTreeSet fields serialise in sorted order, so equal contexts hash equally.
    if let Ok(raw) = serde_json::to_vec(ctx) {
        hasher.update(&raw);
    }
    hasher.update(limit.to_le_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(32);
    for byte in digest.iter().take(16) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", byte);
    }
    format!("pool_{out}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use mealrec_catalog::{value_key, Archetype, HeatLevel, MealMetadata, TagMap};
    use pretty_assertions::assert_eq;
    use std::collections::BTreeSet;

    fn meal(id: &str, tags: &[(&str, &[&str])]) -> Meal {
        let mut map = TagMap::new();
        for (category, values) in tags {
            map.insert(
                category.to_string(),
                values.iter().map(|v| v.to_string()).collect(),
            );
        }
        Meal {
            meal_id: id.to_string(),
            name: format!("Meal {id}"),
            tags: map,
            metadata: MealMetadata::default(),
        }
    }

    fn manifest(archetypes: Vec<(&str, Vec<Meal>)>) -> MealManifest {
        MealManifest::new(
            "manifest-1",
            "tags-1",
            archetypes
                .into_iter()
                .map(|(uid, meals)| Archetype {
                    uid: uid.to_string(),
                    name: None,
                    meals,
                })
                .collect(),
        )
    }

    fn keys(values: &[&str]) -> BTreeSet<String> {
        values.iter().map(|v| value_key(v)).collect()
    }

    fn ids(pool: &CandidatePool) -> Vec<String> {
        pool.summaries.iter().map(|s| s.meal_id.clone()).collect()
    }

    #[test]
    fn vegan_without_dairy_keeps_only_vegan_meal() {
        let manifest = manifest(vec![(
            "bowls",
            vec![
                meal("vegan_bowl", &[("Diet", &["Vegan"])]),
                meal("cheese_bowl", &[("Diet", &["Vegan"]), ("Allergens", &["Dairy"])]),
            ],
        )]);
        let ctx = ConstraintContext {
            required_diets: keys(&["Vegan"]),
            disallowed_allergens: keys(&["Dairy"]),
            ..Default::default()
        };
        let pool = CandidatePoolFilter::new(&manifest).filter(&ctx, None);
        assert_eq!(pool.total_candidates, 1);
        assert_eq!(ids(&pool), vec!["vegan_bowl".to_string()]);
        assert_eq!(pool.rejected.get(&RejectReason::Allergen), Some(&1));
    }

    #[test]
    fn declined_ids_and_limit_interact() {
        let manifest = manifest(vec![(
            "mixed",
            vec![
                meal("vegan_meal", &[("Diet", &["Vegan"])]),
                meal("halal_meal", &[("EthicsReligious", &["Halal"])]),
                meal("pork_meal", &[("Allergens", &["Pork"])]),
            ],
        )]);
        let ctx = ConstraintContext {
            disallowed_allergens: keys(&["Pork"]),
            declined_meal_ids: BTreeSet::from(["vegan_meal".to_string()]),
            ..Default::default()
        };
        let pool = CandidatePoolFilter::new(&manifest).filter(&ctx, Some(1));
        assert_eq!(pool.total_candidates, 1);
        assert_eq!(pool.returned_count(), 1);
        assert_eq!(ids(&pool), vec!["halal_meal".to_string()]);
    }

    #[test]
    fn total_counts_past_the_limit() {
        let meals = (0..5)
            .map(|i| meal(&format!("m{i}"), &[]))
            .collect::<Vec<_>>();
        let manifest = manifest(vec![("all", meals)]);
        let pool = CandidatePoolFilter::new(&manifest).filter(&ConstraintContext::default(), Some(2));
        assert_eq!(pool.total_candidates, 5);
        assert_eq!(ids(&pool), vec!["m0".to_string(), "m1".to_string()]);
        let response = pool.to_response();
        assert_eq!(response.returned_count, 2);
    }

    #[test]
    fn mild_only_never_returns_hot_meals() {
        let manifest = manifest(vec![
            (
                "curries",
                vec![
                    meal("korma", &[("HeatSpice", &["Mild"])]),
                    meal("vindaloo", &[("HeatSpice", &["Hot"])]),
                ],
            ),
            ("wings", vec![meal("ghost_wings", &[("HeatSpice", &["Extra Hot"])])]),
        ]);
        let ctx = ConstraintContext {
            max_heat: Some(HeatLevel::Mild),
            ..Default::default()
        };
        let pool = CandidatePoolFilter::new(&manifest).filter(&ctx, None);
        assert_eq!(ids(&pool), vec!["korma".to_string()]);
        assert_eq!(pool.summaries[0].heat_level.as_deref(), Some("Mild"));
    }

    #[test]
    fn limit_is_clamped() {
        let limits = PoolLimits {
            default_limit: 10,
            max_limit: 20,
        };
        assert_eq!(limits.clamp(None), 10);
        assert_eq!(limits.clamp(Some(0)), 1);
        assert_eq!(limits.clamp(Some(500)), 20);
    }

    #[test]
    fn pool_id_is_deterministic_and_constraint_sensitive() {
        let manifest = manifest(vec![("a", vec![meal("x", &[])])]);
        let ctx = ConstraintContext::default();
        let other = ConstraintContext {
            max_prep_minutes: Some(20),
            ..Default::default()
        };
        assert_eq!(
            candidate_pool_id(&manifest, &ctx, 5),
            candidate_pool_id(&manifest, &ctx, 5)
        );
        assert_ne!(
            candidate_pool_id(&manifest, &ctx, 5),
            candidate_pool_id(&manifest, &other, 5)
        );
    }

    #[test]
    fn summaries_bound_sku_snapshot() {
        let mut m = meal("x", &[]);
        m.metadata.skus = (0..5)
            .map(|i| mealrec_protocol::SkuSnapshot {
                sku: format!("sku{i}"),
                ..Default::default()
            })
            .collect();
        let manifest = manifest(vec![("a", vec![m])]);
        let pool = CandidatePoolFilter::new(&manifest)
            .with_max_skus(2)
            .filter(&ConstraintContext::default(), None);
        assert_eq!(pool.summaries[0].skus.len(), 2);
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        const DIETS: [&str; 3] = ["Vegan", "Vegetarian", "Keto"];

        proptest! {
            #[test]
            fn proptest_pool_counts_and_declines_hold(
                diet_picks in proptest::collection::vec(0usize..3, 1..40),
                declined in proptest::collection::btree_set(0usize..40, 0..10),
                limit in 1usize..20,
            ) {
                let meals: Vec<Meal> = diet_picks
                    .iter()
                    .enumerate()
                    .map(|(i, pick)| meal(&format!("m{i}"), &[("Diet", &[DIETS[*pick]])]))
                    .collect();
                let manifest = manifest(vec![("a", meals)]);
                let ctx = ConstraintContext {
                    required_diets: keys(&["Vegan"]),
                    declined_meal_ids: declined.iter().map(|i| format!("m{i}")).collect(),
                    ..Default::default()
                };
                let pool = CandidatePoolFilter::new(&manifest).filter(&ctx, Some(limit));
                prop_assert!(pool.total_candidates >= pool.returned_count());
                prop_assert!(pool.returned_count() <= limit);
                for summary in &pool.summaries {
                    prop_assert!(!ctx.declined_meal_ids.contains(&summary.meal_id));
                }
            }
        }
    }
}
