use mealrec_catalog::{value_key, HeatLevel, TagCategory, TagManifest};
use mealrec_protocol::ConstraintOverrides;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Stored tag selections for a user: category -> tag ids.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default, alias = "selectedTags")]
    pub selected_tags: BTreeMap<String, Vec<String>>,
    #[serde(default, alias = "dislikedTags")]
    pub disliked_tags: BTreeMap<String, Vec<String>>,
}

impl UserProfile {
    pub fn selected_ids(&self) -> impl Iterator<Item = &str> {
        self.selected_tags.values().flatten().map(String::as_str)
    }

    pub fn disliked_ids(&self) -> impl Iterator<Item = &str> {
        self.disliked_tags.values().flatten().map(String::as_str)
    }
}

/// Resolved hard constraints for one filter invocation. Values are stored as
/// [`value_key`]s so comparisons ignore case and separators.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConstraintContext {
    pub allowed_audience: BTreeSet<String>,
    pub required_diets: BTreeSet<String>,
    pub required_ethics: BTreeSet<String>,
    pub disallowed_allergens: BTreeSet<String>,
    pub disallowed_heat: BTreeSet<String>,
    pub max_heat: Option<HeatLevel>,
    pub max_prep_minutes: Option<u32>,
    pub declined_meal_ids: BTreeSet<String>,
}

impl ConstraintContext {
    pub fn max_heat_rank(&self) -> Option<u8> {
        self.max_heat.map(HeatLevel::rank)
    }

    pub fn is_unrestricted(&self) -> bool {
        self.allowed_audience.is_empty()
            && self.required_diets.is_empty()
            && self.required_ethics.is_empty()
            && self.disallowed_allergens.is_empty()
            && self.disallowed_heat.is_empty()
            && self.max_heat.is_none()
            && self.max_prep_minutes.is_none()
            && self.declined_meal_ids.is_empty()
    }
}

/// Turns profile tag ids plus caller overrides into a [`ConstraintContext`].
///
/// Unknown tag ids contribute nothing; resolution never fails.
pub struct ConstraintResolver<'a> {
    tags: &'a TagManifest,
}

impl<'a> ConstraintResolver<'a> {
    pub fn new(tags: &'a TagManifest) -> Self {
        Self { tags }
    }

    pub fn resolve<I, S>(
        &self,
        profile: &UserProfile,
        overrides: Option<&ConstraintOverrides>,
        declined_meal_ids: I,
    ) -> ConstraintContext
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut ctx = ConstraintContext::default();
        let mut unknown = 0usize;

        for tag_id in profile.selected_ids() {
            let Some((category, value)) = self.tags.resolve(tag_id) else {
                unknown += 1;
                continue;
            };
            match category {
                TagCategory::Audience => {
                    ctx.allowed_audience.insert(value_key(value));
                }
                TagCategory::Diet if self.tags.is_strict(tag_id) => {
                    ctx.required_diets.insert(value_key(value));
                }
                TagCategory::EthicsReligious if self.tags.is_strict(tag_id) => {
                    ctx.required_ethics.insert(value_key(value));
                }
                TagCategory::HeatSpice => {
                    // Most restrictive selection wins.
                    if let Some(level) = HeatLevel::parse(value) {
                        ctx.max_heat = Some(ctx.max_heat.map_or(level, |cur| cur.min(level)));
                    }
                }
                _ => {}
            }
        }

        for tag_id in profile.disliked_ids() {
            let Some((category, value)) = self.tags.resolve(tag_id) else {
                unknown += 1;
                continue;
            };
            match category {
                TagCategory::Allergens => {
                    ctx.disallowed_allergens.insert(value_key(value));
                }
                TagCategory::HeatSpice => {
                    ctx.disallowed_heat.insert(value_key(value));
                }
                _ => {}
            }
        }

        if let Some(overrides) = overrides {
            ctx.required_diets
                .extend(overrides.normalized_diets().map(|v| value_key(&v)));
            ctx.required_ethics
                .extend(overrides.normalized_ethics().map(|v| value_key(&v)));
            ctx.disallowed_allergens
                .extend(overrides.normalized_allergens().map(|v| value_key(&v)));
            ctx.disallowed_heat
                .extend(overrides.normalized_heat_exclusions().map(|v| value_key(&v)));
            ctx.max_prep_minutes = overrides.max_prep_time_minutes;
        }

        ctx.declined_meal_ids = declined_meal_ids
            .into_iter()
            .map(|id| id.as_ref().trim().to_string())
            .filter(|id| !id.is_empty())
            .collect();

        if unknown > 0 {
            log::debug!("Constraint resolution skipped {} unknown tag ids", unknown);
        }

        ctx
    }
}
