//! Individual hard-constraint checks. Each one is a pure function over a meal and the
//! resolved [`ConstraintContext`] so it can be exercised on its own.

use crate::constraints::ConstraintContext;
use mealrec_catalog::{value_key, Meal, TagCategory};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RejectReason {
    Declined,
    Audience,
    Diet,
    Ethics,
    Allergen,
    Heat,
    PrepTime,
}

impl RejectReason {
    pub const fn as_str(self) -> &'static str {
        match self {
            RejectReason::Declined => "declined",
            RejectReason::Audience => "audience",
            RejectReason::Diet => "diet",
            RejectReason::Ethics => "ethics",
            RejectReason::Allergen => "allergen",
            RejectReason::Heat => "heat",
            RejectReason::PrepTime => "prep_time",
        }
    }
}

fn keys(meal: &Meal, category: &TagCategory) -> BTreeSet<String> {
    meal.values_in(category).map(value_key).collect()
}

pub fn not_declined(meal: &Meal, ctx: &ConstraintContext) -> bool {
    !ctx.declined_meal_ids.contains(&meal.meal_id)
}

/// Empty audience set is permissive.
pub fn audience_allowed(meal: &Meal, ctx: &ConstraintContext) -> bool {
    if ctx.allowed_audience.is_empty() {
        return true;
    }
    let audience = keys(meal, &TagCategory::Audience);
    !audience.is_disjoint(&ctx.allowed_audience)
}

pub fn diets_satisfied(meal: &Meal, ctx: &ConstraintContext) -> bool {
    ctx.required_diets.is_empty() || keys(meal, &TagCategory::Diet).is_superset(&ctx.required_diets)
}

pub fn ethics_satisfied(meal: &Meal, ctx: &ConstraintContext) -> bool {
    ctx.required_ethics.is_empty()
        || keys(meal, &TagCategory::EthicsReligious).is_superset(&ctx.required_ethics)
}

pub fn allergens_clear(meal: &Meal, ctx: &ConstraintContext) -> bool {
    ctx.disallowed_allergens.is_empty()
        || keys(meal, &TagCategory::Allergens).is_disjoint(&ctx.disallowed_allergens)
}

/// Excluded heat values must be absent, and the meal's highest recognised heat tag must
/// not exceed the limit. A meal with no recognised heat tag passes the limit check.
pub fn heat_within_limits(meal: &Meal, ctx: &ConstraintContext) -> bool {
    if !ctx.disallowed_heat.is_empty()
        && !keys(meal, &TagCategory::HeatSpice).is_disjoint(&ctx.disallowed_heat)
    {
        return false;
    }
    let Some(limit) = ctx.max_heat else {
        return true;
    };
    match meal.highest_heat() {
        Some(level) => level.rank() <= limit.rank(),
        None => true,
    }
}

/// Unknown prep time passes.
pub fn prep_within_limit(meal: &Meal, ctx: &ConstraintContext) -> bool {
    let Some(limit) = ctx.max_prep_minutes else {
        return true;
    };
    meal.estimated_prep_minutes()
        .map_or(true, |minutes| minutes <= limit)
}

/// Runs every predicate in order, stopping at the first failure.
pub fn first_rejection(meal: &Meal, ctx: &ConstraintContext) -> Option<RejectReason> {
    let checks: [(fn(&Meal, &ConstraintContext) -> bool, RejectReason); 7] = [
        (not_declined, RejectReason::Declined),
        (audience_allowed, RejectReason::Audience),
        (diets_satisfied, RejectReason::Diet),
        (ethics_satisfied, RejectReason::Ethics),
        (allergens_clear, RejectReason::Allergen),
        (heat_within_limits, RejectReason::Heat),
        (prep_within_limit, RejectReason::PrepTime),
    ];
    checks
        .iter()
        .find(|(check, _)| !check(meal, ctx))
        .map(|(_, reason)| *reason)
}

pub fn matches(meal: &Meal, ctx: &ConstraintContext) -> bool {
    first_rejection(meal, ctx).is_none()
}

/// Heat label for summaries: the highest recognised level on the meal.
pub fn heat_label(meal: &Meal) -> Option<String> {
    meal.highest_heat().map(|level| level.as_str().to_string())
}
