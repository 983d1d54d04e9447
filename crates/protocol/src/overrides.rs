use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Caller-supplied hard constraints layered on top of the stored profile.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default, JsonSchema)]
pub struct ConstraintOverrides {
    #[serde(default, alias = "diet")]
    pub diets: Vec<String>,
    #[serde(default, alias = "ethics_religious")]
    pub ethics: Vec<String>,
    #[serde(default, alias = "allergen_exclusions")]
    pub allergens: Vec<String>,
    #[serde(default, alias = "disallowed_heat")]
    pub heat_exclusions: Vec<String>,
    #[serde(default, alias = "maxPrepTimeMinutes")]
    pub max_prep_time_minutes: Option<u32>,
}

impl ConstraintOverrides {
    pub fn is_empty(&self) -> bool {
        self.diets.is_empty()
            && self.ethics.is_empty()
            && self.allergens.is_empty()
            && self.heat_exclusions.is_empty()
            && self.max_prep_time_minutes.is_none()
    }

    pub fn normalized_diets(&self) -> impl Iterator<Item = String> + '_ {
        normalized(&self.diets)
    }

    pub fn normalized_ethics(&self) -> impl Iterator<Item = String> + '_ {
        normalized(&self.ethics)
    }

    pub fn normalized_allergens(&self) -> impl Iterator<Item = String> + '_ {
        normalized(&self.allergens)
    }

    pub fn normalized_heat_exclusions(&self) -> impl Iterator<Item = String> + '_ {
        normalized(&self.heat_exclusions)
    }
}

fn normalized(values: &[String]) -> impl Iterator<Item = String> + '_ {
    values
        .iter()
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
