use crate::error::Result;
use crate::heat::HeatLevel;
use crate::prep::bucket_minutes;
use crate::tags::TagCategory;
use mealrec_protocol::{SkuSnapshot, TagMap};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MealMetadata {
    #[serde(
        default,
        alias = "prepMinutes",
        alias = "prep_time_minutes",
        skip_serializing_if = "Option::is_none"
    )]
    pub prep_minutes: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub complexity: Option<String>,
    #[serde(default)]
    pub skus: Vec<SkuSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meal {
    #[serde(alias = "mealId", alias = "id")]
    pub meal_id: String,
    pub name: String,
    #[serde(default)]
    pub tags: TagMap,
    #[serde(default)]
    pub metadata: MealMetadata,
}

impl Meal {
    /// Values of every tag list whose category name resolves to `category`.
    pub fn values_in<'a>(&'a self, category: &'a TagCategory) -> impl Iterator<Item = &'a str> {
        self.tags
            .iter()
            .filter(move |(name, _)| &TagCategory::from_name(name) == category)
            .flat_map(|(_, values)| values.iter().map(String::as_str))
    }

    pub fn highest_heat(&self) -> Option<HeatLevel> {
        HeatLevel::highest(self.values_in(&TagCategory::HeatSpice))
    }

    /// Explicit minutes first, then the first recognised PrepTime bucket, else unknown.
    pub fn estimated_prep_minutes(&self) -> Option<u32> {
        self.metadata.prep_minutes.or_else(|| {
            self.values_in(&TagCategory::PrepTime)
                .find_map(bucket_minutes)
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Archetype {
    #[serde(alias = "id")]
    pub uid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub meals: Vec<Meal>,
}

#[derive(Debug, Deserialize)]
struct RawMealManifest {
    #[serde(alias = "manifestId")]
    manifest_id: String,
    #[serde(default, alias = "tagsVersion")]
    tags_version: String,
    #[serde(default)]
    archetypes: Vec<Archetype>,
}

/// Read-only catalog of archetypes -> meals -> tags.
#[derive(Debug, Clone, Default)]
pub struct MealManifest {
    manifest_id: String,
    tags_version: String,
    archetypes: Vec<Archetype>,
    index: HashMap<String, (usize, usize)>,
}

impl MealManifest {
    pub fn new(
        manifest_id: impl Into<String>,
        tags_version: impl Into<String>,
        archetypes: Vec<Archetype>,
    ) -> Self {
        let manifest_id = manifest_id.into();
        let mut index = HashMap::new();
        for (a_idx, archetype) in archetypes.iter().enumerate() {
            for (m_idx, meal) in archetype.meals.iter().enumerate() {
                if index.contains_key(&meal.meal_id) {
                    log::warn!(
                        "Manifest {}: duplicate meal id {} in archetype {}; keeping first",
                        manifest_id,
                        meal.meal_id,
                        archetype.uid
                    );
                    continue;
                }
                index.insert(meal.meal_id.clone(), (a_idx, m_idx));
            }
        }
        Self {
            manifest_id,
            tags_version: tags_version.into(),
            archetypes,
            index,
        }
    }

    pub fn from_json_str(raw: &str) -> Result<Self> {
        let raw: RawMealManifest = serde_json::from_str(raw)?;
        Ok(Self::new(raw.manifest_id, raw.tags_version, raw.archetypes))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let manifest = Self::from_json_str(&raw)?;
        log::debug!(
            "Loaded manifest {} ({} archetypes, {} meals) from {}",
            manifest.manifest_id,
            manifest.archetypes.len(),
            manifest.meal_count(),
            path.display()
        );
        Ok(manifest)
    }

    pub fn manifest_id(&self) -> &str {
        &self.manifest_id
    }

    pub fn tags_version(&self) -> &str {
        &self.tags_version
    }

    pub fn archetypes(&self) -> &[Archetype] {
        &self.archetypes
    }

    pub fn meal_count(&self) -> usize {
        self.index.len()
    }

    /// Looks a meal up by id, returning it with its archetype.
    pub fn find_meal(&self, meal_id: &str) -> Option<(&Archetype, &Meal)> {
        let &(a_idx, m_idx) = self.index.get(meal_id)?;
        let archetype = self.archetypes.get(a_idx)?;
        let meal = archetype.meals.get(m_idx)?;
        Some((archetype, meal))
    }

    /// Every meal in archetype order, then meal order as stored. Later copies of a
    /// duplicate meal id are skipped.
    pub fn iter_meals(&self) -> impl Iterator<Item = (&Archetype, &Meal)> {
        self.archetypes
            .iter()
            .enumerate()
            .flat_map(move |(a_idx, archetype)| {
                archetype
                    .meals
                    .iter()
                    .enumerate()
                    .filter(move |(m_idx, meal)| {
                        self.index.get(&meal.meal_id) == Some(&(a_idx, *m_idx))
                    })
                    .map(move |(_, meal)| (archetype, meal))
            })
    }
}
