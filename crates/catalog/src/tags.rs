use crate::error::{CatalogError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;

/// Tag categories the constraint engine understands. Anything else is carried as `Other`
/// and never contributes a restriction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TagCategory {
    Audience,
    Diet,
    EthicsReligious,
    Allergens,
    HeatSpice,
    PrepTime,
    Other(String),
}

impl TagCategory {
    pub fn from_name(raw: &str) -> Self {
        match value_key(raw).replace('_', "").as_str() {
            "audience" => Self::Audience,
            "diet" | "diets" => Self::Diet,
            "ethicsreligious" | "ethics" | "religious" => Self::EthicsReligious,
            "allergens" | "allergen" => Self::Allergens,
            "heatspice" | "heat" | "spice" => Self::HeatSpice,
            "preptime" | "prep" => Self::PrepTime,
            _ => Self::Other(raw.trim().to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Audience => "Audience",
            Self::Diet => "Diet",
            Self::EthicsReligious => "EthicsReligious",
            Self::Allergens => "Allergens",
            Self::HeatSpice => "HeatSpice",
            Self::PrepTime => "PrepTime",
            Self::Other(name) => name,
        }
    }
}

impl From<String> for TagCategory {
    fn from(value: String) -> Self {
        Self::from_name(&value)
    }
}

impl From<TagCategory> for String {
    fn from(value: TagCategory) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for TagCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Comparison key for tag values: trimmed, lowercased, separators folded to `_`.
///
/// "Gluten-Free", "gluten free" and "GLUTEN_FREE" all map to `gluten_free`.
pub fn value_key(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut pending_sep = false;
    for ch in raw.trim().chars() {
        if ch.is_alphanumeric() || ch == '+' {
            if pending_sep && !out.is_empty() {
                out.push('_');
            }
            pending_sep = false;
            out.extend(ch.to_lowercase());
        } else {
            pending_sep = true;
        }
    }
    out
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagEntry {
    pub id: String,
    pub category: TagCategory,
    pub value: String,
    /// Diet/ethics tags flagged strict become hard requirements when selected.
    #[serde(default)]
    pub strict: bool,
}

#[derive(Debug, Deserialize)]
struct RawTagManifest {
    #[serde(default)]
    version: Option<String>,
    tags: Vec<TagEntry>,
}

/// Immutable lookup from opaque tag ids to their category and canonical value.
#[derive(Debug, Clone, Default)]
pub struct TagManifest {
    version: String,
    entries: HashMap<String, TagEntry>,
}

impl TagManifest {
    pub fn new(version: impl Into<String>, tags: Vec<TagEntry>) -> Result<Self> {
        let mut entries = HashMap::with_capacity(tags.len());
        for tag in tags {
            let id = tag.id.trim().to_string();
            if id.is_empty() {
                return Err(CatalogError::InvalidTag {
                    id: tag.id,
                    reason: "empty id".to_string(),
                });
            }
            if tag.value.trim().is_empty() {
                return Err(CatalogError::InvalidTag {
                    id,
                    reason: "empty value".to_string(),
                });
            }
            if entries.contains_key(&id) {
                return Err(CatalogError::DuplicateTag(id));
            }
            entries.insert(id, tag);
        }
        Ok(Self {
            version: version.into(),
            entries,
        })
    }

    pub fn from_json_str(raw: &str) -> Result<Self> {
        let raw: RawTagManifest = serde_json::from_str(raw)?;
        Self::new(raw.version.unwrap_or_default(), raw.tags)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let manifest = Self::from_json_str(&raw)?;
        log::debug!(
            "Loaded {} tags (version '{}') from {}",
            manifest.len(),
            manifest.version,
            path.display()
        );
        Ok(manifest)
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, tag_id: &str) -> Option<&TagEntry> {
        self.entries.get(tag_id.trim())
    }

    /// Resolves a tag id to `(category, canonical value)`; unknown ids resolve to `None`.
    pub fn resolve(&self, tag_id: &str) -> Option<(&TagCategory, &str)> {
        self.get(tag_id)
            .map(|entry| (&entry.category, entry.value.as_str()))
    }

    pub fn is_strict(&self, tag_id: &str) -> bool {
        self.get(tag_id).is_some_and(|entry| entry.strict)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn value_key_folds_case_and_separators() {
        assert_eq!(value_key("Gluten-Free"), "gluten_free");
        assert_eq!(value_key("  gluten free "), "gluten_free");
        assert_eq!(value_key("GLUTEN__FREE"), "gluten_free");
        assert_eq!(value_key("60+ min"), "60+_min");
    }

    #[test]
    fn category_names_are_tolerant() {
        assert_eq!(
            TagCategory::from_name("Ethics & Religious"),
            TagCategory::EthicsReligious
        );
        assert_eq!(TagCategory::from_name("heat_spice"), TagCategory::HeatSpice);
        assert_eq!(TagCategory::from_name("Prep Time"), TagCategory::PrepTime);
        assert_eq!(
            TagCategory::from_name("Cuisine"),
            TagCategory::Other("Cuisine".to_string())
        );
    }

    #[test]
    fn parses_manifest_and_resolves_ids() {
        let raw = r#"{
            "version": "v3",
            "tags": [
                {"id": "t1", "category": "Diet", "value": "Vegan", "strict": true},
                {"id": "t2", "category": "Diet", "value": "High Protein"}
            ]
        }"#;
        let manifest = TagManifest::from_json_str(raw).expect("manifest");
        assert_eq!(manifest.version(), "v3");
        assert_eq!(manifest.resolve("t1"), Some((&TagCategory::Diet, "Vegan")));
        assert!(manifest.is_strict("t1"));
        assert!(!manifest.is_strict("t2"));
        assert!(manifest.resolve("missing").is_none());
    }

    #[test]
    fn rejects_duplicate_ids() {
        let tags = vec![
            TagEntry {
                id: "t1".to_string(),
                category: TagCategory::Diet,
                value: "Vegan".to_string(),
                strict: true,
            },
            TagEntry {
                id: "t1".to_string(),
                category: TagCategory::Diet,
                value: "Vegetarian".to_string(),
                strict: true,
            },
        ];
        let err = TagManifest::new("v1", tags).expect_err("duplicate");
        assert!(matches!(err, CatalogError::DuplicateTag(id) if id == "t1"));
    }
}
