//! # Meal catalog
//!
//! Read-only data the recommendation pipeline filters against:
//!
//! - [`TagManifest`]: opaque tag id -> (category, canonical value)
//! - [`MealManifest`]: archetypes -> meals -> tag map + metadata
//! - [`HeatLevel`]: the fixed spice scale used for max-heat limits
//!
//! Both manifests are built once and shared read-only (`Arc`) across concurrent tasks.

mod error;
mod heat;
mod manifest;
mod prep;
mod tags;

pub use error::{CatalogError, Result};
pub use heat::HeatLevel;
pub use manifest::{Archetype, Meal, MealManifest, MealMetadata};
pub use prep::bucket_minutes;
pub use tags::{value_key, TagCategory, TagEntry, TagManifest};

pub use mealrec_protocol::{SkuSnapshot, TagMap};
