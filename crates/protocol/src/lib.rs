use anyhow::Result;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub mod overrides;

pub use overrides::ConstraintOverrides;

/// Tag map as stored on a meal: category name -> canonical values.
pub type TagMap = BTreeMap<String, Vec<String>>;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Hard constraints left nothing to score.
    NoCandidates,
    /// Every archetype failed or returned zero selections.
    NoRecommendations,
    InvalidRequest,
    Internal,
}

#[derive(Debug, Serialize, Deserialize, Clone, JsonSchema)]
pub struct ErrorEnvelope {
    pub code: ErrorCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl ErrorEnvelope {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            hint: None,
        }
    }

    #[must_use]
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default, JsonSchema)]
pub struct SkuSnapshot {
    pub sku: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_cents: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

/// Client-facing projection of a candidate meal.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, JsonSchema)]
pub struct CandidateSummary {
    pub meal_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archetype_id: Option<String>,
    pub tags: TagMap,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heat_level: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prep_minutes: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub complexity: Option<String>,
    #[serde(default)]
    pub skus: Vec<SkuSnapshot>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, JsonSchema)]
pub struct FilterResponse {
    pub candidate_pool_id: String,
    pub total_candidates: usize,
    pub returned_count: usize,
    pub candidate_meals: Vec<CandidateSummary>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, JsonSchema)]
pub struct RecommendationRequest {
    /// Session to continue. A still-running background run for it is finalised first.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Number of meals wanted; falls back to the configured target.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overrides: Option<ConstraintOverrides>,
    #[serde(default)]
    pub declined_meal_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pool_limit: Option<usize>,
    /// Overrides the configured deadline; `0` waits for every archetype.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline_ms: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, JsonSchema)]
pub struct RecommendationMeal {
    pub meal_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archetype_id: Option<String>,
    pub tags: TagMap,
    pub rank: usize,
    #[serde(default)]
    pub skus: Vec<SkuSnapshot>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, JsonSchema)]
pub struct RecommendationResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Unix epoch milliseconds.
    pub generated_at: u64,
    pub manifest_id: String,
    pub tags_version: String,
    pub requested_count: usize,
    /// Set when fewer meals than requested came back or some archetypes did not finish.
    pub partial: bool,
    #[serde(default)]
    pub notes: Vec<String>,
    pub meals: Vec<RecommendationMeal>,
}

pub fn serialize_json<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(Into::into)
}

pub fn serialize_json_pretty<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value).map_err(Into::into)
}
