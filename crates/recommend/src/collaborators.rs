//! Seams to the systems around the pipeline, plus in-memory versions of each.

use crate::error::Result;
use async_trait::async_trait;
use mealrec_catalog::MealManifest;
use mealrec_filter::UserProfile;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

/// Archetype id -> meal ids observed for it, in emission order.
pub type StreamedIds = BTreeMap<String, Vec<String>>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackSummary {
    #[serde(default)]
    pub liked: Vec<String>,
    #[serde(default)]
    pub disliked: Vec<String>,
}

#[async_trait]
pub trait ManifestProvider: Send + Sync {
    async fn manifest(&self) -> Result<Arc<MealManifest>>;
}

#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Users without a stored profile get the unrestricted default.
    async fn profile(&self, user_id: &str) -> Result<UserProfile>;
}

#[async_trait]
pub trait FeedbackStore: Send + Sync {
    async fn feedback_summary(&self, user_id: &str) -> Result<FeedbackSummary>;
}

#[async_trait]
pub trait PersistenceSink: Send + Sync {
    async fn persist_streamed_ids(&self, session_id: &str, snapshot: &StreamedIds) -> Result<()>;

    async fn update_latest_recommendations(
        &self,
        user_id: &str,
        meal_ids: &[String],
        manifest_id: &str,
        generated_at: u64,
    ) -> Result<()>;
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub struct StaticManifestProvider {
    manifest: Arc<MealManifest>,
}

impl StaticManifestProvider {
    pub fn new(manifest: MealManifest) -> Self {
        Self {
            manifest: Arc::new(manifest),
        }
    }
}

#[async_trait]
impl ManifestProvider for StaticManifestProvider {
    async fn manifest(&self) -> Result<Arc<MealManifest>> {
        Ok(self.manifest.clone())
    }
}

#[derive(Default)]
pub struct MemoryProfileStore {
    profiles: Mutex<HashMap<String, UserProfile>>,
}

impl MemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, user_id: impl Into<String>, profile: UserProfile) {
        lock(&self.profiles).insert(user_id.into(), profile);
    }
}

#[async_trait]
impl ProfileStore for MemoryProfileStore {
    async fn profile(&self, user_id: &str) -> Result<UserProfile> {
        Ok(lock(&self.profiles)
            .get(user_id)
            .cloned()
            .unwrap_or_default())
    }
}

#[derive(Default)]
pub struct MemoryFeedbackStore {
    summaries: Mutex<HashMap<String, FeedbackSummary>>,
}

impl MemoryFeedbackStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, user_id: impl Into<String>, summary: FeedbackSummary) {
        lock(&self.summaries).insert(user_id.into(), summary);
    }
}

#[async_trait]
impl FeedbackStore for MemoryFeedbackStore {
    async fn feedback_summary(&self, user_id: &str) -> Result<FeedbackSummary> {
        Ok(lock(&self.summaries)
            .get(user_id)
            .cloned()
            .unwrap_or_default())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LatestRecommendations {
    pub meal_ids: Vec<String>,
    pub manifest_id: String,
    pub generated_at: u64,
}

/// Records every write; handy for tests and for embedding without storage.
#[derive(Default)]
pub struct MemoryPersistenceSink {
    streamed: Mutex<Vec<(String, StreamedIds)>>,
    latest: Mutex<HashMap<String, LatestRecommendations>>,
}

impl MemoryPersistenceSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every `persist_streamed_ids` call, in order.
    pub fn streamed_writes(&self) -> Vec<(String, StreamedIds)> {
        lock(&self.streamed).clone()
    }

    pub fn latest(&self, user_id: &str) -> Option<LatestRecommendations> {
        lock(&self.latest).get(user_id).cloned()
    }
}

#[async_trait]
impl PersistenceSink for MemoryPersistenceSink {
    async fn persist_streamed_ids(&self, session_id: &str, snapshot: &StreamedIds) -> Result<()> {
        lock(&self.streamed).push((session_id.to_string(), snapshot.clone()));
        Ok(())
    }

    async fn update_latest_recommendations(
        &self,
        user_id: &str,
        meal_ids: &[String],
        manifest_id: &str,
        generated_at: u64,
    ) -> Result<()> {
        lock(&self.latest).insert(
            user_id.to_string(),
            LatestRecommendations {
                meal_ids: meal_ids.to_vec(),
                manifest_id: manifest_id.to_string(),
                generated_at,
            },
        );
        Ok(())
    }
}
