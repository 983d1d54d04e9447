//! File-backed collaborators for running the pipeline from the command line.

use async_trait::async_trait;
use mealrec_catalog::MealManifest;
use mealrec_filter::UserProfile;
use mealrec_recommend::{
    FeedbackStore, FeedbackSummary, ManifestProvider, PersistenceSink, ProfileStore,
    RecommendError, StreamedIds,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

type StoreResult<T> = std::result::Result<T, RecommendError>;

struct CachedManifest {
    modified: Option<SystemTime>,
    manifest: Arc<MealManifest>,
}

/// Serves the manifest from a JSON file, reloading it when the file's mtime changes.
pub struct FileManifestProvider {
    path: PathBuf,
    cache: Mutex<Option<CachedManifest>>,
}

impl FileManifestProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cache: Mutex::new(None),
        }
    }
}

#[async_trait]
impl ManifestProvider for FileManifestProvider {
    async fn manifest(&self) -> StoreResult<Arc<MealManifest>> {
        let modified = tokio::fs::metadata(&self.path)
            .await
            .and_then(|meta| meta.modified())
            .map_err(|err| {
                RecommendError::collaborator("manifest", format!("{}: {err}", self.path.display()))
            })?;

        let mut cache = self.cache.lock().await;
        if let Some(cached) = cache.as_ref() {
            if cached.modified == Some(modified) {
                return Ok(cached.manifest.clone());
            }
        }

        let raw = tokio::fs::read_to_string(&self.path).await.map_err(|err| {
            RecommendError::collaborator("manifest", format!("{}: {err}", self.path.display()))
        })?;
        let manifest = Arc::new(MealManifest::from_json_str(&raw)?);
        log::info!(
            "Loaded manifest {} ({} meals) from {}",
            manifest.manifest_id(),
            manifest.meal_count(),
            self.path.display()
        );
        *cache = Some(CachedManifest {
            modified: Some(modified),
            manifest: manifest.clone(),
        });
        Ok(manifest)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserRecord {
    #[serde(default)]
    pub profile: UserProfile,
    #[serde(default)]
    pub feedback: FeedbackSummary,
}

/// Profiles and feedback from one JSON object keyed by user id.
#[derive(Debug, Default)]
pub struct FileUserStore {
    users: HashMap<String, UserRecord>,
}

impl FileUserStore {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        use anyhow::Context as _;
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read users file {}", path.display()))?;
        let users: HashMap<String, UserRecord> = serde_json::from_str(&raw)
            .with_context(|| format!("Invalid users file {}", path.display()))?;
        Ok(Self { users })
    }

    pub fn with_user(mut self, user_id: impl Into<String>, record: UserRecord) -> Self {
        self.users.insert(user_id.into(), record);
        self
    }
}

#[async_trait]
impl ProfileStore for FileUserStore {
    async fn profile(&self, user_id: &str) -> StoreResult<UserProfile> {
        Ok(self
            .users
            .get(user_id)
            .map(|u| u.profile.clone())
            .unwrap_or_default())
    }
}

#[async_trait]
impl FeedbackStore for FileUserStore {
    async fn feedback_summary(&self, user_id: &str) -> StoreResult<FeedbackSummary> {
        Ok(self
            .users
            .get(user_id)
            .map(|u| u.feedback.clone())
            .unwrap_or_default())
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PersistedRecord {
    StreamedIds {
        session_id: String,
        streamed: StreamedIds,
    },
    LatestRecommendations {
        user_id: String,
        meal_ids: Vec<String>,
        manifest_id: String,
        generated_at: u64,
    },
}

/// Appends one JSON line per write.
pub struct JsonlPersistenceSink {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlPersistenceSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    async fn append(&self, record: &PersistedRecord) -> StoreResult<()> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');
        let _guard = self.write_lock.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|err| RecommendError::collaborator("persistence", err))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|err| RecommendError::collaborator("persistence", err))?;
        file.flush()
            .await
            .map_err(|err| RecommendError::collaborator("persistence", err))
    }
}

#[async_trait]
impl PersistenceSink for JsonlPersistenceSink {
    async fn persist_streamed_ids(&self, session_id: &str, snapshot: &StreamedIds) -> StoreResult<()> {
        self.append(&PersistedRecord::StreamedIds {
            session_id: session_id.to_string(),
            streamed: snapshot.clone(),
        })
        .await
    }

    async fn update_latest_recommendations(
        &self,
        user_id: &str,
        meal_ids: &[String],
        manifest_id: &str,
        generated_at: u64,
    ) -> StoreResult<()> {
        self.append(&PersistedRecord::LatestRecommendations {
            user_id: user_id.to_string(),
            meal_ids: meal_ids.to_vec(),
            manifest_id: manifest_id.to_string(),
            generated_at,
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::time::Duration;
    use tempfile::tempdir;

    fn manifest_json(id: &str) -> String {
        format!(
            r#"{{"manifest_id": "{id}", "tags_version": "v1", "archetypes": [
                {{"uid": "a", "meals": [{{"meal_id": "m1", "name": "One", "tags": {{}}}}]}}
            ]}}"#
        )
    }

    #[tokio::test]
    async fn manifest_reloads_when_file_changes() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("manifest.json");
        std::fs::write(&path, manifest_json("first")).expect("write");

        let provider = FileManifestProvider::new(&path);
        let first = provider.manifest().await.expect("load");
        assert_eq!(first.manifest_id(), "first");
        let again = provider.manifest().await.expect("cached");
        assert!(Arc::ptr_eq(&first, &again));

        std::fs::write(&path, manifest_json("second")).expect("rewrite");
        let file = std::fs::File::options().write(true).open(&path).expect("open");
        file.set_modified(SystemTime::now() + Duration::from_secs(5))
            .expect("touch");
        let reloaded = provider.manifest().await.expect("reload");
        assert_eq!(reloaded.manifest_id(), "second");
    }

    #[tokio::test]
    async fn missing_manifest_is_a_collaborator_error() {
        let provider = FileManifestProvider::new("/nonexistent/manifest.json");
        let err = provider.manifest().await.expect_err("missing");
        assert!(matches!(err, RecommendError::Collaborator { .. }));
    }

    #[tokio::test]
    async fn sink_appends_json_lines() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("out.jsonl");
        let sink = JsonlPersistenceSink::new(&path);

        let mut streamed = BTreeMap::new();
        streamed.insert("a".to_string(), vec!["m1".to_string()]);
        sink.persist_streamed_ids("s1", &streamed).await.expect("persist");
        sink.update_latest_recommendations("u1", &["m1".to_string()], "man", 42)
            .await
            .expect("latest");

        let raw = std::fs::read_to_string(&path).expect("read");
        let records: Vec<PersistedRecord> = raw
            .lines()
            .map(|line| serde_json::from_str(line).expect("record"))
            .collect();
        assert_eq!(
            records,
            vec![
                PersistedRecord::StreamedIds {
                    session_id: "s1".to_string(),
                    streamed,
                },
                PersistedRecord::LatestRecommendations {
                    user_id: "u1".to_string(),
                    meal_ids: vec!["m1".to_string()],
                    manifest_id: "man".to_string(),
                    generated_at: 42,
                },
            ]
        );
    }

    #[tokio::test]
    async fn unknown_users_get_defaults() {
        let store = FileUserStore::default().with_user(
            "u1",
            UserRecord {
                feedback: FeedbackSummary {
                    liked: vec!["m1".to_string()],
                    disliked: Vec::new(),
                },
                ..UserRecord::default()
            },
        );
        assert_eq!(store.feedback_summary("u1").await.expect("fb").liked, vec!["m1"]);
        assert_eq!(store.profile("nobody").await.expect("profile"), UserProfile::default());
    }
}
