//! The two caller-facing operations, `filter` and `run_recommendation`, plus the learning
//! trigger that reuses the recommendation pass in the background.

use crate::background::{BackgroundRunTracker, PersistCallback};
use crate::batcher::{batch_by_archetype, ArchetypeBatch};
use crate::collaborators::{
    FeedbackStore, FeedbackSummary, ManifestProvider, PersistenceSink, ProfileStore,
};
use crate::config::RecommendConfig;
use crate::error::{RecommendError, Result};
use crate::governor::{await_with_deadline, ScoringTasks};
use crate::guard::{fingerprint, DuplicateRunGuard, ScheduleDecision};
use crate::ledger::StreamLedger;
use crate::merge::balance;
use crate::scorer::{ArchetypeOutcome, BatchScorer, OutcomeStatus};
use mealrec_catalog::{MealManifest, TagManifest};
use mealrec_filter::{
    CandidateMealDetail, CandidatePool, CandidatePoolFilter, ConstraintResolver, UserProfile,
};
use mealrec_protocol::{
    ConstraintOverrides, FilterResponse, RecommendationMeal, RecommendationRequest,
    RecommendationResponse,
};
use mealrec_scoring::GenerativeScoringService;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::task::JoinHandle;

/// Everything the pipeline talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub manifests: Arc<dyn ManifestProvider>,
    pub profiles: Arc<dyn ProfileStore>,
    pub feedback: Arc<dyn FeedbackStore>,
    pub scoring: Arc<dyn GenerativeScoringService>,
    pub sink: Arc<dyn PersistenceSink>,
}

/// A learning run handed to the runtime. `handle` is `None` when the guard skipped it.
pub struct LearningRun {
    pub decision: ScheduleDecision,
    pub handle: Option<JoinHandle<()>>,
}

pub struct RecommendationService {
    config: RecommendConfig,
    tags: Arc<TagManifest>,
    collaborators: Collaborators,
    tracker: BackgroundRunTracker,
    guard: DuplicateRunGuard,
    seed: Option<u64>,
}

impl RecommendationService {
    pub fn new(
        config: RecommendConfig,
        tags: Arc<TagManifest>,
        collaborators: Collaborators,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            tags,
            collaborators,
            tracker: BackgroundRunTracker::new(),
            guard: DuplicateRunGuard::new(),
            seed: None,
        })
    }

    /// Shares a tracker with other services, e.g. so one process drains them all.
    #[must_use]
    pub fn with_tracker(mut self, tracker: BackgroundRunTracker) -> Self {
        self.tracker = tracker;
        self
    }

    /// Fixes every shuffle; for reproducible runs and tests.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn config(&self) -> &RecommendConfig {
        &self.config
    }

    pub fn tracker(&self) -> &BackgroundRunTracker {
        &self.tracker
    }

    pub fn guard(&self) -> &DuplicateRunGuard {
        &self.guard
    }

    fn rng(&self) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        }
    }

    fn candidate_pool(
        &self,
        manifest: &MealManifest,
        profile: &UserProfile,
        overrides: Option<&ConstraintOverrides>,
        declined: &BTreeSet<String>,
        limit: Option<usize>,
    ) -> CandidatePool {
        let ctx = ConstraintResolver::new(&self.tags).resolve(profile, overrides, declined);
        CandidatePoolFilter::new(manifest)
            .with_limits(self.config.pool_limits())
            .with_max_skus(self.config.max_skus)
            .filter(&ctx, limit)
    }

    /// Filters the current manifest for an explicit profile.
    pub async fn filter(
        &self,
        profile: &UserProfile,
        overrides: Option<&ConstraintOverrides>,
        declined_meal_ids: &[String],
        limit: Option<usize>,
    ) -> Result<FilterResponse> {
        let manifest = self.collaborators.manifests.manifest().await?;
        let declined: BTreeSet<String> = declined_meal_ids.iter().cloned().collect();
        let pool = self.candidate_pool(&manifest, profile, overrides, &declined, limit);
        log::info!(
            "Filter: {} candidate(s), {} returned",
            pool.total_candidates,
            pool.returned_count()
        );
        Ok(pool.to_response())
    }

    /// Filters for a stored user profile.
    pub async fn filter_for_user(
        &self,
        user_id: &str,
        overrides: Option<&ConstraintOverrides>,
        declined_meal_ids: &[String],
        limit: Option<usize>,
    ) -> Result<FilterResponse> {
        let profile = self.collaborators.profiles.profile(user_id).await?;
        self.filter(&profile, overrides, declined_meal_ids, limit)
            .await
    }

    pub async fn run_recommendation(
        &self,
        user_id: &str,
        request: RecommendationRequest,
    ) -> Result<RecommendationResponse> {
        if let Some(session_id) = request.session_id.as_deref() {
            if let Some(report) = self.tracker.flush(session_id).await {
                log::info!(
                    "Superseded background run for session {session_id} ({} completed, {} failed)",
                    report.completed,
                    report.failed
                );
            }
        }

        let manifest = self.collaborators.manifests.manifest().await?;
        let profile = self.collaborators.profiles.profile(user_id).await?;
        let feedback = self.collaborators.feedback.feedback_summary(user_id).await?;

        let mut declined: BTreeSet<String> = request.declined_meal_ids.iter().cloned().collect();
        declined.extend(feedback.disliked.iter().cloned());

        let pool = self.candidate_pool(
            &manifest,
            &profile,
            request.overrides.as_ref(),
            &declined,
            request.pool_limit,
        );
        if pool.is_empty() {
            log::info!("No candidates for user {user_id}");
            return Err(RecommendError::NoCandidates);
        }

        let target = self.config.target_for(request.count);
        let deadline = self.config.deadline_for(request.deadline_ms);
        let mut rng = self.rng();
        let mut batches = batch_by_archetype(&pool.details, self.config.per_archetype_limit, &mut rng);
        batches.shuffle(&mut rng);
        let archetype_ids: Vec<String> = batches.iter().map(|b| b.archetype_id.clone()).collect();

        let session_id = request.session_id.clone().unwrap_or_else(new_session_id);
        log::info!(
            "Session {session_id}: scoring {} archetype(s) from {} candidate(s), target {target}, deadline {:?}",
            batches.len(),
            pool.total_candidates,
            deadline
        );

        let ledger = StreamLedger::new();
        let tasks = self.spawn_scoring(batches, &feedback, target, &ledger);
        let governed = await_with_deadline(tasks, &archetype_ids, deadline, &ledger).await;

        let pending = governed.pending_archetypes.len();
        let continued = pending > 0
            && self
                .continue_in_background(&session_id, &ledger, governed.pending)
                .await;

        let failed = governed.results.iter().filter(|o| o.is_failed()).count();
        let queues = queues_in_order(&governed.results, &archetype_ids);
        let picks = balance(queues, target, self.config.shuffle_final, &mut rng);

        let details: HashMap<&str, &CandidateMealDetail> = pool
            .details
            .iter()
            .map(|d| (d.meal.meal_id.as_str(), d))
            .collect();
        let meals: Vec<RecommendationMeal> = picks
            .into_iter()
            .filter_map(|pick| {
                let detail = details.get(pick.meal_id.as_str())?;
                Some(RecommendationMeal {
                    meal_id: pick.meal_id,
                    name: detail.meal.name.clone(),
                    archetype_id: detail.archetype_id.clone(),
                    tags: detail.meal.tags.clone(),
                    rank: pick.rank,
                    skus: detail
                        .meal
                        .metadata
                        .skus
                        .iter()
                        .take(self.config.max_skus)
                        .cloned()
                        .collect(),
                })
            })
            .collect();

        if meals.is_empty() {
            log::warn!(
                "Session {session_id}: no recommendations ({failed} failed, {pending} pending)"
            );
            return Err(RecommendError::NoRecommendations);
        }

        let mut notes = Vec::new();
        if continued {
            notes.push(format!(
                "{pending} archetype(s) are still being scored; their picks will be saved when they finish"
            ));
        } else if pending > 0 {
            notes.push(format!("{pending} archetype(s) did not finish before the deadline"));
        }
        if failed > 0 {
            notes.push(format!("{failed} archetype(s) could not be scored"));
        }
        if meals.len() < target {
            notes.push(format!("Returned {} of {target} requested meals", meals.len()));
        }

        let generated_at = unix_millis();
        let meal_ids: Vec<String> = meals.iter().map(|m| m.meal_id.clone()).collect();
        if let Err(err) = self
            .collaborators
            .sink
            .update_latest_recommendations(user_id, &meal_ids, manifest.manifest_id(), generated_at)
            .await
        {
            log::warn!("Failed to store latest recommendations for user {user_id}: {err}");
        }

        Ok(RecommendationResponse {
            session_id: Some(session_id),
            generated_at,
            manifest_id: manifest.manifest_id().to_string(),
            tags_version: manifest.tags_version().to_string(),
            requested_count: target,
            partial: pending > 0 || meals.len() < target,
            notes,
            meals,
        })
    }

    /// Hands unfinished tasks to the tracker, finalising any run this session already
    /// has first. Returns `false` when another request registered the session in between,
    /// in which case the tasks have been aborted and nothing will be persisted for them.
    async fn continue_in_background(
        &self,
        session_id: &str,
        ledger: &StreamLedger,
        tasks: ScoringTasks,
    ) -> bool {
        if let Some(report) = self.tracker.flush(session_id).await {
            log::info!(
                "Session {session_id}: finalised overlapping background run ({} completed)",
                report.completed
            );
        }
        let persist = persist_callback(self.collaborators.sink.clone(), session_id.to_string());
        self.tracker
            .register(session_id, ledger.clone(), tasks, persist)
    }

    fn spawn_scoring(
        &self,
        batches: Vec<ArchetypeBatch>,
        feedback: &FeedbackSummary,
        target: usize,
        ledger: &StreamLedger,
    ) -> ScoringTasks {
        let scorer = BatchScorer::new(self.collaborators.scoring.clone(), self.config.max_tokens);
        let feedback = Arc::new(feedback.clone());
        let mut tasks = ScoringTasks::new();
        for batch in batches {
            let scorer = scorer.clone();
            let feedback = feedback.clone();
            let observer = ledger.observer();
            let archetype_id = batch.archetype_id.clone();
            tasks.spawn(archetype_id, async move {
                scorer.score(&batch, &feedback, target, observer).await
            });
        }
        tasks
    }

    /// Runs a full recommendation pass in the background unless the guard skips it.
    pub fn schedule_learning_run(
        self: &Arc<Self>,
        user_id: &str,
        trigger: &str,
        event_context: &Value,
        usage_snapshot: &Value,
    ) -> LearningRun {
        let fp = fingerprint(event_context, usage_snapshot);
        let decision = self.guard.try_schedule(user_id, trigger, &fp);
        let Some(run_id) = decision.run_id().map(str::to_string) else {
            return LearningRun {
                decision,
                handle: None,
            };
        };

        log::info!("Learning run {run_id} scheduled for user {user_id} ({trigger})");
        let service = Arc::clone(self);
        let user_id = user_id.to_string();
        let handle = tokio::spawn(async move {
            let request = RecommendationRequest {
                deadline_ms: Some(0),
                ..RecommendationRequest::default()
            };
            match service.run_recommendation(&user_id, request).await {
                Ok(response) => {
                    log::info!(
                        "Learning run {run_id} stored {} meal(s) for user {user_id}",
                        response.meals.len()
                    );
                    service.guard.mark_completed(&run_id);
                }
                Err(err) => {
                    log::warn!("Learning run {run_id} for user {user_id} failed: {err}");
                    service.guard.mark_failed(&run_id);
                }
            }
        });
        LearningRun {
            decision,
            handle: Some(handle),
        }
    }
}

/// One queue per archetype in batch order; outcomes without a batch are dropped.
fn queues_in_order(
    results: &[ArchetypeOutcome],
    archetype_ids: &[String],
) -> Vec<(String, Vec<String>)> {
    let by_id: HashMap<&str, &ArchetypeOutcome> = results
        .iter()
        .map(|o| (o.archetype_id.as_str(), o))
        .collect();
    archetype_ids
        .iter()
        .filter_map(|id| {
            let outcome = by_id.get(id.as_str())?;
            if let OutcomeStatus::Failed { error } = &outcome.status {
                log::debug!("Archetype {id} contributes {} streamed pick(s) after failure: {error}", outcome.selections.len());
            }
            Some((id.clone(), outcome.selections.clone()))
        })
        .collect()
}

fn persist_callback(sink: Arc<dyn PersistenceSink>, session_id: String) -> PersistCallback {
    Box::new(move |snapshot| {
        Box::pin(async move {
            if let Err(err) = sink.persist_streamed_ids(&session_id, &snapshot).await {
                log::warn!("Failed to persist streamed ids for session {session_id}: {err}");
            }
        })
    })
}

fn new_session_id() -> String {
    format!("sess_{:016x}", rand::random::<u64>())
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}
