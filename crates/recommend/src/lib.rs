//! Recommendation orchestration.
//!
//! A filtered candidate pool is split into one batch per archetype and every batch is
//! scored concurrently. The [`governor`] waits on all of them under one deadline; batches
//! still running when it passes contribute what they streamed so far and are handed,
//! uncancelled, to the [`BackgroundRunTracker`], which persists their final picks once.

pub mod background;
pub mod batcher;
pub mod collaborators;
pub mod config;
pub mod error;
pub mod governor;
pub mod guard;
pub mod ledger;
pub mod merge;
pub mod scorer;
pub mod service;

pub use background::{BackgroundRunReport, BackgroundRunTracker, PersistCallback};
pub use batcher::{batch_by_archetype, ArchetypeBatch, UNASSIGNED_ARCHETYPE};
pub use collaborators::{
    FeedbackStore, FeedbackSummary, LatestRecommendations, ManifestProvider,
    MemoryFeedbackStore, MemoryPersistenceSink, MemoryProfileStore, PersistenceSink,
    ProfileStore, StaticManifestProvider, StreamedIds,
};
pub use config::RecommendConfig;
pub use error::{RecommendError, Result};
pub use governor::{await_with_deadline, GovernorOutcome, ScoringTasks};
pub use guard::{fingerprint, DuplicateRunGuard, RunRecord, RunStatus, ScheduleDecision};
pub use ledger::{MealObserved, StreamLedger};
pub use merge::{balance, round_robin, MergedPick};
pub use scorer::{ArchetypeOutcome, BatchScorer, OutcomeStatus};
pub use service::{Collaborators, LearningRun, RecommendationService};
