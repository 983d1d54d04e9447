use crate::batcher::ArchetypeBatch;
use crate::collaborators::FeedbackSummary;
use crate::ledger::MealObserved;
use mealrec_scoring::{GenerativeScoringService, SelectionSource, StreamAccumulator};
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OutcomeStatus {
    /// The call finished and its final text parsed.
    Completed,
    /// The call finished but only the streamed ids were usable.
    Recovered,
    /// The call errored; selections are whatever streamed before the error.
    Failed { error: String },
    /// Still running at the deadline; selections are a snapshot.
    Pending,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArchetypeOutcome {
    pub archetype_id: String,
    /// Ranked by the scorer, best first.
    pub selections: Vec<String>,
    #[serde(flatten)]
    pub status: OutcomeStatus,
}

impl ArchetypeOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self.status, OutcomeStatus::Failed { .. })
    }

    pub fn is_pending(&self) -> bool {
        self.status == OutcomeStatus::Pending
    }
}

/// Runs one archetype batch through the scoring service, streaming into an accumulator.
#[derive(Clone)]
pub struct BatchScorer {
    service: Arc<dyn GenerativeScoringService>,
    max_tokens: u32,
}

impl BatchScorer {
    pub fn new(service: Arc<dyn GenerativeScoringService>, max_tokens: u32) -> Self {
        Self {
            service,
            max_tokens,
        }
    }

    /// Never fails: scoring errors degrade to whatever the stream produced.
    pub async fn score(
        &self,
        batch: &ArchetypeBatch,
        feedback: &FeedbackSummary,
        target_count: usize,
        on_meal: MealObserved,
    ) -> ArchetypeOutcome {
        let archetype_id = batch.archetype_id.clone();
        let request = match batch
            .prompt(target_count, &feedback.liked, &feedback.disliked)
            .to_request(self.max_tokens)
        {
            Ok(request) => request,
            Err(err) => {
                log::warn!("Failed to build prompt for archetype {archetype_id}: {err}");
                return ArchetypeOutcome {
                    archetype_id,
                    selections: Vec::new(),
                    status: OutcomeStatus::Failed {
                        error: err.to_string(),
                    },
                };
            }
        };

        let mut acc = StreamAccumulator::new().with_allowed(batch.meal_ids());
        let result = {
            let mut sink = |delta: &str| {
                for id in acc.feed(delta) {
                    on_meal(&archetype_id, &id);
                }
            };
            self.service.invoke(&request, Some(&mut sink)).await
        };

        let streamed = acc.emitted().len();
        let (final_ids, status) = match result {
            Ok(text) => {
                let settled = acc.finish(Some(&text));
                let status = match settled.source {
                    SelectionSource::FinalText => OutcomeStatus::Completed,
                    SelectionSource::StreamFallback => OutcomeStatus::Recovered,
                };
                (settled.ids, status)
            }
            Err(err) => {
                log::warn!(
                    "Scoring archetype {archetype_id} via {} failed after {streamed} streamed id(s): {err}",
                    self.service.name()
                );
                let settled = acc.finish(None);
                (
                    settled.ids,
                    OutcomeStatus::Failed {
                        error: err.to_string(),
                    },
                )
            }
        };

        // Ids that only appeared in the final text.
        for id in &acc.emitted()[streamed..] {
            on_meal(&archetype_id, id);
        }

        log::debug!(
            "Archetype {archetype_id} settled with {} selection(s) ({:?})",
            final_ids.len(),
            status
        );
        ArchetypeOutcome {
            archetype_id,
            selections: final_ids,
            status,
        }
    }
}
