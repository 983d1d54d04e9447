use mealrec_filter::CandidateMealDetail;
use mealrec_scoring::{PromptCandidate, ScoringPrompt};
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::HashMap;

/// Bucket for meals whose archetype is unknown.
pub const UNASSIGNED_ARCHETYPE: &str = "_unassigned";

/// One concurrent unit of scoring work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchetypeBatch {
    pub archetype_id: String,
    pub details: Vec<CandidateMealDetail>,
}

impl ArchetypeBatch {
    pub fn meal_ids(&self) -> impl Iterator<Item = &str> {
        self.details.iter().map(|d| d.meal.meal_id.as_str())
    }

    pub fn len(&self) -> usize {
        self.details.len()
    }

    pub fn is_empty(&self) -> bool {
        self.details.is_empty()
    }

    /// Only id, name and tags of each candidate leave the process.
    pub fn prompt(
        &self,
        target_count: usize,
        liked_meal_ids: &[String],
        disliked_meal_ids: &[String],
    ) -> ScoringPrompt {
        ScoringPrompt {
            archetype_id: self.archetype_id.clone(),
            target_count: target_count.min(self.details.len()),
            liked_meal_ids: liked_meal_ids.to_vec(),
            disliked_meal_ids: disliked_meal_ids.to_vec(),
            candidates: self
                .details
                .iter()
                .map(|d| PromptCandidate {
                    meal_id: d.meal.meal_id.clone(),
                    name: d.meal.name.clone(),
                    tags: d.meal.tags.clone(),
                })
                .collect(),
        }
    }
}

/// Groups by archetype in first-seen order, shuffles each group and caps it.
pub fn batch_by_archetype<R>(
    details: &[CandidateMealDetail],
    per_archetype_limit: usize,
    rng: &mut R,
) -> Vec<ArchetypeBatch>
where
    R: Rng + ?Sized,
{
    let mut batches: Vec<ArchetypeBatch> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for detail in details {
        let key = detail
            .archetype_id
            .clone()
            .unwrap_or_else(|| UNASSIGNED_ARCHETYPE.to_string());
        let slot = *index.entry(key.clone()).or_insert_with(|| {
            batches.push(ArchetypeBatch {
                archetype_id: key,
                details: Vec::new(),
            });
            batches.len() - 1
        });
        batches[slot].details.push(detail.clone());
    }

    for batch in &mut batches {
        batch.details.shuffle(rng);
        batch.details.truncate(per_archetype_limit);
    }
    batches.retain(|b| !b.is_empty());
    batches
}
