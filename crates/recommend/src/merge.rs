use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::{HashSet, VecDeque};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedPick {
    pub archetype_id: String,
    pub meal_id: String,
    /// 1-based presentation order.
    pub rank: usize,
}

/// Interleaves per-archetype queues, one pick per archetype per round, in the given order.
///
/// A meal id that already appeared is skipped without costing its archetype the turn.
pub fn round_robin(queues: Vec<(String, Vec<String>)>, target: usize) -> Vec<MergedPick> {
    let mut queues: Vec<(String, VecDeque<String>)> = queues
        .into_iter()
        .map(|(id, picks)| (id, VecDeque::from(picks)))
        .collect();
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(target);

    while out.len() < target && queues.iter().any(|(_, q)| !q.is_empty()) {
        for (archetype_id, queue) in &mut queues {
            if out.len() >= target {
                break;
            }
            while let Some(meal_id) = queue.pop_front() {
                if seen.insert(meal_id.clone()) {
                    out.push(MergedPick {
                        archetype_id: archetype_id.clone(),
                        meal_id,
                        rank: out.len() + 1,
                    });
                    break;
                }
            }
        }
    }
    out
}

/// Shuffles archetype order, interleaves, then optionally shuffles the result and re-ranks.
pub fn balance<R>(
    mut queues: Vec<(String, Vec<String>)>,
    target: usize,
    shuffle_final: bool,
    rng: &mut R,
) -> Vec<MergedPick>
where
    R: Rng + ?Sized,
{
    queues.shuffle(rng);
    let mut picks = round_robin(queues, target);
    if shuffle_final {
        picks.shuffle(rng);
    }
    for (idx, pick) in picks.iter_mut().enumerate() {
        pick.rank = idx + 1;
    }
    picks
}
