use crate::ledger::StreamLedger;
use crate::scorer::{ArchetypeOutcome, OutcomeStatus};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::time::Duration;
use tokio::task::{Id, JoinError, JoinSet};
use tokio::time::Instant;

/// Per-archetype scoring tasks. Each task is tagged with its archetype so a task that
/// panics can still be attributed.
#[derive(Default)]
pub struct ScoringTasks {
    set: JoinSet<ArchetypeOutcome>,
    archetypes: HashMap<Id, String>,
}

impl ScoringTasks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn<F>(&mut self, archetype_id: impl Into<String>, task: F)
    where
        F: Future<Output = ArchetypeOutcome> + Send + 'static,
    {
        let handle = self.set.spawn(task);
        self.archetypes.insert(handle.id(), archetype_id.into());
    }

    pub fn len(&self) -> usize {
        self.set.len()
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }

    pub fn abort_all(&mut self) {
        self.set.abort_all();
    }

    /// Archetypes whose task has not been joined yet.
    pub fn running(&self) -> HashSet<&str> {
        self.archetypes.values().map(String::as_str).collect()
    }

    /// Next finished task with the archetype it was spawned for.
    pub async fn join_next(&mut self) -> Option<(String, Result<ArchetypeOutcome, JoinError>)> {
        let (id, result) = match self.set.join_next_with_id().await? {
            Ok((id, outcome)) => (id, Ok(outcome)),
            Err(err) => (err.id(), Err(err)),
        };
        let archetype_id = self.archetypes.remove(&id).unwrap_or_default();
        Some((archetype_id, result))
    }
}

pub struct GovernorOutcome {
    /// Real results for finished archetypes, then snapshots for unfinished ones.
    pub results: Vec<ArchetypeOutcome>,
    /// Tasks still running at the deadline. Never cancelled here.
    pub pending: ScoringTasks,
    pub pending_archetypes: Vec<String>,
    pub timed_out: bool,
}

fn aborted(archetype_id: &str, ledger: &StreamLedger, error: String) -> ArchetypeOutcome {
    ArchetypeOutcome {
        archetype_id: archetype_id.to_string(),
        selections: ledger.ids_for(archetype_id),
        status: OutcomeStatus::Failed { error },
    }
}

/// Waits on the whole task set at once until it drains or `deadline` passes.
///
/// `archetype_ids` lists every archetype that has a task in `tasks`, in the order the
/// caller wants results reported.
pub async fn await_with_deadline(
    mut tasks: ScoringTasks,
    archetype_ids: &[String],
    deadline: Option<Duration>,
    ledger: &StreamLedger,
) -> GovernorOutcome {
    let started = Instant::now();
    let deadline_at = deadline.map(|d| started + d);
    let mut results = Vec::with_capacity(archetype_ids.len());
    let mut settled: HashSet<String> = HashSet::new();
    let mut timed_out = false;

    while !tasks.is_empty() {
        let next = match deadline_at {
            Some(at) => match tokio::time::timeout_at(at, tasks.join_next()).await {
                Ok(next) => next,
                Err(_) => {
                    timed_out = true;
                    break;
                }
            },
            None => tasks.join_next().await,
        };
        match next {
            Some((_, Ok(outcome))) => {
                settled.insert(outcome.archetype_id.clone());
                results.push(outcome);
            }
            Some((archetype_id, Err(err))) => {
                log::warn!("Scoring task for archetype {archetype_id} ended abnormally: {err}");
                results.push(aborted(&archetype_id, ledger, format!("scoring task aborted: {err}")));
                settled.insert(archetype_id);
            }
            None => break,
        }
    }

    let running = tasks.running();
    let pending_archetypes: Vec<String> = archetype_ids
        .iter()
        .filter(|id| !settled.contains(*id) && running.contains(id.as_str()))
        .cloned()
        .collect();
    for archetype_id in &pending_archetypes {
        results.push(ArchetypeOutcome {
            archetype_id: archetype_id.clone(),
            selections: ledger.ids_for(archetype_id),
            status: OutcomeStatus::Pending,
        });
    }
    // Listed archetypes that never had a task.
    for archetype_id in archetype_ids
        .iter()
        .filter(|id| !settled.contains(*id) && !running.contains(id.as_str()))
    {
        results.push(aborted(archetype_id, ledger, "no scoring task".to_string()));
    }

    log::info!(
        "Deadline governor: {} settled, {} pending after {:?}{}",
        settled.len(),
        pending_archetypes.len(),
        started.elapsed(),
        if timed_out { " (deadline hit)" } else { "" }
    );

    GovernorOutcome {
        results,
        pending: tasks,
        pending_archetypes,
        timed_out,
    }
}
