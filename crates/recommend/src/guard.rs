use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunRecord {
    pub run_id: String,
    pub user_id: String,
    pub trigger: String,
    pub fingerprint: String,
    pub status: RunStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum ScheduleDecision {
    Scheduled { run_id: String },
    /// The user already has a run in flight.
    SkippedPending { pending_run_id: String },
    /// Nothing changed since the last completed run for this trigger.
    SkippedUnchanged { previous_run_id: String },
}

impl ScheduleDecision {
    pub fn run_id(&self) -> Option<&str> {
        match self {
            Self::Scheduled { run_id } => Some(run_id),
            _ => None,
        }
    }
}

/// SHA-256 over the canonical JSON of `(event_context, usage_snapshot)`.
///
/// Object keys serialise sorted, so key order in the inputs does not matter.
pub fn fingerprint(event_context: &Value, usage_snapshot: &Value) -> String {
    let canonical = Value::Array(vec![event_context.clone(), usage_snapshot.clone()]).to_string();
    let digest = Sha256::digest(canonical.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

#[derive(Default)]
struct GuardState {
    runs: HashMap<String, RunRecord>,
    pending_by_user: HashMap<String, String>,
    last_completed: HashMap<(String, String), String>,
    next_id: u64,
}

/// Advisory gate in front of scoring passes; skips are logged, never errors.
#[derive(Clone, Default)]
pub struct DuplicateRunGuard {
    state: Arc<Mutex<GuardState>>,
}

impl DuplicateRunGuard {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, GuardState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Checks and, when allowed, records a pending run in one step.
    pub fn try_schedule(&self, user_id: &str, trigger: &str, fingerprint: &str) -> ScheduleDecision {
        let mut state = self.lock();

        if let Some(pending) = state.pending_by_user.get(user_id) {
            log::info!("Skipping {trigger} run for user {user_id}: run {pending} still pending");
            return ScheduleDecision::SkippedPending {
                pending_run_id: pending.clone(),
            };
        }

        let key = (user_id.to_string(), trigger.to_string());
        if let Some(previous) = state.last_completed.get(&key) {
            if state
                .runs
                .get(previous)
                .is_some_and(|run| run.fingerprint == fingerprint)
            {
                log::info!(
                    "Skipping {trigger} run for user {user_id}: inputs unchanged since run {previous}"
                );
                return ScheduleDecision::SkippedUnchanged {
                    previous_run_id: previous.clone(),
                };
            }
        }

        state.next_id += 1;
        let run_id = format!("run_{}", state.next_id);
        state.runs.insert(
            run_id.clone(),
            RunRecord {
                run_id: run_id.clone(),
                user_id: user_id.to_string(),
                trigger: trigger.to_string(),
                fingerprint: fingerprint.to_string(),
                status: RunStatus::Pending,
            },
        );
        state
            .pending_by_user
            .insert(user_id.to_string(), run_id.clone());
        ScheduleDecision::Scheduled { run_id }
    }

    pub fn mark_completed(&self, run_id: &str) {
        self.finish(run_id, RunStatus::Completed);
    }

    /// Failed runs never count as "unchanged", so the next trigger retries.
    pub fn mark_failed(&self, run_id: &str) {
        self.finish(run_id, RunStatus::Failed);
    }

    fn finish(&self, run_id: &str, status: RunStatus) {
        let mut state = self.lock();
        let Some(run) = state.runs.get_mut(run_id) else {
            log::warn!("Unknown run {run_id} marked {status:?}");
            return;
        };
        run.status = status;
        let user_id = run.user_id.clone();
        let key = (run.user_id.clone(), run.trigger.clone());

        if state.pending_by_user.get(&user_id).map(String::as_str) == Some(run_id) {
            state.pending_by_user.remove(&user_id);
        }
        if status == RunStatus::Completed {
            state.last_completed.insert(key, run_id.to_string());
        }
    }

    pub fn run(&self, run_id: &str) -> Option<RunRecord> {
        self.lock().runs.get(run_id).cloned()
    }

    pub fn pending_for(&self, user_id: &str) -> Option<String> {
        self.lock().pending_by_user.get(user_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn fingerprint_ignores_key_order() {
        let a = fingerprint(&json!({"x": 1, "y": [1, 2]}), &json!({"meals": 3}));
        let b = fingerprint(&json!({"y": [1, 2], "x": 1}), &json!({"meals": 3}));
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert_ne!(a, fingerprint(&json!({"x": 2, "y": [1, 2]}), &json!({"meals": 3})));
    }

    #[test]
    fn second_identical_run_while_pending_is_skipped() {
        let guard = DuplicateRunGuard::new();
        let fp = fingerprint(&json!({"event": "order"}), &json!({}));
        let first = guard.try_schedule("u1", "order_placed", &fp);
        let second = guard.try_schedule("u1", "order_placed", &fp);
        assert!(matches!(first, ScheduleDecision::Scheduled { .. }));
        assert_eq!(
            second,
            ScheduleDecision::SkippedPending {
                pending_run_id: first.run_id().expect("id").to_string()
            }
        );
    }

    #[test]
    fn unchanged_inputs_after_completion_are_skipped() {
        let guard = DuplicateRunGuard::new();
        let fp = fingerprint(&json!({"event": "order"}), &json!({"n": 1}));
        let first = guard.try_schedule("u1", "order_placed", &fp);
        let run_id = first.run_id().expect("id").to_string();
        guard.mark_completed(&run_id);

        assert_eq!(
            guard.try_schedule("u1", "order_placed", &fp),
            ScheduleDecision::SkippedUnchanged {
                previous_run_id: run_id
            }
        );
        // Another trigger or changed inputs go through.
        let other = guard.try_schedule("u1", "profile_updated", &fp);
        assert!(other.run_id().is_some());
    }

    #[test]
    fn failed_runs_allow_retry() {
        let guard = DuplicateRunGuard::new();
        let fp = fingerprint(&json!({}), &json!({}));
        let first = guard.try_schedule("u1", "t", &fp);
        guard.mark_failed(first.run_id().expect("id"));
        assert!(guard.pending_for("u1").is_none());
        assert!(guard.try_schedule("u1", "t", &fp).run_id().is_some());
    }
}
