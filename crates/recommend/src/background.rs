//! Ownership of scoring tasks that outlive the request that spawned them.

use crate::collaborators::StreamedIds;
use crate::governor::ScoringTasks;
use crate::ledger::StreamLedger;
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

pub type PersistFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Finaliser for a background run. Called exactly once with the final streamed ids.
pub type PersistCallback = Box<dyn FnOnce(StreamedIds) -> PersistFuture + Send>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackgroundRunReport {
    pub session_id: String,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: bool,
    pub streamed: StreamedIds,
}

struct RunEntry {
    generation: u64,
    cancel: oneshot::Sender<()>,
    monitor: JoinHandle<BackgroundRunReport>,
}

type Registry = Arc<Mutex<HashMap<String, RunEntry>>>;

fn lock(registry: &Registry) -> MutexGuard<'_, HashMap<String, RunEntry>> {
    registry
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Session-keyed registry of background runs.
///
/// Registration checks and inserts under one lock with no await in between, so two
/// concurrent registrations for the same session cannot both win.
#[derive(Clone, Default)]
pub struct BackgroundRunTracker {
    runs: Registry,
    generations: Arc<AtomicU64>,
}

impl BackgroundRunTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_registered(&self, session_id: &str) -> bool {
        lock(&self.runs).contains_key(session_id)
    }

    pub fn active_sessions(&self) -> Vec<String> {
        let mut sessions: Vec<String> = lock(&self.runs).keys().cloned().collect();
        sessions.sort();
        sessions
    }

    /// Hands `tasks` to a monitor that persists once they all end.
    ///
    /// Returns `false` without doing anything when `tasks` is empty. Returns `false` when
    /// the session already has a run; the surplus tasks are aborted since nothing would
    /// own them.
    pub fn register(
        &self,
        session_id: &str,
        ledger: StreamLedger,
        mut tasks: ScoringTasks,
        persist: PersistCallback,
    ) -> bool {
        if tasks.is_empty() {
            return false;
        }

        let mut runs = lock(&self.runs);
        if runs.contains_key(session_id) {
            drop(runs);
            log::warn!(
                "Session {session_id} already has a background run; aborting {} duplicate task(s)",
                tasks.len()
            );
            tasks.abort_all();
            return false;
        }

        let generation = self.generations.fetch_add(1, Ordering::Relaxed);
        let (cancel_tx, cancel_rx) = oneshot::channel();
        log::info!(
            "Session {session_id}: {} scoring task(s) continue in the background",
            tasks.len()
        );
        let monitor = tokio::spawn(monitor(
            session_id.to_string(),
            generation,
            tasks,
            ledger,
            persist,
            cancel_rx,
            self.runs.clone(),
        ));
        runs.insert(
            session_id.to_string(),
            RunEntry {
                generation,
                cancel: cancel_tx,
                monitor,
            },
        );
        true
    }

    /// Cancels the session's pending tasks and waits for its finaliser.
    pub async fn flush(&self, session_id: &str) -> Option<BackgroundRunReport> {
        let entry = lock(&self.runs).remove(session_id)?;
        log::info!("Flushing background run for session {session_id}");
        let _ = entry.cancel.send(());
        await_monitor(session_id, entry.monitor).await
    }

    /// Waits for every registered run to finish on its own.
    pub async fn drain(&self) -> Vec<BackgroundRunReport> {
        let entries: Vec<(String, RunEntry)> = lock(&self.runs).drain().collect();
        let mut reports = Vec::with_capacity(entries.len());
        for (session_id, entry) in entries {
            // Keep the sender alive so the monitor does not read its drop as a cancel.
            let RunEntry {
                cancel, monitor, ..
            } = entry;
            if let Some(report) = await_monitor(&session_id, monitor).await {
                reports.push(report);
            }
            drop(cancel);
        }
        reports
    }
}

async fn await_monitor(
    session_id: &str,
    monitor: JoinHandle<BackgroundRunReport>,
) -> Option<BackgroundRunReport> {
    match monitor.await {
        Ok(report) => Some(report),
        Err(err) => {
            log::warn!("Background monitor for session {session_id} ended abnormally: {err}");
            None
        }
    }
}

async fn monitor(
    session_id: String,
    generation: u64,
    mut tasks: ScoringTasks,
    ledger: StreamLedger,
    persist: PersistCallback,
    mut cancel: oneshot::Receiver<()>,
    registry: Registry,
) -> BackgroundRunReport {
    let mut completed = 0usize;
    let mut failed = 0usize;
    let mut cancelled = false;
    let mut listening = true;

    loop {
        tokio::select! {
            signal = &mut cancel, if listening => {
                listening = false;
                if signal.is_ok() {
                    cancelled = true;
                    tasks.abort_all();
                }
            }
            next = tasks.join_next() => match next {
                Some((_, Ok(outcome))) => {
                    ledger.record_all(&outcome.archetype_id, &outcome.selections);
                    if outcome.is_failed() {
                        failed += 1;
                    } else {
                        completed += 1;
                    }
                }
                Some((_, Err(err))) if err.is_cancelled() => {}
                Some((archetype_id, Err(err))) => {
                    failed += 1;
                    log::warn!(
                        "Background scoring task for session {session_id}, archetype {archetype_id}, panicked: {err}"
                    );
                }
                None => break,
            },
        }
    }

    let streamed = ledger.snapshot();
    if cancelled {
        log::warn!(
            "Background run for session {session_id} cancelled; persisting {} archetype(s) captured so far",
            streamed.len()
        );
    } else {
        log::info!(
            "Background run for session {session_id} finished: {completed} completed, {failed} failed"
        );
    }
    persist(streamed.clone()).await;

    {
        let mut runs = lock(&registry);
        if runs
            .get(&session_id)
            .is_some_and(|entry| entry.generation == generation)
        {
            runs.remove(&session_id);
        }
    }

    BackgroundRunReport {
        session_id,
        completed,
        failed,
        cancelled,
        streamed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scorer::{ArchetypeOutcome, OutcomeStatus};
    use pretty_assertions::assert_eq;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn outcome(id: &str, selections: &[&str], status: OutcomeStatus) -> ArchetypeOutcome {
        ArchetypeOutcome {
            archetype_id: id.to_string(),
            selections: selections.iter().map(|s| s.to_string()).collect(),
            status,
        }
    }

    fn counting_persist(
        calls: Arc<AtomicUsize>,
        seen: Arc<Mutex<Option<StreamedIds>>>,
    ) -> PersistCallback {
        Box::new(move |snapshot| {
            Box::pin(async move {
                calls.fetch_add(1, Ordering::SeqCst);
                *seen.lock().expect("lock") = Some(snapshot);
            })
        })
    }

    #[tokio::test]
    async fn empty_task_set_is_not_registered() {
        let tracker = BackgroundRunTracker::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let registered = tracker.register(
            "s",
            StreamLedger::new(),
            ScoringTasks::new(),
            counting_persist(calls.clone(), Arc::default()),
        );
        assert!(!registered);
        assert!(!tracker.is_registered("s"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn persists_once_after_failures_and_deregisters() {
        let tracker = BackgroundRunTracker::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::new(Mutex::new(None));

        let mut tasks = ScoringTasks::new();
        tasks.spawn("a", async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            outcome("a", &["a1", "a2"], OutcomeStatus::Completed)
        });
        tasks.spawn("b", async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            outcome(
                "b",
                &["b1"],
                OutcomeStatus::Failed {
                    error: "503".to_string(),
                },
            )
        });

        assert!(tracker.register(
            "s",
            StreamLedger::new(),
            tasks,
            counting_persist(calls.clone(), seen.clone())
        ));
        assert!(tracker.is_registered("s"));

        let mut second = ScoringTasks::new();
        second.spawn("c", async { outcome("c", &[], OutcomeStatus::Completed) });
        assert!(!tracker.register(
            "s",
            StreamLedger::new(),
            second,
            counting_persist(calls.clone(), seen.clone())
        ));

        let reports = tracker.drain().await;
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].completed, 1);
        assert_eq!(reports[0].failed, 1);
        assert!(!reports[0].cancelled);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let snapshot = seen.lock().expect("lock").clone().expect("persisted");
        assert_eq!(snapshot["a"], vec!["a1".to_string(), "a2".to_string()]);
        assert_eq!(snapshot["b"], vec!["b1".to_string()]);
        assert!(!tracker.is_registered("s"));
    }

    #[tokio::test(start_paused = true)]
    async fn flush_cancels_and_still_persists_once() {
        let tracker = BackgroundRunTracker::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::new(Mutex::new(None));
        let ledger = StreamLedger::new();
        ledger.record("slow", "early");

        let mut tasks = ScoringTasks::new();
        tasks.spawn("slow", async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            outcome("slow", &["never"], OutcomeStatus::Completed)
        });
        assert!(tracker.register("s", ledger, tasks, counting_persist(calls.clone(), seen.clone())));

        let report = tracker.flush("s").await.expect("report");
        assert!(report.cancelled);
        assert_eq!(report.completed, 0);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let snapshot = seen.lock().expect("lock").clone().expect("persisted");
        assert_eq!(snapshot["slow"], vec!["early".to_string()]);
        assert!(tracker.flush("s").await.is_none());
    }
}
