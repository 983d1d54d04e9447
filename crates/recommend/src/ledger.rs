use crate::collaborators::StreamedIds;
use std::sync::{Arc, Mutex, MutexGuard};

/// Called once per newly observed `(archetype_id, meal_id)`.
pub type MealObserved = Arc<dyn Fn(&str, &str) + Send + Sync>;

/// Ids observed per archetype across every stream of one session.
///
/// Scoring tasks only append; readers get copies. Each archetype's list only grows.
#[derive(Clone, Default)]
pub struct StreamLedger {
    inner: Arc<Mutex<StreamedIds>>,
}

impl StreamLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, StreamedIds> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Returns `false` when the id was already recorded for this archetype.
    pub fn record(&self, archetype_id: &str, meal_id: &str) -> bool {
        let mut ids = self.lock();
        let list = ids.entry(archetype_id.to_string()).or_default();
        if list.iter().any(|id| id == meal_id) {
            return false;
        }
        list.push(meal_id.to_string());
        true
    }

    pub fn record_all(&self, archetype_id: &str, meal_ids: &[String]) {
        for id in meal_ids {
            self.record(archetype_id, id);
        }
    }

    pub fn ids_for(&self, archetype_id: &str) -> Vec<String> {
        self.lock().get(archetype_id).cloned().unwrap_or_default()
    }

    pub fn snapshot(&self) -> StreamedIds {
        self.lock().clone()
    }

    pub fn observer(&self) -> MealObserved {
        let ledger = self.clone();
        Arc::new(move |archetype_id, meal_id| {
            if ledger.record(archetype_id, meal_id) {
                log::debug!("Observed meal {meal_id} for archetype {archetype_id}");
            }
        })
    }
}
