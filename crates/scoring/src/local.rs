//! Deterministic offline scorer: no network, same streaming contract.

use crate::error::{Result, ScoringError};
use crate::payload::ScoringPrompt;
use crate::service::{DeltaSink, GenerativeScoringService, ScoringRequest};
use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;

/// Picks liked candidates first, then the rest in prompt order, skipping disliked ones,
/// and streams the answer in fixed-size fragments.
#[derive(Debug, Clone)]
pub struct LocalScoringService {
    chunk_size: usize,
    delay: Duration,
}

impl Default for LocalScoringService {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalScoringService {
    pub fn new() -> Self {
        Self {
            chunk_size: 16,
            delay: Duration::ZERO,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Pause between fragments, to mimic a remote model.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn select(prompt: &ScoringPrompt) -> Vec<String> {
        let disliked = |id: &str| prompt.disliked_meal_ids.iter().any(|d| d == id);
        let liked = |id: &str| prompt.liked_meal_ids.iter().any(|l| l == id);

        let (mut picks, rest): (Vec<&str>, Vec<&str>) = prompt
            .candidates
            .iter()
            .map(|c| c.meal_id.as_str())
            .filter(|id| !disliked(*id))
            .partition(|id| liked(*id));
        picks.extend(rest);
        picks
            .into_iter()
            .take(prompt.target_count)
            .map(str::to_string)
            .collect()
    }
}

fn fragments(text: &str, size: usize) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    while start < text.len() {
        let mut end = (start + size).min(text.len());
        while !text.is_char_boundary(end) {
            end += 1;
        }
        out.push(&text[start..end]);
        start = end;
    }
    out
}

#[async_trait]
impl GenerativeScoringService for LocalScoringService {
    async fn invoke(
        &self,
        request: &ScoringRequest,
        mut on_delta: Option<DeltaSink<'_>>,
    ) -> Result<String> {
        let prompt = ScoringPrompt::from_user_prompt(&request.user_prompt)
            .map_err(|err| ScoringError::Decode(err.to_string()))?;
        let selections: Vec<_> = Self::select(&prompt)
            .into_iter()
            .map(|id| json!({ "meal_id": id }))
            .collect();
        let text = serde_json::to_string(&json!({ "selections": selections }))?;

        for fragment in fragments(&text, self.chunk_size) {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if let Some(sink) = on_delta.as_mut() {
                sink(fragment);
            }
        }
        Ok(text)
    }

    fn name(&self) -> &str {
        "local"
    }
}
