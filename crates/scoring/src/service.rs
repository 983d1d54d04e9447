use crate::error::Result;
use async_trait::async_trait;

/// Receives incremental text while a scoring call is in flight.
pub type DeltaSink<'a> = &'a mut (dyn FnMut(&str) + Send);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoringRequest {
    pub system_prompt: String,
    pub user_prompt: String,
    pub max_tokens: u32,
}

/// External generative model used to select meals from one archetype's candidates.
///
/// `on_delta` is called zero or more times, in arrival order, before `invoke` resolves.
/// The returned string is the consolidated final text and is authoritative over the
/// deltas.
#[async_trait]
pub trait GenerativeScoringService: Send + Sync {
    async fn invoke(
        &self,
        request: &ScoringRequest,
        on_delta: Option<DeltaSink<'_>>,
    ) -> Result<String>;

    fn name(&self) -> &str {
        "scoring"
    }
}
