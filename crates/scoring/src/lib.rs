//! Generative scoring for one archetype at a time.
//!
//! The [`GenerativeScoringService`] trait is the boundary to the external model. Prompts
//! and replies cross it as the typed payloads in [`payload`]; replies are consumed while
//! they stream through a [`StreamAccumulator`].

pub mod error;
pub mod http;
pub mod local;
pub mod payload;
pub mod service;
pub mod stream;

pub use error::{Result, ScoringError};
pub use http::{HttpScoringConfig, HttpScoringService};
pub use local::LocalScoringService;
pub use payload::{
    close_truncated_json, parse_partial_selections, parse_selections, PromptCandidate,
    ScoringPrompt, SYSTEM_PROMPT,
};
pub use service::{DeltaSink, GenerativeScoringService, ScoringRequest};
pub use stream::{FinalSelections, SelectionSource, StreamAccumulator, StreamPhase, StreamSnapshot};
