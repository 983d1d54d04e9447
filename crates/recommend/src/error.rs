use mealrec_catalog::CatalogError;
use mealrec_protocol::{ErrorCode, ErrorEnvelope};
use mealrec_scoring::ScoringError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, RecommendError>;

#[derive(Error, Debug)]
pub enum RecommendError {
    /// Hard constraints removed every meal.
    #[error("No meals match the current constraints")]
    NoCandidates,

    /// Every archetype failed or produced nothing.
    #[error("No recommendations available")]
    NoRecommendations,

    #[error("{collaborator} failed: {message}")]
    Collaborator {
        collaborator: &'static str,
        message: String,
    },

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Scoring error: {0}")]
    Scoring(#[from] ScoringError),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl RecommendError {
    pub fn collaborator(collaborator: &'static str, err: impl std::fmt::Display) -> Self {
        Self::Collaborator {
            collaborator,
            message: err.to_string(),
        }
    }

    /// Caller-facing form; internal details stay in the logs.
    pub fn to_envelope(&self) -> ErrorEnvelope {
        match self {
            Self::NoCandidates => ErrorEnvelope::new(ErrorCode::NoCandidates, self.to_string())
                .with_hint("Adjust your constraints: relax diet, allergen, heat or prep-time limits"),
            Self::NoRecommendations => {
                ErrorEnvelope::new(ErrorCode::NoRecommendations, self.to_string())
                    .with_hint("Try again shortly")
            }
            Self::InvalidConfig(_) => ErrorEnvelope::new(ErrorCode::InvalidRequest, self.to_string()),
            _ => ErrorEnvelope::new(ErrorCode::Internal, "Internal error"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelopes_carry_codes_and_hints() {
        let env = RecommendError::NoCandidates.to_envelope();
        assert_eq!(env.code, ErrorCode::NoCandidates);
        assert!(env.hint.is_some());

        let env = RecommendError::collaborator("profile store", "disk on fire").to_envelope();
        assert_eq!(env.code, ErrorCode::Internal);
        assert!(!env.message.contains("disk"));
    }
}
