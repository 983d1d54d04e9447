use thiserror::Error;

pub type Result<T> = std::result::Result<T, ScoringError>;

/// Failure of a single scoring call. Callers recover per archetype; none of these are
/// surfaced to end users directly.
#[derive(Error, Debug)]
pub enum ScoringError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Remote error (status {status}): {message}")]
    Remote { status: u16, message: String },

    #[error("Scoring call timed out")]
    Timeout,

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Scoring call cancelled")]
    Cancelled,

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl From<reqwest::Error> for ScoringError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return ScoringError::Timeout;
        }
        if let Some(status) = err.status() {
            return ScoringError::Remote {
                status: status.as_u16(),
                message: err.to_string(),
            };
        }
        ScoringError::Transport(err.to_string())
    }
}
