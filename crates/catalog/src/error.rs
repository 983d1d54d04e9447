use thiserror::Error;

pub type Result<T> = std::result::Result<T, CatalogError>;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Duplicate tag id: {0}")]
    DuplicateTag(String),

    #[error("Invalid tag {id}: {reason}")]
    InvalidTag { id: String, reason: String },

    #[error("{0}")]
    Other(String),
}
