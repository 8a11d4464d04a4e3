use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Refusing to publish invalid context: {0}")]
    InvalidContext(String),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SyncError>;
