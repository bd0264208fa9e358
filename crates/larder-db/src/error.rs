use thiserror::Error;

use larder_store::StoreError;

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("storage error: {0:#}")]
    Storage(#[from] anyhow::Error),

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("initial content rejected: {0}")]
    Seed(#[from] StoreError),

    #[error("storage task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, PersistError>;
