use thiserror::Error;

use larder_db::PersistError;
use larder_store::StoreError;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Persist(#[from] PersistError),

    #[error("local storage unavailable: {0:#}")]
    Storage(#[from] anyhow::Error),

    #[error("snapshot request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("unknown list {0}")]
    UnknownList(String),

    #[error("invalid list id {0:?}")]
    InvalidListId(String),

    #[error("unknown item {0}")]
    UnknownItem(String),

    #[error("list {0} is closed")]
    Disposed(String),

    #[error("invalid {name}: {value:?}")]
    InvalidConfig { name: &'static str, value: String },

    #[error("session is shut down")]
    SessionClosed,
}

pub type Result<T> = std::result::Result<T, ClientError>;
