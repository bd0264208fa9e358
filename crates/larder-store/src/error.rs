use thiserror::Error;

use crate::value::CellKind;

/// Writes rejected at the call site. Nothing that fails here is stamped,
/// published or transmitted.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unknown table \"{0}\"")]
    UnknownTable(String),

    #[error("unknown cell \"{cell}\" in table \"{table}\"")]
    UnknownCell { table: String, cell: String },

    #[error("unknown value \"{0}\"")]
    UnknownValue(String),

    #[error("\"{target}\" expects {expected}, received {received}")]
    TypeMismatch {
        target: String,
        expected: CellKind,
        received: CellKind,
    },

    #[error("\"{0}\" must be a finite number")]
    NonFinite(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;
