//! Error types shared by the ingestion pipeline and the analysis store.

use thiserror::Error;
use uuid::Uuid;

/// Errors returned by dataset and analysis operations
#[derive(Error, Debug)]
pub enum Error {
    /// Upload or analysis input was rejected; retrying the same input cannot help
    #[error("validation failed: {0}")]
    Validation(String),

    /// Referenced dataset or analysis does not exist
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },

    /// Requesting identity does not own the dataset
    #[error("access denied to dataset {dataset_id}")]
    Authorization { dataset_id: Uuid },

    /// Persistence layer failed outside of plain IO
    #[error("storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Malformed setting
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    pub fn dataset_not_found(id: Uuid) -> Self {
        Error::NotFound {
            kind: "dataset",
            id: id.to_string(),
        }
    }

    pub fn analysis_not_found(id: Uuid) -> Self {
        Error::NotFound {
            kind: "analysis",
            id: id.to_string(),
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Error::Validation(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }

    pub fn is_authorization(&self) -> bool {
        matches!(self, Error::Authorization { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
