//! Error taxonomy shared by the store, the tracker, the query engine and the
//! verification pipeline.
//!
//! Not-found is deliberately absent: single-item lookups return `Option`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExplorerError {
    /// Malformed request parameters, rejected before the store is touched.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Upstream data that contradicts what is already indexed. Fatal for the
    /// ingestion path and requires operator intervention.
    #[error("data consistency error: {0}")]
    DataConsistency(String),

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ExplorerError {
    pub fn invalid(message: impl Into<String>) -> Self {
        ExplorerError::InvalidRequest(message.into())
    }

    pub fn is_data_consistency(&self) -> bool {
        matches!(self, ExplorerError::DataConsistency(_))
    }
}

impl From<tokio::task::JoinError> for ExplorerError {
    fn from(err: tokio::task::JoinError) -> Self {
        ExplorerError::Internal(format!("blocking task failed: {err}"))
    }
}

pub type ExplorerResult<T> = Result<T, ExplorerError>;
