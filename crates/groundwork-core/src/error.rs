//! Error taxonomy shared by every Groundwork component.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RagError {
    /// Embedding or chat call failed, timed out, or returned a malformed payload.
    #[error("provider error: {0}")]
    Provider(String),
    /// Persistent store used before `initialize()` succeeded, or after `close()`.
    #[error("vector store not initialized: {0}")]
    NotInitialized(String),
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("not found: {0}")]
    NotFound(String),
    /// A batch write was rolled back; nothing from the batch was committed.
    #[error("transaction rolled back: {0}")]
    Transaction(String),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("content provider error: {0}")]
    ContentProvider(String),
}

impl RagError {
    pub fn provider<E: std::fmt::Display>(err: E) -> Self {
        RagError::Provider(err.to_string())
    }

    pub fn storage<E: std::fmt::Display>(err: E) -> Self {
        RagError::Storage(err.to_string())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        RagError::Configuration(msg.into())
    }
}

pub type Result<T, E = RagError> = std::result::Result<T, E>;
