//! Error types for taxon.

use thiserror::Error;
use uuid::Uuid;

/// Result type alias using taxon's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for taxon operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Non-database storage fault (in-memory store, injected failures)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Vocabulary not found
    #[error("Vocabulary not found: {0}")]
    VocabularyNotFound(Uuid),

    /// Vocabulary entry not found
    #[error("Entry not found: {0}")]
    EntryNotFound(Uuid),

    /// A move would make the entry its own ancestor
    #[error("Cycle detected: entry {0} would become its own ancestor")]
    CycleDetected(Uuid),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether this error is a transaction-level storage failure.
    ///
    /// Storage failures leave the session ledger intact so the save can be
    /// retried once the underlying issue clears.
    pub fn is_storage_failure(&self) -> bool {
        matches!(self, Error::Database(_) | Error::Storage(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
