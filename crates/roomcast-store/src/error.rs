//! Store errors.

use crate::id::ContentId;
use thiserror::Error;

/// Content store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The record or its ID failed validation.
    #[error("Invalid content: {0}")]
    Invalid(&'static str),

    /// No content is stored under the ID.
    #[error("Content not found: {0}")]
    NotFound(ContentId),

    /// Content already exists under the ID.
    #[error("Content already exists: {0}")]
    AlreadyExists(ContentId),

    /// The database failed.
    #[error("Database error: {0}")]
    Database(String),

    /// A stored record could not be decoded or encoded.
    #[error("Corrupt record: {0}")]
    Corrupt(#[from] serde_json::Error),
}

impl From<rocksdb::Error> for StoreError {
    fn from(e: rocksdb::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

impl StoreError {
    /// Check if the error is a server-side storage fault rather than a
    /// problem with the request.
    #[must_use]
    pub fn is_server_fault(&self) -> bool {
        matches!(self, Self::Database(_) | Self::Corrupt(_))
    }
}
