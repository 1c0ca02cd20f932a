//! Room content records.
//!
//! Content is end-to-end encrypted by clients; the server only ever sees an
//! initialization vector and ciphertext and never interprets either.

use crate::error::StoreError;
use serde::{Deserialize, Serialize};

/// Encrypted content of a room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomContent {
    /// Initialization vector used to encrypt `data`.
    pub iv: String,
    /// Ciphertext.
    pub data: String,
}

impl RoomContent {
    /// Create a content record.
    #[must_use]
    pub fn new(iv: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            iv: iv.into(),
            data: data.into(),
        }
    }

    /// Validate the record before it is stored.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Invalid`] if either field is empty.
    pub fn validate(&self) -> Result<(), StoreError> {
        if self.data.is_empty() {
            return Err(StoreError::Invalid("Content data cannot be empty"));
        }
        if self.iv.is_empty() {
            return Err(StoreError::Invalid("Content iv cannot be empty"));
        }
        Ok(())
    }
}
