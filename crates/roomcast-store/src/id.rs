//! Content identifiers.

use crate::error::StoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Key under which room content is stored.
///
/// Any non-empty string is accepted and never interpreted; clients usually
/// reuse the room's UUID, but the store does not require it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentId(String);

impl ContentId {
    /// Validate a content ID.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Invalid`] if `id` is empty.
    pub fn parse(id: impl Into<String>) -> Result<Self, StoreError> {
        let id = id.into();
        if id.is_empty() {
            return Err(StoreError::Invalid("Content id cannot be empty"));
        }
        Ok(Self(id))
    }

    /// Get the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Get the ID as raw key bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ContentId {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ContentId {
    type Error = StoreError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(s)
    }
}

impl From<ContentId> for String {
    fn from(id: ContentId) -> Self {
        id.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_any_non_empty_id() {
        assert_eq!(ContentId::parse("room-1").unwrap().as_str(), "room-1");
        assert_eq!(
            "0b7f3c1e-8a7d-4c52-9d1e-2f6a8b9c0d1e".parse::<ContentId>().unwrap().to_string(),
            "0b7f3c1e-8a7d-4c52-9d1e-2f6a8b9c0d1e"
        );
    }

    #[test]
    fn test_empty_id_is_invalid() {
        assert!(matches!(ContentId::parse(""), Err(StoreError::Invalid(_))));
        assert!(serde_json::from_str::<ContentId>(r#""""#).is_err());
    }
}
