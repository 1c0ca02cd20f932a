//! Room identifiers.
//!
//! Rooms are addressed by a UUID supplied by the client when it connects.
//! The same identifier keys the persisted room content.

use crate::registry::HubError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Identifier of a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(Uuid);

impl RoomId {
    /// Generate a fresh random room ID.
    #[must_use]
    pub fn new_v4() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a room ID from its textual form.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::MissingRoomId`] for an empty string and
    /// [`HubError::InvalidRoomId`] if the string is not a UUID.
    pub fn parse(s: &str) -> Result<Self, HubError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(HubError::MissingRoomId);
        }
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|_| HubError::InvalidRoomId(s.to_string()))
    }

    /// Get the underlying UUID.
    #[must_use]
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl FromStr for RoomId {
    type Err = HubError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<Uuid> for RoomId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid() {
        let id = RoomId::parse("67e55044-10b1-426f-9247-bb680e5fe0c8").unwrap();
        assert_eq!(id.to_string(), "67e55044-10b1-426f-9247-bb680e5fe0c8");

        // Uppercase input is normalized
        let upper: RoomId = "67E55044-10B1-426F-9247-BB680E5FE0C8".parse().unwrap();
        assert_eq!(upper, id);
    }

    #[test]
    fn test_parse_rejects_missing_and_malformed() {
        assert!(matches!(RoomId::parse(""), Err(HubError::MissingRoomId)));
        assert!(matches!(RoomId::parse("   "), Err(HubError::MissingRoomId)));
        assert!(matches!(
            RoomId::parse("room-1"),
            Err(HubError::InvalidRoomId(_))
        ));
        assert!(matches!(
            RoomId::parse("67e55044-10b1-426f-9247"),
            Err(HubError::InvalidRoomId(_))
        ));
    }

    #[test]
    fn test_serde_as_string() {
        let id = RoomId::new_v4();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id));
        let back: RoomId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
