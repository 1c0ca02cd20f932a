//! In-memory content store.

use crate::content::RoomContent;
use crate::error::StoreError;
use crate::id::ContentId;
use crate::traits::ContentStore;
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::debug;

/// Content store backed by a concurrent map. Contents are lost on restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: DashMap<ContentId, RoomContent>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl ContentStore for MemoryStore {
    async fn create(&self, id: &ContentId, content: RoomContent) -> Result<(), StoreError> {
        content.validate()?;
        match self.records.entry(id.clone()) {
            Entry::Occupied(_) => Err(StoreError::AlreadyExists(id.clone())),
            Entry::Vacant(entry) => {
                entry.insert(content);
                debug!(content = %id, "Content created");
                Ok(())
            }
        }
    }

    async fn get(&self, id: &ContentId) -> Result<RoomContent, StoreError> {
        self.records
            .get(id)
            .map(|c| c.clone())
            .ok_or_else(|| StoreError::NotFound(id.clone()))
    }

    async fn update(&self, id: &ContentId, content: RoomContent) -> Result<(), StoreError> {
        content.validate()?;
        let mut existing = self
            .records
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        *existing = content;
        debug!(content = %id, "Content updated");
        Ok(())
    }

    async fn delete(&self, id: &ContentId) -> Result<(), StoreError> {
        if self.records.remove(id).is_none() {
            return Err(StoreError::NotFound(id.clone()));
        }
        debug!(content = %id, "Content deleted");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> ContentId {
        ContentId::parse(s).unwrap()
    }

    #[tokio::test]
    async fn test_content_lifecycle() {
        let store = MemoryStore::new();
        let id = id("room-1");

        store.create(&id, RoomContent::new("abc", "xyz")).await.unwrap();
        assert_eq!(store.get(&id).await.unwrap(), RoomContent::new("abc", "xyz"));

        assert!(matches!(
            store.update(&id, RoomContent::new("abc", "")).await,
            Err(StoreError::Invalid(_))
        ));
        assert_eq!(store.get(&id).await.unwrap().data, "xyz");

        store.update(&id, RoomContent::new("def", "uvw")).await.unwrap();
        assert_eq!(store.get(&id).await.unwrap().data, "uvw");

        store.delete(&id).await.unwrap();
        assert!(matches!(store.delete(&id).await, Err(StoreError::NotFound(_))));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_id() {
        let store = MemoryStore::new();
        let id = id("missing");

        assert!(matches!(store.get(&id).await, Err(StoreError::NotFound(_))));
        assert!(matches!(
            store.update(&id, RoomContent::new("a", "b")).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_create_twice() {
        let store = MemoryStore::new();
        let id = id("room-1");

        store.create(&id, RoomContent::new("a", "b")).await.unwrap();
        let err = store.create(&id, RoomContent::new("c", "d")).await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(_)));
        assert!(!err.is_server_fault());
        assert_eq!(store.get(&id).await.unwrap().data, "b");
    }
}
