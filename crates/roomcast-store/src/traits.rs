//! Content store abstraction.
//!
//! The server is written against [`ContentStore`] so the backing storage can
//! be swapped without touching request handling.

use crate::content::RoomContent;
use crate::error::StoreError;
use crate::id::ContentId;
use async_trait::async_trait;

/// CRUD access to room content.
///
/// Implementations validate content on `create` and `update`, report
/// unknown IDs as [`StoreError::NotFound`], and never inspect the content
/// beyond validation.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Store new content under `id`.
    async fn create(&self, id: &ContentId, content: RoomContent) -> Result<(), StoreError>;

    /// Fetch the content stored under `id`.
    async fn get(&self, id: &ContentId) -> Result<RoomContent, StoreError>;

    /// Replace the content stored under `id`.
    async fn update(&self, id: &ContentId, content: RoomContent) -> Result<(), StoreError>;

    /// Remove the content stored under `id`.
    async fn delete(&self, id: &ContentId) -> Result<(), StoreError>;

    /// Get the backend name (e.g., "memory", "rocksdb").
    fn name(&self) -> &'static str;
}
