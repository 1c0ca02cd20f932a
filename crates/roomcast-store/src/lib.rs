//! # roomcast-store
//!
//! Persisted room content for Roomcast.
//!
//! Rooms carry an encrypted content blob that clients create, fetch, update
//! and delete over HTTP. This crate stores those blobs under an opaque
//! [`ContentId`] without ever interpreting them. Content storage and live
//! rooms are independent: deleting content does not close a room, and an
//! empty room does not delete its content.
//!
//! Two backends implement [`ContentStore`]:
//!
//! - **MemoryStore** - Concurrent in-process map
//! - **RocksStore** - RocksDB database on disk

pub mod content;
pub mod error;
pub mod id;
pub mod memory;
pub mod rocks;
pub mod traits;

pub use content::RoomContent;
pub use error::StoreError;
pub use id::ContentId;
pub use memory::MemoryStore;
pub use rocks::{RocksConfig, RocksStore};
pub use traits::ContentStore;
