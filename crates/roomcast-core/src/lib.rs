//! # roomcast-core
//!
//! In-memory room registry and broadcast hub for the Roomcast server.
//!
//! This crate provides the fundamental building blocks:
//!
//! - **Registry** - Owns the live rooms, creates them on first join and drops them when empty
//! - **Room** - A set of peer queues with fan-out broadcast
//! - **PeerQueue** - Bounded per-peer delivery queue with a backpressure policy
//! - **Session** - The handle a connection uses to send, receive and leave
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐ join  ┌─────────────┐       ┌─────────────┐
//! │ Connection  │──────▶│  Registry   │──────▶│    Room     │
//! └─────────────┘       └─────────────┘       └─────────────┘
//!        │                                      │ broadcast
//!        ▼                                      ▼
//! ┌─────────────┐  receive              ┌─────────────┐
//! │  Session    │◀──────────────────────│  PeerQueue  │
//! └─────────────┘                       └─────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use roomcast_core::{Received, Registry, RoomId};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), roomcast_core::HubError> {
//! let registry = Arc::new(Registry::new());
//! let room = RoomId::new_v4();
//!
//! let alice = registry.join(room)?;
//! let bob = registry.join(room)?;
//!
//! alice.send("hello").await?;
//! if let Received::Message(message) = bob.receive().await {
//!     assert_eq!(&message.payload[..], b"hello");
//! }
//! # Ok(())
//! # }
//! ```

pub mod message;
pub mod queue;
pub mod registry;
pub mod room;
pub mod room_id;
pub mod session;

pub use message::Message;
pub use queue::{Backpressure, PeerQueue, PushError};
pub use registry::{HubConfig, HubError, Registry, RegistryStats};
pub use room::{BroadcastReport, PeerId, Room};
pub use room_id::RoomId;
pub use session::{Received, Session};
