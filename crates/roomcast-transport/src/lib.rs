//! # roomcast-transport
//!
//! Transport adapters for the Roomcast broadcast hub.
//!
//! A transport turns a client connection into a pair of halves:
//!
//! - **FrameSource** - Frames arriving from the client
//! - **FrameSink** - Frames going out to the client
//!
//! [`pump::run_session`] then connects those halves to a joined
//! [`Session`](roomcast_core::Session), so the server stays transport-agnostic.
//!
//! ```rust,ignore
//! use roomcast_transport::{pump, websocket};
//!
//! async fn on_upgrade(socket: axum::extract::ws::WebSocket, session: roomcast_core::Session) {
//!     let (sink, source) = websocket::split(socket);
//!     let summary = pump::run_session(session, sink, source).await;
//!     tracing::debug!(?summary, "Connection finished");
//! }
//! ```

pub mod pump;
pub mod traits;

#[cfg(feature = "websocket")]
pub mod websocket;

pub use pump::{run_session, CloseReason, PumpSummary};
pub use traits::{ConnectionId, FrameSink, FrameSource, TransportError};
