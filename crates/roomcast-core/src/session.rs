//! Sessions: the handle a connection holds while it is in a room.
//!
//! A session is `Joined` from the moment [`Registry::join`] returns it until
//! the first call to [`Session::leave`] (or until it is dropped), after which
//! it is `Left` for good. Leaving is idempotent, so a disconnect racing a
//! registry shutdown or a slow-peer eviction is harmless.

use crate::message::Message;
use crate::queue::PeerQueue;
use crate::registry::{HubError, Registry};
use crate::room::{BroadcastReport, PeerId, Room};
use crate::room_id::RoomId;
use bytes::Bytes;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Result of waiting on a session's queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Received {
    /// A message from another peer.
    Message(Arc<Message>),
    /// No further messages will arrive.
    EndOfStream,
}

impl Received {
    /// Get the message, if any.
    #[must_use]
    pub fn into_message(self) -> Option<Arc<Message>> {
        match self {
            Self::Message(message) => Some(message),
            Self::EndOfStream => None,
        }
    }
}

/// A peer's membership in one room.
pub struct Session {
    registry: Arc<Registry>,
    pub(crate) room: Arc<Room>,
    peer_id: PeerId,
    queue: Arc<PeerQueue>,
    left: AtomicBool,
}

impl Session {
    pub(crate) fn new(
        registry: Arc<Registry>,
        room: Arc<Room>,
        peer_id: PeerId,
        queue: Arc<PeerQueue>,
    ) -> Self {
        Self {
            registry,
            room,
            peer_id,
            queue,
            left: AtomicBool::new(false),
        }
    }

    /// Get the room this session joined.
    #[must_use]
    pub fn room_id(&self) -> RoomId {
        self.room.id()
    }

    /// Get this session's peer ID.
    #[must_use]
    pub fn peer_id(&self) -> PeerId {
        self.peer_id
    }

    /// Check if the session is still joined.
    ///
    /// A session stops being joined when it leaves, when the registry shuts
    /// down, or when it is disconnected as a slow peer.
    #[must_use]
    pub fn is_joined(&self) -> bool {
        !self.left.load(Ordering::Acquire) && !self.queue.is_closed()
    }

    /// Broadcast a payload to every other peer in the room.
    ///
    /// Delivery to each recipient is independent: a full or closed recipient
    /// never prevents delivery to the others.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::SessionClosed`] after leaving (or being
    /// disconnected), [`HubError::Closed`] after registry shutdown and
    /// [`HubError::PayloadTooLarge`] if the payload exceeds the limit.
    pub async fn send(&self, payload: impl Into<Bytes>) -> Result<BroadcastReport, HubError> {
        if self.left.load(Ordering::Acquire) {
            return Err(HubError::SessionClosed);
        }
        if self.registry.is_closed() {
            return Err(HubError::Closed);
        }

        let payload = payload.into();
        let max = self.registry.config().max_message_size;
        if payload.len() > max {
            return Err(HubError::PayloadTooLarge {
                size: payload.len(),
                max,
            });
        }

        let report = self
            .room
            .broadcast(self.peer_id, payload)
            .await
            .map_err(|err| match err {
                HubError::PeerNotFound { .. } => HubError::SessionClosed,
                other => other,
            })?;

        if !report.evicted.is_empty() {
            self.registry.evict(&self.room, &report.evicted);
        }

        Ok(report)
    }

    /// Wait for the next message addressed to this peer.
    ///
    /// Returns [`Received::EndOfStream`] once the session has left, the peer
    /// was disconnected, or the registry shut down. Safe to cancel.
    pub async fn receive(&self) -> Received {
        if self.left.load(Ordering::Acquire) {
            return Received::EndOfStream;
        }
        match self.queue.pop().await {
            Some(message) => Received::Message(message),
            None => Received::EndOfStream,
        }
    }

    /// Leave the room.
    ///
    /// Returns `true` if this call left the room, `false` if the session had
    /// already left.
    pub fn leave(&self) -> bool {
        if self.left.swap(true, Ordering::AcqRel) {
            return false;
        }

        let was_joined = self.registry.leave_room(&self.room, self.peer_id);
        debug!(
            room = %self.room.id(),
            peer = self.peer_id,
            was_joined,
            "Session left"
        );
        true
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.leave();
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("room", &self.room.id())
            .field("peer", &self.peer_id)
            .field("left", &self.left.load(Ordering::Relaxed))
            .finish()
    }
}
