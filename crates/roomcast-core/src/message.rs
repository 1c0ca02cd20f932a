//! Messages exchanged between peers of a room.
//!
//! Payloads are opaque bytes. The hub never looks inside them.

use crate::room::PeerId;
use crate::room_id::RoomId;
use bytes::Bytes;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// A unique message identifier.
pub type MessageId = u64;

/// Process-wide message sequence.
static ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Generate a unique message ID.
#[must_use]
pub fn generate_message_id() -> MessageId {
    ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// A broadcast message as seen by its recipients.
///
/// One `Message` is allocated per broadcast and shared by every recipient
/// through an `Arc`; it is never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Unique message identifier.
    pub id: MessageId,
    /// Room the message was broadcast in.
    pub room: RoomId,
    /// Peer that sent the message.
    pub sender: PeerId,
    /// Opaque payload.
    pub payload: Bytes,
    /// Milliseconds since the Unix epoch when the message was created.
    pub timestamp: u64,
}

impl Message {
    /// Create a new message.
    #[must_use]
    pub fn new(room: RoomId, sender: PeerId, payload: impl Into<Bytes>) -> Self {
        Self {
            id: generate_message_id(),
            room,
            sender,
            payload: payload.into(),
            timestamp: now_millis(),
        }
    }

    /// Get the payload bytes.
    #[must_use]
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Get the payload size in bytes.
    #[must_use]
    pub fn payload_size(&self) -> usize {
        self.payload.len()
    }
}
