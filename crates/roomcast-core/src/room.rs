//! Room abstraction for Roomcast.
//!
//! A room is a broadcast domain: it owns the delivery queue of every joined
//! peer and fans each message out to everyone except its sender.
//!
//! The room lock guards only the peer set. Broadcast copies the recipient
//! queues out under the lock and delivers after releasing it, so a slow
//! recipient never holds up joins, leaves or other broadcasts. Room methods
//! never call back into the registry.

use crate::message::Message;
use crate::queue::{Backpressure, PeerQueue, PushError};
use crate::registry::HubError;
use crate::room_id::RoomId;
use bytes::Bytes;
use futures_util::future::join_all;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, trace, warn};

/// Identifier of a peer, unique within one room's lifetime.
pub type PeerId = u64;

/// First peer ID handed out by a fresh room.
pub const FIRST_PEER_ID: PeerId = 1;

/// Outcome of a single broadcast.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Peers the message was addressed to.
    pub recipients: usize,
    /// Peers whose queue accepted the message.
    pub delivered: usize,
    /// Messages lost to backpressure (displaced or timed out).
    pub dropped: usize,
    /// Peers that were too slow and must be disconnected.
    pub evicted: Vec<PeerId>,
}

#[derive(Debug)]
struct RoomState {
    peers: HashMap<PeerId, Arc<PeerQueue>>,
    next_peer_id: PeerId,
}

/// A room holding the queues of its joined peers.
#[derive(Debug)]
pub struct Room {
    id: RoomId,
    state: Mutex<RoomState>,
    queue_capacity: usize,
    max_peers: usize,
    backpressure: Backpressure,
}

impl Room {
    /// Create an empty room.
    #[must_use]
    pub fn new(
        id: RoomId,
        queue_capacity: usize,
        max_peers: usize,
        backpressure: Backpressure,
    ) -> Self {
        Self {
            id,
            state: Mutex::new(RoomState {
                peers: HashMap::new(),
                next_peer_id: FIRST_PEER_ID,
            }),
            queue_capacity,
            max_peers,
            backpressure,
        }
    }

    fn lock(&self) -> MutexGuard<'_, RoomState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Get the room ID.
    #[must_use]
    pub fn id(&self) -> RoomId {
        self.id
    }

    /// Get the backpressure policy applied by broadcast.
    #[must_use]
    pub fn backpressure(&self) -> Backpressure {
        self.backpressure
    }

    /// Get the number of joined peers.
    #[must_use]
    pub fn peer_count(&self) -> usize {
        self.lock().peers.len()
    }

    /// Check if the room has no peers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().peers.is_empty()
    }

    /// Check if a peer is currently joined.
    #[must_use]
    pub fn contains(&self, peer_id: PeerId) -> bool {
        self.lock().peers.contains_key(&peer_id)
    }

    /// Get the IDs of all joined peers in ascending order.
    #[must_use]
    pub fn peer_ids(&self) -> Vec<PeerId> {
        let mut ids: Vec<PeerId> = self.lock().peers.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Allocate a new peer with a fresh queue.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::RoomFull`] if the room is at its peer limit.
    pub(crate) fn add_peer(&self) -> Result<(PeerId, Arc<PeerQueue>), HubError> {
        let mut state = self.lock();
        if state.peers.len() >= self.max_peers {
            return Err(HubError::RoomFull(self.id));
        }

        let peer_id = state.next_peer_id;
        state.next_peer_id += 1;

        let queue = Arc::new(PeerQueue::new(self.queue_capacity));
        state.peers.insert(peer_id, Arc::clone(&queue));

        debug!(room = %self.id, peer = peer_id, peers = state.peers.len(), "Peer joined");
        Ok((peer_id, queue))
    }

    /// Remove a peer and close its queue.
    ///
    /// Returns `true` if the peer was joined. Removing an unknown or already
    /// removed peer is a no-op.
    pub(crate) fn remove_peer(&self, peer_id: PeerId) -> bool {
        let mut state = self.lock();
        let Some(queue) = state.peers.remove(&peer_id) else {
            return false;
        };
        let remaining = state.peers.len();
        drop(state);

        queue.close();
        debug!(room = %self.id, peer = peer_id, peers = remaining, "Peer left");
        true
    }

    /// Remove every peer and close all queues.
    ///
    /// Returns the number of peers removed.
    pub(crate) fn close_all(&self) -> usize {
        let peers: Vec<Arc<PeerQueue>> = self.lock().peers.drain().map(|(_, q)| q).collect();
        for queue in &peers {
            queue.close();
        }
        peers.len()
    }

    /// Deliver `payload` to every peer except `sender`.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::PeerNotFound`] if `sender` is not joined.
    pub async fn broadcast(
        &self,
        sender: PeerId,
        payload: impl Into<Bytes>,
    ) -> Result<BroadcastReport, HubError> {
        let recipients: Vec<(PeerId, Arc<PeerQueue>)> = {
            let state = self.lock();
            if !state.peers.contains_key(&sender) {
                return Err(HubError::PeerNotFound {
                    room: self.id,
                    peer: sender,
                });
            }
            state
                .peers
                .iter()
                .filter(|(id, _)| **id != sender)
                .map(|(id, queue)| (*id, Arc::clone(queue)))
                .collect()
        };

        let message = Arc::new(Message::new(self.id, sender, payload));
        let mut report = BroadcastReport {
            recipients: recipients.len(),
            ..BroadcastReport::default()
        };

        match self.backpressure {
            Backpressure::DropOldest => {
                for (peer_id, queue) in &recipients {
                    match queue.force_push(Arc::clone(&message)) {
                        Ok(displaced) => {
                            report.delivered += 1;
                            if displaced {
                                report.dropped += 1;
                                trace!(room = %self.id, peer = peer_id, "Displaced oldest message");
                            }
                        }
                        Err(_) => trace!(room = %self.id, peer = peer_id, "Recipient already closed"),
                    }
                }
            }
            Backpressure::Disconnect => {
                for (peer_id, queue) in &recipients {
                    match queue.try_push(Arc::clone(&message)) {
                        Ok(()) => report.delivered += 1,
                        Err(PushError::Full) => {
                            warn!(room = %self.id, peer = peer_id, "Recipient queue full, disconnecting");
                            report.evicted.push(*peer_id);
                        }
                        Err(_) => trace!(room = %self.id, peer = peer_id, "Recipient already closed"),
                    }
                }
            }
            Backpressure::Block { deadline } => {
                let outcomes = join_all(
                    recipients
                        .iter()
                        .map(|(_, queue)| queue.push_timeout(Arc::clone(&message), deadline)),
                )
                .await;

                for ((peer_id, _), outcome) in recipients.iter().zip(outcomes) {
                    match outcome {
                        Ok(()) => report.delivered += 1,
                        Err(PushError::Timeout) => {
                            warn!(room = %self.id, peer = peer_id, "Delivery deadline expired, message dropped");
                            report.dropped += 1;
                        }
                        Err(_) => trace!(room = %self.id, peer = peer_id, "Recipient already closed"),
                    }
                }
            }
        }

        trace!(
            room = %self.id,
            sender = sender,
            recipients = report.recipients,
            delivered = report.delivered,
            "Broadcast"
        );
        Ok(report)
    }
}
