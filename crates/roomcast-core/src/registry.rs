//! Room registry for Roomcast.
//!
//! The registry owns every live room. Rooms are created on the first join
//! and removed when their last peer leaves, so a room is registered exactly
//! while it has at least one peer.
//!
//! Lock order: a registry shard lock is always taken before a room lock.
//! Rooms never reach back into the registry, and broadcast only ever takes
//! the room lock.

use crate::queue::{Backpressure, DEFAULT_QUEUE_CAPACITY};
use crate::room::{PeerId, Room};
use crate::room_id::RoomId;
use crate::session::Session;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

/// Hub errors.
#[derive(Debug, Error)]
pub enum HubError {
    /// No room ID was supplied.
    #[error("Missing room id")]
    MissingRoomId,

    /// The room ID is not a UUID.
    #[error("Invalid room id: {0}")]
    InvalidRoomId(String),

    /// Payload exceeds the configured size limit.
    #[error("Payload too large: {size} bytes (max: {max})")]
    PayloadTooLarge {
        /// Size of the rejected payload.
        size: usize,
        /// Configured limit.
        max: usize,
    },

    /// Maximum number of rooms reached.
    #[error("Maximum rooms reached")]
    MaxRoomsReached,

    /// Room is at its peer limit.
    #[error("Room is full: {0}")]
    RoomFull(RoomId),

    /// The peer is no longer part of the room.
    #[error("Peer {peer} not found in room {room}")]
    PeerNotFound {
        /// Room that was addressed.
        room: RoomId,
        /// Peer that was addressed.
        peer: PeerId,
    },

    /// The session has already left its room.
    #[error("Session has left the room")]
    SessionClosed,

    /// The registry has been shut down.
    #[error("Registry is shut down")]
    Closed,
}

impl HubError {
    /// Check if the error was caused by invalid caller input.
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::MissingRoomId | Self::InvalidRoomId(_) | Self::PayloadTooLarge { .. }
        )
    }
}

/// Hub configuration.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Maximum number of live rooms.
    pub max_rooms: usize,
    /// Maximum peers per room.
    pub max_peers_per_room: usize,
    /// Messages buffered per peer.
    pub queue_capacity: usize,
    /// Largest accepted payload in bytes.
    pub max_message_size: usize,
    /// What to do when a peer's queue is full.
    pub backpressure: Backpressure,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            max_rooms: 10_000,
            max_peers_per_room: 1024,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            max_message_size: 64 * 1024,
            backpressure: Backpressure::DropOldest,
        }
    }
}

/// The registry of live rooms.
///
/// Shared behind an `Arc`; every [`Session`] keeps a reference back to the
/// registry it joined through.
#[derive(Debug)]
pub struct Registry {
    /// Rooms indexed by ID.
    rooms: DashMap<RoomId, Arc<Room>>,
    /// Live rooms plus slots reserved by joins still creating their room.
    room_count: AtomicUsize,
    /// Set once by `shutdown`.
    closed: AtomicBool,
    /// Configuration.
    config: HubConfig,
}

impl Registry {
    /// Create a new registry with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(HubConfig::default())
    }

    /// Create a new registry with custom configuration.
    #[must_use]
    pub fn with_config(config: HubConfig) -> Self {
        info!("Creating registry with config: {:?}", config);
        Self {
            rooms: DashMap::new(),
            room_count: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
            config,
        }
    }

    /// Get the registry configuration.
    #[must_use]
    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    /// Check if the registry has been shut down.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Join a room, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Closed`] after shutdown, [`HubError::MaxRoomsReached`]
    /// or [`HubError::RoomFull`] when limits are exceeded.
    pub fn join(self: &Arc<Self>, room_id: RoomId) -> Result<Session, HubError> {
        let entry = self.rooms.entry(room_id);

        // Checked under the shard lock so a join cannot slip in behind shutdown.
        if self.is_closed() {
            return Err(HubError::Closed);
        }

        let (room, peer_id, queue) = match entry {
            Entry::Occupied(entry) => {
                let room = Arc::clone(entry.get());
                let (peer_id, queue) = room.add_peer()?;
                (room, peer_id, queue)
            }
            Entry::Vacant(entry) => {
                // Joins to different shards race here, so the slot is
                // reserved atomically before the room exists.
                let max_rooms = self.config.max_rooms;
                self.room_count
                    .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                        (n < max_rooms).then_some(n + 1)
                    })
                    .map_err(|_| HubError::MaxRoomsReached)?;

                let room = Arc::new(Room::new(
                    room_id,
                    self.config.queue_capacity,
                    self.config.max_peers_per_room,
                    self.config.backpressure,
                ));
                let (peer_id, queue) = match room.add_peer() {
                    Ok(joined) => joined,
                    Err(err) => {
                        self.room_count.fetch_sub(1, Ordering::AcqRel);
                        return Err(err);
                    }
                };
                entry.insert(Arc::clone(&room));
                debug!(room = %room_id, "Created room");
                (room, peer_id, queue)
            }
        };

        Ok(Session::new(Arc::clone(self), room, peer_id, queue))
    }

    /// Remove a peer from the given room instance, dropping the room if it
    /// becomes empty.
    ///
    /// Returns `true` if the peer was joined. Safe to call repeatedly, and
    /// safe to call for a room that has since been removed or replaced.
    pub(crate) fn leave_room(&self, room: &Arc<Room>, peer_id: PeerId) -> bool {
        let room_id = room.id();
        match self.rooms.entry(room_id) {
            Entry::Occupied(entry) if Arc::ptr_eq(entry.get(), room) => {
                let removed = room.remove_peer(peer_id);
                if room.is_empty() {
                    entry.remove();
                    self.room_count.fetch_sub(1, Ordering::AcqRel);
                    debug!(room = %room_id, "Deleted empty room");
                }
                removed
            }
            // The room is gone or was re-created; only the stale instance is touched.
            _ => room.remove_peer(peer_id),
        }
    }

    /// Disconnect peers that a broadcast reported as too slow.
    pub(crate) fn evict(&self, room: &Arc<Room>, peers: &[PeerId]) {
        for &peer_id in peers {
            if self.leave_room(room, peer_id) {
                info!(room = %room.id(), peer = peer_id, "Evicted slow peer");
            }
        }
    }

    /// Tear down every room.
    ///
    /// Closes all queues (every pending receive ends), clears all peer sets
    /// and empties the registry. Later joins fail with [`HubError::Closed`].
    /// Calling this more than once is a no-op.
    pub fn shutdown(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        let mut rooms = 0usize;
        let mut peers = 0usize;
        self.rooms.retain(|_, room| {
            rooms += 1;
            peers += room.close_all();
            false
        });
        self.room_count.store(0, Ordering::Release);

        info!(rooms, peers, "Registry shut down");
    }

    /// Get registry statistics.
    #[must_use]
    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            room_count: self.rooms.len(),
            peer_count: self.rooms.iter().map(|r| r.peer_count()).sum(),
        }
    }

    /// Check if a room exists.
    #[must_use]
    pub fn room_exists(&self, room_id: &RoomId) -> bool {
        self.rooms.contains_key(room_id)
    }

    /// Get the peer count for a room.
    #[must_use]
    pub fn peer_count(&self, room_id: &RoomId) -> usize {
        self.rooms
            .get(room_id)
            .map(|r| r.peer_count())
            .unwrap_or(0)
    }

    /// Get all live room IDs.
    #[must_use]
    pub fn room_ids(&self) -> Vec<RoomId> {
        self.rooms.iter().map(|e| *e.key()).collect()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

/// Registry statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryStats {
    /// Number of live rooms.
    pub room_count: usize,
    /// Number of joined peers across all rooms.
    pub peer_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Received;
    use std::time::Duration;

    fn registry() -> Arc<Registry> {
        Arc::new(Registry::new())
    }

    #[test]
    fn test_join_assigns_increasing_peer_ids() {
        let registry = registry();
        let room = RoomId::new_v4();

        let sessions: Vec<Session> = (0..5).map(|_| registry.join(room).unwrap()).collect();
        let ids: Vec<PeerId> = sessions.iter().map(Session::peer_id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
        assert_eq!(registry.peer_count(&room), 5);
    }

    #[test]
    fn test_room_lifecycle() {
        let registry = registry();
        let room = RoomId::new_v4();

        // Join then leave: the room disappears
        let a = registry.join(room).unwrap();
        assert!(registry.room_exists(&room));
        assert!(a.leave());
        assert!(!registry.room_exists(&room));

        // Join two, leave one: the room stays
        let b = registry.join(room).unwrap();
        let c = registry.join(room).unwrap();
        assert!(b.leave());
        assert!(registry.room_exists(&room));
        assert_eq!(registry.peer_count(&room), 1);

        drop(c);
        assert!(!registry.room_exists(&room));
        assert_eq!(registry.stats().room_count, 0);
    }

    #[test]
    fn test_recreated_room_restarts_peer_ids() {
        let registry = registry();
        let room = RoomId::new_v4();

        let a = registry.join(room).unwrap();
        a.leave();

        let b = registry.join(room).unwrap();
        assert_eq!(b.peer_id(), 1);
    }

    #[test]
    fn test_stale_session_cannot_remove_new_peer() {
        let registry = registry();
        let room = RoomId::new_v4();

        let old = registry.join(room).unwrap();
        // Simulate the old room disappearing underneath the session.
        registry.leave_room(&old.room, old.peer_id());
        assert!(!registry.room_exists(&room));

        let fresh = registry.join(room).unwrap();
        assert_eq!(fresh.peer_id(), old.peer_id());

        // The stale session leaving must not touch the fresh peer.
        old.leave();
        assert!(registry.room_exists(&room));
        assert!(fresh.is_joined());
        assert_eq!(registry.peer_count(&room), 1);
    }

    #[test]
    fn test_max_rooms() {
        let registry = Arc::new(Registry::with_config(HubConfig {
            max_rooms: 1,
            ..HubConfig::default()
        }));

        let _a = registry.join(RoomId::new_v4()).unwrap();
        assert!(matches!(
            registry.join(RoomId::new_v4()),
            Err(HubError::MaxRoomsReached)
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_max_rooms_under_concurrent_joins() {
        let registry = Arc::new(Registry::with_config(HubConfig {
            max_rooms: 8,
            ..HubConfig::default()
        }));
        let barrier = Arc::new(tokio::sync::Barrier::new(64));

        let tasks: Vec<_> = (0..64)
            .map(|_| {
                let registry = Arc::clone(&registry);
                let barrier = Arc::clone(&barrier);
                tokio::spawn(async move {
                    barrier.wait().await;
                    registry.join(RoomId::new_v4())
                })
            })
            .collect();

        let mut sessions = Vec::new();
        for task in tasks {
            match task.await.unwrap() {
                Ok(session) => sessions.push(session),
                Err(err) => assert!(matches!(err, HubError::MaxRoomsReached)),
            }
        }

        assert_eq!(sessions.len(), 8);
        assert_eq!(registry.stats().room_count, 8);

        // Freed slots are reusable.
        sessions.pop();
        assert!(registry.join(RoomId::new_v4()).is_ok());
    }

    #[test]
    fn test_room_creation_failure_releases_slot() {
        let registry = Arc::new(Registry::with_config(HubConfig {
            max_rooms: 1,
            max_peers_per_room: 0,
            ..HubConfig::default()
        }));

        for _ in 0..3 {
            assert!(matches!(
                registry.join(RoomId::new_v4()),
                Err(HubError::RoomFull(_))
            ));
        }
        assert_eq!(registry.room_count.load(Ordering::Acquire), 0);
        assert_eq!(registry.stats().room_count, 0);
    }

    #[test]
    fn test_room_full_leaves_registry_consistent() {
        let registry = Arc::new(Registry::with_config(HubConfig {
            max_peers_per_room: 1,
            ..HubConfig::default()
        }));
        let room = RoomId::new_v4();

        let _a = registry.join(room).unwrap();
        assert!(matches!(registry.join(room), Err(HubError::RoomFull(_))));
        assert_eq!(registry.peer_count(&room), 1);
    }

    #[tokio::test]
    async fn test_shutdown_tears_down_everything() {
        let registry = registry();
        let r1 = RoomId::new_v4();
        let r2 = RoomId::new_v4();

        let a = registry.join(r1).unwrap();
        let b = registry.join(r1).unwrap();
        let c = registry.join(r2).unwrap();

        let pending = tokio::spawn(async move { a.receive().await });
        tokio::task::yield_now().await;

        registry.shutdown();

        assert_eq!(pending.await.unwrap(), Received::EndOfStream);
        assert_eq!(b.receive().await, Received::EndOfStream);
        assert!(!registry.room_exists(&r1));
        assert!(!registry.room_exists(&r2));
        assert_eq!(registry.stats(), RegistryStats { room_count: 0, peer_count: 0 });
        assert!(matches!(registry.join(r1), Err(HubError::Closed)));
        assert!(matches!(c.send(&b"late"[..]).await, Err(HubError::Closed)));

        // Leaving after shutdown is a harmless no-op
        c.leave();
        registry.shutdown();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_join_leave_broadcast() {
        let registry = registry();
        let rooms: Vec<RoomId> = (0..8).map(|_| RoomId::new_v4()).collect();

        let mut tasks = Vec::new();
        for worker in 0..32usize {
            let registry = Arc::clone(&registry);
            let rooms = rooms.clone();
            tasks.push(tokio::spawn(async move {
                for round in 0..50usize {
                    let room = rooms[(worker + round) % rooms.len()];
                    let session = registry.join(room).unwrap();
                    let _ = session.send(format!("{worker}:{round}")).await;
                    while let Ok(Received::Message(_)) =
                        tokio::time::timeout(Duration::from_millis(1), session.receive()).await
                    {}
                    assert!(session.leave());
                }
            }));
        }

        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(registry.stats(), RegistryStats { room_count: 0, peer_count: 0 });
        for room in &rooms {
            assert!(!registry.room_exists(room));
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_leave_racing_shutdown() {
        let registry = registry();
        let rooms: Vec<RoomId> = (0..8).map(|_| RoomId::new_v4()).collect();
        let sessions: Vec<Arc<Session>> = (0..256)
            .map(|i| Arc::new(registry.join(rooms[i % rooms.len()]).unwrap()))
            .collect();
        let barrier = Arc::new(tokio::sync::Barrier::new(sessions.len() + 1));

        let mut tasks = Vec::new();
        for (i, session) in sessions.iter().enumerate() {
            let session = Arc::clone(session);
            let barrier = Arc::clone(&barrier);
            tasks.push(tokio::spawn(async move {
                barrier.wait().await;
                if i % 2 == 0 {
                    session.leave();
                }
                session.receive().await
            }));
        }

        let closer = {
            let registry = Arc::clone(&registry);
            let barrier = Arc::clone(&barrier);
            tokio::spawn(async move {
                barrier.wait().await;
                registry.shutdown();
            })
        };

        for task in tasks {
            let received = tokio::time::timeout(Duration::from_secs(5), task)
                .await
                .unwrap()
                .unwrap();
            assert_eq!(received, Received::EndOfStream);
        }
        closer.await.unwrap();

        assert!(registry.is_closed());
        assert_eq!(registry.stats(), RegistryStats { room_count: 0, peer_count: 0 });
        for session in &sessions {
            assert!(!session.is_joined());
            assert_eq!(session.receive().await, Received::EndOfStream);
            session.leave();
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_eviction_racing_leave() {
        let registry = Arc::new(Registry::with_config(HubConfig {
            queue_capacity: 1,
            backpressure: Backpressure::Disconnect,
            ..HubConfig::default()
        }));
        let room = RoomId::new_v4();
        let sessions: Vec<Arc<Session>> = (0..64)
            .map(|_| Arc::new(registry.join(room).unwrap()))
            .collect();
        let barrier = Arc::new(tokio::sync::Barrier::new(sessions.len()));

        let tasks: Vec<_> = sessions
            .iter()
            .enumerate()
            .map(|(i, session)| {
                let session = Arc::clone(session);
                let barrier = Arc::clone(&barrier);
                tokio::spawn(async move {
                    barrier.wait().await;
                    if i % 2 == 0 {
                        for n in 0..4 {
                            // Fails once this sender has itself been evicted.
                            let _ = session.send(format!("{i}:{n}")).await;
                        }
                    }
                    session.leave();
                })
            })
            .collect();

        for task in tasks {
            tokio::time::timeout(Duration::from_secs(5), task)
                .await
                .unwrap()
                .unwrap();
        }

        assert_eq!(registry.stats(), RegistryStats { room_count: 0, peer_count: 0 });
        assert!(!registry.room_exists(&room));
        assert_eq!(registry.room_count.load(Ordering::Acquire), 0);
        for session in &sessions {
            assert_eq!(session.receive().await, Received::EndOfStream);
        }

        // The slot accounting survived the race.
        let again = registry.join(room).unwrap();
        assert_eq!(again.peer_id(), 1);
    }
}
