//! Shared fixtures for the Roomcast benchmarks.

use bytes::Bytes;
use roomcast_core::{HubConfig, Registry, RoomId, Session};
use std::sync::Arc;

/// A room with one sending session and a number of listeners.
pub struct Fixture {
    /// Registry owning the room.
    pub registry: Arc<Registry>,
    /// The room every session joined.
    pub room: RoomId,
    /// Session that broadcasts.
    pub sender: Session,
    /// Sessions that only receive.
    pub listeners: Vec<Session>,
}

impl Fixture {
    /// Join a fresh room with one sender and `listeners` receivers.
    ///
    /// # Panics
    ///
    /// Panics if `config` does not allow `listeners + 1` peers in a room.
    #[must_use]
    pub fn new(listeners: usize, config: HubConfig) -> Self {
        let registry = Arc::new(Registry::with_config(config));
        let room = RoomId::new_v4();
        let sender = registry.join(room).expect("join sender");
        let listeners = (0..listeners)
            .map(|_| registry.join(room).expect("join listener"))
            .collect();

        Self {
            registry,
            room,
            sender,
            listeners,
        }
    }

    /// Receive one message on every listener.
    pub async fn drain_one(&self) {
        for listener in &self.listeners {
            let _ = listener.receive().await;
        }
    }
}

/// Hub configuration sized for fan-out benchmarks.
#[must_use]
pub fn bench_config(peers: usize) -> HubConfig {
    HubConfig {
        max_peers_per_room: peers.max(1) + 1,
        ..HubConfig::default()
    }
}

/// A zeroed payload of `size` bytes.
#[must_use]
pub fn payload(size: usize) -> Bytes {
    Bytes::from(vec![0u8; size])
}

/// A single-threaded runtime for driving async hub calls from criterion.
///
/// # Panics
///
/// Panics if the runtime cannot be built.
#[must_use]
pub fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("build tokio runtime")
}
