//! Pumping frames between a connection and a session.
//!
//! [`run_session`] drives one joined connection: every inbound frame is
//! broadcast through the session, every message the session receives is
//! written to the client. When either direction stops (client close,
//! transport error, registry shutdown) the session leaves its room exactly
//! once and the connection is closed.

use crate::traits::{FrameSink, FrameSource};
use roomcast_core::{Received, Session};
use tracing::{debug, trace, warn};

/// Why a pump stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The client closed the connection.
    PeerClosed,
    /// The session's queue ended (left, disconnected, or registry shut down).
    EndOfStream,
    /// Reading from or writing to the connection failed.
    TransportError,
    /// The session can no longer send.
    SessionClosed,
}

/// Counters for a finished pump.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PumpSummary {
    /// Frames broadcast to the room.
    pub inbound: u64,
    /// Frames rejected by the hub (e.g., too large).
    pub rejected: u64,
    /// Messages written to the client.
    pub outbound: u64,
    /// Why the pump stopped.
    pub reason: CloseReason,
}

/// Run a session over a connection until either side finishes.
///
/// Consumes the session; it has left its room when this returns.
pub async fn run_session<K, S>(session: Session, mut sink: K, mut source: S) -> PumpSummary
where
    K: FrameSink,
    S: FrameSource,
{
    let room = session.room_id();
    let peer = session.peer_id();

    let mut inbound = 0u64;
    let mut rejected = 0u64;
    let mut outbound = 0u64;

    let reason = {
        let read_loop = async {
            loop {
                match source.recv().await {
                    Ok(Some(frame)) => match session.send(frame).await {
                        Ok(report) => {
                            inbound += 1;
                            trace!(room = %room, peer, recipients = report.recipients, "Frame broadcast");
                        }
                        Err(err) if err.is_validation() => {
                            rejected += 1;
                            warn!(room = %room, peer, error = %err, "Frame rejected");
                        }
                        Err(err) => {
                            debug!(room = %room, peer, error = %err, "Session can no longer send");
                            return CloseReason::SessionClosed;
                        }
                    },
                    Ok(None) => return CloseReason::PeerClosed,
                    Err(err) => {
                        warn!(room = %room, peer, error = %err, "Connection read failed");
                        return CloseReason::TransportError;
                    }
                }
            }
        };

        let write_loop = async {
            loop {
                match session.receive().await {
                    Received::Message(message) => {
                        if let Err(err) = sink.send(message.payload.clone()).await {
                            debug!(room = %room, peer, error = %err, "Connection write failed");
                            return CloseReason::TransportError;
                        }
                        outbound += 1;
                    }
                    Received::EndOfStream => return CloseReason::EndOfStream,
                }
            }
        };

        tokio::select! {
            reason = read_loop => reason,
            reason = write_loop => reason,
        }
    };

    session.leave();
    if let Err(err) = sink.close().await {
        trace!(room = %room, peer, error = %err, "Close after disconnect");
    }

    debug!(room = %room, peer, inbound, outbound, rejected, ?reason, "Session pump finished");

    PumpSummary {
        inbound,
        rejected,
        outbound,
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::TransportError;
    use async_trait::async_trait;
    use bytes::Bytes;
    use roomcast_core::{HubConfig, Registry, RoomId};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio::task::JoinHandle;

    struct ChannelSource(mpsc::UnboundedReceiver<Bytes>);

    #[async_trait]
    impl FrameSource for ChannelSource {
        async fn recv(&mut self) -> Result<Option<Bytes>, TransportError> {
            Ok(self.0.recv().await)
        }
    }

    struct ChannelSink {
        tx: mpsc::UnboundedSender<Bytes>,
        closed: Arc<AtomicBool>,
        fail: bool,
    }

    #[async_trait]
    impl FrameSink for ChannelSink {
        async fn send(&mut self, frame: Bytes) -> Result<(), TransportError> {
            if self.fail {
                return Err(TransportError::ConnectionClosed);
            }
            self.tx
                .send(frame)
                .map_err(|e| TransportError::SendFailed(e.to_string()))
        }

        async fn close(&mut self) -> Result<(), TransportError> {
            self.closed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    /// A fake client: frames it sends, frames it receives, and the pump task.
    struct Client {
        outgoing: mpsc::UnboundedSender<Bytes>,
        incoming: mpsc::UnboundedReceiver<Bytes>,
        closed: Arc<AtomicBool>,
        pump: JoinHandle<PumpSummary>,
    }

    fn connect(registry: &Arc<Registry>, room: RoomId, fail_writes: bool) -> Client {
        let session = registry.join(room).unwrap();
        let (outgoing, source_rx) = mpsc::unbounded_channel();
        let (sink_tx, incoming) = mpsc::unbounded_channel();
        let closed = Arc::new(AtomicBool::new(false));
        let sink = ChannelSink {
            tx: sink_tx,
            closed: Arc::clone(&closed),
            fail: fail_writes,
        };
        let pump = tokio::spawn(run_session(session, sink, ChannelSource(source_rx)));
        Client {
            outgoing,
            incoming,
            closed,
            pump,
        }
    }

    async fn next_frame(client: &mut Client) -> Bytes {
        tokio::time::timeout(Duration::from_secs(1), client.incoming.recv())
            .await
            .expect("timed out waiting for frame")
            .expect("sink dropped")
    }

    #[tokio::test]
    async fn test_frames_reach_other_clients_only() {
        let registry = Arc::new(Registry::new());
        let room = RoomId::new_v4();
        let mut a = connect(&registry, room, false);
        let mut b = connect(&registry, room, false);

        a.outgoing.send(Bytes::from_static(b"hello")).unwrap();
        assert_eq!(next_frame(&mut b).await, "hello");
        assert!(
            tokio::time::timeout(Duration::from_millis(20), a.incoming.recv())
                .await
                .is_err()
        );

        // Client A hangs up: its pump ends and it leaves the room.
        drop(a.outgoing);
        let summary = a.pump.await.unwrap();
        assert_eq!(summary.reason, CloseReason::PeerClosed);
        assert_eq!(summary.inbound, 1);
        assert!(a.closed.load(Ordering::SeqCst));
        assert_eq!(registry.peer_count(&room), 1);

        // Shutting down the registry ends B's pump.
        registry.shutdown();
        let summary = b.pump.await.unwrap();
        assert_eq!(summary.reason, CloseReason::EndOfStream);
        assert_eq!(summary.outbound, 1);
        assert!(b.closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_oversized_frame_is_rejected_not_fatal() {
        let registry = Arc::new(Registry::with_config(HubConfig {
            max_message_size: 8,
            ..HubConfig::default()
        }));
        let room = RoomId::new_v4();
        let a = connect(&registry, room, false);
        let mut b = connect(&registry, room, false);

        a.outgoing.send(Bytes::from(vec![0u8; 64])).unwrap();
        a.outgoing.send(Bytes::from_static(b"small")).unwrap();
        assert_eq!(next_frame(&mut b).await, "small");

        drop(a.outgoing);
        let summary = a.pump.await.unwrap();
        assert_eq!(summary.rejected, 1);
        assert_eq!(summary.inbound, 1);
    }

    #[tokio::test]
    async fn test_write_failure_leaves_room() {
        let registry = Arc::new(Registry::new());
        let room = RoomId::new_v4();
        let a = connect(&registry, room, false);
        let broken = connect(&registry, room, true);

        a.outgoing.send(Bytes::from_static(b"ping")).unwrap();

        let summary = broken.pump.await.unwrap();
        assert_eq!(summary.reason, CloseReason::TransportError);
        assert_eq!(registry.peer_count(&room), 1);
    }
}
