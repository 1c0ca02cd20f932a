//! Bounded per-peer delivery queues.
//!
//! Every joined peer owns exactly one [`PeerQueue`]. The room writes into it
//! during broadcast, the owning session is the only reader. A queue is closed
//! once, when its peer leaves; closing wakes the reader and any writer
//! waiting for space.

use crate::message::Message;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Notify;

/// Default number of messages buffered per peer.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// What a broadcast does when a recipient's queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Backpressure {
    /// Discard the oldest buffered message to make room for the new one.
    #[default]
    DropOldest,
    /// Remove the slow peer from its room.
    Disconnect,
    /// Wait up to `deadline` for space, then drop the message for that peer.
    Block {
        /// Maximum time to wait for each recipient.
        deadline: Duration,
    },
}

/// Reasons a message could not be queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PushError {
    /// The queue is at capacity.
    #[error("Queue is full")]
    Full,
    /// The queue has been closed.
    #[error("Queue is closed")]
    Closed,
    /// No space became available before the deadline.
    #[error("Timed out waiting for queue space")]
    Timeout,
}

#[derive(Debug, Default)]
struct QueueState {
    buffer: VecDeque<Arc<Message>>,
    closed: bool,
}

/// A bounded single-reader message queue for one peer.
#[derive(Debug)]
pub struct PeerQueue {
    state: Mutex<QueueState>,
    /// Signalled when a message is queued or the queue closes.
    readable: Notify,
    /// Signalled when a message is taken or the queue closes.
    writable: Notify,
    capacity: usize,
}

impl PeerQueue {
    /// Create a queue holding at most `capacity` messages (minimum 1).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            readable: Notify::new(),
            writable: Notify::new(),
            capacity: capacity.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Get the queue capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of buffered messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().buffer.len()
    }

    /// Check if no messages are buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().buffer.is_empty()
    }

    /// Check if the queue has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Queue a message if there is space.
    ///
    /// # Errors
    ///
    /// Returns [`PushError::Full`] at capacity and [`PushError::Closed`] after close.
    pub fn try_push(&self, message: Arc<Message>) -> Result<(), PushError> {
        let mut state = self.lock();
        if state.closed {
            return Err(PushError::Closed);
        }
        if state.buffer.len() >= self.capacity {
            return Err(PushError::Full);
        }
        state.buffer.push_back(message);
        drop(state);
        self.readable.notify_one();
        Ok(())
    }

    /// Queue a message, discarding the oldest buffered one if full.
    ///
    /// Returns `true` if a message was discarded.
    ///
    /// # Errors
    ///
    /// Returns [`PushError::Closed`] after close.
    pub fn force_push(&self, message: Arc<Message>) -> Result<bool, PushError> {
        let mut state = self.lock();
        if state.closed {
            return Err(PushError::Closed);
        }
        let displaced = state.buffer.len() >= self.capacity && state.buffer.pop_front().is_some();
        state.buffer.push_back(message);
        drop(state);
        self.readable.notify_one();
        Ok(displaced)
    }

    /// Queue a message, waiting up to `deadline` for space.
    ///
    /// # Errors
    ///
    /// Returns [`PushError::Timeout`] if the queue stayed full and
    /// [`PushError::Closed`] if it closed while waiting.
    pub async fn push_timeout(
        &self,
        message: Arc<Message>,
        deadline: Duration,
    ) -> Result<(), PushError> {
        let wait = async {
            loop {
                let writable = self.writable.notified();
                tokio::pin!(writable);
                writable.as_mut().enable();

                match self.try_push(Arc::clone(&message)) {
                    Err(PushError::Full) => writable.await,
                    other => return other,
                }
            }
        };

        tokio::time::timeout(deadline, wait)
            .await
            .unwrap_or(Err(PushError::Timeout))
    }

    /// Take the next message without waiting.
    ///
    /// Returns `None` if the queue is empty or closed.
    pub fn try_pop(&self) -> Option<Arc<Message>> {
        let message = self.lock().buffer.pop_front();
        if message.is_some() {
            self.writable.notify_waiters();
        }
        message
    }

    /// Wait for the next message.
    ///
    /// Returns `None` once the queue is closed. Cancelling the returned
    /// future never loses a message.
    pub async fn pop(&self) -> Option<Arc<Message>> {
        loop {
            let readable = self.readable.notified();
            tokio::pin!(readable);
            readable.as_mut().enable();

            {
                let mut state = self.lock();
                if state.closed {
                    return None;
                }
                if let Some(message) = state.buffer.pop_front() {
                    drop(state);
                    self.writable.notify_waiters();
                    return Some(message);
                }
            }

            readable.await;
        }
    }

    /// Close the queue, discarding anything still buffered.
    ///
    /// Returns `true` if this call closed the queue, `false` if it was
    /// already closed.
    pub fn close(&self) -> bool {
        let mut state = self.lock();
        if state.closed {
            return false;
        }
        state.closed = true;
        state.buffer.clear();
        drop(state);

        self.readable.notify_waiters();
        self.writable.notify_waiters();
        true
    }
}
