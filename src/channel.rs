//! # Bounded FIFO channel between producer and consumer.
//!
//! [`BoundedChannel`] is a fixed-capacity queue with a non-blocking send, a timed
//! receive and an explicit reset.
//!
//! ## Architecture
//! ```text
//!   try_send(v) ──► Mutex<VecDeque<T>> ──► recv_timeout(d)
//!        │                  ▲                    │
//!        └── notify_one ──► Notify ◄── notified ─┘
//!   reset() ── clear() under the same mutex
//! ```
//!
//! ## Rules
//! - `len()` never exceeds `capacity()`; a full channel rejects the value (no backpressure).
//! - FIFO order is preserved for every successful send.
//! - `reset()` is atomic with respect to `try_send`/`recv_timeout`; receivers blocked
//!   across a reset keep waiting for **new** data.
//! - The channel serializes access internally; callers need no extra locking.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::Notify;

/// Fixed-width message exchanged by the producer and the consumer.
pub type Message = i32;

/// Channel construction failed.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelError {
    /// A channel must hold at least one message.
    #[error("channel capacity must be greater than zero")]
    ZeroCapacity,
}

/// Non-blocking send rejected the value.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrySendError<T> {
    /// The channel is at capacity; the value is handed back and dropped by the caller.
    #[error("channel full")]
    Full(T),
}

impl<T> TrySendError<T> {
    /// Returns the rejected value.
    pub fn into_inner(self) -> T {
        match self {
            TrySendError::Full(v) => v,
        }
    }
}

/// No message arrived before the deadline.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("receive timed out after {timeout:?}")]
pub struct RecvTimeoutError {
    /// The wait that elapsed.
    pub timeout: Duration,
}

/// Fixed-capacity FIFO with timed receive and reset.
#[derive(Debug)]
pub struct BoundedChannel<T> {
    buf: Mutex<VecDeque<T>>,
    capacity: usize,
    ready: Notify,
}

impl<T> BoundedChannel<T> {
    /// Creates an empty channel holding at most `capacity` messages.
    pub fn new(capacity: usize) -> Result<Self, ChannelError> {
        if capacity == 0 {
            return Err(ChannelError::ZeroCapacity);
        }
        Ok(Self {
            buf: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            ready: Notify::new(),
        })
    }

    /// Enqueues `value` without waiting.
    ///
    /// Returns [`TrySendError::Full`] when the channel is at capacity.
    pub fn try_send(&self, value: T) -> Result<(), TrySendError<T>> {
        {
            let mut buf = self.lock();
            if buf.len() >= self.capacity {
                return Err(TrySendError::Full(value));
            }
            buf.push_back(value);
        }
        self.ready.notify_one();
        Ok(())
    }

    /// Takes the oldest message, waiting up to `timeout` for one to arrive.
    pub async fn recv_timeout(&self, timeout: Duration) -> Result<T, RecvTimeoutError> {
        tokio::time::timeout(timeout, self.recv())
            .await
            .map_err(|_| RecvTimeoutError { timeout })
    }

    /// Takes the oldest message, waiting as long as needed.
    async fn recv(&self) -> T {
        loop {
            let notified = self.ready.notified();
            tokio::pin!(notified);
            // Register before checking so a send between the check and the await is not lost.
            notified.as_mut().enable();

            if let Some(v) = self.lock().pop_front() {
                return v;
            }
            notified.await;
        }
    }

    /// Takes the oldest message if one is buffered.
    pub fn try_recv(&self) -> Option<T> {
        self.lock().pop_front()
    }

    /// Discards every buffered message; returns how many were dropped.
    pub fn reset(&self) -> usize {
        let mut buf = self.lock();
        let dropped = buf.len();
        buf.clear();
        dropped
    }

    /// Number of buffered messages.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// True if nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Maximum number of buffered messages.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<T>> {
        self.buf.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
