//! Bounded per-client outbox.
//!
//! The outbox is a thin wrapper over a bounded `tokio::sync::mpsc` channel.
//! Only non-blocking delivery is exposed on the sending side: a full outbox is
//! reported back to the caller instead of being waited on. Closing happens by
//! dropping the `Outbox`, so ownership guarantees it happens exactly once.

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// An opaque broadcast payload. Cloning is a reference-count bump.
pub type Payload = Bytes;

/// Why a non-blocking delivery did not happen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TryDeliverError {
    /// The outbox is at capacity.
    Full,
    /// The receiving session is gone.
    Closed,
}

#[derive(Debug)]
pub struct Outbox {
    tx: mpsc::Sender<Payload>,
    capacity: usize,
}

#[derive(Debug)]
pub struct OutboxReceiver {
    rx: mpsc::Receiver<Payload>,
}

/// Create an outbox holding at most `capacity` pending payloads.
///
/// # Panics
///
/// Panics if `capacity` is zero.
pub fn channel(capacity: usize) -> (Outbox, OutboxReceiver) {
    let (tx, rx) = mpsc::channel(capacity);
    (Outbox { tx, capacity }, OutboxReceiver { rx })
}

impl Outbox {
    pub fn try_deliver(&self, payload: Payload) -> Result<(), TryDeliverError> {
        self.tx.try_send(payload).map_err(|e| match e {
            TrySendError::Full(_) => TryDeliverError::Full,
            TrySendError::Closed(_) => TryDeliverError::Closed,
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of payloads waiting to be drained.
    pub fn pending(&self) -> usize {
        self.capacity - self.tx.capacity()
    }
}

impl OutboxReceiver {
    /// Wait for the next payload. `None` once the outbox is closed and drained.
    pub async fn recv(&mut self) -> Option<Payload> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Payload> {
        self.rx.try_recv().ok()
    }

    /// True once the hub has dropped the sending side.
    pub fn is_closed(&self) -> bool {
        self.rx.is_closed()
    }
}
