//! Reply Correlator
//!
//! Couples a synchronous "write and wait" call to the next inbound read on
//! the same connection.
//!
//! ## Discipline
//! While a slot is armed, whatever the reader pulls off the socket next is
//! taken as the reply, solicited or not. This is only correct when the peer
//! never sends unsolicited data during the wait.

use bytes::Bytes;
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::time::Duration;

use crate::error::{Result, WireError};

/// Per-connection correlation slot
///
/// Holds at most one armed sender. The reader hands the next payload to it
/// instead of dispatching to observers.
#[derive(Default)]
pub struct ReplySlot {
    waiter: Mutex<Option<Sender<Bytes>>>,
}

/// An armed slot waiting for its payload
pub struct PendingReply<'a> {
    slot: &'a ReplySlot,
    receiver: Receiver<Bytes>,
}

impl ReplySlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm the slot. Fails if another caller already armed it.
    pub fn arm(&self) -> Result<PendingReply<'_>> {
        let mut waiter = self.waiter.lock();
        if waiter.is_some() {
            return Err(WireError::CorrelationBusy);
        }
        let (tx, rx) = channel::bounded(1);
        *waiter = Some(tx);
        Ok(PendingReply {
            slot: self,
            receiver: rx,
        })
    }

    /// Whether a caller is currently waiting
    pub fn is_armed(&self) -> bool {
        self.waiter.lock().is_some()
    }

    /// Offer an inbound payload.
    ///
    /// Returns `None` when the payload was captured as a reply, or hands it
    /// back for normal dispatch when nothing is armed.
    pub fn offer(&self, payload: Bytes) -> Option<Bytes> {
        let mut waiter = self.waiter.lock();
        match waiter.take() {
            // Sent under the lock so disarm() never races a half-done hand-off
            Some(tx) => match tx.try_send(payload) {
                Ok(()) => None,
                Err(e) => Some(e.into_inner()),
            },
            None => Some(payload),
        }
    }

    fn disarm(&self) {
        self.waiter.lock().take();
    }
}

impl PendingReply<'_> {
    /// Block until the reply arrives or `timeout` elapses.
    ///
    /// An empty `Bytes` means the wait timed out.
    pub fn wait(self, timeout: Duration) -> Bytes {
        match self.receiver.recv_timeout(timeout) {
            Ok(payload) => payload,
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                self.slot.disarm();
                // A reply may have landed between the timeout and disarm
                self.receiver.try_recv().unwrap_or_default()
            }
        }
    }
}

impl Drop for PendingReply<'_> {
    fn drop(&mut self) {
        self.slot.disarm();
    }
}
