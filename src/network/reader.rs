//! Reader
//!
//! Pulls bytes off connection sockets and hands them to the session.
//!
//! ## Modes
//! - **Per-connection**: one blocking thread per connection. A zero-byte
//!   read is ignored; disconnect detection belongs to the liveness monitor.
//! - **Multiplexed**: one thread waits for readiness on every registered
//!   socket and drains whichever become readable.
//!
//! Either way a socket has a single reader, so payloads reach observers in
//! wire order.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use mio::{Events, Poll, Token, Waker};

use super::connection::{Connection, ConnectionId};
use super::session::Session;
use crate::error::Result;

/// Pause after a zero-byte read before trying again
const IDLE_READ_BACKOFF: Duration = Duration::from_millis(1);

/// Token reserved for waking the multiplexed reader
const WAKE_TOKEN: Token = Token(0);

/// Readiness events fetched per poll
const EVENTS_CAPACITY: usize = 1024;

// =============================================================================
// Per-connection Mode
// =============================================================================

pub(crate) fn spawn_blocking_reader(
    session: Arc<Session>,
    connection: Arc<Connection>,
) -> Result<JoinHandle<()>> {
    let handle = thread::Builder::new()
        .name(format!("linkwire-reader-{}", connection.id().as_u64()))
        .spawn(move || read_blocking(&session, &connection))?;
    Ok(handle)
}

fn read_blocking(session: &Session, connection: &Arc<Connection>) {
    let packet_size = session.config.packet_size;

    while connection.is_active() {
        let Some(guard) = connection.begin_read() else {
            tracing::warn!("Read already in flight on {}, reader exiting", connection.id());
            return;
        };

        let mut buf = vec![0u8; packet_size];
        let result = guard.read(&mut buf);
        drop(guard);

        match result {
            Ok(0) => thread::sleep(IDLE_READ_BACKOFF),
            Ok(n) => session.deliver(connection, buf, n),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => {
                if connection.is_active() {
                    tracing::warn!("Read from {} failed: {}", connection.id(), e);
                    session.disconnect(connection);
                }
                return;
            }
        }
    }

    tracing::trace!("Reader for {} exiting", connection.id());
}

// =============================================================================
// Multiplexed Mode
// =============================================================================

/// Single shared reader thread driven by readiness events
pub struct MultiplexedReader {
    waker: Waker,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl MultiplexedReader {
    /// Create the poller. The returned registry is what the session uses to
    /// register and deregister sockets.
    pub(crate) fn poller() -> Result<(Poll, mio::Registry)> {
        let poll = Poll::new()?;
        let registry = poll.registry().try_clone()?;
        Ok((poll, registry))
    }

    pub(crate) fn spawn(poll: Poll, session: Arc<Session>) -> Result<Self> {
        let waker = Waker::new(poll.registry(), WAKE_TOKEN)?;
        let stop = Arc::new(AtomicBool::new(false));

        let thread_stop = Arc::clone(&stop);
        let handle = thread::Builder::new()
            .name("linkwire-mux-reader".to_string())
            .spawn(move || run_multiplexed(poll, &session, &thread_stop))?;

        Ok(Self {
            waker,
            stop,
            handle: Some(handle),
        })
    }

    /// Signal the reader thread and wait for it to exit
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Err(e) = self.waker.wake() {
            tracing::debug!("Waking multiplexed reader failed: {}", e);
        }
        if let Some(handle) = self.handle.take() {
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }
    }
}

impl Drop for MultiplexedReader {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.shutdown();
        }
    }
}

fn run_multiplexed(mut poll: Poll, session: &Session, stop: &AtomicBool) {
    let mut events = Events::with_capacity(EVENTS_CAPACITY);

    while !stop.load(Ordering::Acquire) {
        if let Err(e) = poll.poll(&mut events, None) {
            if e.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            tracing::error!("Readiness poll failed, multiplexed reader exiting: {}", e);
            return;
        }

        for event in events.iter() {
            if event.token() == WAKE_TOKEN {
                continue;
            }
            let id = ConnectionId::from_u64(event.token().0 as u64);
            if let Some(connection) = session.registry.get(id) {
                drain(session, &connection);
            }
        }
    }

    tracing::trace!("Multiplexed reader exiting");
}

/// Read everything currently buffered on a ready socket
///
/// Each successful read becomes its own delivery, as in per-connection mode.
/// End of stream is left for the liveness monitor.
fn drain(session: &Session, connection: &Arc<Connection>) {
    let Some(guard) = connection.begin_read() else {
        return;
    };

    loop {
        let mut buf = vec![0u8; session.config.packet_size];
        match guard.read(&mut buf) {
            Ok(0) => return,
            Ok(n) => session.deliver(connection, buf, n),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return,
            Err(e) => {
                drop(guard);
                if connection.is_active() {
                    tracing::warn!("Read from {} failed: {}", connection.id(), e);
                    session.disconnect(connection);
                }
                return;
            }
        }
    }
}
