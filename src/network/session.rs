//! Session
//!
//! State shared by every thread of one server run or one client connection:
//! the configuration snapshot, the registry, the observers, and how readers
//! are attached. Admission, delivery and teardown all live here so the
//! acceptor, readers and liveness monitor agree on one ordering.

use std::io;
use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;

use bytes::Bytes;
use mio::unix::SourceFd;
use mio::{Interest, Token};

use super::connection::{Connection, ConnectionId};
use super::events::EventDispatcher;
use super::message::Message;
use super::reader;
use super::registry::ConnectionRegistry;
use crate::codec::trim_trailing_zeros;
use crate::config::Config;
use crate::error::{Result, WireError};

/// How a newly admitted connection gets its reader
pub(crate) enum ReadStrategy {
    /// Spawn a dedicated blocking reader thread
    PerConnection,

    /// Register the socket with the shared readiness poller
    Multiplexed(mio::Registry),
}

pub(crate) struct Session {
    pub(crate) config: Config,
    pub(crate) registry: ConnectionRegistry,
    pub(crate) events: Arc<EventDispatcher>,
    strategy: ReadStrategy,
}

impl Session {
    pub(crate) fn new(config: Config, events: Arc<EventDispatcher>, strategy: ReadStrategy) -> Self {
        Self {
            config,
            registry: ConnectionRegistry::new(),
            events,
            strategy,
        }
    }

    // =========================================================================
    // Admission
    // =========================================================================

    /// Turn an established stream into an `Active`, registered connection
    ///
    /// Order: register while `Pending`, activate, start the reader, fire
    /// `connected`.
    pub(crate) fn admit(self: &Arc<Self>, stream: TcpStream, peer: SocketAddr) -> Result<Arc<Connection>> {
        let connection = Arc::new(Connection::establish(stream, peer, &self.config)?);
        if !self.registry.insert(Arc::clone(&connection)) || !connection.activate() {
            self.registry.remove(connection.id());
            connection.begin_close();
            connection.release();
            return Err(WireError::ConnectionClosed);
        }

        if let Err(e) = self.start_reader(&connection) {
            self.registry.remove(connection.id());
            connection.begin_close();
            connection.release();
            return Err(e);
        }

        tracing::debug!(
            "Connection {} established with {} ({})",
            connection.id(),
            connection.name(),
            connection.peer_addr()
        );
        self.events.fire_connected(&connection);
        Ok(connection)
    }

    fn start_reader(self: &Arc<Self>, connection: &Arc<Connection>) -> Result<()> {
        match &self.strategy {
            ReadStrategy::PerConnection => {
                let handle = reader::spawn_blocking_reader(Arc::clone(self), Arc::clone(connection))?;
                connection.attach_reader(handle);
            }
            ReadStrategy::Multiplexed(registry) => {
                connection.set_nonblocking(true)?;
                registry.register(
                    &mut SourceFd(&connection.raw_fd()),
                    token_for(connection.id())?,
                    Interest::READABLE,
                )?;
            }
        }
        Ok(())
    }

    // =========================================================================
    // Delivery
    // =========================================================================

    /// Process one completed read of `len` bytes into `buf`
    ///
    /// `buf` is the full zero-initialised receive buffer. With trimming on,
    /// the zero padding is stripped; with it off, the full buffer is
    /// delivered. A waiting `write_and_wait` takes the payload before any
    /// observer sees it.
    pub(crate) fn deliver(&self, connection: &Arc<Connection>, mut buf: Vec<u8>, len: usize) {
        if self.config.trim_trailing_zeros {
            trim_trailing_zeros(&mut buf);
        }
        tracing::trace!(
            "Read {} bytes from {}, delivering {}",
            len,
            connection.id(),
            buf.len()
        );

        let payload = Bytes::from(buf);
        if let Some(payload) = connection.offer_reply(payload) {
            let message = Message::new(payload, Arc::clone(connection));
            self.events.fire_data(&message);
        }
    }

    // =========================================================================
    // Teardown
    // =========================================================================

    /// Close a connection exactly once
    ///
    /// Whichever detector calls this first (liveness probe, read failure,
    /// explicit stop) performs the cleanup; later calls return false.
    pub(crate) fn disconnect(&self, connection: &Arc<Connection>) -> bool {
        if !connection.begin_close() {
            return false;
        }

        self.registry.remove(connection.id());
        self.events.fire_disconnected(connection);

        if let ReadStrategy::Multiplexed(registry) = &self.strategy {
            if let Err(e) = registry.deregister(&mut SourceFd(&connection.raw_fd())) {
                tracing::debug!("Deregistering {} failed: {}", connection.id(), e);
            }
        }
        connection.release();

        tracing::debug!("Connection {} ({}) closed", connection.id(), connection.name());
        true
    }

    /// Close every registered connection
    pub(crate) fn disconnect_all(&self) -> usize {
        self.registry
            .snapshot()
            .iter()
            .filter(|c| self.disconnect(c))
            .count()
    }
}

/// Readiness token for a connection id
///
/// Ids start at 1, so a token never collides with the reader's waker at 0.
/// An id that does not fit in `usize` cannot be registered.
pub(crate) fn token_for(id: ConnectionId) -> Result<Token> {
    usize::try_from(id.as_u64()).map(Token).map_err(|_| {
        WireError::Io(io::Error::new(
            io::ErrorKind::Other,
            format!("connection id {} exceeds the readiness token range", id),
        ))
    })
}
