//! TCP Client
//!
//! Owns exactly one socket to a linkwire-style server, with its own reader
//! thread and liveness monitor, plus a synchronous request/reply helper.

use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;

use super::connection::Connection;
use super::events::{EventDispatcher, SubscriptionId};
use super::liveness::LivenessMonitor;
use super::message::Message;
use super::session::{ReadStrategy, Session};
use crate::config::Config;
use crate::error::{Result, WireError};

/// TCP client for linkwire
pub struct Client {
    config: Config,
    events: Arc<EventDispatcher>,

    /// Present between connect and disconnect
    link: Option<Link>,
}

/// One established connection and the threads serving it
struct Link {
    session: Arc<Session>,
    connection: Arc<Connection>,
    monitor: LivenessMonitor,
}

impl Client {
    /// Create a disconnected client
    pub fn new(config: Config) -> Self {
        Self {
            config,
            events: Arc::new(EventDispatcher::new()),
            link: None,
        }
    }

    // =========================================================================
    // Configuration
    // =========================================================================

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Set the remote host. Fails while connected.
    pub fn set_address(&mut self, address: impl Into<String>) -> Result<()> {
        if self.is_connected() {
            return Err(WireError::Config(
                "cannot change the client address while connected".to_string(),
            ));
        }
        self.config.address = Some(address.into());
        Ok(())
    }

    /// Set the remote port. Fails while connected.
    pub fn set_port(&mut self, port: u16) -> Result<()> {
        if self.is_connected() {
            return Err(WireError::Config(
                "cannot change the client port while connected".to_string(),
            ));
        }
        self.config.port = Some(port);
        Ok(())
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Connect to the configured address and port
    ///
    /// Does nothing if already connected. A connect failure leaves the
    /// client disconnected.
    pub fn connect(&mut self) -> Result<()> {
        if self.is_connected() {
            return Ok(());
        }
        // The monitor may have closed a previous link behind our back
        self.disconnect();

        let host = self
            .config
            .address
            .clone()
            .ok_or_else(|| WireError::Config("the hostname cannot be empty".to_string()))?;
        let port = match self.config.port {
            Some(port) if port > 0 => port,
            _ => return Err(WireError::Config("the port must be greater than 0".to_string())),
        };
        self.config.validate()?;

        let target = format!("{}:{}", host, port);
        let stream = TcpStream::connect((host.as_str(), port)).map_err(|source| WireError::Connect {
            addr: target.clone(),
            source,
        })?;
        let peer = stream.peer_addr()?;

        let session = Arc::new(Session::new(
            self.config.clone(),
            Arc::clone(&self.events),
            ReadStrategy::PerConnection,
        ));
        let connection = session.admit(stream, peer)?;
        let monitor = match LivenessMonitor::spawn_single(Arc::clone(&session)) {
            Ok(monitor) => monitor,
            Err(e) => {
                session.disconnect(&connection);
                return Err(e);
            }
        };

        tracing::info!("Connected to {} ({})", target, peer);
        self.link = Some(Link {
            session,
            connection,
            monitor,
        });
        Ok(())
    }

    /// Connect to `address:port`
    pub fn connect_to(&mut self, address: impl Into<String>, port: u16) -> Result<()> {
        if self.is_connected() {
            return Ok(());
        }
        self.config.address = Some(address.into());
        self.config.port = Some(port);
        self.connect()
    }

    /// Close the socket and release the reader and monitor threads.
    /// Does nothing if not connected.
    pub fn disconnect(&mut self) {
        let Some(link) = self.link.take() else {
            return;
        };

        link.monitor.stop();
        if link.session.disconnect(&link.connection) {
            tracing::info!("Disconnected from {}", link.connection.peer_addr());
        }
    }

    /// True while the socket is established and has not been found dead
    pub fn is_connected(&self) -> bool {
        self.link
            .as_ref()
            .is_some_and(|link| link.connection.is_active())
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.active_connection().map(|c| c.peer_addr())
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.active_connection().and_then(|c| c.local_addr().ok())
    }

    /// The underlying connection while connected
    pub fn connection(&self) -> Option<&Arc<Connection>> {
        self.active_connection()
    }

    fn active_connection(&self) -> Option<&Arc<Connection>> {
        self.link
            .as_ref()
            .map(|link| &link.connection)
            .filter(|c| c.is_active())
    }

    fn require_connection(&self) -> Result<&Arc<Connection>> {
        self.active_connection().ok_or(WireError::NotConnected)
    }

    // =========================================================================
    // Writing
    // =========================================================================

    pub fn write(&self, data: &[u8]) -> Result<()> {
        self.require_connection()?.send(data)
    }

    pub fn write_text(&self, text: &str) -> Result<()> {
        self.require_connection()?.send_text(text)
    }

    /// Write `data` and wait up to `timeout` for the next inbound payload
    ///
    /// Returns empty bytes on timeout. The reply is not passed to
    /// `data-received` observers.
    pub fn write_and_wait(&self, data: &[u8], timeout: Duration) -> Result<Bytes> {
        self.require_connection()?.write_and_wait(data, timeout)
    }

    /// Text variant of [`write_and_wait`](Self::write_and_wait); an empty
    /// string means the wait timed out
    pub fn write_and_wait_text(&self, text: &str, timeout: Duration) -> Result<String> {
        self.require_connection()?.write_and_wait_text(text, timeout)
    }

    // =========================================================================
    // Events
    // =========================================================================

    pub fn on_data<F>(&self, observer: F) -> SubscriptionId
    where
        F: Fn(&Message) + Send + Sync + 'static,
    {
        self.events.on_data(observer)
    }

    pub fn on_connected<F>(&self, observer: F) -> SubscriptionId
    where
        F: Fn(&Arc<Connection>) + Send + Sync + 'static,
    {
        self.events.on_connected(observer)
    }

    /// Fires on a clean `disconnect()` and when the liveness monitor finds
    /// the server gone
    pub fn on_disconnected<F>(&self, observer: F) -> SubscriptionId
    where
        F: Fn(&Arc<Connection>) + Send + Sync + 'static,
    {
        self.events.on_disconnected(observer)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.events.unsubscribe(id)
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.disconnect();
    }
}
