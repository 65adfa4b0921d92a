//! TCP Server
//!
//! Accepts many concurrent client connections, reads from each, watches
//! them for silent disconnects and broadcasts to all of them.
//!
//! ## Threads per run
//! - one acceptor
//! - one liveness monitor
//! - one reader per connection, or one shared multiplexed reader

use std::net::{IpAddr, SocketAddr, TcpListener};
use std::sync::Arc;

use super::acceptor::Acceptor;
use super::connection::{Connection, ConnectionId};
use super::events::{EventDispatcher, SubscriptionId};
use super::liveness::LivenessMonitor;
use super::message::Message;
use super::reader::MultiplexedReader;
use super::session::{ReadStrategy, Session};
use crate::config::{Config, ReadMode};
use crate::error::{Result, WireError};

/// TCP server for linkwire
pub struct Server {
    config: Config,

    /// Observers survive stop/start cycles
    events: Arc<EventDispatcher>,

    /// Present while started
    running: Option<RunningServer>,
}

/// Everything owned by one started run
struct RunningServer {
    session: Arc<Session>,
    acceptor: Acceptor,
    monitor: LivenessMonitor,
    multiplexer: Option<MultiplexedReader>,
}

impl Server {
    /// Create a stopped server with the given config
    pub fn new(config: Config) -> Self {
        Self {
            config,
            events: Arc::new(EventDispatcher::new()),
            running: None,
        }
    }

    // =========================================================================
    // Configuration
    // =========================================================================

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Set the listen IP. Fails while started.
    pub fn set_address(&mut self, address: impl Into<String>) -> Result<()> {
        if self.is_running() {
            return Err(WireError::Config(
                "cannot change the server address while it is started".to_string(),
            ));
        }
        self.config.address = Some(address.into());
        Ok(())
    }

    /// Set the listen port. Fails while started.
    pub fn set_port(&mut self, port: u16) -> Result<()> {
        if self.is_running() {
            return Err(WireError::Config(
                "cannot change the server port while it is started".to_string(),
            ));
        }
        self.config.port = Some(port);
        Ok(())
    }

    /// Replace the receive/liveness knobs; takes effect on the next start.
    /// Fails while started.
    pub fn set_config(&mut self, config: Config) -> Result<()> {
        if self.is_running() {
            return Err(WireError::Config(
                "cannot replace the server config while it is started".to_string(),
            ));
        }
        self.config = config;
        Ok(())
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Start listening on the configured address and port
    ///
    /// Does nothing if already started. A bind failure leaves the server
    /// stopped.
    pub fn start(&mut self) -> Result<()> {
        if self.is_running() {
            return Ok(());
        }

        let port = self
            .config
            .port
            .ok_or_else(|| WireError::Config("can't start server without a port".to_string()))?;
        let address = self
            .config
            .address
            .as_deref()
            .ok_or_else(|| WireError::Config("can't start server without an IP".to_string()))?;
        let ip: IpAddr = address
            .parse()
            .map_err(|_| WireError::Config(format!("invalid listen IP: {}", address)))?;
        self.config.validate()?;

        let addr = SocketAddr::new(ip, port);
        let listener = TcpListener::bind(addr).map_err(|source| WireError::Bind {
            addr: addr.to_string(),
            source,
        })?;

        self.running = Some(self.launch(listener)?);
        tracing::info!("Server listening on {}", self.local_addr().unwrap_or(addr));
        Ok(())
    }

    /// Start on `port`, keeping the configured address
    pub fn start_on(&mut self, port: u16) -> Result<()> {
        if self.is_running() {
            return Ok(());
        }
        self.config.port = Some(port);
        self.start()
    }

    /// Start on `address:port`
    pub fn start_at(&mut self, address: impl Into<String>, port: u16) -> Result<()> {
        if self.is_running() {
            return Ok(());
        }
        self.config.address = Some(address.into());
        self.config.port = Some(port);
        self.start()
    }

    fn launch(&self, listener: TcpListener) -> Result<RunningServer> {
        let (strategy, poll) = match self.config.read_mode {
            ReadMode::PerConnection => (ReadStrategy::PerConnection, None),
            ReadMode::Multiplexed => {
                let (poll, registry) = MultiplexedReader::poller()?;
                (ReadStrategy::Multiplexed(registry), Some(poll))
            }
        };

        let session = Arc::new(Session::new(
            self.config.clone(),
            Arc::clone(&self.events),
            strategy,
        ));

        // Readers first, so nothing accepted is left without one
        let multiplexer = match poll {
            Some(poll) => Some(MultiplexedReader::spawn(poll, Arc::clone(&session))?),
            None => None,
        };
        let monitor = LivenessMonitor::spawn(Arc::clone(&session))?;
        let acceptor = Acceptor::spawn(listener, Arc::clone(&session))?;

        Ok(RunningServer {
            session,
            acceptor,
            monitor,
            multiplexer,
        })
    }

    /// Stop the server: close the listener and every connection, release
    /// all threads. Does nothing if not started.
    pub fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };

        running.acceptor.stop();
        running.monitor.stop();
        if let Some(multiplexer) = running.multiplexer {
            multiplexer.stop();
        }

        let closed = running.session.disconnect_all();
        running.session.registry.drain();

        tracing::info!("Server stopped, {} connection(s) closed", closed);
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Address actually bound, useful when started on port 0
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running.as_ref().map(|r| r.acceptor.local_addr())
    }

    // =========================================================================
    // Connections
    // =========================================================================

    pub fn connection_count(&self) -> usize {
        self.running
            .as_ref()
            .map_or(0, |r| r.session.registry.len())
    }

    /// Snapshot of the connected clients
    pub fn connections(&self) -> Vec<Arc<Connection>> {
        self.running
            .as_ref()
            .map_or_else(Vec::new, |r| r.session.registry.snapshot())
    }

    pub fn connection(&self, id: ConnectionId) -> Option<Arc<Connection>> {
        self.running.as_ref()?.session.registry.get(id)
    }

    /// Close one connection through the regular disconnect path
    pub fn disconnect(&self, id: ConnectionId) -> bool {
        let Some(running) = self.running.as_ref() else {
            return false;
        };
        match running.session.registry.get(id) {
            Some(connection) => running.session.disconnect(&connection),
            None => false,
        }
    }

    /// Send `data` to every connected client. Best-effort; returns how many
    /// sends succeeded.
    ///
    /// Sends run one after another on the calling thread. A peer that stops
    /// reading holds the broadcast up for at most `write_timeout_ms` before
    /// it is skipped; with a timeout of 0 it can block every later send.
    pub fn broadcast(&self, data: &[u8]) -> usize {
        let mut delivered = 0;
        for connection in self.connections() {
            match connection.send(data) {
                Ok(()) => delivered += 1,
                Err(e) => tracing::debug!("Broadcast to {} failed: {}", connection.id(), e),
            }
        }
        delivered
    }

    /// Encode `text` with the configured codec and broadcast it
    pub fn broadcast_text(&self, text: &str) -> usize {
        self.broadcast(&self.config.codec.encode(text))
    }

    // =========================================================================
    // Events
    // =========================================================================

    pub fn on_connected<F>(&self, observer: F) -> SubscriptionId
    where
        F: Fn(&Arc<Connection>) + Send + Sync + 'static,
    {
        self.events.on_connected(observer)
    }

    pub fn on_disconnected<F>(&self, observer: F) -> SubscriptionId
    where
        F: Fn(&Arc<Connection>) + Send + Sync + 'static,
    {
        self.events.on_disconnected(observer)
    }

    pub fn on_data<F>(&self, observer: F) -> SubscriptionId
    where
        F: Fn(&Message) + Send + Sync + 'static,
    {
        self.events.on_data(observer)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.events.unsubscribe(id)
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.stop();
    }
}
