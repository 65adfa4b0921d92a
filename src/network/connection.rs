//! Connection
//!
//! One established socket endpoint plus its lifecycle state.
//!
//! ## Lifecycle
//! ```text
//! Pending ──activate──▶ Active ──begin_close──▶ Closing ──release──▶ Closed
//! ```
//! Only one caller ever wins `begin_close`, which makes teardown
//! exactly-once no matter how many detectors notice the failure.

use std::fmt;
use std::io::{self, Read, Write};
use std::mem::MaybeUninit;
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::os::fd::{AsRawFd, RawFd};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use bytes::Bytes;
use parking_lot::Mutex;
use socket2::SockRef;

use super::correlator::ReplySlot;
use crate::codec::TextCodec;
use crate::config::Config;
use crate::error::{Result, WireError};

/// Pause between retries when a non-blocking send hits a full buffer
const SEND_RETRY_BACKOFF: Duration = Duration::from_millis(1);

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique connection identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }

    pub(crate) fn from_u64(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle state of a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Socket established, not yet registered
    Pending,

    /// Registered, reader running, eligible for sends and liveness checks
    Active,

    /// Disconnect detected, cleanup in progress
    Closing,

    /// Socket shut down and reader released (terminal)
    Closed,
}

/// Outcome of a non-blocking liveness probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    Alive,
    Gone,
}

/// An established TCP connection
pub struct Connection {
    id: ConnectionId,

    /// Display name derived from the remote address
    name: String,

    peer_addr: SocketAddr,

    stream: TcpStream,

    state: Mutex<ConnectionState>,

    /// Serializes writers so payloads never interleave on the wire
    write_lock: Mutex<()>,

    /// Dedicated reader thread (per-connection mode only)
    reader: Mutex<Option<JoinHandle<()>>>,

    /// Set while a read is outstanding on this socket
    read_in_flight: AtomicBool,

    reply_slot: ReplySlot,

    codec: TextCodec,

    write_timeout: Option<Duration>,
}

impl Connection {
    /// Wrap an established stream in a `Pending` connection
    ///
    /// Applies the socket options from `config`.
    pub fn establish(stream: TcpStream, peer_addr: SocketAddr, config: &Config) -> Result<Self> {
        stream.set_nodelay(config.tcp_nodelay)?;
        stream.set_write_timeout(config.write_timeout())?;

        Ok(Self {
            id: ConnectionId::next(),
            name: format!("Client{}", peer_addr.ip()),
            peer_addr,
            stream,
            state: Mutex::new(ConnectionState::Pending),
            write_lock: Mutex::new(()),
            reader: Mutex::new(None),
            read_in_flight: AtomicBool::new(false),
            reply_slot: ReplySlot::new(),
            codec: config.codec,
            write_timeout: config.write_timeout(),
        })
    }

    // =========================================================================
    // Identity
    // =========================================================================

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.stream.local_addr()?)
    }

    pub(crate) fn raw_fd(&self) -> RawFd {
        self.stream.as_raw_fd()
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    pub fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    pub fn is_active(&self) -> bool {
        self.state() == ConnectionState::Active
    }

    /// `Pending → Active`. Returns false from any other state.
    pub(crate) fn activate(&self) -> bool {
        let mut state = self.state.lock();
        if *state != ConnectionState::Pending {
            return false;
        }
        *state = ConnectionState::Active;
        true
    }

    /// `Pending | Active → Closing`. Exactly one caller gets `true`.
    pub(crate) fn begin_close(&self) -> bool {
        let mut state = self.state.lock();
        match *state {
            ConnectionState::Pending | ConnectionState::Active => {
                *state = ConnectionState::Closing;
                true
            }
            ConnectionState::Closing | ConnectionState::Closed => false,
        }
    }

    /// Shut the socket down, join the reader and mark the connection `Closed`
    ///
    /// Every step is best-effort. Shutting the socket down is what unblocks a
    /// reader parked in `read`; the join is skipped when called from that
    /// reader itself.
    pub(crate) fn release(&self) {
        if let Err(e) = self.stream.shutdown(Shutdown::Both) {
            tracing::debug!("Shutdown of {} ({}) failed: {}", self.name, self.id, e);
        }

        let reader = self.reader.lock().take();
        if let Some(handle) = reader {
            if handle.thread().id() != thread::current().id() && handle.join().is_err() {
                tracing::debug!("Reader thread for {} panicked", self.id);
            }
        }

        *self.state.lock() = ConnectionState::Closed;
    }

    /// Hand the dedicated reader thread to this connection
    ///
    /// The state is checked under the reader slot lock: `release` takes the
    /// slot only after `begin_close`, so a handle stored here is always seen
    /// by it, and a connection already closing joins the handle itself.
    pub(crate) fn attach_reader(&self, handle: JoinHandle<()>) {
        let mut slot = self.reader.lock();
        if self.state() == ConnectionState::Active {
            *slot = Some(handle);
            return;
        }
        drop(slot);

        // Teardown has begun; the socket is (or is about to be) shut down,
        // so the reader sees a non-active state and exits on its own
        if handle.thread().id() != thread::current().id() && handle.join().is_err() {
            tracing::debug!("Reader thread for {} panicked", self.id);
        }
    }

    // =========================================================================
    // Reading
    // =========================================================================

    /// Claim the single in-flight read slot for this connection
    pub(crate) fn begin_read(&self) -> Option<ReadGuard<'_>> {
        self.read_in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| ReadGuard { connection: self })
    }

    pub fn is_read_in_flight(&self) -> bool {
        self.read_in_flight.load(Ordering::Acquire)
    }

    pub(crate) fn set_nonblocking(&self, nonblocking: bool) -> Result<()> {
        self.stream.set_nonblocking(nonblocking)?;
        Ok(())
    }

    /// Probe the socket without blocking and without consuming data
    ///
    /// Readable with zero bytes available means the peer closed; a hard socket
    /// error means it is gone too.
    pub fn probe(&self) -> Liveness {
        if matches!(self.state(), ConnectionState::Closing | ConnectionState::Closed) {
            return Liveness::Gone;
        }

        let mut buf = [MaybeUninit::<u8>::uninit(); 1];
        let socket = SockRef::from(&self.stream);
        match socket.recv_with_flags(&mut buf, libc::MSG_PEEK | libc::MSG_DONTWAIT) {
            Ok(0) => Liveness::Gone,
            Ok(_) => Liveness::Alive,
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted) => {
                Liveness::Alive
            }
            Err(e) => {
                tracing::debug!("Liveness probe on {} failed: {}", self.id, e);
                Liveness::Gone
            }
        }
    }

    /// Route an inbound payload to a waiting `write_and_wait`, if any.
    /// Returns the payload when nobody is waiting.
    pub(crate) fn offer_reply(&self, payload: Bytes) -> Option<Bytes> {
        self.reply_slot.offer(payload)
    }

    // =========================================================================
    // Writing
    // =========================================================================

    /// Write raw bytes to the peer
    pub fn send(&self, data: &[u8]) -> Result<()> {
        if !self.is_active() {
            return Err(WireError::ConnectionClosed);
        }

        let _guard = self.write_lock.lock();
        self.write_all(data)?;
        Ok(())
    }

    /// Encode text with the session codec and write it to the peer
    pub fn send_text(&self, text: &str) -> Result<()> {
        self.send(&self.codec.encode(text))
    }

    /// Write `data`, then wait up to `timeout` for the next inbound payload
    ///
    /// Returns an empty `Bytes` on timeout. Only one call may wait per
    /// connection; a concurrent second call fails with `CorrelationBusy`.
    pub fn write_and_wait(&self, data: &[u8], timeout: Duration) -> Result<Bytes> {
        // Armed before the write so a fast reply cannot slip past
        let pending = self.reply_slot.arm()?;
        self.send(data)?;
        Ok(pending.wait(timeout))
    }

    /// Text variant of [`write_and_wait`](Self::write_and_wait)
    pub fn write_and_wait_text(&self, text: &str, timeout: Duration) -> Result<String> {
        let reply = self.write_and_wait(&self.codec.encode(text), timeout)?;
        Ok(self.codec.decode(&reply))
    }

    pub fn codec(&self) -> TextCodec {
        self.codec
    }

    /// `write_all` that tolerates a non-blocking socket
    fn write_all(&self, mut data: &[u8]) -> io::Result<()> {
        let started = Instant::now();
        let mut stream = &self.stream;

        while !data.is_empty() {
            match stream.write(data) {
                Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
                Ok(n) => data = &data[n..],
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    if let Some(limit) = self.write_timeout {
                        if started.elapsed() >= limit {
                            return Err(io::ErrorKind::TimedOut.into());
                        }
                    }
                    thread::sleep(SEND_RETRY_BACKOFF);
                }
                Err(e) => return Err(e),
            }
        }
        stream.flush()
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("peer_addr", &self.peer_addr)
            .field("state", &self.state())
            .finish()
    }
}

/// Exclusive right to read from a connection's socket
pub(crate) struct ReadGuard<'a> {
    connection: &'a Connection,
}

impl ReadGuard<'_> {
    /// Read up to `buf.len()` bytes
    pub(crate) fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        (&self.connection.stream).read(buf)
    }
}

impl Drop for ReadGuard<'_> {
    fn drop(&mut self) {
        self.connection.read_in_flight.store(false, Ordering::Release);
    }
}
