//! Acceptor
//!
//! Blocks on the listening socket and admits every incoming connection.
//! Stopping closes the listener to fail the pending `accept`; the thread is
//! never killed.

use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use socket2::SockRef;

use super::session::Session;
use crate::error::Result;

/// Pause after a failed accept so a persistent error (e.g. fd exhaustion)
/// does not spin
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(10);

/// How long the wake-up connection in `stop` may take
const WAKE_CONNECT_TIMEOUT: Duration = Duration::from_secs(1);

/// Accept loop running on its own thread
pub struct Acceptor {
    listener: Arc<TcpListener>,
    local_addr: SocketAddr,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Acceptor {
    pub(crate) fn spawn(listener: TcpListener, session: Arc<Session>) -> Result<Self> {
        let local_addr = listener.local_addr()?;
        let listener = Arc::new(listener);
        let stop = Arc::new(AtomicBool::new(false));

        let thread_listener = Arc::clone(&listener);
        let thread_stop = Arc::clone(&stop);
        let handle = thread::Builder::new()
            .name("linkwire-acceptor".to_string())
            .spawn(move || accept_loop(&thread_listener, &session, &thread_stop))?;

        Ok(Self {
            listener,
            local_addr,
            stop,
            handle: Some(handle),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Close the listener and join the accept thread
    pub fn stop(mut self) {
        self.stop.store(true, Ordering::Release);

        // Shutting down a listening socket fails a blocked accept on Linux.
        // Elsewhere fall back to a throwaway connection to wake it.
        if let Err(e) = SockRef::from(&*self.listener).shutdown(Shutdown::Both) {
            tracing::debug!("Listener shutdown failed ({}), waking acceptor by connecting", e);
            let target = wake_target(self.local_addr);
            if let Err(e) = TcpStream::connect_timeout(&target, WAKE_CONNECT_TIMEOUT) {
                tracing::warn!("Could not wake acceptor on {}: {}", target, e);
            }
        }

        if let Some(handle) = self.handle.take() {
            if handle.thread().id() != thread::current().id() && handle.join().is_err() {
                tracing::warn!("Acceptor thread panicked");
            }
        }
    }
}

fn accept_loop(listener: &TcpListener, session: &Arc<Session>, stop: &AtomicBool) {
    tracing::debug!("Acceptor listening on {:?}", listener.local_addr());

    loop {
        match listener.accept() {
            Ok((stream, peer)) => {
                if stop.load(Ordering::Acquire) {
                    break;
                }
                if let Err(e) = session.admit(stream, peer) {
                    tracing::warn!("Failed to admit connection from {}: {}", peer, e);
                }
            }
            Err(e) => {
                if stop.load(Ordering::Acquire) {
                    break;
                }
                if e.kind() != io::ErrorKind::Interrupted {
                    tracing::warn!("Accept failed: {}", e);
                    thread::sleep(ACCEPT_ERROR_BACKOFF);
                }
            }
        }
    }

    tracing::debug!("Acceptor stopped");
}

/// Address to connect to when waking a listener bound to a wildcard IP
fn wake_target(local: SocketAddr) -> SocketAddr {
    let ip = match local.ip() {
        IpAddr::V4(ip) if ip.is_unspecified() => IpAddr::V4(Ipv4Addr::LOCALHOST),
        IpAddr::V6(ip) if ip.is_unspecified() => IpAddr::V6(Ipv6Addr::LOCALHOST),
        ip => ip,
    };
    SocketAddr::new(ip, local.port())
}
