//! Liveness Monitor
//!
//! TCP gives no notification when a peer dies without a clean close, so a
//! dedicated thread periodically probes every registered socket and runs
//! disconnect cleanup for the ones that are gone.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};

use super::connection::Liveness;
use super::session::Session;
use crate::error::Result;

/// Background probe loop over a session's registry
pub struct LivenessMonitor {
    /// Dropping the sender wakes the monitor out of its sleep
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl LivenessMonitor {
    pub(crate) fn spawn(session: Arc<Session>) -> Result<Self> {
        Self::start(session, Until::Stopped)
    }

    /// Monitor for a session that owns a single connection. The thread ends
    /// on its own once that connection has been closed.
    pub(crate) fn spawn_single(session: Arc<Session>) -> Result<Self> {
        Self::start(session, Until::Empty)
    }

    fn start(session: Arc<Session>, until: Until) -> Result<Self> {
        let (stop_tx, stop_rx) = channel::bounded::<()>(0);
        let interval = session.config.poll_interval();

        let handle = thread::Builder::new()
            .name("linkwire-liveness".to_string())
            .spawn(move || run(&session, interval, until, &stop_rx))?;

        Ok(Self {
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        })
    }

    /// Stop probing and wait for the thread to exit
    ///
    /// Safe to call from the monitor's own thread (for instance from a
    /// `disconnected` observer); the join is skipped there.
    pub fn stop(mut self) {
        self.shutdown();
    }

    /// True once the monitor thread has exited
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, |h| h.is_finished())
    }

    fn shutdown(&mut self) {
        self.stop_tx.take();
        if let Some(handle) = self.handle.take() {
            if handle.thread().id() != thread::current().id() && handle.join().is_err() {
                tracing::warn!("Liveness monitor thread panicked");
            }
        }
    }
}

impl Drop for LivenessMonitor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// When the monitor ends without being told to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Until {
    Stopped,
    Empty,
}

fn run(session: &Session, interval: Duration, until: Until, stop_rx: &Receiver<()>) {
    tracing::debug!("Liveness monitor started (interval {:?})", interval);

    loop {
        scan(session);
        if until == Until::Empty && session.registry.is_empty() {
            tracing::debug!("Nothing left to probe");
            break;
        }

        let stopped = if interval.is_zero() {
            matches!(stop_rx.try_recv(), Err(TryRecvError::Disconnected) | Ok(()))
        } else {
            !matches!(stop_rx.recv_timeout(interval), Err(RecvTimeoutError::Timeout))
        };
        if stopped {
            break;
        }
        if interval.is_zero() {
            thread::yield_now();
        }
    }

    tracing::debug!("Liveness monitor stopped");
}

/// Probe one snapshot of the registry
fn scan(session: &Session) -> usize {
    let mut closed = 0;
    for connection in session.registry.snapshot() {
        if connection.probe() == Liveness::Gone {
            tracing::debug!(
                "Liveness probe: {} ({}) is gone",
                connection.id(),
                connection.name()
            );
            if session.disconnect(&connection) {
                closed += 1;
            }
        }
    }
    closed
}
