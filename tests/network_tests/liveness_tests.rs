//! Liveness Tests
//!
//! Tests verify:
//! - A peer that vanishes is detected by polling, not by the reader
//! - The disconnected event fires exactly once per connection
//! - Continuous polling (interval 0) works
//! - The client detects a server that went away

use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam::channel::unbounded;
use linkwire::{Client, Config, ConnectionState, Server};

// =============================================================================
// Helper Functions
// =============================================================================

const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

fn start_server(poll_interval_ms: u64) -> (Server, SocketAddr) {
    let mut server = Server::new(
        Config::builder()
            .address("127.0.0.1")
            .port(0)
            .poll_interval_ms(poll_interval_ms)
            .build(),
    );
    server.start().unwrap();
    let addr = server.local_addr().unwrap();
    (server, addr)
}

fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

fn count_disconnects(server: &Server) -> Arc<AtomicUsize> {
    let count = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&count);
    server.on_disconnected(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    count
}

// =============================================================================
// Server-side Detection Tests
// =============================================================================

#[test]
fn test_dropped_peer_is_detected() {
    let (server, addr) = start_server(25);
    let disconnects = count_disconnects(&server);

    let stream = TcpStream::connect(addr).unwrap();
    assert!(wait_until(EVENT_TIMEOUT, || server.connection_count() == 1));
    let conn = server.connections().remove(0);

    drop(stream);

    assert!(wait_until(EVENT_TIMEOUT, || server.connection_count() == 0));
    assert!(wait_until(EVENT_TIMEOUT, || conn.state() == ConnectionState::Closed));

    thread::sleep(Duration::from_millis(100));
    assert_eq!(disconnects.load(Ordering::SeqCst), 1);
}

#[test]
fn test_only_dead_peer_is_removed() {
    let (server, addr) = start_server(25);
    let (tx, rx) = unbounded();
    server.on_disconnected(move |conn| {
        let _ = tx.send(conn.id());
    });

    let keep = TcpStream::connect(addr).unwrap();
    assert!(wait_until(EVENT_TIMEOUT, || server.connection_count() == 1));
    let kept_id = server.connections()[0].id();

    let leave = TcpStream::connect(addr).unwrap();
    assert!(wait_until(EVENT_TIMEOUT, || server.connection_count() == 2));

    drop(leave);

    let gone_id = rx.recv_timeout(EVENT_TIMEOUT).unwrap();
    assert_ne!(gone_id, kept_id);
    assert_eq!(server.connection_count(), 1);
    assert_eq!(server.connections()[0].id(), kept_id);
    drop(keep);
}

#[test]
fn test_continuous_polling_detects_disconnect() {
    let (server, addr) = start_server(0);
    let disconnects = count_disconnects(&server);

    let stream = TcpStream::connect(addr).unwrap();
    assert!(wait_until(EVENT_TIMEOUT, || server.connection_count() == 1));
    drop(stream);

    assert!(wait_until(EVENT_TIMEOUT, || disconnects.load(Ordering::SeqCst) == 1));
    assert_eq!(server.connection_count(), 0);
}

#[test]
fn test_idle_peer_stays_connected() {
    let (server, addr) = start_server(10);
    let disconnects = count_disconnects(&server);

    let _stream = TcpStream::connect(addr).unwrap();
    assert!(wait_until(EVENT_TIMEOUT, || server.connection_count() == 1));

    thread::sleep(Duration::from_millis(300));
    assert_eq!(server.connection_count(), 1);
    assert_eq!(disconnects.load(Ordering::SeqCst), 0);
}

#[test]
fn test_client_disconnect_is_seen_by_server() {
    let (server, addr) = start_server(25);
    let disconnects = count_disconnects(&server);

    let mut client = Client::new(Config::default());
    client.connect_to("127.0.0.1", addr.port()).unwrap();
    assert!(wait_until(EVENT_TIMEOUT, || server.connection_count() == 1));

    client.disconnect();

    assert!(wait_until(EVENT_TIMEOUT, || server.connection_count() == 0));
    assert!(wait_until(EVENT_TIMEOUT, || disconnects.load(Ordering::SeqCst) == 1));
}

// =============================================================================
// Client-side Detection Tests
// =============================================================================

#[test]
fn test_client_detects_server_stop() {
    let (mut server, addr) = start_server(25);

    let mut client = Client::new(Config::builder().poll_interval_ms(25).build());
    let disconnects = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&disconnects);
    client.on_disconnected(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    client.connect_to("127.0.0.1", addr.port()).unwrap();
    assert!(wait_until(EVENT_TIMEOUT, || server.connection_count() == 1));

    server.stop();

    assert!(wait_until(EVENT_TIMEOUT, || !client.is_connected()));
    client.disconnect();
    assert_eq!(disconnects.load(Ordering::SeqCst), 1);
}

#[test]
fn test_client_detects_dropped_raw_server() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    let mut client = Client::new(Config::builder().poll_interval_ms(25).build());
    client.connect_to("127.0.0.1", port).unwrap();
    let (peer, _) = listener.accept().unwrap();

    drop(peer);

    assert!(wait_until(EVENT_TIMEOUT, || !client.is_connected()));
    assert!(client.write(b"late").is_err());
}

#[test]
fn test_client_can_reconnect_after_server_restart() {
    let (mut server, addr) = start_server(25);

    let mut client = Client::new(Config::builder().poll_interval_ms(25).build());
    client.connect_to("127.0.0.1", addr.port()).unwrap();

    server.stop();
    assert!(wait_until(EVENT_TIMEOUT, || !client.is_connected()));

    server.start().unwrap();
    let new_port = server.local_addr().unwrap().port();
    client.set_port(new_port).unwrap();
    client.connect().unwrap();

    assert!(client.is_connected());
    assert!(wait_until(EVENT_TIMEOUT, || server.connection_count() == 1));
}
