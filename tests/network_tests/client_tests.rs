//! Client Tests
//!
//! Tests verify:
//! - Connect/disconnect lifecycle and configuration errors
//! - Writing raw bytes and text
//! - write_and_wait: reply capture, timeout, single in-flight wait
//! - data-received observers

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam::channel::unbounded;
use linkwire::{Client, Config, Server, WireError};

// =============================================================================
// Helper Functions
// =============================================================================

const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

/// Server that echoes every payload back to its sender
fn echo_server() -> (Server, SocketAddr) {
    let mut server = Server::new(
        Config::builder()
            .address("127.0.0.1")
            .port(0)
            .poll_interval_ms(20)
            .build(),
    );
    server.on_data(|msg| {
        let _ = msg.reply(msg.payload());
    });
    server.start().unwrap();
    let addr = server.local_addr().unwrap();
    (server, addr)
}

/// Raw listener standing in for a server the test drives by hand
fn raw_peer() -> (TcpListener, u16) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    (listener, port)
}

fn connected_client(port: u16) -> Client {
    let mut client = Client::new(Config::builder().poll_interval_ms(20).build());
    client.connect_to("127.0.0.1", port).unwrap();
    client
}

fn accept(listener: &TcpListener) -> TcpStream {
    let (stream, _) = listener.accept().unwrap();
    stream.set_read_timeout(Some(EVENT_TIMEOUT)).unwrap();
    stream
}

// =============================================================================
// Lifecycle Tests
// =============================================================================

#[test]
fn test_connect_without_address_fails() {
    let mut client = Client::new(Config::builder().port(9000).build());
    assert!(matches!(client.connect(), Err(WireError::Config(_))));
    assert!(!client.is_connected());
}

#[test]
fn test_connect_with_zero_port_fails() {
    let mut client = Client::new(Config::builder().address("127.0.0.1").port(0).build());
    assert!(matches!(client.connect(), Err(WireError::Config(_))));

    let mut client = Client::new(Config::builder().address("127.0.0.1").build());
    assert!(matches!(client.connect(), Err(WireError::Config(_))));
}

#[test]
fn test_connect_refused_leaves_client_disconnected() {
    let (listener, port) = raw_peer();
    drop(listener);

    let mut client = Client::new(Config::default());
    let result = client.connect_to("127.0.0.1", port);

    assert!(matches!(result, Err(WireError::Connect { .. })));
    assert!(!client.is_connected());
    assert!(client.peer_addr().is_none());
}

#[test]
fn test_connect_is_idempotent() {
    let (listener, port) = raw_peer();
    let mut client = connected_client(port);
    let _peer = accept(&listener);
    let local = client.local_addr();

    client.connect().unwrap();
    client.connect_to("127.0.0.1", port).unwrap();

    assert!(client.is_connected());
    assert_eq!(client.local_addr(), local);
}

#[test]
fn test_address_and_port_locked_while_connected() {
    let (listener, port) = raw_peer();
    let mut client = connected_client(port);
    let _peer = accept(&listener);

    assert!(matches!(client.set_port(1), Err(WireError::Config(_))));
    assert!(matches!(client.set_address("example.org"), Err(WireError::Config(_))));

    client.disconnect();
    assert!(client.set_port(1).is_ok());
}

#[test]
fn test_disconnect_is_idempotent_and_closes_socket() {
    let (listener, port) = raw_peer();
    let mut client = connected_client(port);
    let mut peer = accept(&listener);

    client.disconnect();
    client.disconnect();
    assert!(!client.is_connected());

    let mut buf = [0u8; 4];
    assert_eq!(peer.read(&mut buf).unwrap_or(0), 0);
}

#[test]
fn test_reconnect_after_disconnect() {
    let (server, addr) = echo_server();
    let mut client = connected_client(addr.port());
    client.disconnect();

    client.connect().unwrap();
    assert!(client.is_connected());
    let reply = client.write_and_wait(b"again", EVENT_TIMEOUT).unwrap();
    assert_eq!(&reply[..], b"again");
    drop(server);
}

// =============================================================================
// Write Tests
// =============================================================================

#[test]
fn test_write_when_disconnected_fails() {
    let client = Client::new(Config::default());
    assert!(matches!(client.write(b"x"), Err(WireError::NotConnected)));
    assert!(matches!(client.write_text("x"), Err(WireError::NotConnected)));
    assert!(matches!(
        client.write_and_wait(b"x", Duration::from_millis(10)),
        Err(WireError::NotConnected)
    ));
}

#[test]
fn test_write_reaches_peer() {
    let (listener, port) = raw_peer();
    let client = connected_client(port);
    let mut peer = accept(&listener);

    client.write(b"raw").unwrap();
    client.write_text("+text").unwrap();

    let mut buf = [0u8; 8];
    peer.read_exact(&mut buf).unwrap();
    assert_eq!(&buf, b"raw+text");
}

// =============================================================================
// write_and_wait Tests
// =============================================================================

#[test]
fn test_write_and_wait_returns_reply() {
    let (_server, addr) = echo_server();
    let client = connected_client(addr.port());

    let reply = client.write_and_wait(b"PING", EVENT_TIMEOUT).unwrap();
    assert_eq!(&reply[..], b"PING");
}

#[test]
fn test_reply_is_not_passed_to_observers() {
    let (_server, addr) = echo_server();
    let client = connected_client(addr.port());
    let (tx, rx) = unbounded();
    client.on_data(move |msg| {
        let _ = tx.send(msg.payload().to_vec());
    });

    let reply = client.write_and_wait_text("hello", EVENT_TIMEOUT).unwrap();
    assert_eq!(reply, "hello");
    assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());

    // Outside a wait, data goes to observers again
    client.write_text("later").unwrap();
    assert_eq!(rx.recv_timeout(EVENT_TIMEOUT).unwrap(), b"later");
}

#[test]
fn test_write_and_wait_times_out_empty() {
    let (listener, port) = raw_peer();
    let client = connected_client(port);
    let _peer = accept(&listener);

    let start = Instant::now();
    let reply = client
        .write_and_wait(b"anyone?", Duration::from_millis(150))
        .unwrap();

    assert!(reply.is_empty());
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_millis(150));
    assert!(elapsed < Duration::from_secs(3));
}

#[test]
fn test_concurrent_write_and_wait_is_rejected() {
    let (listener, port) = raw_peer();
    let client = Arc::new(connected_client(port));
    let mut peer = accept(&listener);

    let waiter = Arc::clone(&client);
    let first = thread::spawn(move || waiter.write_and_wait(b"one", Duration::from_secs(5)));

    // Wait until the first request is on the wire, so its slot is armed
    let mut buf = [0u8; 3];
    peer.read_exact(&mut buf).unwrap();

    let second = client.write_and_wait(b"two", Duration::from_millis(50));
    assert!(matches!(second, Err(WireError::CorrelationBusy)));

    peer.write_all(b"reply").unwrap();
    let reply = first.join().unwrap().unwrap();
    assert_eq!(&reply[..], b"reply");
}

#[test]
fn test_sequential_requests_are_correlated() {
    let (_server, addr) = echo_server();
    let client = connected_client(addr.port());

    for i in 0..20 {
        let request = format!("req-{}", i);
        let reply = client.write_and_wait_text(&request, EVENT_TIMEOUT).unwrap();
        assert_eq!(reply, request);
    }
}

// =============================================================================
// Observer Tests
// =============================================================================

#[test]
fn test_client_receives_broadcast() {
    let (server, addr) = echo_server();
    let client = connected_client(addr.port());
    let (tx, rx) = unbounded();
    client.on_data(move |msg| {
        let _ = tx.send(msg.text().to_string());
    });

    let deadline = Instant::now() + EVENT_TIMEOUT;
    while server.connection_count() == 0 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(server.broadcast_text("news"), 1);

    assert_eq!(rx.recv_timeout(EVENT_TIMEOUT).unwrap(), "news");
}

#[test]
fn test_client_reply_goes_back_to_server() {
    let (listener, port) = raw_peer();
    let client = connected_client(port);
    client.on_data(|msg| {
        if msg.text() == "question" {
            msg.reply_text("answer").unwrap();
        }
    });
    let mut peer = accept(&listener);

    peer.write_all(b"question").unwrap();

    let mut buf = [0u8; 6];
    peer.read_exact(&mut buf).unwrap();
    assert_eq!(&buf, b"answer");
}
