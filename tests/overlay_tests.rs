//! Overlay Integration Tests
//!
//! Loopback client/server scenarios exercising the full overlay
//! surface: lifecycle, handle recycling, byte transfer, broadcast,
//! and the accept loop.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::thread;

use tether::{Acceptor, Config, Overlay, Target, TetherError};

/// Overlay bound to an ephemeral loopback port, already listening
fn listening_overlay(backlog: u32) -> Arc<Overlay> {
    let config = Config::builder().max_simultaneous(backlog).build();
    let overlay = Arc::new(Overlay::new(config).unwrap());

    overlay.configure_local(0);
    overlay.bind().unwrap();
    overlay.listen().unwrap();
    overlay
}

/// The kernel-assigned port of a bound overlay
fn bound_port(overlay: &Overlay) -> u16 {
    overlay.local_endpoint().unwrap().port()
}

// =============================================================================
// Lifecycle
// =============================================================================

#[test]
fn test_bind_without_local_endpoint() {
    let overlay = Overlay::new(Config::default()).unwrap();

    let err = overlay.bind().unwrap_err();
    assert!(matches!(err, TetherError::MissingEndpoint("local")));
}

#[test]
fn test_connect_without_remote_endpoint() {
    let overlay = Overlay::new(Config::default()).unwrap();

    let err = overlay.connect().unwrap_err();
    assert!(matches!(err, TetherError::MissingEndpoint("remote")));
}

#[test]
fn test_configure_remote_rejects_invalid_address() {
    let overlay = Overlay::new(Config::default()).unwrap();

    let err = overlay.configure_remote("not-an-address", 9000).unwrap_err();
    assert!(matches!(err, TetherError::InvalidAddress(_)));
}

#[test]
fn test_bind_reports_assigned_port() {
    let overlay = listening_overlay(10);

    // Port 0 was requested; the endpoint now carries the real port.
    assert_ne!(bound_port(&overlay), 0);
}

// =============================================================================
// Handle Assignment and Recycling
// =============================================================================

#[test]
fn test_handle_recycling_scenario() {
    // Server with backlog 10; three clients connect sequentially.
    let overlay = listening_overlay(10);
    let port = bound_port(&overlay);

    let _c0 = TcpStream::connect(("127.0.0.1", port)).unwrap();
    let _c1 = TcpStream::connect(("127.0.0.1", port)).unwrap();
    let _c2 = TcpStream::connect(("127.0.0.1", port)).unwrap();

    let h0 = overlay.accept().unwrap();
    let h1 = overlay.accept().unwrap();
    let h2 = overlay.accept().unwrap();

    assert_eq!(h0.index(), 0);
    assert_eq!(h1.index(), 1);
    assert_eq!(h2.index(), 2);

    // The peer at handle 1 disconnects and is released.
    overlay.release(h1.into()).unwrap();
    assert_eq!(overlay.handles(), vec![h0, h2]);

    // A fourth client gets the recycled handle, not a new one.
    let _c3 = TcpStream::connect(("127.0.0.1", port)).unwrap();
    let h3 = overlay.accept().unwrap();

    assert_eq!(h3.index(), 1);
    assert_eq!(overlay.size(), 3);
}

#[test]
fn test_accept_records_peer_endpoint() {
    let overlay = listening_overlay(10);
    let port = bound_port(&overlay);

    assert!(overlay.remote_endpoint().is_none());

    let _client = TcpStream::connect(("127.0.0.1", port)).unwrap();
    overlay.accept().unwrap();

    let peer = overlay.remote_endpoint().unwrap();
    assert_eq!(peer.ip(), std::net::Ipv4Addr::new(127, 0, 0, 1));
}

// =============================================================================
// Send and Receive
// =============================================================================

#[test]
fn test_send_receive_round_trip() {
    let overlay = listening_overlay(10);
    let port = bound_port(&overlay);

    let mut client = TcpStream::connect(("127.0.0.1", port)).unwrap();
    let handle = overlay.accept().unwrap();

    client.write_all(b"hello overlay").unwrap();
    let request = overlay.receive(handle.into(), 64).unwrap();
    assert_eq!(&request[..], b"hello overlay");

    overlay.send(handle.into(), b"pong").unwrap();
    let mut buf = [0u8; 16];
    let n = client.read(&mut buf).unwrap();
    assert_eq!(&buf[..n], b"pong");
}

#[test]
fn test_binary_payload_round_trip() {
    let overlay = listening_overlay(10);
    let port = bound_port(&overlay);

    let mut client = TcpStream::connect(("127.0.0.1", port)).unwrap();
    let handle = overlay.accept().unwrap();

    // Embedded zero bytes survive the transfer intact.
    let payload = b"bin\0ary\0bytes";
    client.write_all(payload).unwrap();

    let received = overlay.receive(handle.into(), payload.len() + 1).unwrap();
    assert_eq!(&received[..], payload);
}

#[test]
fn test_receive_overflow_boundary() {
    let overlay = listening_overlay(10);
    let port = bound_port(&overlay);

    let mut client = TcpStream::connect(("127.0.0.1", port)).unwrap();
    let handle = overlay.accept().unwrap();

    // A read that fills the whole buffer is an overflow, strictly >=.
    client.write_all(b"12345678").unwrap();
    let err = overlay.receive(handle.into(), 8).unwrap_err();
    assert!(matches!(err, TetherError::ReceiveOverflow { capacity: 8 }));

    // One spare byte of capacity is enough.
    client.write_all(b"12345678").unwrap();
    let payload = overlay.receive(handle.into(), 9).unwrap();
    assert_eq!(&payload[..], b"12345678");

    // A zero-capacity buffer can never hold anything.
    let err = overlay.receive(handle.into(), 0).unwrap_err();
    assert!(matches!(err, TetherError::ReceiveOverflow { capacity: 0 }));
}

#[test]
fn test_receive_empty_after_peer_shutdown() {
    let overlay = listening_overlay(10);
    let port = bound_port(&overlay);

    let client = TcpStream::connect(("127.0.0.1", port)).unwrap();
    let handle = overlay.accept().unwrap();

    drop(client);
    let payload = overlay.receive(handle.into(), 16).unwrap();
    assert!(payload.is_empty());
}

#[test]
fn test_send_on_released_handle_is_stale() {
    let overlay = listening_overlay(10);
    let port = bound_port(&overlay);

    let _client = TcpStream::connect(("127.0.0.1", port)).unwrap();
    let handle = overlay.accept().unwrap();

    overlay.release(handle.into()).unwrap();

    let err = overlay.send(handle.into(), b"too late").unwrap_err();
    assert!(matches!(err, TetherError::StaleHandle(h) if h == handle));
}

// =============================================================================
// Broadcast
// =============================================================================

#[test]
fn test_broadcast_partial_failure() {
    let overlay = listening_overlay(10);
    let port = bound_port(&overlay);

    let mut c0 = TcpStream::connect(("127.0.0.1", port)).unwrap();
    let _c1 = TcpStream::connect(("127.0.0.1", port)).unwrap();
    let mut c2 = TcpStream::connect(("127.0.0.1", port)).unwrap();

    let h0 = overlay.accept().unwrap();
    let h1 = overlay.accept().unwrap();
    let h2 = overlay.accept().unwrap();

    // Kill the middle destination before broadcasting.
    overlay.release(h1.into()).unwrap();

    let report = overlay.broadcast(b"ping", &[h0.into(), h1.into(), h2.into()]);

    // The dead peer is reported without stopping delivery to the rest.
    assert_eq!(report.delivered, vec![Target::Peer(h0), Target::Peer(h2)]);
    assert_eq!(report.failed.len(), 1);
    assert!(!report.is_complete());

    let (failed_target, failed_err) = &report.failed[0];
    assert_eq!(*failed_target, Target::Peer(h1));
    assert!(matches!(failed_err, TetherError::StaleHandle(h) if *h == h1));

    let mut buf = [0u8; 8];
    let n = c0.read(&mut buf).unwrap();
    assert_eq!(&buf[..n], b"ping");
    let n = c2.read(&mut buf).unwrap();
    assert_eq!(&buf[..n], b"ping");
}

#[test]
fn test_broadcast_complete_delivery() {
    let overlay = listening_overlay(10);
    let port = bound_port(&overlay);

    let mut clients = Vec::new();
    for _ in 0..3 {
        clients.push(TcpStream::connect(("127.0.0.1", port)).unwrap());
    }

    let targets: Vec<Target> = (0..3)
        .map(|_| overlay.accept().unwrap().into())
        .collect();

    let report = overlay.broadcast(b"all hands", &targets);
    assert!(report.is_complete());
    assert_eq!(report.delivered.len(), 3);

    for client in &mut clients {
        let mut buf = [0u8; 16];
        let n = client.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"all hands");
    }
}

// =============================================================================
// Client Role
// =============================================================================

#[test]
fn test_client_overlay_round_trip() {
    let server = listening_overlay(10);
    let port = bound_port(&server);

    let client = Overlay::new(Config::default()).unwrap();
    client.configure_remote("127.0.0.1", port).unwrap();
    client.connect().unwrap();

    client.send(Target::Primary, b"hi from client").unwrap();

    let handle = server.accept().unwrap();
    let request = server.receive(handle.into(), 64).unwrap();
    assert_eq!(&request[..], b"hi from client");

    server.send(handle.into(), b"hi back").unwrap();
    let reply = client.receive(Target::Primary, 64).unwrap();
    assert_eq!(&reply[..], b"hi back");
}

// =============================================================================
// Acceptor
// =============================================================================

#[test]
fn test_acceptor_serves_and_surfaces_accept_failure() {
    let overlay = listening_overlay(10);
    let port = bound_port(&overlay);

    let serving = Arc::clone(&overlay);
    let acceptor_thread = thread::spawn(move || {
        Acceptor::new(serving, 2).serve(|overlay, handle| {
            loop {
                match overlay.receive(handle.into(), 1024) {
                    Ok(payload) if payload.is_empty() => break,
                    Ok(payload) => {
                        if overlay.send(handle.into(), &payload).is_err() {
                            break;
                        }
                    }
                    Err(_) => break,
                }
            }
            let _ = overlay.release(handle.into());
        })
    });

    let mut client = TcpStream::connect(("127.0.0.1", port)).unwrap();
    client.write_all(b"echo me").unwrap();

    let mut buf = [0u8; 16];
    let n = client.read(&mut buf).unwrap();
    assert_eq!(&buf[..n], b"echo me");
    drop(client);

    // Shutting the listener down stops the accept loop; the failure
    // reaches the serve caller instead of killing the process.
    overlay.release(Target::Primary).unwrap();
    let result = acceptor_thread.join().unwrap();
    assert!(matches!(result, Err(TetherError::Accept(_))));
}

#[test]
fn test_concurrent_accept_and_traffic() {
    let overlay = listening_overlay(10);
    let port = bound_port(&overlay);

    // One thread sits in accept while traffic flows on an
    // already-established connection.
    let mut first = TcpStream::connect(("127.0.0.1", port)).unwrap();
    let h0 = overlay.accept().unwrap();

    let accepting = Arc::clone(&overlay);
    let accept_thread = thread::spawn(move || accepting.accept());

    first.write_all(b"through the lock-free path").unwrap();
    let payload = overlay.receive(h0.into(), 64).unwrap();
    assert_eq!(&payload[..], b"through the lock-free path");

    let _second = TcpStream::connect(("127.0.0.1", port)).unwrap();
    let h1 = accept_thread.join().unwrap().unwrap();
    assert_eq!(h1.index(), 1);
}
