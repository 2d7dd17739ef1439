//! Test support for the tether message channel.
//!
//! This crate provides a deterministic in-memory transport
//! ([`MemoryNetwork`]), schema fixtures for tests, and small polling
//! helpers. Integration tests for the socket engine live in this crate's
//! `tests/` directory so they can exercise the real public surface of
//! `tether-core` from outside.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod mem_transport;
pub mod messages;

use std::sync::Arc;
use std::time::{Duration, Instant};

use tether_core::{Socket, SocketConfig, SocketState};
use tether_proto::Message;

pub use mem_transport::MemoryNetwork;

/// Install a `tracing` subscriber honoring `RUST_LOG`, once per process.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Poll `take_next_message` until a message arrives or the timeout expires.
pub fn take_with_timeout(socket: &mut Socket, timeout: Duration) -> Option<Box<dyn Message>> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(message) = socket.take_next_message() {
            return Some(message);
        }
        if Instant::now() >= deadline {
            return None;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
}

/// Poll until the socket reaches `target` or the timeout expires.
/// Returns the state observed last.
pub fn wait_for_state(socket: &mut Socket, target: SocketState, timeout: Duration) -> SocketState {
    let deadline = Instant::now() + timeout;
    loop {
        socket.poll_events();
        let state = socket.state();
        if state == target || Instant::now() >= deadline {
            return state;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
}

/// Establish a connected socket pair over `net`, with the fixture schema
/// registered on both sides. The first socket listened, the second dialed.
///
/// `listen` blocks until a peer arrives, so the listening side runs on a
/// short-lived helper thread and is handed back once connected.
pub fn connected_pair(net: &MemoryNetwork, port: u16) -> (Socket, Socket) {
    let mut server = Socket::with_transport(Arc::new(net.clone()), SocketConfig::default());
    messages::register_fixture_types(&mut server);
    let listener = std::thread::spawn(move || {
        server.listen("pair", port);
        server
    });

    let mut client = Socket::with_transport(Arc::new(net.clone()), SocketConfig::default());
    messages::register_fixture_types(&mut client);
    client.connect("pair", port);

    let server = listener.join().expect("listening thread should not panic");
    assert_eq!(server.state(), SocketState::Connected);
    assert_eq!(client.state(), SocketState::Connected);
    (server, client)
}
