//! Lifecycle edges: close, peer close, reset, and configuration freezing.

use std::sync::Arc;
use std::time::Duration;

use tether_core::{Socket, SocketConfig, SocketListener, SocketState};
use tether_harness::messages::{register_fixture_types, FixtureSchema, Ping};
use tether_harness::{
    connected_pair, init_tracing, take_with_timeout, wait_for_state, MemoryNetwork,
};
use tether_proto::{CborPrototype, SchemaType};

const WAIT: Duration = Duration::from_secs(5);

struct NullListener;

impl SocketListener for NullListener {}

#[test]
fn close_is_idempotent() {
    init_tracing();
    let net = MemoryNetwork::new();
    let (mut server, mut client) = connected_pair(&net, 1);

    client.close();
    assert_eq!(client.state(), SocketState::Closed);
    client.close();
    assert_eq!(client.state(), SocketState::Closed);
    assert_eq!(client.last_error(), None);

    server.close();
    server.close();
    assert_eq!(server.state(), SocketState::Closed);
}

#[test]
fn peer_close_drains_to_closed_without_error() {
    init_tracing();
    let net = MemoryNetwork::new();
    let (mut server, mut client) = connected_pair(&net, 1);

    client.close();

    // End-of-stream on a frame boundary is a graceful close, not a fault
    let state = wait_for_state(&mut server, SocketState::Closed, WAIT);
    assert_eq!(state, SocketState::Closed);
    assert_eq!(server.last_error(), None);
}

#[test]
fn messages_received_before_close_stay_takeable() {
    init_tracing();
    let net = MemoryNetwork::new();
    let (mut server, client) = connected_pair(&net, 1);

    client.send_message(Box::new(Ping { seq: 77 }));

    // Wait for delivery, then hang up on both ends
    let message = take_with_timeout(&mut server, WAIT).expect("ping should arrive");
    assert_eq!(message.downcast::<Ping>().expect("ping").seq, 77);

    client.send_message(Box::new(Ping { seq: 78 }));
    std::thread::sleep(Duration::from_millis(50));
    server.close();

    // Anything decoded before teardown is still drainable afterward
    if let Some(late) = server.take_next_message() {
        assert_eq!(late.downcast::<Ping>().expect("ping").seq, 78);
    }
}

#[test]
fn reset_from_connected_is_a_noop() {
    init_tracing();
    let net = MemoryNetwork::new();
    let (server, mut client) = connected_pair(&net, 1);

    client.reset();
    assert_eq!(client.state(), SocketState::Connected);
    drop(server);
}

#[test]
fn configuration_freezes_once_opened() {
    init_tracing();
    let net = MemoryNetwork::new();
    let (_server, mut client) = connected_pair(&net, 1);

    // Registration, schema sources, and listeners are all refused
    assert!(!client.register_message_type(Arc::new(CborPrototype::<Frozen>::new())));
    assert!(!client.register_all_message_types(&FixtureSchema));
    assert!(client.add_listener(Box::new(NullListener)).is_none());

    // The refusals record no error and leave the session running
    assert_eq!(client.last_error(), None);
    assert_eq!(client.state(), SocketState::Connected);
}

#[derive(Debug, Default, serde::Serialize, serde::Deserialize)]
struct Frozen;

impl SchemaType for Frozen {
    const TYPE_ID: u32 = 1000;
    const TYPE_NAME: &'static str = "frozen";
}

#[test]
fn reset_keeps_schema_and_allows_reconnect() {
    init_tracing();
    let net = MemoryNetwork::new();
    let (mut first_peer, mut client) = connected_pair(&net, 1);

    client.close();
    wait_for_state(&mut first_peer, SocketState::Closed, WAIT);

    client.reset();
    assert_eq!(client.state(), SocketState::Initial);

    // Registered types survive the reset
    assert!(client.create_message_by_name("ping").is_some());

    // A fresh peer on a new port; the reset socket reconnects without
    // being reconfigured
    let mut second_peer = Socket::with_transport(Arc::new(net.clone()), SocketConfig::default());
    register_fixture_types(&mut second_peer);
    let listener = std::thread::spawn(move || {
        second_peer.listen("pair", 2);
        second_peer
    });

    client.connect("pair", 2);
    assert_eq!(client.state(), SocketState::Connected);

    let mut second_peer = listener.join().expect("listening thread");
    client.send_message(Box::new(Ping { seq: 5 }));
    let message = take_with_timeout(&mut second_peer, WAIT).expect("ping after reconnect");
    assert_eq!(message.downcast::<Ping>().expect("ping").seq, 5);
}

#[test]
fn remove_listener_before_opening() {
    let net = MemoryNetwork::new();
    let mut socket = Socket::with_transport(Arc::new(net), SocketConfig::default());

    let id = socket.add_listener(Box::new(NullListener)).expect("initial state");
    assert!(socket.remove_listener(id));
    assert!(!socket.remove_listener(id));
}
