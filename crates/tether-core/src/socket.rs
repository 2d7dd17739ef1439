//! The public socket facade.
//!
//! `Socket` is a thin owner of one private [`SocketEngine`]: every method
//! forwards, and the engine never leaks out. The facade is the ownership
//! boundary that keeps the threaded internals replaceable without touching
//! callers.

use std::sync::Arc;
use std::time::Duration;

use tether_proto::{Message, Prototype, TypeSource};

use crate::engine::SocketEngine;
use crate::error::SocketError;
use crate::listener::{ListenerId, SocketListener};
use crate::state::SocketState;
use crate::transport::{TcpTransport, Transport};

/// Tunables for a socket.
#[derive(Debug, Clone)]
pub struct SocketConfig {
    /// Bound on outbound connection establishment; exceeded means
    /// `ConnectionFailed`. There is no per-message timeout: queued messages
    /// do not expire.
    pub connect_timeout: Duration,
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self { connect_timeout: Duration::from_secs(10) }
    }
}

/// A bidirectional, message-oriented channel over a raw connection.
///
/// One side calls [`listen`](Self::listen), the other
/// [`connect`](Self::connect); both then exchange registered messages until
/// one side calls [`close`](Self::close). Message types and listeners are
/// configured before connecting and frozen afterward.
///
/// A socket is driven from a single calling thread. It is deliberately not
/// `Clone`: the engine, its connection handle, and its threads have exactly
/// one owner.
///
/// No method panics or returns an error by unwinding: all failures surface
/// through [`state`](Self::state), [`last_error`](Self::last_error), and
/// listener notifications.
pub struct Socket {
    engine: SocketEngine,
}

impl Socket {
    /// Create a socket over TCP with default configuration
    #[must_use]
    pub fn new() -> Self {
        Self::with_transport(Arc::new(TcpTransport), SocketConfig::default())
    }

    /// Create a socket over a custom transport
    #[must_use]
    pub fn with_transport(transport: Arc<dyn Transport>, config: SocketConfig) -> Self {
        Self { engine: SocketEngine::new(transport, config) }
    }

    /// Get the current socket state
    #[must_use]
    pub fn state(&self) -> SocketState {
        self.engine.state()
    }

    /// Get the most recent fatal error, if one is retained
    #[must_use]
    pub fn last_error(&self) -> Option<SocketError> {
        self.engine.last_error()
    }

    /// Clear the retained error without changing state
    pub fn clear_error(&self) {
        self.engine.clear_error();
    }

    /// Register a message type for this socket.
    ///
    /// Returns `false` if the socket has left its initial state (the schema
    /// is frozen once a connection attempt starts) or if the type's id or
    /// name collides with an earlier registration. A refused registration
    /// records no error.
    pub fn register_message_type(&mut self, prototype: Arc<dyn Prototype>) -> bool {
        self.engine.register_message_type(prototype)
    }

    /// Register every message type a schema source declares.
    ///
    /// Same freezing rule as [`register_message_type`](Self::register_message_type).
    pub fn register_all_message_types(&mut self, source: &dyn TypeSource) -> bool {
        self.engine.register_all_message_types(source)
    }

    /// Add a listener notified of state changes, errors, and message
    /// arrival.
    ///
    /// Only legal before connecting; returns `None` once the socket has
    /// left its initial state.
    pub fn add_listener(&mut self, listener: Box<dyn SocketListener>) -> Option<ListenerId> {
        self.engine.add_listener(listener)
    }

    /// Remove a previously added listener.
    ///
    /// Returns `false` if the id is unknown or the socket has left its
    /// initial state.
    pub fn remove_listener(&mut self, id: ListenerId) -> bool {
        self.engine.remove_listener(id)
    }

    /// Connect to a listening peer.
    ///
    /// Legal only from the initial state; otherwise a no-op. On success the
    /// state becomes `Connected` and the I/O threads start; on failure the
    /// state becomes `Error` with a `ConnectionFailed` last error.
    pub fn connect(&mut self, host: &str, port: u16) {
        self.engine.connect(host, port);
    }

    /// Bind, then block until one peer connects.
    ///
    /// Symmetric to [`connect`](Self::connect): legal only from the initial
    /// state, same success and failure transitions.
    pub fn listen(&mut self, host: &str, port: u16) {
        self.engine.listen(host, port);
    }

    /// Close the connection and stop handling messages.
    ///
    /// Signals both I/O threads, interrupts any blocked read, joins both
    /// threads, and transitions to `Closed`. Idempotent: closing an
    /// already-closed or errored socket does nothing.
    pub fn close(&mut self) {
        self.engine.close();
    }

    /// Reset a socket for reuse.
    ///
    /// Legal only from `Closed` or `Error`; otherwise a no-op. Queues and
    /// the retained error are cleared; registered types and listeners are
    /// kept, so a reset socket can reconnect without reconfiguration.
    pub fn reset(&mut self) {
        self.engine.reset();
    }

    /// Create an empty instance of a registered type by id.
    ///
    /// Returns `None` for an unregistered id; this is a recoverable
    /// condition, not an error.
    #[must_use]
    pub fn create_message(&self, type_id: u32) -> Option<Box<dyn Message>> {
        self.engine.create_message(type_id)
    }

    /// Create an empty instance of a registered type by name
    #[must_use]
    pub fn create_message_by_name(&self, type_name: &str) -> Option<Box<dyn Message>> {
        self.engine.create_message_by_name(type_name)
    }

    /// Send a message across the socket.
    ///
    /// Enqueues and returns immediately; the send thread transmits in FIFO
    /// order. The queue is unbounded, so this never blocks and never drops
    /// under pressure.
    pub fn send_message(&self, message: Box<dyn Message>) {
        self.engine.send_message(message);
    }

    /// Remove the next pending message from the incoming queue.
    ///
    /// Non-blocking: returns `None` when nothing is pending. Pending
    /// listener notifications are delivered (on this thread) before the
    /// queue is polled.
    pub fn take_next_message(&mut self) -> Option<Box<dyn Message>> {
        self.engine.take_next_message()
    }

    /// Deliver pending listener notifications on the calling thread.
    ///
    /// Listeners are never invoked from the I/O threads; call this (or
    /// [`take_next_message`](Self::take_next_message)) to drain them.
    pub fn poll_events(&mut self) {
        self.engine.poll_events();
    }

    /// Log the registered message types at debug level
    pub fn dump_message_types(&self) {
        self.engine.dump_message_types();
    }
}

impl Default for Socket {
    fn default() -> Self {
        Self::new()
    }
}
