//! The private socket engine: connection ownership, I/O threads, and
//! lifecycle.
//!
//! Exactly three threads touch an engine: the application thread (every
//! public operation), the send thread, and the receive thread. The
//! application thread owns the engine itself; the I/O threads see only the
//! [`Shared`] core (state cell, error slot, queues) behind an `Arc`. The
//! connection halves are moved into the threads outright, so no thread ever
//! operates on a handle another thread has released.
//!
//! The registry is mutable only while the state is `Initial`; a clone is
//! frozen into an `Arc` when a session starts, which is what lets the
//! receive thread decode without any locking.

use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use tether_proto::{Frame, FrameHeader, Message, Prototype, TypeRegistry, TypeSource};

use crate::error::{ErrorCategory, SocketError};
use crate::listener::{ListenerId, ListenerSet, SocketEvent, SocketListener};
use crate::queue::MessageQueue;
use crate::socket::SocketConfig;
use crate::state::{SocketState, StateCell};
use crate::transport::{ShutdownHandle, SplitConnection, Transport};

/// State shared between the application thread and the I/O threads.
struct Shared {
    state: StateCell,
    last_error: Mutex<Option<SocketError>>,
    events: MessageQueue<SocketEvent>,
    outgoing: MessageQueue<Box<dyn Message>>,
    incoming: MessageQueue<Box<dyn Message>>,
}

impl Shared {
    fn new() -> Self {
        Self {
            state: StateCell::new(),
            last_error: Mutex::new(None),
            events: MessageQueue::new(),
            outgoing: MessageQueue::new(),
            incoming: MessageQueue::new(),
        }
    }

    fn error_slot(&self) -> MutexGuard<'_, Option<SocketError>> {
        self.last_error.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, event: SocketEvent) {
        let _ = self.events.push(event);
    }

    /// Take the edge `from -> to` and publish the change on success.
    fn enter(&self, from: SocketState, to: SocketState) -> bool {
        if self.state.transition(from, to) {
            tracing::debug!(%from, %to, "state transition");
            self.publish(SocketEvent::StateChanged(to));
            true
        } else {
            false
        }
    }
}

/// Record a fatal error: fill the error slot, force the `Error` state,
/// close both queues, and tear down the connection so the peer thread
/// unblocks.
fn fail(shared: &Shared, error: SocketError, shutdown: Option<&Arc<dyn ShutdownHandle>>) {
    tracing::error!(%error, "fatal socket error");
    *shared.error_slot() = Some(error.clone());

    if let Some(from) = shared.state.force_error() {
        tracing::debug!(%from, "state forced to error");
        shared.publish(SocketEvent::Error(error));
        shared.publish(SocketEvent::StateChanged(SocketState::Error));
    }

    shared.outgoing.close();
    shared.incoming.close();
    if let Some(handle) = shutdown {
        handle.shutdown();
    }
}

/// The peer closed its end cleanly: drain down to `Closed` without
/// recording an error.
fn peer_closed(shared: &Shared, shutdown: &Arc<dyn ShutdownHandle>) {
    tracing::debug!("peer closed the stream");
    // If close() already moved us to Closing, only the final edge remains
    shared.enter(SocketState::Connected, SocketState::Closing);
    shared.enter(SocketState::Closing, SocketState::Closed);
    shared.outgoing.close();
    shared.incoming.close();
    shutdown.shutdown();
}

/// True once the session is no longer `Connected`, meaning an I/O failure
/// on a thread is the echo of a local `close()` rather than a peer fault.
fn session_interrupted(shared: &Shared) -> bool {
    shared.state.get() != SocketState::Connected
}

/// Read until `buf` is full or the stream ends. Returns the number of bytes
/// actually read; anything short of `buf.len()` means end-of-stream.
fn read_full<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }
    Ok(filled)
}

fn encode_frame(message: &dyn Message) -> tether_proto::Result<Frame> {
    let payload = message.encode_payload()?;
    Ok(Frame::new(FrameHeader::new(message.type_id()), payload))
}

/// Send thread body: drain the outgoing queue, frame, and write.
fn send_loop(
    shared: &Shared,
    mut writer: Box<dyn Write + Send>,
    shutdown: &Arc<dyn ShutdownHandle>,
) {
    tracing::debug!("send thread started");

    while let Some(message) = shared.outgoing.pop_wait() {
        let frame = match encode_frame(message.as_ref()) {
            Ok(frame) => frame,
            Err(err) => {
                fail(
                    shared,
                    SocketError::new(ErrorCategory::SendFailed, err.to_string()),
                    Some(shutdown),
                );
                break;
            },
        };

        let mut wire = Vec::with_capacity(frame.wire_size());
        if let Err(err) = frame.encode(&mut wire) {
            fail(
                shared,
                SocketError::new(ErrorCategory::SendFailed, err.to_string()),
                Some(shutdown),
            );
            break;
        }

        // write_all loops over partial writes internally
        if let Err(err) = writer.write_all(&wire).and_then(|()| writer.flush()) {
            if session_interrupted(shared) {
                break;
            }
            fail(shared, SocketError::from_io(ErrorCategory::SendFailed, &err), Some(shutdown));
            break;
        }

        tracing::trace!(type_id = frame.header.type_id(), bytes = frame.wire_size(), "frame sent");
    }

    tracing::debug!("send thread exiting");
}

/// Receive thread body: read frames, decode through the frozen registry,
/// and enqueue.
fn recv_loop(
    shared: &Shared,
    mut reader: Box<dyn Read + Send>,
    registry: &TypeRegistry,
    shutdown: &Arc<dyn ShutdownHandle>,
) {
    tracing::debug!("receive thread started");

    loop {
        let mut header_buf = [0u8; FrameHeader::SIZE];
        match read_full(&mut *reader, &mut header_buf) {
            // End-of-stream on a frame boundary is a graceful peer close
            Ok(0) => {
                peer_closed(shared, shutdown);
                break;
            },
            Ok(n) if n == FrameHeader::SIZE => {},
            Ok(n) => {
                if session_interrupted(shared) {
                    break;
                }
                fail(
                    shared,
                    SocketError::new(
                        ErrorCategory::ReceiveFailed,
                        format!("connection closed mid-header ({n} of {} bytes)", FrameHeader::SIZE),
                    ),
                    Some(shutdown),
                );
                break;
            },
            Err(err) => {
                if session_interrupted(shared) {
                    break;
                }
                fail(
                    shared,
                    SocketError::from_io(ErrorCategory::ReceiveFailed, &err),
                    Some(shutdown),
                );
                break;
            },
        }

        let header = match FrameHeader::from_bytes(&header_buf) {
            Ok(header) => *header,
            Err(err) => {
                // The stream can no longer be trusted to be frame-aligned
                fail(
                    shared,
                    SocketError::new(ErrorCategory::ParseFailed, err.to_string()),
                    Some(shutdown),
                );
                break;
            },
        };

        let mut payload = vec![0u8; header.payload_size() as usize];
        match read_full(&mut *reader, &mut payload) {
            Ok(n) if n == payload.len() => {},
            Ok(_) => {
                if session_interrupted(shared) {
                    break;
                }
                fail(
                    shared,
                    SocketError::new(
                        ErrorCategory::ReceiveFailed,
                        "connection closed mid-frame",
                    ),
                    Some(shutdown),
                );
                break;
            },
            Err(err) => {
                if session_interrupted(shared) {
                    break;
                }
                fail(
                    shared,
                    SocketError::from_io(ErrorCategory::ReceiveFailed, &err),
                    Some(shutdown),
                );
                break;
            },
        }

        let Some(prototype) = registry.prototype(header.type_id()) else {
            // The payload was fully consumed, so framing stays aligned.
            // Unknown types may arrive from a mismatched peer version:
            // recoverable, surfaced only through the event queue.
            tracing::warn!(type_id = header.type_id(), "dropping frame with unregistered type id");
            shared.publish(SocketEvent::Error(SocketError::new(
                ErrorCategory::Unregistered,
                format!("unknown message type id: {}", header.type_id()),
            )));
            continue;
        };

        match prototype.decode_payload(&payload) {
            Ok(message) => {
                tracing::trace!(type_id = header.type_id(), "message received");
                // The queue refuses the message once teardown has begun;
                // announcing an arrival that cannot be taken would lie to
                // listeners.
                if shared.incoming.push(message) {
                    shared.publish(SocketEvent::MessageReceived);
                }
            },
            Err(err) => {
                fail(
                    shared,
                    SocketError::new(ErrorCategory::ParseFailed, err.to_string()),
                    Some(shutdown),
                );
                break;
            },
        }
    }

    tracing::debug!("receive thread exiting");
}

/// The threaded engine behind the public [`Socket`](crate::Socket) facade.
pub(crate) struct SocketEngine {
    config: SocketConfig,
    transport: Arc<dyn Transport>,
    shared: Arc<Shared>,
    registry: TypeRegistry,
    listeners: ListenerSet,
    send_thread: Option<JoinHandle<()>>,
    recv_thread: Option<JoinHandle<()>>,
    shutdown: Option<Arc<dyn ShutdownHandle>>,
}

impl SocketEngine {
    pub(crate) fn new(transport: Arc<dyn Transport>, config: SocketConfig) -> Self {
        Self {
            config,
            transport,
            shared: Arc::new(Shared::new()),
            registry: TypeRegistry::new(),
            listeners: ListenerSet::new(),
            send_thread: None,
            recv_thread: None,
            shutdown: None,
        }
    }

    pub(crate) fn state(&self) -> SocketState {
        self.shared.state.get()
    }

    pub(crate) fn last_error(&self) -> Option<SocketError> {
        self.shared.error_slot().clone()
    }

    pub(crate) fn clear_error(&self) {
        *self.shared.error_slot() = None;
    }

    pub(crate) fn register_message_type(&mut self, prototype: Arc<dyn Prototype>) -> bool {
        if self.state() != SocketState::Initial {
            tracing::debug!(state = %self.state(), "registration ignored: schema is frozen");
            return false;
        }
        match self.registry.register(prototype) {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(%err, "message type registration rejected");
                false
            },
        }
    }

    pub(crate) fn register_all_message_types(&mut self, source: &dyn TypeSource) -> bool {
        if self.state() != SocketState::Initial {
            tracing::debug!(state = %self.state(), "registration ignored: schema is frozen");
            return false;
        }
        match self.registry.register_source(source) {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(%err, "schema source registration rejected");
                false
            },
        }
    }

    pub(crate) fn add_listener(&mut self, listener: Box<dyn SocketListener>) -> Option<ListenerId> {
        if self.state() != SocketState::Initial {
            tracing::debug!(state = %self.state(), "listener ignored: socket already configured");
            return None;
        }
        Some(self.listeners.add(listener))
    }

    pub(crate) fn remove_listener(&mut self, id: ListenerId) -> bool {
        if self.state() != SocketState::Initial {
            return false;
        }
        self.listeners.remove(id)
    }

    pub(crate) fn create_message(&self, type_id: u32) -> Option<Box<dyn Message>> {
        self.registry.create(type_id)
    }

    pub(crate) fn create_message_by_name(&self, type_name: &str) -> Option<Box<dyn Message>> {
        self.registry.create_by_name(type_name)
    }

    pub(crate) fn dump_message_types(&self) {
        for (type_id, type_name) in self.registry.entries() {
            tracing::debug!(type_id, type_name, "registered message type");
        }
    }

    pub(crate) fn connect(&mut self, host: &str, port: u16) {
        if !self.shared.enter(SocketState::Initial, SocketState::Opening) {
            tracing::debug!(state = %self.state(), "connect ignored: socket not in initial state");
            return;
        }
        self.shared.enter(SocketState::Opening, SocketState::Connecting);

        tracing::debug!(host, port, "dialing");
        match self.transport.dial(host, port, self.config.connect_timeout) {
            Ok(conn) => self.start_session(conn, SocketState::Connecting),
            Err(err) => fail(
                &self.shared,
                SocketError::from_io(ErrorCategory::ConnectionFailed, &err),
                None,
            ),
        }
    }

    pub(crate) fn listen(&mut self, host: &str, port: u16) {
        if !self.shared.enter(SocketState::Initial, SocketState::Opening) {
            tracing::debug!(state = %self.state(), "listen ignored: socket not in initial state");
            return;
        }
        self.shared.enter(SocketState::Opening, SocketState::Listening);

        tracing::debug!(host, port, "listening for one peer");
        match self.transport.accept_once(host, port) {
            Ok(conn) => self.start_session(conn, SocketState::Listening),
            Err(err) => fail(
                &self.shared,
                SocketError::from_io(ErrorCategory::ConnectionFailed, &err),
                None,
            ),
        }
    }

    fn start_session(&mut self, conn: SplitConnection, from: SocketState) {
        let SplitConnection { reader, writer, shutdown } = conn;

        // Freeze the schema for the lifetime of this session: the receive
        // thread reads this snapshot without locking.
        let registry = Arc::new(self.registry.clone());
        self.shutdown = Some(Arc::clone(&shutdown));

        self.shared.enter(from, SocketState::Connected);

        let send_thread = {
            let shared = Arc::clone(&self.shared);
            let shutdown = Arc::clone(&shutdown);
            thread::Builder::new()
                .name("tether-send".into())
                .spawn(move || send_loop(&shared, writer, &shutdown))
        };

        let recv_thread = {
            let shared = Arc::clone(&self.shared);
            let shutdown = Arc::clone(&shutdown);
            thread::Builder::new()
                .name("tether-recv".into())
                .spawn(move || recv_loop(&shared, reader, &registry, &shutdown))
        };

        match (send_thread, recv_thread) {
            (Ok(send), Ok(recv)) => {
                self.send_thread = Some(send);
                self.recv_thread = Some(recv);
            },
            (send, recv) => {
                fail(
                    &self.shared,
                    SocketError::new(ErrorCategory::Other, "failed to spawn i/o threads"),
                    Some(&shutdown),
                );
                if let Ok(handle) = send {
                    let _ = handle.join();
                }
                if let Ok(handle) = recv {
                    let _ = handle.join();
                }
            },
        }
    }

    pub(crate) fn close(&mut self) {
        loop {
            let state = self.state();
            if state.is_terminal() {
                // Idempotent: still reap any threads that exited on their own
                self.join_threads();
                return;
            }
            // Another actor may have taken the Closing edge already; there
            // is no Closing self-edge, so fall through to teardown instead
            // of retrying the CAS forever.
            if state == SocketState::Closing
                || self.shared.enter(state, SocketState::Closing)
            {
                break;
            }
            // A thread changed the state between observation and CAS; retry
        }

        // Wake a send thread blocked on the queue, then unblock a receive
        // thread parked in read()
        self.shared.outgoing.close();
        if let Some(shutdown) = &self.shutdown {
            shutdown.shutdown();
        }

        self.join_threads();

        self.shared.enter(SocketState::Closing, SocketState::Closed);
        tracing::debug!("socket closed");
    }

    pub(crate) fn reset(&mut self) {
        let state = self.state();
        if !state.is_terminal() {
            tracing::debug!(%state, "reset ignored: socket not closed or errored");
            return;
        }

        self.join_threads();
        self.shutdown = None;

        self.shared.outgoing.reset();
        self.shared.incoming.reset();
        self.shared.events.reset();
        *self.shared.error_slot() = None;

        self.shared.state.transition(state, SocketState::Initial);
        tracing::debug!("socket reset for reuse");
    }

    pub(crate) fn send_message(&self, message: Box<dyn Message>) {
        if !self.shared.outgoing.push(message) {
            tracing::debug!("outgoing queue closed; message dropped");
        }
    }

    pub(crate) fn take_next_message(&mut self) -> Option<Box<dyn Message>> {
        self.poll_events();
        self.shared.incoming.try_pop()
    }

    pub(crate) fn poll_events(&mut self) {
        while let Some(event) = self.shared.events.try_pop() {
            self.listeners.dispatch(&event);
        }
    }

    fn join_threads(&mut self) {
        if let Some(handle) = self.send_thread.take() {
            if handle.join().is_err() {
                tracing::warn!("send thread panicked");
            }
        }
        if let Some(handle) = self.recv_thread.take() {
            if handle.join().is_err() {
                tracing::warn!("receive thread panicked");
            }
        }
    }
}

impl Drop for SocketEngine {
    fn drop(&mut self) {
        // Destruction must never begin while a thread can still touch the
        // shared core; close() joins both.
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use std::any::Any;
    use std::io::Cursor;
    use std::time::Duration;

    use bytes::Bytes;
    use tether_proto::ProtocolError;

    use super::*;

    /// Transport whose every operation is refused, for driving the engine
    /// through its failure edges without a network.
    struct RefusingTransport;

    impl Transport for RefusingTransport {
        fn dial(&self, _: &str, _: u16, _: Duration) -> io::Result<SplitConnection> {
            Err(io::Error::new(io::ErrorKind::ConnectionRefused, "refused"))
        }

        fn accept_once(&self, _: &str, _: u16) -> io::Result<SplitConnection> {
            Err(io::Error::new(io::ErrorKind::AddrInUse, "address in use"))
        }
    }

    fn refusing_engine() -> SocketEngine {
        SocketEngine::new(Arc::new(RefusingTransport), SocketConfig::default())
    }

    #[test]
    fn failed_dial_forces_error_state() {
        let mut engine = refusing_engine();
        engine.connect("127.0.0.1", 1);

        assert_eq!(engine.state(), SocketState::Error);
        let error = engine.last_error().expect("error should be recorded");
        assert_eq!(error.category, ErrorCategory::ConnectionFailed);
    }

    #[test]
    fn failed_listen_forces_error_state() {
        let mut engine = refusing_engine();
        engine.listen("127.0.0.1", 1);

        assert_eq!(engine.state(), SocketState::Error);
        assert_eq!(
            engine.last_error().map(|e| e.category),
            Some(ErrorCategory::ConnectionFailed)
        );
    }

    #[test]
    fn clear_error_keeps_state() {
        let mut engine = refusing_engine();
        engine.connect("127.0.0.1", 1);

        engine.clear_error();
        assert_eq!(engine.last_error(), None);
        assert_eq!(engine.state(), SocketState::Error);
    }

    #[test]
    fn connect_from_error_state_is_a_noop() {
        let mut engine = refusing_engine();
        engine.connect("127.0.0.1", 1);
        engine.clear_error();

        engine.connect("127.0.0.1", 1);
        assert_eq!(engine.state(), SocketState::Error);
        // The ignored call must not record a new error
        assert_eq!(engine.last_error(), None);
    }

    #[test]
    fn reset_returns_to_initial() {
        let mut engine = refusing_engine();
        engine.connect("127.0.0.1", 1);
        assert_eq!(engine.state(), SocketState::Error);

        engine.reset();
        assert_eq!(engine.state(), SocketState::Initial);
        assert_eq!(engine.last_error(), None);
    }

    #[test]
    fn close_from_initial_is_closed() {
        let mut engine = refusing_engine();
        engine.close();
        assert_eq!(engine.state(), SocketState::Closed);

        // Idempotent
        engine.close();
        assert_eq!(engine.state(), SocketState::Closed);
    }

    /// One-byte message with hand-rolled codec, so the receive loop can be
    /// driven without pulling a serializer into this crate.
    #[derive(Debug)]
    struct Blip(u8);

    impl Message for Blip {
        fn type_id(&self) -> u32 {
            7
        }

        fn type_name(&self) -> &str {
            "blip"
        }

        fn encode_payload(&self) -> tether_proto::Result<Bytes> {
            Ok(Bytes::copy_from_slice(&[self.0]))
        }

        fn as_any(&self) -> &dyn Any {
            self
        }

        fn into_any(self: Box<Self>) -> Box<dyn Any> {
            self
        }
    }

    struct BlipPrototype;

    impl Prototype for BlipPrototype {
        fn type_id(&self) -> u32 {
            7
        }

        fn type_name(&self) -> &str {
            "blip"
        }

        fn create(&self) -> Box<dyn Message> {
            Box::new(Blip(0))
        }

        fn decode_payload(&self, bytes: &[u8]) -> tether_proto::Result<Box<dyn Message>> {
            match bytes.first() {
                Some(&value) => Ok(Box::new(Blip(value))),
                None => Err(ProtocolError::DecodeFailed("empty payload".into())),
            }
        }
    }

    struct NoopShutdown;

    impl ShutdownHandle for NoopShutdown {
        fn shutdown(&self) {}
    }

    #[test]
    fn no_arrival_event_for_a_message_dropped_at_teardown() {
        let shared = Shared::new();
        assert!(shared.state.transition(SocketState::Initial, SocketState::Opening));
        assert!(shared.state.transition(SocketState::Opening, SocketState::Connecting));
        assert!(shared.state.transition(SocketState::Connecting, SocketState::Connected));

        // Teardown has begun: the incoming queue refuses new messages
        shared.incoming.close();

        let mut registry = TypeRegistry::new();
        registry.register(Arc::new(BlipPrototype)).expect("fresh registry");

        let frame = Frame::new(FrameHeader::new(7), vec![5u8]);
        let mut wire = Vec::with_capacity(frame.wire_size());
        frame.encode(&mut wire).expect("within bounds");

        let shutdown: Arc<dyn ShutdownHandle> = Arc::new(NoopShutdown);
        recv_loop(&shared, Box::new(Cursor::new(wire)), &registry, &shutdown);

        // The message was refused, so no arrival may be announced for it
        assert!(shared.incoming.try_pop().is_none());
        while let Some(event) = shared.events.try_pop() {
            assert!(
                !matches!(event, SocketEvent::MessageReceived),
                "arrival announced for a message nobody can take"
            );
        }
    }

    #[test]
    fn read_full_reports_short_stream() {
        let data = [1u8, 2, 3];
        let mut reader: &[u8] = &data;

        let mut buf = [0u8; 8];
        let n = read_full(&mut reader, &mut buf).unwrap();
        assert_eq!(n, 3);
        assert_eq!(&buf[..3], &data);
    }
}
