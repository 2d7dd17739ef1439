//! Observer capability set and queued event delivery.
//!
//! Listeners are never invoked from the I/O threads. The threads push
//! [`SocketEvent`]s onto a queue and the application thread drains it
//! (during [`poll_events`](crate::Socket::poll_events) or
//! [`take_next_message`](crate::Socket::take_next_message)), so listener
//! code cannot race with or block the network loops.

use crate::error::SocketError;
use crate::state::SocketState;

/// Observer of socket events.
///
/// All methods have empty default bodies; implement only what you care
/// about. Callbacks run on the application thread that drains the event
/// queue, in the order the events occurred.
pub trait SocketListener: Send {
    /// The socket entered a new lifecycle state
    fn on_state_changed(&mut self, _state: SocketState) {}

    /// An error was recorded (fatal or recoverable)
    fn on_error(&mut self, _error: &SocketError) {}

    /// A decoded message was appended to the incoming queue
    fn on_message_received(&mut self) {}
}

/// Token identifying a registered listener, returned by
/// [`add_listener`](crate::Socket::add_listener) and consumed by
/// [`remove_listener`](crate::Socket::remove_listener).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Event produced by the engine threads for later delivery.
#[derive(Debug, Clone)]
pub(crate) enum SocketEvent {
    StateChanged(SocketState),
    Error(SocketError),
    MessageReceived,
}

/// Ordered set of listeners, owned by the application thread.
pub(crate) struct ListenerSet {
    listeners: Vec<(ListenerId, Box<dyn SocketListener>)>,
    next_id: u64,
}

impl ListenerSet {
    pub(crate) fn new() -> Self {
        Self { listeners: Vec::new(), next_id: 0 }
    }

    pub(crate) fn add(&mut self, listener: Box<dyn SocketListener>) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.listeners.push((id, listener));
        id
    }

    /// Returns true if a listener with this id was present
    pub(crate) fn remove(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(lid, _)| *lid != id);
        self.listeners.len() != before
    }

    pub(crate) fn dispatch(&mut self, event: &SocketEvent) {
        for (_, listener) in &mut self.listeners {
            match event {
                SocketEvent::StateChanged(state) => listener.on_state_changed(*state),
                SocketEvent::Error(error) => listener.on_error(error),
                SocketEvent::MessageReceived => listener.on_message_received(),
            }
        }
    }
}
