//! Socket lifecycle state machine.
//!
//! A single authoritative [`SocketState`] value is held in an atomic cell.
//! All transitions go through compare-and-swap against a legality table, so
//! concurrent attempts (application thread closing while the receive thread
//! detects end-of-stream) resolve to exactly one winner and no illegal edge
//! is ever taken.
//!
//! ```text
//! Initial ─▶ Opening ─▶ Connecting ─┐
//!                  └──▶ Listening ──┴─▶ Connected ─▶ Closing ─▶ Closed
//!
//! any non-terminal ─▶ Error          Closed | Error ─▶ Initial (reset only)
//! any non-terminal ─▶ Closing (close is legal from every live state)
//! ```

use std::sync::atomic::{AtomicU8, Ordering};

/// Socket lifecycle state.
///
/// `Closed` and `Error` are terminal: no I/O thread may be started again
/// without an explicit [`reset`](crate::Socket::reset), which is the only
/// operation that leaves a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SocketState {
    /// Freshly created; types and listeners may still be registered
    Initial = 0,
    /// Lifecycle operation started, transport not yet engaged
    Opening = 1,
    /// Bound and waiting for a peer to connect
    Listening = 2,
    /// Dialing the remote peer
    Connecting = 3,
    /// Session live; send and receive threads running
    Connected = 4,
    /// Shutdown in progress; threads are being stopped
    Closing = 5,
    /// Session ended cleanly
    Closed = 6,
    /// A fatal error forced the session down
    Error = 7,
}

impl SocketState {
    /// Whether this state is terminal (`Closed` or `Error`)
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Closed | Self::Error)
    }

    const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Initial,
            1 => Self::Opening,
            2 => Self::Listening,
            3 => Self::Connecting,
            4 => Self::Connected,
            5 => Self::Closing,
            6 => Self::Closed,
            _ => Self::Error,
        }
    }

    /// Whether `self -> to` is a legal lifecycle edge
    #[must_use]
    pub const fn may_transition(self, to: Self) -> bool {
        match (self, to) {
            (Self::Initial, Self::Opening)
            | (Self::Opening, Self::Listening | Self::Connecting)
            | (Self::Listening | Self::Connecting, Self::Connected)
            | (Self::Closing, Self::Closed)
            | (Self::Closed | Self::Error, Self::Initial) => true,

            // close() is legal from any non-terminal state; Closing has no
            // self-edge, so two actors racing for shutdown get one winner
            (Self::Closing, Self::Closing) => false,
            (from, Self::Closing) => !from.is_terminal(),

            // a fatal error forces Error from any non-terminal state
            (from, Self::Error) => !from.is_terminal(),

            _ => false,
        }
    }
}

impl std::fmt::Display for SocketState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Initial => "initial",
            Self::Opening => "opening",
            Self::Listening => "listening",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Closing => "closing",
            Self::Closed => "closed",
            Self::Error => "error",
        };
        f.write_str(name)
    }
}

/// Atomic holder of the authoritative state value.
#[derive(Debug)]
pub(crate) struct StateCell(AtomicU8);

impl StateCell {
    pub(crate) fn new() -> Self {
        Self(AtomicU8::new(SocketState::Initial as u8))
    }

    pub(crate) fn get(&self) -> SocketState {
        SocketState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Attempt the edge `from -> to`. Returns false if the edge is illegal
    /// or the state has moved on since `from` was observed.
    pub(crate) fn transition(&self, from: SocketState, to: SocketState) -> bool {
        if !from.may_transition(to) {
            return false;
        }
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Force `Error` from whatever non-terminal state is current.
    ///
    /// Returns the state that was replaced, or `None` if the machine was
    /// already terminal (the first fatal error wins; later ones only
    /// overwrite the error slot, not the state).
    pub(crate) fn force_error(&self) -> Option<SocketState> {
        loop {
            let current = self.get();
            if current.is_terminal() {
                return None;
            }
            if self.transition(current, SocketState::Error) {
                return Some(current);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_edges() {
        use SocketState::*;
        for (from, to) in [
            (Initial, Opening),
            (Opening, Connecting),
            (Opening, Listening),
            (Connecting, Connected),
            (Listening, Connected),
            (Connected, Closing),
            (Closing, Closed),
        ] {
            assert!(from.may_transition(to), "{from} -> {to} should be legal");
        }
    }

    #[test]
    fn terminal_states_only_reset() {
        use SocketState::*;
        for terminal in [Closed, Error] {
            assert!(terminal.may_transition(Initial));
            for to in [Opening, Listening, Connecting, Connected, Closing, Closed, Error] {
                assert!(!terminal.may_transition(to), "{terminal} -> {to} should be illegal");
            }
        }
    }

    #[test]
    fn closing_is_not_reentrant() {
        // Two actors racing for shutdown must produce one Closing edge,
        // never a duplicate
        assert!(!SocketState::Closing.may_transition(SocketState::Closing));
        assert!(SocketState::Closing.may_transition(SocketState::Closed));

        let cell = StateCell::new();
        assert!(cell.transition(SocketState::Initial, SocketState::Closing));
        assert!(!cell.transition(SocketState::Closing, SocketState::Closing));
        assert_eq!(cell.get(), SocketState::Closing);
    }

    #[test]
    fn error_reachable_from_any_live_state() {
        use SocketState::*;
        for from in [Initial, Opening, Listening, Connecting, Connected, Closing] {
            assert!(from.may_transition(Error));
        }
    }

    #[test]
    fn cell_transition_is_exact() {
        let cell = StateCell::new();
        assert_eq!(cell.get(), SocketState::Initial);

        assert!(cell.transition(SocketState::Initial, SocketState::Opening));
        // stale `from` observation loses
        assert!(!cell.transition(SocketState::Initial, SocketState::Opening));
        assert_eq!(cell.get(), SocketState::Opening);
    }

    #[test]
    fn force_error_wins_once() {
        let cell = StateCell::new();
        assert!(cell.transition(SocketState::Initial, SocketState::Opening));

        assert_eq!(cell.force_error(), Some(SocketState::Opening));
        assert_eq!(cell.get(), SocketState::Error);
        assert_eq!(cell.force_error(), None);
    }
}
