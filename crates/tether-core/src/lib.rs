//! Threaded socket engine for the tether message channel.
//!
//! A [`Socket`] connects two processes over a raw stream and exchanges
//! strongly-typed messages registered ahead of time by schema. One side
//! listens, the other connects; after that the API is symmetric.
//!
//! # Architecture
//!
//! ```text
//!  application thread          send thread            receive thread
//!  ─────────────────────       ────────────────       ─────────────────
//!  send_message ──────────▶ outgoing queue ──▶ encode ─▶ write_all
//!  take_next_message ◀──── incoming queue ◀─ decode ◀── read frames
//!  poll_events ◀────────── event queue ◀──── state/error notifications
//! ```
//!
//! The application thread never blocks on network I/O. The two background
//! threads run only while a session is live; [`Socket::close`] interrupts a
//! blocked read (by shutting the connection handle) and a blocked queue wait
//! (by closing the queue), then joins both threads before returning.
//!
//! # Modules
//!
//! - [`state`]: socket lifecycle state machine
//! - [`error`]: error category and value type
//! - [`queue`]: thread-safe FIFO message queues
//! - [`transport`]: connect/listen/read/write capability and its TCP impl
//! - [`listener`]: observer capability set and event delivery
//! - [`socket`]: the public facade

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod engine;

pub mod error;
pub mod listener;
pub mod queue;
pub mod socket;
pub mod state;
pub mod transport;

pub use error::{ErrorCategory, SocketError};
pub use listener::{ListenerId, SocketListener};
pub use socket::{Socket, SocketConfig};
pub use state::SocketState;
pub use transport::{ShutdownHandle, SplitConnection, TcpTransport, Transport};
