//! Wire protocol types for the tether message channel.
//!
//! This crate defines everything that crosses the wire and nothing that
//! touches a socket:
//!
//! - [`FrameHeader`] and [`Frame`]: the length-prefixed wire format
//! - [`Message`] and [`Prototype`]: the typed-message capability seam
//! - [`TypeRegistry`]: the two-keyed (id and name) message type table
//! - [`ProtocolError`]: structured errors for parsing and codec failures
//!
//! The engine in `tether-core` drives these types from its I/O threads; this
//! crate stays pure so every invariant can be tested without a network.

#![deny(missing_docs)]

pub mod errors;
pub mod frame;
pub mod header;
pub mod message;
pub mod registry;

pub use errors::{ProtocolError, Result};
pub use frame::Frame;
pub use header::FrameHeader;
pub use message::{CborPrototype, Message, Prototype, SchemaType};
pub use registry::{TypeRegistry, TypeSource};
