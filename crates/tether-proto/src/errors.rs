//! Error types for the tether wire protocol.
//!
//! All errors are structured and testable. Codec failures wrap the
//! underlying serializer message as a string so that `ProtocolError` stays
//! `Clone + PartialEq` and usable in assertions.

use thiserror::Error;

/// Protocol-level errors that can occur during frame parsing, message
/// encoding, and registry operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Frame is shorter than the fixed header size
    #[error("frame too short: expected at least {expected} bytes, got {actual}")]
    FrameTooShort {
        /// Expected minimum size in bytes
        expected: usize,
        /// Actual size received
        actual: usize,
    },

    /// Invalid magic number in frame header
    #[error("invalid magic number: expected 0x54455448 (\"TETH\")")]
    InvalidMagic,

    /// Unsupported protocol version
    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(u8),

    /// Declared payload length exceeds the sanity bound
    #[error("payload too large: {size} bytes exceeds maximum {max}")]
    PayloadTooLarge {
        /// Actual payload size
        size: usize,
        /// Maximum allowed size
        max: usize,
    },

    /// Frame is truncated (header claims more data than available)
    #[error("frame truncated: header claims {expected} payload bytes, but only {actual} available")]
    FrameTruncated {
        /// Expected payload size from header
        expected: usize,
        /// Actual bytes available
        actual: usize,
    },

    /// Failed to serialize a message payload
    #[error("failed to encode payload: {0}")]
    EncodeFailed(String),

    /// Failed to deserialize a message payload
    #[error("failed to decode payload: {0}")]
    DecodeFailed(String),

    /// Registration would collide with an existing type id or name
    #[error("duplicate message type: id {id} ({name})")]
    DuplicateType {
        /// Colliding type id
        id: u32,
        /// Colliding type name
        name: String,
    },
}

/// Convenient Result type alias for protocol operations
pub type Result<T> = std::result::Result<T, ProtocolError>;
