//! Error category and value type for the socket engine.
//!
//! The engine never unwinds across the public contract. Fatal failures are
//! recorded in a single "last error" slot, force the state machine into
//! `Error`, and are surfaced through [`last_error`](crate::Socket::last_error)
//! and the error listener notification. Recoverable conditions never change
//! state.

use std::fmt;
use std::io;

/// Classification of a socket failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Dial, bind, or accept failed (fatal)
    ConnectionFailed,
    /// Write failure mid-session (fatal)
    SendFailed,
    /// Read failure mid-session (fatal)
    ReceiveFailed,
    /// Malformed frame; the stream can no longer be trusted to be
    /// frame-aligned (fatal)
    ParseFailed,
    /// A frame with an unknown type id was consumed and dropped
    /// (recoverable; the session continues)
    Unregistered,
    /// Operation called from a disallowed state (recoverable no-op)
    InvalidState,
    /// Anything else
    Other,
}

impl ErrorCategory {
    /// Whether an error of this category forces the `Error` state
    #[must_use]
    pub const fn is_fatal(self) -> bool {
        !matches!(self, Self::Unregistered | Self::InvalidState)
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ConnectionFailed => "connection failed",
            Self::SendFailed => "send failed",
            Self::ReceiveFailed => "receive failed",
            Self::ParseFailed => "parse failed",
            Self::Unregistered => "unregistered message type",
            Self::InvalidState => "invalid state",
            Self::Other => "error",
        };
        f.write_str(name)
    }
}

/// A socket error value: category plus the underlying platform detail.
///
/// At most one error is retained per socket; a new fatal error overwrites
/// the previous one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketError {
    /// What went wrong, coarsely
    pub category: ErrorCategory,
    /// OS error code, when the failure came from the platform
    pub native_code: Option<i32>,
    /// Human-readable detail
    pub message: String,
}

impl SocketError {
    /// Create an error with no platform code
    pub fn new(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self { category, native_code: None, message: message.into() }
    }

    /// Create an error from an I/O failure, keeping the OS error code
    pub fn from_io(category: ErrorCategory, err: &io::Error) -> Self {
        Self {
            category,
            native_code: err.raw_os_error(),
            message: err.to_string(),
        }
    }

    /// Whether this error forced the `Error` state
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        self.category.is_fatal()
    }
}

impl fmt::Display for SocketError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.category, self.message)?;
        if let Some(code) = self.native_code {
            write!(f, " (os error {code})")?;
        }
        Ok(())
    }
}

impl std::error::Error for SocketError {}
