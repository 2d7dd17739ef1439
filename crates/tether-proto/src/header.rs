//! Frame header implementation with zero-copy parsing.
//!
//! The `FrameHeader` is a fixed 16-byte structure serialized as raw binary
//! (Big Endian). Parsing it is a validated cast, so the receive thread can
//! inspect the type id and payload length before a single payload byte has
//! been read from the stream.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::errors::{ProtocolError, Result};

/// Fixed 16-byte frame header (Big Endian network byte order)
///
/// Fields are stored as raw byte arrays to avoid alignment issues with
/// `#[repr(C, packed)]`. Layout:
///
/// ```text
/// magic[4] | version u8 | reserved[3] | type_id[4] | payload_size[4]
/// ```
///
/// # Invariants
///
/// - `magic` is always `"TETH"` and `version` is always [`Self::VERSION`];
///   [`FrameHeader::from_bytes`] rejects anything else.
/// - `payload_size` never exceeds [`Self::MAX_PAYLOAD_SIZE`]. The bound
///   protects the receiver from a corrupted or hostile peer declaring an
///   unbounded length.
///
/// The header deliberately carries no per-message sequence number: delivery
/// order over the stream is the only ordering guarantee this protocol makes.
#[repr(C, packed)]
#[derive(Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct FrameHeader {
    magic: [u8; 4],                   // 0x54455448 ("TETH" in ASCII)
    version: u8,                      // 0x01
    reserved: [u8; 3],                // must be zero on the wire
    pub(crate) type_id: [u8; 4],      // u32 registered message type id
    pub(crate) payload_size: [u8; 4], // u32 payload length
}

impl FrameHeader {
    /// Size of the serialized header (16 bytes)
    pub const SIZE: usize = 16;

    /// Magic number: "TETH" in ASCII (0x54455448)
    pub const MAGIC: u32 = 0x5445_5448;

    /// Current protocol version
    pub const VERSION: u8 = 0x01;

    /// Maximum payload size (64 MB)
    ///
    /// A header declaring more than this is treated as stream corruption,
    /// not as a large message.
    pub const MAX_PAYLOAD_SIZE: u32 = 64 * 1024 * 1024;

    /// Create a new header for the given message type id.
    ///
    /// `payload_size` starts at zero; [`Frame::new`](crate::Frame::new) sets
    /// it to match the actual payload.
    #[must_use]
    pub fn new(type_id: u32) -> Self {
        Self {
            magic: Self::MAGIC.to_be_bytes(),
            version: Self::VERSION,
            reserved: [0u8; 3],
            type_id: type_id.to_be_bytes(),
            payload_size: [0u8; 4],
        }
    }

    /// Parse a header from network bytes (zero-copy, safe)
    ///
    /// # Errors
    ///
    /// Returns `ProtocolError` if:
    /// - the buffer is shorter than 16 bytes
    /// - the magic number is invalid
    /// - the protocol version is unsupported
    /// - the declared payload size exceeds [`Self::MAX_PAYLOAD_SIZE`]
    ///
    /// Validation runs cheapest-first (length, magic, version, size) so
    /// garbage data fails fast.
    pub fn from_bytes(bytes: &[u8]) -> Result<&Self> {
        let header = Self::ref_from_prefix(bytes)
            .map_err(|_| ProtocolError::FrameTooShort {
                expected: Self::SIZE,
                actual: bytes.len(),
            })?
            .0;

        if u32::from_be_bytes(header.magic) != Self::MAGIC {
            return Err(ProtocolError::InvalidMagic);
        }

        if header.version != Self::VERSION {
            return Err(ProtocolError::UnsupportedVersion(header.version));
        }

        let payload_size = u32::from_be_bytes(header.payload_size);
        if payload_size > Self::MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::PayloadTooLarge {
                size: payload_size as usize,
                max: Self::MAX_PAYLOAD_SIZE as usize,
            });
        }

        Ok(header)
    }

    /// Serialize the header to bytes
    #[must_use]
    #[allow(clippy::wrong_self_convention)] // common serialization pattern
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let bytes = IntoBytes::as_bytes(self);
        let mut arr = [0u8; Self::SIZE];
        arr.copy_from_slice(bytes);
        arr
    }

    /// Get the magic number
    #[must_use]
    pub fn magic(&self) -> u32 {
        u32::from_be_bytes(self.magic)
    }

    /// Get the protocol version
    #[must_use]
    pub fn version(&self) -> u8 {
        self.version
    }

    /// Get the message type id
    #[must_use]
    pub fn type_id(&self) -> u32 {
        u32::from_be_bytes(self.type_id)
    }

    /// Get the payload size
    #[must_use]
    pub fn payload_size(&self) -> u32 {
        u32::from_be_bytes(self.payload_size)
    }
}

// Manual Debug implementation (can't derive due to packed repr)
impl std::fmt::Debug for FrameHeader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameHeader")
            .field("magic", &format!("{:#010x}", self.magic()))
            .field("version", &self.version())
            .field("type_id", &self.type_id())
            .field("payload_size", &self.payload_size())
            .finish()
    }
}

// Manual PartialEq implementation (can't derive due to packed repr)
impl PartialEq for FrameHeader {
    fn eq(&self, other: &Self) -> bool {
        self.to_bytes() == other.to_bytes()
    }
}

impl Eq for FrameHeader {}
