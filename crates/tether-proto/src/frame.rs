//! Frame type combining header and payload.
//!
//! A `Frame` is one complete length-prefixed unit of the wire protocol
//! carrying exactly one encoded message. It holds raw payload bytes, not a
//! decoded message: decoding requires the registry and belongs to the
//! receive path, while framing does not.

use bytes::{BufMut, Bytes};

use crate::{
    errors::{ProtocolError, Result},
    header::FrameHeader,
};

/// Complete protocol frame
///
/// Layout on the wire: `[FrameHeader: 16 bytes] + [payload: variable]`.
///
/// # Invariants
///
/// - `payload.len()` always matches `header.payload_size()`. [`Frame::new`]
///   enforces this by rewriting the header field, and [`Frame::decode`]
///   verifies it against the buffer.
/// - A frame is atomic: a consumer never observes a partial frame as a
///   message. Partial network reads are the engine's problem; by the time a
///   `Frame` exists, it is whole.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Frame header (16 bytes)
    pub header: FrameHeader,

    /// Raw payload bytes (already encoded by the message codec)
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame with automatic payload_size calculation
    ///
    /// The header's `payload_size` field is set to match the actual payload
    /// length, so header and payload cannot disagree.
    #[must_use]
    pub fn new(mut header: FrameHeader, payload: impl Into<Bytes>) -> Self {
        let payload = payload.into();

        #[allow(clippy::cast_possible_truncation)]
        {
            header.payload_size = (payload.len() as u32).to_be_bytes();
        }

        Self { header, payload }
    }

    /// Encode the frame into a buffer
    ///
    /// Writes `[header (16 bytes)] + [payload (variable)]`.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::PayloadTooLarge`] if the payload exceeds
    /// [`FrameHeader::MAX_PAYLOAD_SIZE`]. This is the enforcement point for
    /// the size bound on the send path.
    pub fn encode(&self, dst: &mut impl BufMut) -> Result<()> {
        if self.payload.len() > FrameHeader::MAX_PAYLOAD_SIZE as usize {
            return Err(ProtocolError::PayloadTooLarge {
                size: self.payload.len(),
                max: FrameHeader::MAX_PAYLOAD_SIZE as usize,
            });
        }

        dst.put_slice(&self.header.to_bytes());
        dst.put_slice(&self.payload);

        Ok(())
    }

    /// Decode a frame from wire format
    ///
    /// Returns a `Frame` with raw payload bytes; message decoding happens
    /// later through the registry. Trailing data past the declared payload
    /// length is ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - header parsing fails (invalid magic, version, or size bound)
    /// - the payload is truncated (fewer bytes than the header claims)
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let header = FrameHeader::from_bytes(bytes)?;

        let payload_size = header.payload_size() as usize;
        let total_size = FrameHeader::SIZE + payload_size;

        if bytes.len() < total_size {
            return Err(ProtocolError::FrameTruncated {
                expected: payload_size,
                actual: bytes.len().saturating_sub(FrameHeader::SIZE),
            });
        }

        let payload = Bytes::copy_from_slice(&bytes[FrameHeader::SIZE..total_size]);

        Ok(Self { header: *header, payload })
    }

    /// Total size of the frame on the wire
    #[must_use]
    pub fn wire_size(&self) -> usize {
        FrameHeader::SIZE + self.payload.len()
    }
}
