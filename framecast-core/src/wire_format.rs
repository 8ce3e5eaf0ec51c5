//! Binary frame wire format
//!
//! Every frame crosses the network as a single message:
//!
//! ```text
//! offset 0  u32 LE  width
//! offset 4  u32 LE  height
//! offset 8  width * height * 4 bytes of RGBA8, row-major, no padding
//! ```
//!
//! There is no magic number, version, or checksum. The only integrity check
//! available to a receiver is that the body length agrees with the header.

use crate::error::FramecastError;
use crate::frame::Frame;
use bytes::{BufMut, Bytes, BytesMut};

/// Size of the fixed frame header in bytes
pub const HEADER_LEN: usize = 8;

/// Parsed frame header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

impl FrameHeader {
    /// Read the header from the start of a payload
    pub fn parse(payload: &[u8]) -> Result<Self, FramecastError> {
        if payload.len() < HEADER_LEN {
            return Err(FramecastError::MalformedPayload {
                len: payload.len(),
                required: HEADER_LEN,
            });
        }

        let width = u32::from_le_bytes([payload[0], payload[1], payload[2], payload[3]]);
        let height = u32::from_le_bytes([payload[4], payload[5], payload[6], payload[7]]);
        Ok(Self { width, height })
    }

    /// Append the header in wire order
    pub fn write(&self, buf: &mut BytesMut) {
        buf.put_u32_le(self.width);
        buf.put_u32_le(self.height);
    }

    /// Pixel byte count the header promises.
    ///
    /// Computed in `u64` and saturating, so hostile headers cannot overflow.
    pub fn expected_pixel_len(&self) -> u64 {
        (self.width as u64 * self.height as u64).saturating_mul(4)
    }

    /// Total payload length the header promises
    pub fn expected_payload_len(&self) -> u64 {
        self.expected_pixel_len().saturating_add(HEADER_LEN as u64)
    }
}

/// Validated view into a frame payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedFrame<'a> {
    /// Header fields
    pub header: FrameHeader,
    /// RGBA bytes following the header
    pub pixels: &'a [u8],
}

/// Parse and validate a payload.
///
/// Zero dimensions are legal on the wire: an 8-byte payload with a `0x0`
/// header decodes to an empty pixel slice.
pub fn decode_frame(payload: &[u8]) -> Result<DecodedFrame<'_>, FramecastError> {
    let header = FrameHeader::parse(payload)?;
    let pixels = &payload[HEADER_LEN..];

    let expected = header.expected_pixel_len();
    if pixels.len() as u64 != expected {
        return Err(FramecastError::LengthMismatch {
            width: header.width,
            height: header.height,
            expected,
            actual: pixels.len() as u64,
        });
    }

    Ok(DecodedFrame { header, pixels })
}

/// Encode a frame into a fresh buffer
pub fn encode_frame(frame: &Frame) -> Bytes {
    let mut buf = BytesMut::with_capacity(HEADER_LEN + frame.pixels().len());
    write_frame(frame, &mut buf);
    buf.freeze()
}

fn write_frame(frame: &Frame, buf: &mut BytesMut) {
    FrameHeader {
        width: frame.width(),
        height: frame.height(),
    }
    .write(buf);
    buf.extend_from_slice(frame.pixels());
}

/// Frame encoder that keeps one scratch buffer across calls.
///
/// The buffer is sized for the current resolution. While the resolution stays
/// the same its storage is reclaimed once the previously returned payload has
/// been dropped; a resolution change sizes a new buffer.
#[derive(Debug, Default)]
pub struct FrameEncoder {
    scratch: BytesMut,
    sized_for: usize,
    allocations: u64,
}

impl FrameEncoder {
    /// Create an encoder with no buffer yet
    pub fn new() -> Self {
        Self::default()
    }

    /// Encode a frame, returning a cheaply clonable payload
    pub fn encode(&mut self, frame: &Frame) -> Bytes {
        let total = HEADER_LEN + frame.pixels().len();

        if self.sized_for != total {
            self.scratch = BytesMut::with_capacity(total);
            self.sized_for = total;
            self.allocations += 1;
        } else {
            self.scratch.reserve(total);
        }

        write_frame(frame, &mut self.scratch);
        self.scratch.split().freeze()
    }

    /// Number of scratch buffers sized so far
    pub fn allocations(&self) -> u64 {
        self.allocations
    }
}
