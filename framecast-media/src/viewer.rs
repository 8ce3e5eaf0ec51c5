//! Viewer-side frame decoding
//!
//! A remote viewer receives binary frame messages and paints them into a
//! [`RasterSurface`]. Messages whose body length disagrees with their header
//! are discarded and the surface keeps showing the previous image.

use framecast_core::{decode_frame, FramecastError};
use tracing::{debug, warn};

/// Initial surface width, before any frame arrives
pub const INITIAL_WIDTH: u32 = 320;
/// Initial surface height, before any frame arrives
pub const INITIAL_HEIGHT: u32 = 240;

const OPAQUE_BLACK: [u8; 4] = [0, 0, 0, 255];

/// CPU RGBA surface the viewer paints into
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterSurface {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl Default for RasterSurface {
    fn default() -> Self {
        Self::new(INITIAL_WIDTH, INITIAL_HEIGHT)
    }
}

impl RasterSurface {
    /// Create an opaque black surface
    pub fn new(width: u32, height: u32) -> Self {
        let mut surface = Self {
            width: 0,
            height: 0,
            pixels: Vec::new(),
        };
        surface.resize(width, height);
        surface
    }

    /// Resize, discarding the contents and filling with opaque black
    pub fn resize(&mut self, width: u32, height: u32) {
        let count = width as usize * height as usize;
        self.pixels.clear();
        self.pixels.reserve_exact(count * 4);
        for _ in 0..count {
            self.pixels.extend_from_slice(&OPAQUE_BLACK);
        }
        self.width = width;
        self.height = height;
    }

    /// Copy same-sized RGBA rows into the surface
    fn paint(&mut self, pixels: &[u8]) {
        self.pixels.copy_from_slice(pixels);
    }

    /// `(width, height)`
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Surface bytes
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Pixel at column `x`, row `y`
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = (y as usize * self.width as usize + x as usize) * 4;
        let px = &self.pixels[offset..offset + 4];
        Some([px[0], px[1], px[2], px[3]])
    }
}

/// Result of applying one message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Applied {
    /// Frame width
    pub width: u32,
    /// Frame height
    pub height: u32,
    /// Whether the surface changed size
    pub resized: bool,
}

/// Paints received frame messages into a [`RasterSurface`]
#[derive(Debug, Default)]
pub struct ViewerDecoder {
    surface: RasterSurface,
    applied: u64,
    discarded: u64,
}

impl ViewerDecoder {
    /// Create a decoder with the initial 320x240 black surface
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate a frame message and paint it.
    ///
    /// A malformed message leaves the surface untouched. A frame with new
    /// dimensions resizes the surface first; `0x0` frames are legal and
    /// shrink it to nothing.
    pub fn apply(&mut self, payload: &[u8]) -> Result<Applied, FramecastError> {
        let decoded = match decode_frame(payload) {
            Ok(decoded) => decoded,
            Err(e) => {
                self.discarded += 1;
                warn!("Discarding frame message: {}", e);
                return Err(e);
            }
        };

        let (width, height) = (decoded.header.width, decoded.header.height);
        let resized = self.surface.dimensions() != (width, height);
        if resized {
            debug!("Viewer surface resized to {}x{}", width, height);
            self.surface.resize(width, height);
        }
        self.surface.paint(decoded.pixels);
        self.applied += 1;

        Ok(Applied {
            width,
            height,
            resized,
        })
    }

    /// Surface being painted
    pub fn surface(&self) -> &RasterSurface {
        &self.surface
    }

    /// Human-readable resolution, e.g. `"640 x 480"`
    pub fn resolution_label(&self) -> String {
        let (w, h) = self.surface.dimensions();
        format!("{} x {}", w, h)
    }

    /// Frames painted
    pub fn frames_applied(&self) -> u64 {
        self.applied
    }

    /// Messages discarded as malformed
    pub fn frames_discarded(&self) -> u64 {
        self.discarded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(width: u32, height: u32, body: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(8 + body.len());
        out.extend_from_slice(&width.to_le_bytes());
        out.extend_from_slice(&height.to_le_bytes());
        out.extend_from_slice(body);
        out
    }

    #[test]
    fn test_initial_surface() {
        let decoder = ViewerDecoder::new();
        assert_eq!(decoder.surface().dimensions(), (320, 240));
        assert_eq!(decoder.surface().pixel(0, 0), Some([0, 0, 0, 255]));
        assert_eq!(decoder.resolution_label(), "320 x 240");
    }

    #[test]
    fn test_apply_resizes_and_paints() {
        let mut decoder = ViewerDecoder::new();
        let body: Vec<u8> = (0..16).collect();

        let applied = decoder.apply(&payload(2, 2, &body)).unwrap();
        assert!(applied.resized);
        assert_eq!(decoder.surface().pixels(), &body[..]);
        assert_eq!(decoder.surface().pixel(1, 1), Some([12, 13, 14, 15]));

        let applied = decoder.apply(&payload(2, 2, &[9; 16])).unwrap();
        assert!(!applied.resized);
        assert_eq!(decoder.surface().pixel(0, 0), Some([9, 9, 9, 9]));
        assert_eq!(decoder.frames_applied(), 2);
    }

    #[test]
    fn test_mismatched_message_leaves_surface() {
        let mut decoder = ViewerDecoder::new();
        decoder.apply(&payload(1, 1, &[1, 2, 3, 4])).unwrap();
        let before = decoder.surface().clone();

        assert!(decoder.apply(&payload(2, 2, &[0; 15])).is_err());
        assert!(decoder.apply(&[1, 2, 3]).is_err());

        assert_eq!(decoder.surface(), &before);
        assert_eq!(decoder.frames_discarded(), 2);
    }

    #[test]
    fn test_zero_sized_frame() {
        let mut decoder = ViewerDecoder::new();
        let applied = decoder.apply(&payload(0, 0, &[])).unwrap();
        assert!(applied.resized);
        assert_eq!(decoder.surface().dimensions(), (0, 0));
        assert!(decoder.surface().pixels().is_empty());
    }
}
