//! Frames and pixel buffer reuse
//!
//! A [`Frame`] is always valid once constructed: both dimensions are non-zero
//! and the pixel buffer holds exactly `width * height * 4` RGBA bytes, row-major,
//! with no row padding.

use crate::error::FramecastError;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

/// Bytes per RGBA8 pixel
pub const BYTES_PER_PIXEL: usize = 4;

/// Pixel byte count for the given dimensions, `None` on overflow
pub fn rgba_len(width: u32, height: u32) -> Option<usize> {
    (width as usize)
        .checked_mul(height as usize)?
        .checked_mul(BYTES_PER_PIXEL)
}

/// One decoded image: RGBA8, row-major, no padding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl Frame {
    /// Create a frame, validating that the buffer matches the dimensions
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self, FramecastError> {
        if width == 0 || height == 0 {
            return Err(FramecastError::EmptyFrame { width, height });
        }

        let expected = rgba_len(width, height).ok_or(FramecastError::InvalidFrame {
            width,
            height,
            expected: usize::MAX,
            actual: pixels.len(),
        })?;

        if pixels.len() != expected {
            return Err(FramecastError::InvalidFrame {
                width,
                height,
                expected,
                actual: pixels.len(),
            });
        }

        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    /// Width in pixels
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels
    pub fn height(&self) -> u32 {
        self.height
    }

    /// `(width, height)`
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// RGBA bytes
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Give the pixel buffer back, e.g. to a [`BufferPool`]
    pub fn into_pixels(self) -> Vec<u8> {
        self.pixels
    }
}

/// Single-spare buffer pool.
///
/// Holds at most one idle buffer. A buffer is handed out again only when its
/// capacity equals the requested length exactly; a resolution change therefore
/// costs one fresh allocation and the old spare is dropped.
#[derive(Debug, Default)]
pub struct BufferPool {
    spare: Mutex<Option<Vec<u8>>>,
    allocations: AtomicU64,
    reuses: AtomicU64,
}

impl BufferPool {
    /// Create an empty pool
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a zeroed buffer of exactly `len` bytes
    pub fn acquire(&self, len: usize) -> Vec<u8> {
        let spare = self.spare.lock().take();
        match spare {
            Some(mut buf) if buf.capacity() == len => {
                self.reuses.fetch_add(1, Ordering::Relaxed);
                buf.clear();
                buf.resize(len, 0);
                buf
            }
            _ => {
                self.allocations.fetch_add(1, Ordering::Relaxed);
                vec![0; len]
            }
        }
    }

    /// Return a buffer for later reuse
    pub fn release(&self, buf: Vec<u8>) {
        *self.spare.lock() = Some(buf);
    }

    /// Number of buffers allocated by [`acquire`](Self::acquire)
    pub fn allocations(&self) -> u64 {
        self.allocations.load(Ordering::Relaxed)
    }

    /// Number of times a spare was handed out again
    pub fn reuses(&self) -> u64 {
        self.reuses.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_validation() {
        let frame = Frame::new(2, 1, vec![0; 8]).unwrap();
        assert_eq!(frame.dimensions(), (2, 1));
        assert_eq!(frame.pixels().len(), 8);

        match Frame::new(2, 2, vec![0; 15]) {
            Err(FramecastError::InvalidFrame {
                expected, actual, ..
            }) => {
                assert_eq!(expected, 16);
                assert_eq!(actual, 15);
            }
            other => panic!("Expected InvalidFrame, got {:?}", other),
        }

        assert!(matches!(
            Frame::new(0, 4, Vec::new()),
            Err(FramecastError::EmptyFrame { .. })
        ));
    }

    #[test]
    fn test_pool_reuses_matching_capacity() {
        let pool = BufferPool::new();

        let buf = pool.acquire(16);
        assert_eq!(buf.len(), 16);
        pool.release(buf);

        let buf = pool.acquire(16);
        assert_eq!(pool.allocations(), 1);
        assert_eq!(pool.reuses(), 1);
        pool.release(buf);

        // A different size never reuses the spare
        let buf = pool.acquire(32);
        assert_eq!(buf.len(), 32);
        assert_eq!(pool.allocations(), 2);
        assert_eq!(pool.reuses(), 1);
    }

    #[test]
    fn test_rgba_len_overflow() {
        assert_eq!(rgba_len(4, 2), Some(32));
        assert_eq!(rgba_len(0, 2), Some(0));
        assert_eq!(rgba_len(u32::MAX, u32::MAX), None);
    }
}
