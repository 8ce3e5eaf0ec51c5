//! CPU texture backend
//!
//! Keeps the texture in memory and samples it through the same quad
//! geometry the GPU path uses. Used headless and in tests.

use crate::display::{uv_at_clip, TextureBackend};
use crate::error::{MediaError, MediaResult};
use framecast_core::rgba_len;

/// Largest texture dimension accepted by default
pub const DEFAULT_MAX_TEXTURE_DIMENSION: u32 = 8192;

/// In-memory [`TextureBackend`]
#[derive(Debug, Clone)]
pub struct SoftwareBackend {
    texture: Vec<u8>,
    width: u32,
    height: u32,
    max_dimension: u32,
    allocations: u64,
    updates: u64,
    draws: u64,
    clears: u64,
    last_clear: Option<[f32; 4]>,
}

impl Default for SoftwareBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl SoftwareBackend {
    /// Create a backend with the default size limit
    pub fn new() -> Self {
        Self::with_max_dimension(DEFAULT_MAX_TEXTURE_DIMENSION)
    }

    /// Create a backend refusing textures wider or taller than `max_dimension`
    pub fn with_max_dimension(max_dimension: u32) -> Self {
        Self {
            texture: Vec::new(),
            width: 0,
            height: 0,
            max_dimension,
            allocations: 0,
            updates: 0,
            draws: 0,
            clears: 0,
            last_clear: None,
        }
    }

    /// Texture dimensions
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Texture bytes
    pub fn texture(&self) -> &[u8] {
        &self.texture
    }

    /// Pixel shown at clip-space `(x, y)` with nearest sampling
    pub fn sample_at_clip(&self, x: f32, y: f32) -> Option<[u8; 4]> {
        if self.width == 0 || self.height == 0 {
            return None;
        }
        let [u, v] = uv_at_clip(x, y);
        let col = ((u * self.width as f32) as u32).min(self.width - 1);
        let row = ((v * self.height as f32) as u32).min(self.height - 1);
        let offset = (row as usize * self.width as usize + col as usize) * 4;
        let px = self.texture.get(offset..offset + 4)?;
        Some([px[0], px[1], px[2], px[3]])
    }

    /// Texture allocations so far
    pub fn allocations(&self) -> u64 {
        self.allocations
    }

    /// In-place updates so far
    pub fn updates(&self) -> u64 {
        self.updates
    }

    /// Draw calls so far
    pub fn draws(&self) -> u64 {
        self.draws
    }

    /// Clears so far
    pub fn clears(&self) -> u64 {
        self.clears
    }

    /// Color of the most recent clear
    pub fn last_clear(&self) -> Option<[f32; 4]> {
        self.last_clear
    }
}

impl TextureBackend for SoftwareBackend {
    fn allocate(&mut self, width: u32, height: u32, pixels: &[u8]) -> MediaResult<()> {
        if width > self.max_dimension || height > self.max_dimension {
            return Err(MediaError::TextureTooLarge {
                width,
                height,
                limit: self.max_dimension,
            });
        }
        let expected = rgba_len(width, height).ok_or(MediaError::MemoryAllocationFailed {
            size: usize::MAX,
        })?;
        if pixels.len() != expected {
            return Err(MediaError::InvalidFrameData {
                expected,
                actual: pixels.len(),
            });
        }

        self.texture = pixels.to_vec();
        self.width = width;
        self.height = height;
        self.allocations += 1;
        Ok(())
    }

    fn update(&mut self, pixels: &[u8]) -> MediaResult<()> {
        if pixels.len() != self.texture.len() {
            return Err(MediaError::InvalidFrameData {
                expected: self.texture.len(),
                actual: pixels.len(),
            });
        }
        self.texture.copy_from_slice(pixels);
        self.updates += 1;
        Ok(())
    }

    fn draw(&mut self) -> MediaResult<()> {
        if self.texture.is_empty() {
            return Err(MediaError::InvalidState {
                message: "draw before allocate".to_string(),
            });
        }
        self.draws += 1;
        Ok(())
    }

    fn clear(&mut self, color: [f32; 4]) -> MediaResult<()> {
        self.clears += 1;
        self.last_clear = Some(color);
        Ok(())
    }
}
