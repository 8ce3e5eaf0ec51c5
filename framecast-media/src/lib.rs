//! # Framecast Media
//!
//! Everything that touches pixels on this side of the network: the capture
//! boundary and capture thread, the local texture display with its software
//! and wgpu backends, and viewer-side frame decoding.

#![warn(clippy::all)]

pub mod capture;
pub mod display;
pub mod error;
#[cfg(feature = "wgpu")]
pub mod gpu;
pub mod software;
pub mod viewer;

// Re-export main types
pub use capture::{
    CaptureStats, CaptureWorker, FrameSource, FrameTransform, LumaToRgba, PassthroughRgba,
    PixelLayout, RawFrame, TestPatternSource,
};
pub use display::{
    uv_at_clip, DisplayConfig, DisplaySink, DisplayStats, DisplayThread, QuadVertex,
    RedrawOutcome, TextureBackend, TextureState, BACKGROUND_BLACK, QUAD_VERTICES,
};
pub use error::{ErrorCategory, MediaError, MediaResult};
#[cfg(feature = "wgpu")]
pub use gpu::WgpuBackend;
pub use software::{SoftwareBackend, DEFAULT_MAX_TEXTURE_DIMENSION};
pub use viewer::{Applied, RasterSurface, ViewerDecoder, INITIAL_HEIGHT, INITIAL_WIDTH};
