//! Local display of the newest frame
//!
//! [`DisplaySink`] owns one texture through a [`TextureBackend`] and draws it
//! as a full-surface quad on every redraw tick. The texture is allocated on
//! the first frame and whenever the resolution changes; frames with the same
//! resolution are written into the existing texture in place.

use crate::error::{MediaError, MediaResult};
use framecast_core::{EventBus, MailboxReader, PipelineEvent};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace, warn};

/// Opaque black
pub const BACKGROUND_BLACK: [f32; 4] = [0.0, 0.0, 0.0, 1.0];

/// One corner of the display quad: clip-space position and texture coordinate
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "wgpu", derive(bytemuck::Pod, bytemuck::Zeroable))]
pub struct QuadVertex {
    /// Clip-space `(x, y)`, each in `[-1, 1]`, y up
    pub position: [f32; 2],
    /// Texture `(u, v)`, `(0, 0)` is the first byte of the pixel buffer
    pub uv: [f32; 2],
}

/// Full-surface quad as a triangle strip: bottom-left, bottom-right,
/// top-left, top-right.
///
/// The top edge samples `v = 0` (pixel row 0) and the left edge samples
/// `u = 0` (pixel column 0), so the image appears upright and unmirrored.
pub const QUAD_VERTICES: [QuadVertex; 4] = [
    QuadVertex {
        position: [-1.0, -1.0],
        uv: [0.0, 1.0],
    },
    QuadVertex {
        position: [1.0, -1.0],
        uv: [1.0, 1.0],
    },
    QuadVertex {
        position: [-1.0, 1.0],
        uv: [0.0, 0.0],
    },
    QuadVertex {
        position: [1.0, 1.0],
        uv: [1.0, 0.0],
    },
];

/// Texture coordinate the quad maps to a clip-space point
pub fn uv_at_clip(x: f32, y: f32) -> [f32; 2] {
    let bl = QUAD_VERTICES[0];
    let tr = QUAD_VERTICES[3];
    let tx = (x - bl.position[0]) / (tr.position[0] - bl.position[0]);
    let ty = (y - bl.position[1]) / (tr.position[1] - bl.position[1]);
    [
        bl.uv[0] + tx * (tr.uv[0] - bl.uv[0]),
        bl.uv[1] + ty * (tr.uv[1] - bl.uv[1]),
    ]
}

/// Where frames are drawn.
///
/// Implementations keep exactly one texture. `allocate` creates or replaces
/// it; `update` overwrites it and must not allocate.
pub trait TextureBackend: Send + 'static {
    /// Create a `width`x`height` texture initialised with `pixels`
    fn allocate(&mut self, width: u32, height: u32, pixels: &[u8]) -> MediaResult<()>;

    /// Overwrite the existing texture with same-sized `pixels`
    fn update(&mut self, pixels: &[u8]) -> MediaResult<()>;

    /// Draw the texture over the whole surface and present
    fn draw(&mut self) -> MediaResult<()>;

    /// Fill the surface with `color` and present
    fn clear(&mut self, color: [f32; 4]) -> MediaResult<()>;
}

/// Texture lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureState {
    /// No frame uploaded yet
    Uninitialized,
    /// Texture exists with these dimensions
    Allocated {
        /// Texture width
        width: u32,
        /// Texture height
        height: u32,
    },
    /// Allocation failed; the sink no longer draws
    Failed,
}

/// What a redraw did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedrawOutcome {
    /// Nothing uploaded yet; surface cleared to the background
    Cleared,
    /// No new frame; existing texture drawn again
    Redrawn,
    /// New frame uploaded and drawn
    Uploaded {
        /// Whether the texture had to be (re)allocated
        allocated: bool,
    },
}

/// Display configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayConfig {
    /// Redraw ticks per second
    pub redraw_rate: f64,
    /// Color shown before the first frame
    pub background_color: [f32; 4],
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            redraw_rate: 60.0,
            background_color: BACKGROUND_BLACK,
        }
    }
}

impl DisplayConfig {
    /// Validate configuration
    pub fn validate(&self) -> MediaResult<()> {
        if !(self.redraw_rate > 0.0 && self.redraw_rate.is_finite()) {
            return Err(MediaError::InvalidConfiguration {
                message: format!("redraw rate must be positive, got {}", self.redraw_rate),
            });
        }
        Ok(())
    }

    /// Time between redraw ticks
    pub fn redraw_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.redraw_rate)
    }
}

/// Display counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DisplayStats {
    /// Texture allocations
    pub allocations: u64,
    /// In-place texture updates
    pub updates: u64,
    /// Redraw ticks handled
    pub redraws: u64,
}

/// Uploads the newest mailbox frame and draws it every tick
pub struct DisplaySink<B: TextureBackend> {
    backend: B,
    reader: MailboxReader,
    state: TextureState,
    config: DisplayConfig,
    stats: DisplayStats,
    events: Option<EventBus>,
}

impl<B: TextureBackend> DisplaySink<B> {
    /// Create a sink drawing through `backend`
    pub fn new(backend: B, reader: MailboxReader, config: DisplayConfig) -> Self {
        Self {
            backend,
            reader,
            state: TextureState::Uninitialized,
            config,
            stats: DisplayStats::default(),
            events: None,
        }
    }

    /// Report allocations and failures on `events`
    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    /// Handle one redraw tick.
    ///
    /// Errors from `update` or `draw` leave the sink usable. An allocation
    /// error moves it to [`TextureState::Failed`] and every later call fails.
    pub fn redraw(&mut self) -> MediaResult<RedrawOutcome> {
        if self.state == TextureState::Failed {
            return Err(MediaError::InvalidState {
                message: "display texture allocation failed earlier".to_string(),
            });
        }
        self.stats.redraws += 1;

        let frame = match self.reader.take_if_new() {
            Some(frame) => frame,
            None => {
                return match self.state {
                    TextureState::Allocated { .. } => {
                        self.backend.draw()?;
                        Ok(RedrawOutcome::Redrawn)
                    }
                    _ => {
                        self.backend.clear(self.config.background_color)?;
                        Ok(RedrawOutcome::Cleared)
                    }
                };
            }
        };

        let (width, height) = frame.dimensions();
        let allocated = match self.state {
            TextureState::Allocated {
                width: w,
                height: h,
            } if w == width && h == height => {
                self.backend.update(frame.pixels())?;
                self.stats.updates += 1;
                false
            }
            _ => {
                if let Err(e) = self.backend.allocate(width, height, frame.pixels()) {
                    error!("Texture allocation for {}x{} failed: {}", width, height, e);
                    self.state = TextureState::Failed;
                    if let Some(events) = &self.events {
                        events.emit(PipelineEvent::DisplayFailed {
                            reason: e.to_string(),
                        });
                    }
                    return Err(e);
                }
                debug!("Allocated {}x{} display texture", width, height);
                self.state = TextureState::Allocated { width, height };
                self.stats.allocations += 1;
                if let Some(events) = &self.events {
                    events.emit(PipelineEvent::TextureAllocated { width, height });
                }
                true
            }
        };

        self.backend.draw()?;
        trace!("Drew {}x{} frame", width, height);
        Ok(RedrawOutcome::Uploaded { allocated })
    }

    /// Current texture state
    pub fn state(&self) -> TextureState {
        self.state
    }

    /// Whether allocation has failed
    pub fn is_failed(&self) -> bool {
        self.state == TextureState::Failed
    }

    /// Counters
    pub fn stats(&self) -> DisplayStats {
        self.stats
    }

    /// Display configuration
    pub fn config(&self) -> &DisplayConfig {
        &self.config
    }

    /// Backend
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Backend, mutably (e.g. to resize the surface)
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }
}

/// Dedicated thread running [`DisplaySink::redraw`] at a fixed rate
pub struct DisplayThread<B: TextureBackend> {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<DisplaySink<B>>>,
}

impl<B: TextureBackend> DisplayThread<B> {
    /// Start redrawing on a new thread at the sink's configured rate
    pub fn spawn(mut sink: DisplaySink<B>) -> MediaResult<Self> {
        sink.config.validate()?;
        let interval = sink.config.redraw_interval();
        let stop = Arc::new(AtomicBool::new(false));

        let thread = std::thread::Builder::new()
            .name("framecast-display".to_string())
            .spawn({
                let stop = Arc::clone(&stop);
                move || {
                    while !stop.load(Ordering::Acquire) {
                        let tick = Instant::now();
                        if let Err(e) = sink.redraw() {
                            if sink.is_failed() {
                                error!("Display stopped: {}", e);
                                break;
                            }
                            warn!(category = ?e.category(), "Redraw failed: {}", e);
                        }
                        if let Some(rest) = interval.checked_sub(tick.elapsed()) {
                            std::thread::sleep(rest);
                        }
                    }
                    sink
                }
            })?;

        info!("Display thread started ({:?} per frame)", interval);
        Ok(Self {
            stop,
            thread: Some(thread),
        })
    }

    /// Whether the thread is still redrawing
    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Stop the thread and hand back the sink
    pub fn stop(&mut self) -> MediaResult<DisplaySink<B>> {
        self.stop.store(true, Ordering::Release);
        let thread = self.thread.take().ok_or(MediaError::InvalidState {
            message: "display thread already stopped".to_string(),
        })?;
        thread.join().map_err(|_| MediaError::InvalidState {
            message: "display thread panicked".to_string(),
        })
    }
}

impl<B: TextureBackend> Drop for DisplayThread<B> {
    fn drop(&mut self) {
        if self.thread.is_some() {
            let _ = self.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quad_corners() {
        assert_eq!(uv_at_clip(-1.0, 1.0), [0.0, 0.0]);
        assert_eq!(uv_at_clip(1.0, 1.0), [1.0, 0.0]);
        assert_eq!(uv_at_clip(-1.0, -1.0), [0.0, 1.0]);
        assert_eq!(uv_at_clip(1.0, -1.0), [1.0, 1.0]);
        assert_eq!(uv_at_clip(0.0, 0.0), [0.5, 0.5]);
    }

    #[test]
    fn test_display_config_validation() {
        assert!(DisplayConfig::default().validate().is_ok());
        assert_eq!(
            DisplayConfig::default().background_color,
            [0.0, 0.0, 0.0, 1.0]
        );

        let config = DisplayConfig {
            redraw_rate: 0.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
