//! Headless viewer state
//!
//! Folds [`SubscriberEvent`]s into a decoded surface, a connection state and
//! a frame rate, which is everything a viewer page would show.

use crate::config::ViewerConfig;
use framecast_broadcast::SubscriberEvent;
use framecast_diagnostics::{ConnectionState, FrameRateMeter};
use framecast_media::ViewerDecoder;
use serde::Serialize;
use tracing::{debug, info};

/// What a viewer shows besides the image
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViewerStatus {
    /// Connection state
    pub state: ConnectionState,
    /// Current surface resolution, e.g. `"640 x 480"`
    pub resolution: String,
    /// Frames per second over the last closed window
    pub fps: Option<f64>,
    /// Frames painted
    pub frames_applied: u64,
    /// Messages discarded as malformed
    pub frames_discarded: u64,
}

/// Viewer without a window
#[derive(Debug)]
pub struct HeadlessViewer {
    decoder: ViewerDecoder,
    meter: FrameRateMeter,
    state: ConnectionState,
}

impl HeadlessViewer {
    /// Create a viewer showing the initial black surface
    pub fn new(config: &ViewerConfig) -> Self {
        Self {
            decoder: ViewerDecoder::new(),
            meter: FrameRateMeter::new(config.fps_window),
            state: ConnectionState::Disconnected,
        }
    }

    /// Apply one subscriber event
    pub fn handle(&mut self, event: SubscriberEvent) {
        match event {
            SubscriberEvent::StateChanged(state) => {
                self.state = state;
                info!("{}", state);
            }
            SubscriberEvent::Frame(payload) => {
                if let Ok(applied) = self.decoder.apply(&payload) {
                    if applied.resized {
                        info!("Resolution: {}", self.decoder.resolution_label());
                    }
                    if let Some(fps) = self.meter.tick() {
                        debug!("FPS: {:.1}", fps);
                    }
                }
            }
            SubscriberEvent::Text(text) => info!("Server message: {}", text),
        }
    }

    /// Current status
    pub fn status(&self) -> ViewerStatus {
        ViewerStatus {
            state: self.state,
            resolution: self.decoder.resolution_label(),
            fps: self.meter.last_rate(),
            frames_applied: self.decoder.frames_applied(),
            frames_discarded: self.decoder.frames_discarded(),
        }
    }

    /// Decoded surface and counters
    pub fn decoder(&self) -> &ViewerDecoder {
        &self.decoder
    }
}
