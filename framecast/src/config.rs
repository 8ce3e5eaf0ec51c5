//! Configuration types and defaults

use crate::error::PipelineError;
use framecast_broadcast::SubscriberConfig;
use framecast_core::{FramecastError, RelayConfig};
use framecast_media::DisplayConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Built-in test pattern capture settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Frames per second
    pub frame_rate: f64,
    /// Stop after this many frames
    pub max_frames: Option<u64>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            frame_rate: 30.0,
            max_frames: None,
        }
    }
}

impl CaptureConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), FramecastError> {
        if self.width == 0 || self.height == 0 {
            return Err(FramecastError::InvalidConfiguration {
                field: "capture".to_string(),
                reason: format!("dimensions must be non-zero, got {}x{}", self.width, self.height),
            });
        }
        if !(self.frame_rate > 0.0 && self.frame_rate.is_finite()) {
            return Err(FramecastError::InvalidConfiguration {
                field: "capture.frame_rate".to_string(),
                reason: format!("must be positive, got {}", self.frame_rate),
            });
        }
        Ok(())
    }
}

/// Producer-side pipeline configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Test pattern capture
    #[serde(default)]
    pub capture: CaptureConfig,
    /// Local display
    #[serde(default)]
    pub display: DisplayConfig,
    /// Relay uplink. `None` runs the pipeline without uploading.
    #[serde(default)]
    pub relay: Option<RelayConfig>,
}

impl PipelineConfig {
    /// Validate every section
    pub fn validate(&self) -> Result<(), PipelineError> {
        self.capture.validate()?;
        self.display.validate()?;
        if let Some(relay) = &self.relay {
            relay.validate()?;
        }
        Ok(())
    }

    /// Parse a JSON configuration
    pub fn from_json(text: &str) -> Result<Self, PipelineError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a JSON configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, PipelineError> {
        let text = std::fs::read_to_string(path).map_err(framecast_media::MediaError::from)?;
        Self::from_json(&text)
    }
}

/// Headless viewer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewerConfig {
    /// WebSocket URL of the broadcast server's viewer endpoint
    pub url: String,
    /// Delay before reconnecting after a disconnect
    pub reconnect_delay: Duration,
    /// Window over which frames per second are measured
    pub fps_window: Duration,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:8080/ws".to_string(),
            reconnect_delay: Duration::from_secs(2),
            fps_window: Duration::from_secs(1),
        }
    }
}

impl ViewerConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), PipelineError> {
        self.subscriber().validate()?;
        if self.fps_window < Duration::from_secs(1) {
            return Err(FramecastError::InvalidConfiguration {
                field: "fps_window".to_string(),
                reason: "must be at least one second".to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// Subscriber settings derived from this configuration
    pub fn subscriber(&self) -> SubscriberConfig {
        SubscriberConfig {
            url: self.url.clone(),
            reconnect_delay: self.reconnect_delay,
            ..Default::default()
        }
    }
}
