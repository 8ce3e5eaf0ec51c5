//! # Framecast - Live Frame Relay
//!
//! Framecast takes frames from a capture source, shows them locally and
//! relays them to any number of remote viewers.
//!
//! ## Key Features
//!
//! - **Latest-wins handoff**: one mailbox, independent consumers, no queues
//! - **Local display**: upright textured quad, software or wgpu backend
//! - **Rate-limited relay**: at most one upload per interval, failures dropped
//! - **Fan-out server**: HTTP uploads forwarded byte for byte to WebSocket viewers
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use framecast::{Pipeline, PipelineConfig, PassthroughRgba, RelayConfig, SoftwareBackend};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), framecast::PipelineError> {
//!     let config = PipelineConfig {
//!         relay: Some(RelayConfig::default()),
//!         ..Default::default()
//!     };
//!
//!     let mut pipeline = Pipeline::new(config)?;
//!     pipeline.start_test_pattern(PassthroughRgba, Some(SoftwareBackend::new()))?;
//!
//!     tokio::time::sleep(std::time::Duration::from_secs(5)).await;
//!     pipeline.stop().await?;
//!     Ok(())
//! }
//! ```

#![deny(missing_docs)]
#![warn(clippy::all)]

// Re-export core types for easy access
pub use framecast_core::{
    decode_frame, encode_frame, CycleOutcome, EventBus, EventStream, Frame, FrameEncoder,
    FrameHeader, FrameMailbox, FrameTransport, FramecastError, HttpTransport, MailboxReader,
    PipelineEvent, RelayConfig, RelayHandle, RelayUplink, HEADER_LEN,
};

pub use framecast_media::{
    CaptureWorker, DisplayConfig, DisplaySink, DisplayThread, FrameSource, FrameTransform,
    LumaToRgba, MediaError, PassthroughRgba, PixelLayout, RasterSurface, RawFrame,
    RedrawOutcome, SoftwareBackend, TestPatternSource, TextureBackend, TextureState,
    ViewerDecoder,
};

#[cfg(feature = "wgpu")]
pub use framecast_media::WgpuBackend;

pub use framecast_broadcast::{
    BroadcastError, BroadcastServer, FrameSubscriber, RunningServer, ServerConfig,
    SubscriberConfig, SubscriberEvent,
};

pub use framecast_diagnostics::{
    init_logging, ConnectionInfo, ConnectionState, FrameRateMeter,
};

// Public API modules
pub mod config;
pub mod error;
pub mod pipeline;
pub mod viewer;

// Re-export main API types
pub use config::{CaptureConfig, PipelineConfig, ViewerConfig};
pub use error::PipelineError;
pub use pipeline::{Pipeline, PipelineStats};
pub use viewer::{HeadlessViewer, ViewerStatus};
