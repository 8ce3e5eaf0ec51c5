//! Pipeline-level error type

use framecast_broadcast::BroadcastError;
use framecast_core::FramecastError;
use framecast_media::MediaError;
use thiserror::Error;

/// Errors raised while assembling or running a [`Pipeline`](crate::Pipeline)
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Core error (mailbox, wire format, relay)
    #[error(transparent)]
    Core(#[from] FramecastError),

    /// Capture or display error
    #[error(transparent)]
    Media(#[from] MediaError),

    /// Server or subscriber error
    #[error(transparent)]
    Broadcast(#[from] BroadcastError),

    /// Configuration file could not be parsed
    #[error("Invalid configuration file: {0}")]
    ConfigFormat(#[from] serde_json::Error),

    /// Operation not valid in the current lifecycle state
    #[error("Invalid pipeline state: {message}")]
    InvalidState {
        /// What was attempted
        message: String,
    },
}

impl PipelineError {
    /// Check if error is recoverable
    pub fn is_recoverable(&self) -> bool {
        match self {
            PipelineError::Core(e) => e.is_recoverable(),
            PipelineError::Media(e) => e.is_recoverable(),
            PipelineError::Broadcast(e) => e.is_recoverable(),
            PipelineError::ConfigFormat(_) => false,
            PipelineError::InvalidState { .. } => false,
        }
    }
}
