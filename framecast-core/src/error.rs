//! Error types for Framecast

use std::time::Duration;
use thiserror::Error;

/// Main error type for Framecast core operations
#[derive(Error, Debug)]
pub enum FramecastError {
    /// Initialization error
    #[error("Initialization failed: {reason}")]
    Initialization {
        /// Reason for initialization failure
        reason: String,
    },

    /// Invalid configuration value
    #[error("Invalid configuration for {field}: {reason}")]
    InvalidConfiguration {
        /// Offending configuration field
        field: String,
        /// Why the value was rejected
        reason: String,
    },

    /// Pixel buffer does not match the declared dimensions
    #[error("Invalid frame {width}x{height}: expected {expected} bytes, got {actual}")]
    InvalidFrame {
        /// Declared width in pixels
        width: u32,
        /// Declared height in pixels
        height: u32,
        /// Expected pixel byte count
        expected: usize,
        /// Actual pixel byte count
        actual: usize,
    },

    /// Frame with a zero dimension
    #[error("Empty frame: {width}x{height}")]
    EmptyFrame {
        /// Declared width in pixels
        width: u32,
        /// Declared height in pixels
        height: u32,
    },

    /// Payload too short to carry a frame header
    #[error("Malformed payload: {len} bytes is shorter than the {required} byte header")]
    MalformedPayload {
        /// Payload length
        len: usize,
        /// Minimum length required
        required: usize,
    },

    /// Payload body length disagrees with its header
    #[error("Length mismatch for {width}x{height}: expected {expected} pixel bytes, got {actual}")]
    LengthMismatch {
        /// Width from the header
        width: u32,
        /// Height from the header
        height: u32,
        /// Pixel byte count implied by the header
        expected: u64,
        /// Pixel byte count present
        actual: u64,
    },

    /// Transport error
    #[error("Transport error: {reason}")]
    Transport {
        /// Reason for transport error
        reason: String,
    },

    /// Operation timed out error
    #[error("Operation timed out: {operation} after {duration:?}")]
    Timeout {
        /// Operation that timed out
        operation: String,
        /// Duration after which timeout occurred
        duration: Duration,
    },

    /// The mailbox was closed
    #[error("Frame mailbox is closed")]
    MailboxClosed,
}

impl FramecastError {
    /// Get error code for programmatic handling
    pub fn error_code(&self) -> String {
        match self {
            FramecastError::Initialization { .. } => "INITIALIZATION_FAILED".to_string(),
            FramecastError::InvalidConfiguration { .. } => "INVALID_CONFIGURATION".to_string(),
            FramecastError::InvalidFrame { .. } => "INVALID_FRAME".to_string(),
            FramecastError::EmptyFrame { .. } => "EMPTY_FRAME".to_string(),
            FramecastError::MalformedPayload { .. } => "MALFORMED_PAYLOAD".to_string(),
            FramecastError::LengthMismatch { .. } => "LENGTH_MISMATCH".to_string(),
            FramecastError::Transport { .. } => "TRANSPORT_ERROR".to_string(),
            FramecastError::Timeout { .. } => "TIMEOUT".to_string(),
            FramecastError::MailboxClosed => "MAILBOX_CLOSED".to_string(),
        }
    }

    /// Whether the pipeline keeps running after this error.
    ///
    /// Frame-level problems and transport hiccups are dropped and logged;
    /// only setup failures are fatal.
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            FramecastError::Initialization { .. } | FramecastError::InvalidConfiguration { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = FramecastError::InvalidFrame {
            width: 2,
            height: 2,
            expected: 16,
            actual: 15,
        };
        assert_eq!(
            error.to_string(),
            "Invalid frame 2x2: expected 16 bytes, got 15"
        );
        assert_eq!(error.error_code(), "INVALID_FRAME");
    }

    #[test]
    fn test_recoverability() {
        assert!(FramecastError::Transport {
            reason: "connection refused".to_string()
        }
        .is_recoverable());
        assert!(!FramecastError::Initialization {
            reason: "no runtime".to_string()
        }
        .is_recoverable());
    }
}
