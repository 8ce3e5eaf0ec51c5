//! Media error types and handling
//!
//! This module defines the error types used by capture, display and viewer
//! decoding, with a coarse category for each.

use framecast_core::FramecastError;
use thiserror::Error;

/// Main error type for media operations
#[derive(Error, Debug)]
pub enum MediaError {
    /// I/O operation failed
    #[error("I/O error: {source}")]
    Io {
        #[from]
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// Invalid configuration provided
    #[error("Invalid configuration: {message}")]
    InvalidConfiguration {
        /// Error message
        message: String,
    },

    /// Invalid frame data error
    #[error("Invalid frame data: expected {expected} bytes, got {actual}")]
    InvalidFrameData {
        /// Expected data size
        expected: usize,
        /// Actual data size
        actual: usize,
    },

    /// Frame source failed
    #[error("Capture failed: {reason}")]
    Capture {
        /// Failure reason
        reason: String,
    },

    /// Pixel transform failed
    #[error("Transform failed: {reason}")]
    Transform {
        /// Failure reason
        reason: String,
    },

    /// Capture not active error
    #[error("Capture not active")]
    CaptureNotActive,

    /// Texture allocation failed
    #[error("Memory allocation failed: {size} bytes")]
    MemoryAllocationFailed {
        /// Size that failed to allocate
        size: usize,
    },

    /// Texture larger than the device supports
    #[error("Texture {width}x{height} exceeds device limit of {limit}")]
    TextureTooLarge {
        /// Requested width
        width: u32,
        /// Requested height
        height: u32,
        /// Maximum supported dimension
        limit: u32,
    },

    /// Presentation surface error
    #[error("Surface error: {message}")]
    Surface {
        /// Error message
        message: String,
    },

    /// Invalid state for operation
    #[error("Invalid state: {message}")]
    InvalidState {
        /// State error message
        message: String,
    },

    /// Error from the core pipeline
    #[error(transparent)]
    Core(#[from] FramecastError),
}

/// Result type alias for media operations
pub type MediaResult<T> = Result<T, MediaError>;

impl MediaError {
    /// Check if error is recoverable
    pub fn is_recoverable(&self) -> bool {
        match self {
            MediaError::Io { .. } => true,
            MediaError::InvalidFrameData { .. } => true,
            MediaError::Transform { .. } => true,
            MediaError::Surface { .. } => true,
            MediaError::MemoryAllocationFailed { .. } => false,
            MediaError::TextureTooLarge { .. } => false,
            MediaError::Core(e) => e.is_recoverable(),
            _ => false,
        }
    }

    /// Get error category
    pub fn category(&self) -> ErrorCategory {
        match self {
            MediaError::Io { .. } => ErrorCategory::System,
            MediaError::InvalidConfiguration { .. } => ErrorCategory::Configuration,
            MediaError::InvalidFrameData { .. } => ErrorCategory::Data,
            MediaError::Capture { .. } => ErrorCategory::Device,
            MediaError::Transform { .. } => ErrorCategory::Data,
            MediaError::CaptureNotActive => ErrorCategory::State,
            MediaError::MemoryAllocationFailed { .. } => ErrorCategory::Memory,
            MediaError::TextureTooLarge { .. } => ErrorCategory::Memory,
            MediaError::Surface { .. } => ErrorCategory::Display,
            MediaError::InvalidState { .. } => ErrorCategory::State,
            MediaError::Core(_) => ErrorCategory::Pipeline,
        }
    }
}

/// Error categories for classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// System-level errors (I/O, permissions, etc.)
    System,
    /// Configuration and parameter errors
    Configuration,
    /// Data validation errors
    Data,
    /// Device and hardware errors
    Device,
    /// State management errors
    State,
    /// Memory management errors
    Memory,
    /// Presentation surface errors
    Display,
    /// Errors bubbled up from the core pipeline
    Pipeline,
}
