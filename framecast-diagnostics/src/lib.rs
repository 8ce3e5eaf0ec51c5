//! # Framecast Diagnostics
//!
//! Logging setup, connection state tracking and frame rate measurement
//! shared by the Framecast server, relay and viewers.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod connection;
pub mod frame_rate;
pub mod logging;

// Re-export main types
pub use connection::{ConnectionInfo, ConnectionState};
pub use frame_rate::FrameRateMeter;
pub use logging::{env_filter, init_logging, init_test_logging, LoggingError};
