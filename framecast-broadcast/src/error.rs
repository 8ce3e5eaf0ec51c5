//! Error types for the broadcast server and viewer subscription

use std::net::SocketAddr;
use thiserror::Error;

/// Errors raised by the broadcast server and subscriber
#[derive(Error, Debug)]
pub enum BroadcastError {
    /// Server failed to bind or start
    #[error("Failed to start broadcast server on {address}: {source}")]
    ServerStartFailed {
        /// Address that failed to bind
        address: SocketAddr,
        /// Underlying error
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Viewer connection failure
    #[error("Connection to {url} failed: {reason}")]
    Connection {
        /// Endpoint URL
        url: String,
        /// Failure reason
        reason: String,
    },

    /// URL or route path that cannot be used
    #[error("Invalid URL {url}: {reason}")]
    InvalidUrl {
        /// Offending URL or path
        url: String,
        /// Why it was rejected
        reason: String,
    },

    /// Invalid server configuration
    #[error("Invalid configuration for {field}: {reason}")]
    InvalidConfiguration {
        /// Offending configuration field
        field: String,
        /// Why the value was rejected
        reason: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BroadcastError {
    /// Get error code for programmatic handling
    pub fn error_code(&self) -> String {
        match self {
            BroadcastError::ServerStartFailed { .. } => "SERVER_START_FAILED".to_string(),
            BroadcastError::Connection { .. } => "CONNECTION_FAILED".to_string(),
            BroadcastError::InvalidUrl { .. } => "INVALID_URL".to_string(),
            BroadcastError::InvalidConfiguration { .. } => "INVALID_CONFIGURATION".to_string(),
            BroadcastError::Io(_) => "IO_ERROR".to_string(),
        }
    }

    /// Check if error is recoverable
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            BroadcastError::Connection { .. } | BroadcastError::Io(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = BroadcastError::Connection {
            url: "ws://127.0.0.1:1/ws".to_string(),
            reason: "refused".to_string(),
        };
        assert_eq!(err.error_code(), "CONNECTION_FAILED");
        assert!(err.is_recoverable());

        let err = BroadcastError::ServerStartFailed {
            address: "127.0.0.1:8080".parse().unwrap(),
            source: "in use".into(),
        };
        assert_eq!(err.error_code(), "SERVER_START_FAILED");
        assert!(!err.is_recoverable());
        assert!(err.to_string().contains("127.0.0.1:8080"));
    }
}
