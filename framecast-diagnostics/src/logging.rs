//! Structured logging setup

use thiserror::Error;
use tracing_subscriber::EnvFilter;

/// Logging could not be installed
#[derive(Error, Debug)]
#[error("Failed to initialise logging: {reason}")]
pub struct LoggingError {
    /// Why the subscriber was refused
    pub reason: String,
}

/// Build the filter: `RUST_LOG` if set and valid, otherwise `default_directive`
pub fn env_filter(default_directive: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive))
}

/// Install a global `fmt` subscriber.
///
/// Fails if a global subscriber is already set.
pub fn init_logging(default_directive: &str) -> Result<(), LoggingError> {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(default_directive))
        .with_target(true)
        .try_init()
        .map_err(|e| LoggingError {
            reason: e.to_string(),
        })?;
    tracing::debug!("Logging initialised (default filter {:?})", default_directive);
    Ok(())
}

/// Install a test-friendly subscriber; repeated calls are ignored
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter("debug"))
        .with_test_writer()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent_for_tests() {
        init_test_logging();
        init_test_logging();
        tracing::debug!("logging initialised");
        assert!(init_logging("info").is_err());
    }
}
