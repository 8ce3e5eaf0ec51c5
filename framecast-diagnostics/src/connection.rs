//! Connection state tracking

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    /// Connecting
    Connecting,
    /// Connected
    Connected,
    /// Waiting to reconnect after a failure or close
    Reconnecting,
    /// Disconnected
    Disconnected,
}

impl ConnectionState {
    /// Status line shown to a viewer
    pub fn status_text(&self) -> &'static str {
        match self {
            ConnectionState::Connecting => "Connecting...",
            ConnectionState::Connected => "Connected",
            ConnectionState::Reconnecting => "Disconnected (retrying...)",
            ConnectionState::Disconnected => "Disconnected",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.status_text())
    }
}

/// Connection information and statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionInfo {
    /// Current state
    pub state: ConnectionState,
    /// When the current state was entered
    pub since: DateTime<Utc>,
    /// Connection attempts so far, including the first
    pub attempts: u64,
    /// Binary messages received over all connections
    pub messages_received: u64,
    /// Bytes received over all connections
    pub bytes_received: u64,
}

impl Default for ConnectionInfo {
    fn default() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            since: Utc::now(),
            attempts: 0,
            messages_received: 0,
            bytes_received: 0,
        }
    }
}

impl ConnectionInfo {
    /// Move to `state`, returning `false` if it was already current
    pub fn transition(&mut self, state: ConnectionState) -> bool {
        if self.state == state {
            return false;
        }
        if state == ConnectionState::Connecting {
            self.attempts += 1;
        }
        self.state = state;
        self.since = Utc::now();
        true
    }

    /// Account for one received message
    pub fn record_message(&mut self, bytes: usize) {
        self.messages_received += 1;
        self.bytes_received += bytes as u64;
    }

    /// Time spent in the current state
    pub fn time_in_state(&self) -> Duration {
        (Utc::now() - self.since).to_std().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transitions_count_attempts() {
        let mut info = ConnectionInfo::default();
        assert!(info.transition(ConnectionState::Connecting));
        assert!(info.transition(ConnectionState::Connected));
        assert!(!info.transition(ConnectionState::Connected));
        assert!(info.transition(ConnectionState::Reconnecting));
        assert!(info.transition(ConnectionState::Connecting));
        assert_eq!(info.attempts, 2);
        assert_eq!(info.state.to_string(), "Connecting...");
    }

    #[test]
    fn test_status_text() {
        assert_eq!(ConnectionState::Connected.status_text(), "Connected");
        assert_eq!(
            ConnectionState::Reconnecting.status_text(),
            "Disconnected (retrying...)"
        );
    }
}
