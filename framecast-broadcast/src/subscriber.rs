//! Viewer-side subscription to the broadcast server
//!
//! [`FrameSubscriber`] keeps one WebSocket open to the viewer endpoint. When
//! the socket closes or fails it reports the disconnect, waits a fixed delay
//! and connects again, indefinitely.

use crate::error::BroadcastError;
use bytes::Bytes;
use framecast_diagnostics::{ConnectionInfo, ConnectionState};
use futures::StreamExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tungstenite::Message;

/// Events delivered to the viewer
#[derive(Debug, Clone, PartialEq)]
pub enum SubscriberEvent {
    /// Connection state changed
    StateChanged(ConnectionState),
    /// One encoded frame, exactly as broadcast
    Frame(Bytes),
    /// Text message from the server
    Text(String),
}

/// Subscriber configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriberConfig {
    /// WebSocket URL of the viewer endpoint
    pub url: String,
    /// Delay between a disconnect and the next attempt
    pub reconnect_delay: Duration,
    /// Capacity of the event channel
    pub event_capacity: usize,
}

impl Default for SubscriberConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:8080/ws".to_string(),
            reconnect_delay: Duration::from_secs(2),
            event_capacity: 16,
        }
    }
}

impl SubscriberConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), BroadcastError> {
        if !(self.url.starts_with("ws://") || self.url.starts_with("wss://")) {
            return Err(BroadcastError::InvalidUrl {
                url: self.url.clone(),
                reason: "expected a ws:// or wss:// URL".to_string(),
            });
        }
        if self.reconnect_delay.is_zero() {
            return Err(BroadcastError::InvalidConfiguration {
                field: "reconnect_delay".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.event_capacity == 0 {
            return Err(BroadcastError::InvalidConfiguration {
                field: "event_capacity".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// Background WebSocket subscription with fixed-delay reconnect
pub struct FrameSubscriber {
    info: Arc<Mutex<ConnectionInfo>>,
    task: Option<JoinHandle<()>>,
}

impl FrameSubscriber {
    /// Start subscribing. Events arrive on the returned receiver.
    pub fn spawn(
        config: SubscriberConfig,
    ) -> Result<(Self, mpsc::Receiver<SubscriberEvent>), BroadcastError> {
        config.validate()?;
        let (tx, rx) = mpsc::channel(config.event_capacity);
        let info = Arc::new(Mutex::new(ConnectionInfo::default()));

        let task = tokio::spawn(run_subscription(config, tx, Arc::clone(&info)));

        Ok((
            Self {
                info,
                task: Some(task),
            },
            rx,
        ))
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        self.info.lock().state
    }

    /// Snapshot of connection statistics
    pub fn info(&self) -> ConnectionInfo {
        self.info.lock().clone()
    }

    /// Whether the background task is still alive
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Stop the subscription
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.info.lock().transition(ConnectionState::Disconnected);
    }
}

impl Drop for FrameSubscriber {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Record a state change and report it. Returns `false` once the receiver is gone.
async fn announce(
    info: &Mutex<ConnectionInfo>,
    tx: &mpsc::Sender<SubscriberEvent>,
    state: ConnectionState,
) -> bool {
    let changed = info.lock().transition(state);
    if !changed {
        return true;
    }
    tracing::debug!("Viewer connection state: {}", state);
    tx.send(SubscriberEvent::StateChanged(state)).await.is_ok()
}

async fn run_subscription(
    config: SubscriberConfig,
    tx: mpsc::Sender<SubscriberEvent>,
    info: Arc<Mutex<ConnectionInfo>>,
) {
    loop {
        if !announce(&info, &tx, ConnectionState::Connecting).await {
            return;
        }

        match connect_async(config.url.as_str()).await {
            Ok((mut stream, _response)) => {
                tracing::info!("Connected to {}", config.url);
                if !announce(&info, &tx, ConnectionState::Connected).await {
                    return;
                }

                while let Some(message) = stream.next().await {
                    let event = match message {
                        Ok(Message::Binary(data)) => {
                            info.lock().record_message(data.len());
                            SubscriberEvent::Frame(Bytes::from(data))
                        }
                        Ok(Message::Text(text)) => SubscriberEvent::Text(text),
                        Ok(Message::Close(_)) => break,
                        Ok(_) => continue,
                        Err(e) => {
                            tracing::debug!("Viewer socket error: {}", e);
                            break;
                        }
                    };
                    if tx.send(event).await.is_err() {
                        return;
                    }
                }
                tracing::info!("Disconnected from {}", config.url);
            }
            Err(e) => {
                let err = BroadcastError::Connection {
                    url: config.url.clone(),
                    reason: e.to_string(),
                };
                tracing::debug!("{}", err);
            }
        }

        if !announce(&info, &tx, ConnectionState::Reconnecting).await {
            return;
        }
        tokio::time::sleep(config.reconnect_delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_validation() {
        assert!(SubscriberConfig::default().validate().is_ok());

        let config = SubscriberConfig {
            url: "http://127.0.0.1:8080/ws".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(BroadcastError::InvalidUrl { .. })
        ));

        let config = SubscriberConfig {
            reconnect_delay: Duration::ZERO,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[tokio::test]
    async fn test_stop_marks_disconnected() {
        let (mut subscriber, _events) = FrameSubscriber::spawn(SubscriberConfig {
            url: "ws://127.0.0.1:9/ws".to_string(),
            reconnect_delay: Duration::from_millis(20),
            event_capacity: 4,
        })
        .unwrap();

        assert!(subscriber.is_running());
        subscriber.stop();
        assert!(!subscriber.is_running());
        assert_eq!(subscriber.state(), ConnectionState::Disconnected);
    }
}
