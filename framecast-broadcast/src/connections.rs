//! Set of live viewer connections
//!
//! Each viewer owns a bounded outbound queue drained by its socket task. Fan-out
//! never awaits a viewer: a full queue skips that viewer for this frame and a
//! closed queue removes the viewer from the set.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::net::SocketAddr;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Identifier of one viewer connection
pub type ConnectionId = Uuid;

/// Outbound side of one viewer connection
#[derive(Debug)]
pub struct ViewerHandle {
    tx: mpsc::Sender<Bytes>,
    /// Remote address of the viewer
    pub addr: Option<SocketAddr>,
    /// When the viewer connected
    pub connected_at: DateTime<Utc>,
}

/// Result of delivering one payload to every viewer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FanOutReport {
    /// Viewers whose queue accepted the payload
    pub delivered: usize,
    /// Viewers skipped because their queue was full or closed
    pub skipped: usize,
}

/// Registry of connected viewers keyed by connection id
#[derive(Debug)]
pub struct ConnectionSet {
    viewers: DashMap<ConnectionId, ViewerHandle>,
    queue_size: usize,
}

impl ConnectionSet {
    /// Create an empty set whose viewers buffer at most `queue_size` frames
    pub fn new(queue_size: usize) -> Self {
        Self {
            viewers: DashMap::new(),
            queue_size: queue_size.max(1),
        }
    }

    /// Add a viewer, returning its id and the receiver its socket task drains
    pub fn register(&self, addr: Option<SocketAddr>) -> (ConnectionId, mpsc::Receiver<Bytes>) {
        let (tx, rx) = mpsc::channel(self.queue_size);
        let id = Uuid::new_v4();
        self.viewers.insert(
            id,
            ViewerHandle {
                tx,
                addr,
                connected_at: Utc::now(),
            },
        );
        (id, rx)
    }

    /// Remove a viewer. Returns `true` if it was still present.
    pub fn remove(&self, id: &ConnectionId) -> bool {
        self.viewers.remove(id).is_some()
    }

    /// Number of connected viewers
    pub fn len(&self) -> usize {
        self.viewers.len()
    }

    /// Whether no viewer is connected
    pub fn is_empty(&self) -> bool {
        self.viewers.is_empty()
    }

    /// Queue `payload` for every viewer
    pub fn fan_out(&self, payload: &Bytes) -> FanOutReport {
        let mut report = FanOutReport::default();
        let mut closed = Vec::new();

        for entry in self.viewers.iter() {
            match entry.tx.try_send(payload.clone()) {
                Ok(()) => report.delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::debug!("Viewer {} is behind, skipping frame", entry.key());
                    report.skipped += 1;
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    report.skipped += 1;
                    closed.push(*entry.key());
                }
            }
        }

        // Removal happens after iteration so no shard lock is held twice
        for id in closed {
            if self.viewers.remove(&id).is_some() {
                tracing::debug!("Pruned closed viewer {}", id);
            }
        }

        report
    }
}
