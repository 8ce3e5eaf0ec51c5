//! Pipeline events
//!
//! Components report notable state changes on a shared broadcast channel.
//! Emitting never blocks and never fails; with no subscriber the event is
//! simply dropped.

use tokio::sync::broadcast;
use tracing::debug;

/// Events emitted by pipeline components
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineEvent {
    /// Capture refused a malformed frame
    FrameRejected {
        /// Why the frame was refused
        reason: String,
    },
    /// Capture thread exited
    CaptureStopped {
        /// Frames published before exit
        frames_published: u64,
    },
    /// Display allocated a texture for a new resolution
    TextureAllocated {
        /// Texture width
        width: u32,
        /// Texture height
        height: u32,
    },
    /// Display could not allocate its texture and stopped
    DisplayFailed {
        /// Failure description
        reason: String,
    },
    /// Relay handed a payload to the transport
    UploadDispatched {
        /// Payload size in bytes
        bytes: usize,
    },
    /// Relay transport reported a failure; the frame was dropped
    UploadFailed {
        /// Failure description
        reason: String,
    },
}

impl PipelineEvent {
    /// Get the event type as a string
    pub fn event_type(&self) -> &'static str {
        match self {
            PipelineEvent::FrameRejected { .. } => "frame_rejected",
            PipelineEvent::CaptureStopped { .. } => "capture_stopped",
            PipelineEvent::TextureAllocated { .. } => "texture_allocated",
            PipelineEvent::DisplayFailed { .. } => "display_failed",
            PipelineEvent::UploadDispatched { .. } => "upload_dispatched",
            PipelineEvent::UploadFailed { .. } => "upload_failed",
        }
    }

    /// Check if this is an error event
    pub fn is_error_event(&self) -> bool {
        matches!(
            self,
            PipelineEvent::FrameRejected { .. }
                | PipelineEvent::DisplayFailed { .. }
                | PipelineEvent::UploadFailed { .. }
        )
    }
}

/// Cloneable sender side of the pipeline event channel
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<PipelineEvent>,
}

impl EventBus {
    /// Create a bus retaining up to `capacity` undelivered events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Emit an event to all current subscribers
    pub fn emit(&self, event: PipelineEvent) {
        debug!("Pipeline event: {}", event.event_type());
        let _ = self.tx.send(event);
    }

    /// Subscribe to events emitted from now on
    pub fn subscribe(&self) -> EventStream {
        EventStream {
            receiver: self.tx.subscribe(),
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(64)
    }
}

/// Stream of pipeline events for async iteration
#[derive(Debug)]
pub struct EventStream {
    receiver: broadcast::Receiver<PipelineEvent>,
}

impl EventStream {
    /// Get the next event, skipping over any that were missed while lagging.
    ///
    /// Returns `None` once every sender is gone.
    pub async fn next(&mut self) -> Option<PipelineEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!("Event stream lagged, skipped {} events", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Try to get the next event without blocking
    pub fn try_next(&mut self) -> Option<PipelineEvent> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => return None,
            }
        }
    }
}
