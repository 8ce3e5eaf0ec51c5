//! Rate-limited relay from the frame mailbox to a remote upload endpoint
//!
//! The relay is lossy by construction. Each cycle either sends the newest
//! frame or sends nothing: there is no queue, no retry, and a failed upload
//! is logged and forgotten. Sends run on detached tasks so a slow network
//! never delays the next cycle.

use crate::error::FramecastError;
use crate::event::{EventBus, PipelineEvent};
use crate::mailbox::MailboxReader;
use crate::wire_format::FrameEncoder;
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

/// Relay configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Full URL of the upload endpoint
    pub upload_url: String,
    /// Minimum time between two uploads
    pub min_interval: Duration,
    /// Per-request timeout
    pub request_timeout: Duration,
    /// How often the background loop runs a cycle
    pub poll_interval: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            upload_url: "http://127.0.0.1:8080/upload-frame".to_string(),
            min_interval: Duration::from_millis(100),
            request_timeout: Duration::from_secs(2),
            poll_interval: Duration::from_millis(10),
        }
    }
}

impl RelayConfig {
    /// Check the configuration for values the relay cannot run with
    pub fn validate(&self) -> Result<(), FramecastError> {
        if !(self.upload_url.starts_with("http://") || self.upload_url.starts_with("https://")) {
            return Err(FramecastError::InvalidConfiguration {
                field: "upload_url".to_string(),
                reason: format!("expected an http(s) URL, got {:?}", self.upload_url),
            });
        }
        if self.request_timeout.is_zero() {
            return Err(FramecastError::InvalidConfiguration {
                field: "request_timeout".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.poll_interval.is_zero() {
            return Err(FramecastError::InvalidConfiguration {
                field: "poll_interval".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

/// Something that can deliver an encoded frame payload
#[async_trait]
pub trait FrameTransport: Send + Sync + 'static {
    /// Deliver one payload, best effort
    async fn send_frame(&self, payload: Bytes) -> Result<(), FramecastError>;
}

/// HTTP POST transport
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl HttpTransport {
    /// Create a transport posting to `url`
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, FramecastError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FramecastError::Initialization {
                reason: format!("Failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            url: url.into(),
            timeout,
        })
    }

    /// Target URL
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl FrameTransport for HttpTransport {
    async fn send_frame(&self, payload: Bytes) -> Result<(), FramecastError> {
        let response = self
            .client
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    FramecastError::Timeout {
                        operation: format!("POST {}", self.url),
                        duration: self.timeout,
                    }
                } else {
                    FramecastError::Transport {
                        reason: e.to_string(),
                    }
                }
            })?;

        response
            .error_for_status()
            .map_err(|e| FramecastError::Transport {
                reason: e.to_string(),
            })?;
        Ok(())
    }
}

/// Minimum-interval gate
#[derive(Debug, Clone)]
pub struct RateLimiter {
    min_interval: Duration,
    last_send: Option<Instant>,
}

impl RateLimiter {
    /// Create a limiter that allows one send per `min_interval`
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_send: None,
        }
    }

    /// Whether a send is allowed at `now`
    pub fn is_ready(&self, now: Instant) -> bool {
        match self.last_send {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.min_interval,
        }
    }

    /// Record a send at `now`
    pub fn record(&mut self, now: Instant) {
        self.last_send = Some(now);
    }

    /// Configured interval
    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }
}

/// Result of one relay cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Called inside the minimum interval; mailbox not touched
    Throttled,
    /// Interval elapsed but no frame arrived since the last upload
    NothingNew,
    /// A payload of this many bytes was handed to the transport
    Dispatched(usize),
}

/// Relay counters, shared with in-flight send tasks
#[derive(Debug, Default)]
pub struct RelayStats {
    dispatched: AtomicU64,
    throttled: AtomicU64,
    delivered: AtomicU64,
    failed: AtomicU64,
}

impl RelayStats {
    /// Payloads handed to the transport
    pub fn dispatched(&self) -> u64 {
        self.dispatched.load(Ordering::Relaxed)
    }

    /// Cycles refused by the rate limiter
    pub fn throttled(&self) -> u64 {
        self.throttled.load(Ordering::Relaxed)
    }

    /// Sends the transport reported as successful
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    /// Sends the transport reported as failed
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

/// Rate-limited uploader of the newest mailbox frame
pub struct RelayUplink<T: FrameTransport> {
    reader: MailboxReader,
    encoder: FrameEncoder,
    limiter: RateLimiter,
    transport: Arc<T>,
    stats: Arc<RelayStats>,
    events: Option<EventBus>,
}

impl<T: FrameTransport> RelayUplink<T> {
    /// Create a relay reading from `reader` and sending through `transport`
    pub fn new(reader: MailboxReader, transport: T, min_interval: Duration) -> Self {
        Self {
            reader,
            encoder: FrameEncoder::new(),
            limiter: RateLimiter::new(min_interval),
            transport: Arc::new(transport),
            stats: Arc::new(RelayStats::default()),
            events: None,
        }
    }

    /// Report dispatches and failures on `events`
    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    /// Shared counters
    pub fn stats(&self) -> Arc<RelayStats> {
        Arc::clone(&self.stats)
    }

    /// Run one cycle now. Must be called from within a tokio runtime.
    pub fn publish_cycle(&mut self) -> CycleOutcome {
        self.publish_cycle_at(Instant::now())
    }

    /// Run one cycle as if the current time were `now`.
    ///
    /// The throttle is checked before the mailbox is read, so a frame that
    /// arrives during the interval stays pending for a later cycle. The send
    /// timer only moves when something is actually dispatched.
    pub fn publish_cycle_at(&mut self, now: Instant) -> CycleOutcome {
        if !self.limiter.is_ready(now) {
            self.stats.throttled.fetch_add(1, Ordering::Relaxed);
            return CycleOutcome::Throttled;
        }

        let frame = match self.reader.take_if_new() {
            Some(frame) => frame,
            None => return CycleOutcome::NothingNew,
        };

        let payload = self.encoder.encode(&frame);
        drop(frame);
        let len = payload.len();

        self.limiter.record(now);
        self.stats.dispatched.fetch_add(1, Ordering::Relaxed);
        trace!("Dispatching {} byte frame upload", len);
        if let Some(events) = &self.events {
            events.emit(PipelineEvent::UploadDispatched { bytes: len });
        }

        let transport = Arc::clone(&self.transport);
        let stats = Arc::clone(&self.stats);
        let events = self.events.clone();
        tokio::spawn(async move {
            match transport.send_frame(payload).await {
                Ok(()) => {
                    stats.delivered.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    stats.failed.fetch_add(1, Ordering::Relaxed);
                    warn!("Frame upload failed, dropping frame: {}", e);
                    if let Some(events) = events {
                        events.emit(PipelineEvent::UploadFailed {
                            reason: e.to_string(),
                        });
                    }
                }
            }
        });

        CycleOutcome::Dispatched(len)
    }

    /// Run cycles every `poll_interval` on a background task
    pub fn spawn(mut self, poll_interval: Duration) -> RelayHandle {
        let stats = self.stats();
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(poll_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            info!(
                "Relay uplink started (min interval {:?})",
                self.limiter.min_interval()
            );
            loop {
                ticker.tick().await;
                if self.reader.mailbox().is_closed() {
                    debug!("Mailbox closed, relay uplink exiting");
                    break;
                }
                self.publish_cycle();
            }
        });

        RelayHandle {
            task: Some(task),
            stats,
        }
    }
}

/// Handle to a running relay loop
#[derive(Debug)]
pub struct RelayHandle {
    task: Option<JoinHandle<()>>,
    stats: Arc<RelayStats>,
}

impl RelayHandle {
    /// Shared counters
    pub fn stats(&self) -> &Arc<RelayStats> {
        &self.stats
    }

    /// Whether the loop is still running
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Stop the loop. In-flight sends are left to finish on their own.
    pub async fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            let _ = task.await;
            debug!("Relay uplink stopped");
        }
    }
}

impl Drop for RelayHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
