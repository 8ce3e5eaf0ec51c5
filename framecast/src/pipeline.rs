//! Producer-side pipeline context
//!
//! A [`Pipeline`] owns one mailbox and the three components around it: the
//! capture thread that fills it, the display thread and the relay task that
//! drain it. Nothing is global; dropping the pipeline tears everything down.

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use framecast_core::{
    EventBus, EventStream, FrameMailbox, HttpTransport, RelayConfig, RelayHandle, RelayUplink,
};
use framecast_media::{
    CaptureWorker, DisplaySink, DisplayThread, FrameSource, FrameTransform, MediaError,
    TestPatternSource, TextureBackend,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Counters gathered from every running component
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    /// Frames produced by the source
    pub captured: u64,
    /// Frames published to the mailbox
    pub published: u64,
    /// Frames dropped by capture
    pub dropped: u64,
    /// Latest mailbox generation
    pub generation: u64,
    /// Uploads handed to the transport
    pub uploads_dispatched: u64,
    /// Uploads acknowledged by the server
    pub uploads_delivered: u64,
    /// Uploads that failed
    pub uploads_failed: u64,
}

/// One capture source feeding a local display and a relay uplink
pub struct Pipeline<B: TextureBackend> {
    config: PipelineConfig,
    mailbox: Arc<FrameMailbox>,
    events: EventBus,
    capture: Option<CaptureWorker>,
    display: Option<DisplayThread<B>>,
    relay: Option<RelayHandle>,
    started: bool,
}

impl<B: TextureBackend> Pipeline<B> {
    /// Create a stopped pipeline
    pub fn new(config: PipelineConfig) -> Result<Self, PipelineError> {
        config.validate()?;
        Ok(Self {
            config,
            mailbox: Arc::new(FrameMailbox::new()),
            events: EventBus::default(),
            capture: None,
            display: None,
            relay: None,
            started: false,
        })
    }

    /// Pipeline configuration
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// The shared mailbox
    pub fn mailbox(&self) -> &Arc<FrameMailbox> {
        &self.mailbox
    }

    /// Subscribe to pipeline events
    pub fn events(&self) -> EventStream {
        self.events.subscribe()
    }

    /// Whether [`start`](Self::start) has run and [`stop`](Self::stop) has not
    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Start with the configured test pattern as the source
    pub fn start_test_pattern<T: FrameTransform>(
        &mut self,
        transform: T,
        backend: Option<B>,
    ) -> Result<(), PipelineError> {
        let capture = &self.config.capture;
        let mut source = TestPatternSource::new(capture.width, capture.height, capture.frame_rate)?;
        if let Some(max) = capture.max_frames {
            source = source.with_max_frames(max);
        }
        self.start(source, transform, backend)
    }

    /// Start every component.
    ///
    /// Consumers start before the producer. The relay runs only when a relay
    /// section is configured and needs a tokio runtime; the display runs only
    /// when a backend is given.
    pub fn start<S, T>(
        &mut self,
        source: S,
        transform: T,
        backend: Option<B>,
    ) -> Result<(), PipelineError>
    where
        S: FrameSource,
        T: FrameTransform,
    {
        if self.started {
            return Err(PipelineError::InvalidState {
                message: "pipeline already started".to_string(),
            });
        }
        if self.mailbox.is_closed() {
            return Err(PipelineError::InvalidState {
                message: "pipeline was stopped and cannot be restarted".to_string(),
            });
        }

        let relay = match &self.config.relay {
            Some(config) => Some(self.build_relay(config)?),
            None => None,
        };

        if let Some(backend) = backend {
            let sink = DisplaySink::new(backend, self.mailbox.reader(), self.config.display.clone())
                .with_events(self.events.clone());
            self.display = Some(DisplayThread::spawn(sink)?);
        }

        self.relay = relay;

        self.capture = Some(CaptureWorker::spawn(
            source,
            transform,
            Arc::clone(&self.mailbox),
            Some(self.events.clone()),
        )?);

        self.started = true;
        info!(
            "Pipeline started (display: {}, relay: {})",
            self.display.is_some(),
            self.relay.is_some()
        );
        Ok(())
    }

    fn build_relay(&self, config: &RelayConfig) -> Result<RelayHandle, PipelineError> {
        tokio::runtime::Handle::try_current().map_err(|e| {
            framecast_core::FramecastError::Initialization {
                reason: format!("relay needs a tokio runtime: {}", e),
            }
        })?;

        let transport = HttpTransport::new(config.upload_url.clone(), config.request_timeout)?;
        let uplink = RelayUplink::new(self.mailbox.reader(), transport, config.min_interval)
            .with_events(self.events.clone());
        Ok(uplink.spawn(config.poll_interval))
    }

    /// Suspend capture. Display and relay keep running on the last frame.
    pub fn pause(&self) -> Result<(), PipelineError> {
        match &self.capture {
            Some(capture) => {
                capture.pause();
                Ok(())
            }
            None => Err(MediaError::CaptureNotActive.into()),
        }
    }

    /// Resume capture after [`pause`](Self::pause)
    pub fn resume(&self) -> Result<(), PipelineError> {
        match &self.capture {
            Some(capture) => {
                capture.resume();
                Ok(())
            }
            None => Err(MediaError::CaptureNotActive.into()),
        }
    }

    /// Whether capture is currently paused
    pub fn is_paused(&self) -> bool {
        self.capture.as_ref().is_some_and(|c| c.is_paused())
    }

    /// Snapshot of component counters
    pub fn stats(&self) -> PipelineStats {
        let mut stats = PipelineStats {
            generation: self.mailbox.stats().generation,
            ..Default::default()
        };
        if let Some(capture) = &self.capture {
            let capture = capture.stats();
            stats.captured = capture.captured();
            stats.published = capture.published();
            stats.dropped = capture.dropped();
        }
        if let Some(relay) = &self.relay {
            let relay = relay.stats();
            stats.uploads_dispatched = relay.dispatched();
            stats.uploads_delivered = relay.delivered();
            stats.uploads_failed = relay.failed();
        }
        stats
    }

    /// Tear down in order: close the mailbox, stop the display, stop the
    /// relay, stop capture. Returns the display sink if one was running.
    ///
    /// Thread joins run on the blocking pool; joining capture waits for the
    /// source's current frame. Every component is stopped before the first
    /// error is returned.
    pub async fn stop(&mut self) -> Result<Option<DisplaySink<B>>, PipelineError> {
        if !self.started {
            return Err(PipelineError::InvalidState {
                message: "pipeline not started".to_string(),
            });
        }
        self.started = false;

        self.mailbox.close();
        debug!("Mailbox closed");

        let display = match self.display.take() {
            Some(mut display) => join_blocking("display", move || display.stop())
                .await
                .map(Some),
            None => Ok(None),
        };

        if let Some(mut relay) = self.relay.take() {
            relay.stop().await;
        }

        let capture = match self.capture.take() {
            Some(mut capture) => {
                let stats = Arc::clone(capture.stats());
                let result = join_blocking("capture", move || capture.stop()).await;
                debug!("Capture stopped after {} frames", stats.published());
                result
            }
            None => Ok(()),
        };

        if let Err(e) = &display {
            warn!("Display did not stop cleanly: {}", e);
        }
        if let Err(e) = &capture {
            warn!("Capture did not stop cleanly: {}", e);
        }

        info!("Pipeline stopped");
        let sink = display?;
        capture?;
        Ok(sink)
    }
}

/// Run a blocking component shutdown off the async workers
async fn join_blocking<T, F>(component: &str, stop: F) -> Result<T, PipelineError>
where
    F: FnOnce() -> Result<T, MediaError> + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(stop).await {
        Ok(result) => Ok(result?),
        Err(e) => Err(PipelineError::InvalidState {
            message: format!("{} shutdown task failed: {}", component, e),
        }),
    }
}

impl<B: TextureBackend> Drop for Pipeline<B> {
    fn drop(&mut self) {
        // Components stop in their own Drop impls once the mailbox is closed
        self.mailbox.close();
    }
}
