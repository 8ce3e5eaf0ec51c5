//! Capture boundary and capture thread
//!
//! Raw frames come from a [`FrameSource`] (the camera or any other producer),
//! are converted to RGBA by a [`FrameTransform`], and land in the shared
//! [`FrameMailbox`]. All of this runs on one dedicated OS thread so that a
//! blocking source never touches the async runtime.

use crate::error::{MediaError, MediaResult};
use framecast_core::{rgba_len, EventBus, FrameMailbox, FramecastError, PipelineEvent};
use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Layout of a raw frame's pixel data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PixelLayout {
    /// One byte of luma per pixel (the Y plane of a YUV frame)
    Luma8,
    /// Four bytes per pixel, RGBA order
    Rgba8,
}

impl PixelLayout {
    /// Bytes per pixel
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            PixelLayout::Luma8 => 1,
            PixelLayout::Rgba8 => 4,
        }
    }
}

/// Frame as delivered by a source, before conversion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Pixel layout of `data`
    pub layout: PixelLayout,
    /// Pixel data
    pub data: Vec<u8>,
    /// Source sequence number
    pub sequence: u64,
}

/// Producer of raw frames.
///
/// `next_frame` may block until a frame is available. `Ok(None)` means the
/// source is exhausted and capture should end.
pub trait FrameSource: Send + 'static {
    /// Wait for and return the next frame
    fn next_frame(&mut self) -> MediaResult<Option<RawFrame>>;
}

/// Conversion from a raw frame into RGBA8
pub trait FrameTransform: Send + 'static {
    /// Write the RGBA rendition of `raw` into `out`, replacing its contents
    fn transform(&mut self, raw: &RawFrame, out: &mut Vec<u8>) -> MediaResult<()>;
}

/// Expands an 8-bit luma plane into opaque gray RGBA
#[derive(Debug, Default, Clone, Copy)]
pub struct LumaToRgba;

impl FrameTransform for LumaToRgba {
    fn transform(&mut self, raw: &RawFrame, out: &mut Vec<u8>) -> MediaResult<()> {
        if raw.layout != PixelLayout::Luma8 {
            return Err(MediaError::Transform {
                reason: format!("expected Luma8 input, got {:?}", raw.layout),
            });
        }

        let pixels = raw.width as usize * raw.height as usize;
        if raw.data.len() < pixels {
            return Err(MediaError::InvalidFrameData {
                expected: pixels,
                actual: raw.data.len(),
            });
        }

        out.resize(pixels * 4, 0);
        for (rgba, &y) in out.chunks_exact_mut(4).zip(&raw.data[..pixels]) {
            rgba.copy_from_slice(&[y, y, y, 255]);
        }
        Ok(())
    }
}

/// Copies RGBA input through unchanged
#[derive(Debug, Default, Clone, Copy)]
pub struct PassthroughRgba;

impl FrameTransform for PassthroughRgba {
    fn transform(&mut self, raw: &RawFrame, out: &mut Vec<u8>) -> MediaResult<()> {
        if raw.layout != PixelLayout::Rgba8 {
            return Err(MediaError::Transform {
                reason: format!("expected Rgba8 input, got {:?}", raw.layout),
            });
        }
        out.clear();
        out.extend_from_slice(&raw.data);
        Ok(())
    }
}

/// Synthetic RGBA source.
///
/// Red ramps left to right, green ramps top to bottom and blue carries the
/// low byte of the sequence number, so orientation and motion are both
/// visible.
#[derive(Debug, Clone)]
pub struct TestPatternSource {
    width: u32,
    height: u32,
    frame_interval: Duration,
    max_frames: Option<u64>,
    sequence: u64,
    next_due: Option<Instant>,
}

impl TestPatternSource {
    /// Create a source producing `width`x`height` frames at `frame_rate` per second
    pub fn new(width: u32, height: u32, frame_rate: f64) -> MediaResult<Self> {
        if width == 0 || height == 0 {
            return Err(MediaError::InvalidConfiguration {
                message: format!("test pattern size must be non-zero, got {}x{}", width, height),
            });
        }
        if !(frame_rate > 0.0 && frame_rate.is_finite()) {
            return Err(MediaError::InvalidConfiguration {
                message: format!("frame rate must be positive, got {}", frame_rate),
            });
        }

        Ok(Self {
            width,
            height,
            frame_interval: Duration::from_secs_f64(1.0 / frame_rate),
            max_frames: None,
            sequence: 0,
            next_due: None,
        })
    }

    /// Stop after `count` frames
    pub fn with_max_frames(mut self, count: u64) -> Self {
        self.max_frames = Some(count);
        self
    }

    /// Render the pattern for a given sequence number
    pub fn render(width: u32, height: u32, sequence: u64) -> Vec<u8> {
        let mut data = Vec::with_capacity(width as usize * height as usize * 4);
        for y in 0..height {
            for x in 0..width {
                let r = (x * 255 / width.saturating_sub(1).max(1)) as u8;
                let g = (y * 255 / height.saturating_sub(1).max(1)) as u8;
                data.extend_from_slice(&[r, g, sequence as u8, 255]);
            }
        }
        data
    }
}

impl FrameSource for TestPatternSource {
    fn next_frame(&mut self) -> MediaResult<Option<RawFrame>> {
        if self.max_frames.is_some_and(|max| self.sequence >= max) {
            return Ok(None);
        }

        if let Some(due) = self.next_due {
            let now = Instant::now();
            if due > now {
                std::thread::sleep(due - now);
            }
        }
        self.next_due = Some(Instant::now() + self.frame_interval);

        let frame = RawFrame {
            width: self.width,
            height: self.height,
            layout: PixelLayout::Rgba8,
            data: Self::render(self.width, self.height, self.sequence),
            sequence: self.sequence,
        };
        self.sequence += 1;
        Ok(Some(frame))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunState {
    Running,
    Paused,
    Stopping,
}

#[derive(Debug)]
struct CaptureControl {
    state: Mutex<RunState>,
    changed: Condvar,
}

/// Capture counters
#[derive(Debug, Default)]
pub struct CaptureStats {
    captured: AtomicU64,
    published: AtomicU64,
    dropped: AtomicU64,
}

impl CaptureStats {
    /// Frames read from the source
    pub fn captured(&self) -> u64 {
        self.captured.load(Ordering::Relaxed)
    }

    /// Frames accepted by the mailbox
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    /// Frames dropped by the transform or mailbox validation
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Capture thread feeding a [`FrameMailbox`]
#[derive(Debug)]
pub struct CaptureWorker {
    control: Arc<CaptureControl>,
    stats: Arc<CaptureStats>,
    thread: Option<JoinHandle<()>>,
}

impl CaptureWorker {
    /// Start capturing on a new thread
    pub fn spawn<S, T>(
        source: S,
        transform: T,
        mailbox: Arc<FrameMailbox>,
        events: Option<EventBus>,
    ) -> MediaResult<Self>
    where
        S: FrameSource,
        T: FrameTransform,
    {
        let control = Arc::new(CaptureControl {
            state: Mutex::new(RunState::Running),
            changed: Condvar::new(),
        });
        let stats = Arc::new(CaptureStats::default());

        let thread = std::thread::Builder::new()
            .name("framecast-capture".to_string())
            .spawn({
                let control = Arc::clone(&control);
                let stats = Arc::clone(&stats);
                move || run_capture(source, transform, mailbox, control, stats, events)
            })?;

        info!("Capture thread started");
        Ok(Self {
            control,
            stats,
            thread: Some(thread),
        })
    }

    /// Suspend capture. Consumers keep running on the last frame.
    pub fn pause(&self) {
        let mut state = self.control.state.lock();
        if *state == RunState::Running {
            *state = RunState::Paused;
            debug!("Capture paused");
        }
    }

    /// Resume after [`pause`](Self::pause)
    pub fn resume(&self) {
        let mut state = self.control.state.lock();
        if *state == RunState::Paused {
            *state = RunState::Running;
            self.control.changed.notify_all();
            debug!("Capture resumed");
        }
    }

    /// Whether capture is paused
    pub fn is_paused(&self) -> bool {
        *self.control.state.lock() == RunState::Paused
    }

    /// Whether the capture thread is still alive
    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Capture counters
    pub fn stats(&self) -> &Arc<CaptureStats> {
        &self.stats
    }

    /// Stop the thread and wait for it to exit.
    ///
    /// Waits at most for the source's current `next_frame` call to return.
    pub fn stop(&mut self) -> MediaResult<()> {
        {
            let mut state = self.control.state.lock();
            *state = RunState::Stopping;
            self.control.changed.notify_all();
        }

        match self.thread.take() {
            Some(thread) => thread.join().map_err(|_| MediaError::InvalidState {
                message: "capture thread panicked".to_string(),
            }),
            None => Err(MediaError::CaptureNotActive),
        }
    }
}

impl Drop for CaptureWorker {
    fn drop(&mut self) {
        if self.thread.is_some() {
            let _ = self.stop();
        }
    }
}

fn run_capture<S: FrameSource, T: FrameTransform>(
    mut source: S,
    mut transform: T,
    mailbox: Arc<FrameMailbox>,
    control: Arc<CaptureControl>,
    stats: Arc<CaptureStats>,
    events: Option<EventBus>,
) {
    let emit = |event: PipelineEvent| {
        if let Some(events) = &events {
            events.emit(event);
        }
    };

    loop {
        {
            let mut state = control.state.lock();
            while *state == RunState::Paused {
                control.changed.wait(&mut state);
            }
            if *state == RunState::Stopping {
                break;
            }
        }

        let raw = match source.next_frame() {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                info!("Frame source exhausted");
                break;
            }
            Err(e) if e.is_recoverable() => {
                warn!(category = ?e.category(), "Frame source error, skipping frame: {}", e);
                stats.dropped.fetch_add(1, Ordering::Relaxed);
                continue;
            }
            Err(e) => {
                error!(category = ?e.category(), "Frame source failed, stopping capture: {}", e);
                break;
            }
        };
        stats.captured.fetch_add(1, Ordering::Relaxed);

        let len = match rgba_len(raw.width, raw.height) {
            Some(len) => len,
            None => {
                warn!("Dropping {}x{} frame: size overflows", raw.width, raw.height);
                stats.dropped.fetch_add(1, Ordering::Relaxed);
                continue;
            }
        };

        let mut buf = mailbox.acquire_buffer(len);
        if let Err(e) = transform.transform(&raw, &mut buf) {
            warn!(category = ?e.category(), "Dropping frame {}: {}", raw.sequence, e);
            stats.dropped.fetch_add(1, Ordering::Relaxed);
            emit(PipelineEvent::FrameRejected {
                reason: e.to_string(),
            });
            mailbox.pool().release(buf);
            continue;
        }

        match mailbox.publish_rgba(raw.width, raw.height, buf) {
            Ok(()) => {
                stats.published.fetch_add(1, Ordering::Relaxed);
            }
            Err(FramecastError::MailboxClosed) => {
                debug!("Mailbox closed, capture exiting");
                break;
            }
            Err(e) => {
                stats.dropped.fetch_add(1, Ordering::Relaxed);
                emit(PipelineEvent::FrameRejected {
                    reason: e.to_string(),
                });
            }
        }
    }

    let published = stats.published();
    info!("Capture thread exiting after {} frames", published);
    emit(PipelineEvent::CaptureStopped {
        frames_published: published,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCategory;
    use std::collections::VecDeque;

    struct ScriptedSource {
        frames: VecDeque<RawFrame>,
    }

    impl FrameSource for ScriptedSource {
        fn next_frame(&mut self) -> MediaResult<Option<RawFrame>> {
            Ok(self.frames.pop_front())
        }
    }

    struct FailingSource {
        script: VecDeque<MediaResult<Option<RawFrame>>>,
    }

    impl FrameSource for FailingSource {
        fn next_frame(&mut self) -> MediaResult<Option<RawFrame>> {
            self.script.pop_front().unwrap_or(Ok(None))
        }
    }

    fn wait_for_exit(worker: &CaptureWorker) {
        for _ in 0..200 {
            if !worker.is_running() {
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    fn rgba(width: u32, height: u32, len: usize, sequence: u64) -> RawFrame {
        RawFrame {
            width,
            height,
            layout: PixelLayout::Rgba8,
            data: vec![sequence as u8; len],
            sequence,
        }
    }

    #[test]
    fn test_luma_to_rgba() {
        let raw = RawFrame {
            width: 2,
            height: 1,
            layout: PixelLayout::Luma8,
            data: vec![10, 200],
            sequence: 0,
        };
        let mut out = Vec::new();
        LumaToRgba.transform(&raw, &mut out).unwrap();
        assert_eq!(out, vec![10, 10, 10, 255, 200, 200, 200, 255]);

        let wrong = rgba(1, 1, 4, 0);
        assert!(LumaToRgba.transform(&wrong, &mut out).is_err());
    }

    #[test]
    fn test_pattern_is_asymmetric() {
        let data = TestPatternSource::render(4, 2, 7);
        // top-left
        assert_eq!(&data[0..4], &[0, 0, 7, 255]);
        // top-right
        assert_eq!(&data[12..16], &[255, 0, 7, 255]);
        // bottom-left
        assert_eq!(&data[16..20], &[0, 255, 7, 255]);
    }

    #[test]
    fn test_malformed_frame_is_dropped() {
        let mailbox = Arc::new(FrameMailbox::new());
        let mut reader = mailbox.reader();
        let source = ScriptedSource {
            frames: VecDeque::from(vec![rgba(2, 2, 16, 1), rgba(2, 2, 15, 2)]),
        };

        let mut worker =
            CaptureWorker::spawn(source, PassthroughRgba, Arc::clone(&mailbox), None).unwrap();
        for _ in 0..200 {
            if !worker.is_running() {
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        worker.stop().unwrap();

        assert_eq!(worker.stats().captured(), 2);
        assert_eq!(worker.stats().published(), 1);
        assert_eq!(worker.stats().dropped(), 1);
        assert_eq!(mailbox.stats().rejected, 1);
        assert_eq!(reader.take_if_new().unwrap().pixels()[0], 1);
    }

    #[test]
    fn test_pause_and_resume() {
        let mailbox = Arc::new(FrameMailbox::new());
        let source = TestPatternSource::new(2, 2, 200.0).unwrap();
        let mut worker =
            CaptureWorker::spawn(source, PassthroughRgba, Arc::clone(&mailbox), None).unwrap();

        std::thread::sleep(Duration::from_millis(50));
        worker.pause();
        assert!(worker.is_paused());
        // Let an in-flight frame land before sampling
        std::thread::sleep(Duration::from_millis(30));
        let paused_at = worker.stats().published();
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(worker.stats().published(), paused_at);

        worker.resume();
        std::thread::sleep(Duration::from_millis(50));
        assert!(worker.stats().published() > paused_at);

        worker.stop().unwrap();
        assert!(!worker.is_running());
    }

    #[test]
    fn test_closed_mailbox_ends_capture() {
        let mailbox = Arc::new(FrameMailbox::new());
        mailbox.close();
        let source = TestPatternSource::new(2, 2, 500.0).unwrap();
        let mut worker =
            CaptureWorker::spawn(source, PassthroughRgba, Arc::clone(&mailbox), None).unwrap();

        for _ in 0..200 {
            if !worker.is_running() {
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(!worker.is_running());
        worker.stop().unwrap();
    }

    #[test]
    fn test_source_errors_by_category() {
        let mailbox = Arc::new(FrameMailbox::new());
        let bad_data = MediaError::InvalidFrameData {
            expected: 4,
            actual: 2,
        };
        let unplugged = MediaError::Capture {
            reason: "device unplugged".to_string(),
        };
        assert_eq!(bad_data.category(), ErrorCategory::Data);
        assert_eq!(unplugged.category(), ErrorCategory::Device);

        let source = FailingSource {
            script: VecDeque::from(vec![
                Err(bad_data),
                Ok(Some(rgba(1, 1, 4, 1))),
                Err(unplugged),
                Ok(Some(rgba(1, 1, 4, 2))),
            ]),
        };
        let mut worker =
            CaptureWorker::spawn(source, PassthroughRgba, Arc::clone(&mailbox), None).unwrap();
        wait_for_exit(&worker);

        // The data error skips one frame, the device error ends capture
        assert!(!worker.is_running());
        assert_eq!(worker.stats().dropped(), 1);
        assert_eq!(worker.stats().published(), 1);
        assert_eq!(mailbox.latest().unwrap().pixels()[0], 1);
        worker.stop().unwrap();
    }
}
