//! Frame rate measurement

use std::time::{Duration, Instant};

/// Counts frames and reports a rate once per window
#[derive(Debug, Clone)]
pub struct FrameRateMeter {
    window: Duration,
    window_start: Instant,
    frames: u64,
    total: u64,
    last_rate: Option<f64>,
}

impl Default for FrameRateMeter {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

impl FrameRateMeter {
    /// Create a meter reporting every `window`
    pub fn new(window: Duration) -> Self {
        Self::starting_at(window, Instant::now())
    }

    /// Create a meter whose first window starts at `start`
    pub fn starting_at(window: Duration, start: Instant) -> Self {
        Self {
            window,
            window_start: start,
            frames: 0,
            total: 0,
            last_rate: None,
        }
    }

    /// Count one frame now; returns a rate when a window closes
    pub fn tick(&mut self) -> Option<f64> {
        self.tick_at(Instant::now())
    }

    /// Count one frame at `now`; returns frames per second when at least one
    /// window has elapsed since the last report
    pub fn tick_at(&mut self, now: Instant) -> Option<f64> {
        self.frames += 1;
        self.total += 1;

        let elapsed = now.saturating_duration_since(self.window_start);
        if elapsed < self.window {
            return None;
        }

        let rate = self.frames as f64 / elapsed.as_secs_f64();
        self.frames = 0;
        self.window_start = now;
        self.last_rate = Some(rate);
        Some(rate)
    }

    /// Rate from the most recent closed window
    pub fn last_rate(&self) -> Option<f64> {
        self.last_rate
    }

    /// Frames counted since creation
    pub fn total_frames(&self) -> u64 {
        self.total
    }
}
