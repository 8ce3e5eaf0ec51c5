//! Latest-frame-wins handoff between the capture thread and its consumers
//!
//! The mailbox holds at most one frame. Publishing replaces it unconditionally,
//! so a slow consumer skips frames instead of queueing them. Each consumer reads
//! through its own [`MailboxReader`], which remembers the last generation it saw;
//! display and relay therefore each get "new since my last read" semantics
//! without interfering with one another.

use crate::error::FramecastError;
use crate::frame::{BufferPool, Frame};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, trace, warn};

#[derive(Debug, Default)]
struct Slot {
    frame: Option<Arc<Frame>>,
    generation: u64,
}

/// Mailbox counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MailboxStats {
    /// Frames accepted
    pub published: u64,
    /// Frames refused by validation
    pub rejected: u64,
    /// Current generation (0 until the first publish)
    pub generation: u64,
}

/// Single-slot frame buffer shared by the producer and all readers
#[derive(Debug, Default)]
pub struct FrameMailbox {
    slot: Mutex<Slot>,
    pool: BufferPool,
    closed: AtomicBool,
    published: AtomicU64,
    rejected: AtomicU64,
}

impl FrameMailbox {
    /// Create an empty mailbox
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the held frame and mark it new for every reader.
    ///
    /// If no reader still holds the replaced frame its pixel buffer is
    /// returned to the pool. Fails only once the mailbox is closed.
    pub fn publish(&self, frame: Frame) -> Result<(), FramecastError> {
        if self.closed.load(Ordering::Acquire) {
            debug!("Dropping {}x{} frame: mailbox closed", frame.width(), frame.height());
            return Err(FramecastError::MailboxClosed);
        }

        let previous = {
            let mut slot = self.slot.lock();
            slot.generation += 1;
            trace!("Published frame generation {}", slot.generation);
            slot.frame.replace(Arc::new(frame))
        };
        self.published.fetch_add(1, Ordering::Relaxed);

        if let Some(frame) = previous.and_then(Arc::into_inner) {
            self.pool.release(frame.into_pixels());
        }
        Ok(())
    }

    /// Validate raw RGBA data and publish it.
    ///
    /// A buffer that does not match its dimensions is refused and the
    /// currently held frame stays untouched.
    pub fn publish_rgba(
        &self,
        width: u32,
        height: u32,
        pixels: Vec<u8>,
    ) -> Result<(), FramecastError> {
        match Frame::new(width, height, pixels) {
            Ok(frame) => self.publish(frame),
            Err(e) => {
                self.rejected.fetch_add(1, Ordering::Relaxed);
                warn!("Rejected frame: {}", e);
                Err(e)
            }
        }
    }

    /// Create an independent reader.
    ///
    /// A fresh reader treats the currently held frame, if any, as new.
    pub fn reader(self: &Arc<Self>) -> MailboxReader {
        MailboxReader {
            mailbox: Arc::clone(self),
            seen: 0,
        }
    }

    /// Current frame without affecting any reader
    pub fn latest(&self) -> Option<Arc<Frame>> {
        self.slot.lock().frame.clone()
    }

    /// Pooled buffer for the next frame
    pub fn acquire_buffer(&self, len: usize) -> Vec<u8> {
        self.pool.acquire(len)
    }

    /// Buffer pool backing this mailbox
    pub fn pool(&self) -> &BufferPool {
        &self.pool
    }

    /// Stop accepting frames and drop the held one.
    ///
    /// Later publishes fail with [`FramecastError::MailboxClosed`] and readers
    /// see nothing new.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.slot.lock().frame = None;
            debug!("Frame mailbox closed");
        }
    }

    /// Whether [`close`](Self::close) was called
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Snapshot of the counters
    pub fn stats(&self) -> MailboxStats {
        MailboxStats {
            published: self.published.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            generation: self.slot.lock().generation,
        }
    }
}

/// One consumer's view of a [`FrameMailbox`]
#[derive(Debug)]
pub struct MailboxReader {
    mailbox: Arc<FrameMailbox>,
    seen: u64,
}

impl MailboxReader {
    /// Take the held frame if it was published after this reader's last take.
    ///
    /// Never blocks. Any number of publishes between two calls yields only
    /// the most recent frame.
    pub fn take_if_new(&mut self) -> Option<Arc<Frame>> {
        let slot = self.mailbox.slot.lock();
        if slot.generation == self.seen {
            return None;
        }
        let frame = slot.frame.clone()?;
        self.seen = slot.generation;
        Some(frame)
    }

    /// Whether a take would return a frame
    pub fn has_new(&self) -> bool {
        let slot = self.mailbox.slot.lock();
        slot.generation != self.seen && slot.frame.is_some()
    }

    /// Generation of the last frame this reader took
    pub fn last_seen(&self) -> u64 {
        self.seen
    }

    /// The mailbox this reader observes
    pub fn mailbox(&self) -> &Arc<FrameMailbox> {
        &self.mailbox
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(width: u32, height: u32, value: u8) -> Frame {
        Frame::new(width, height, vec![value; (width * height * 4) as usize]).unwrap()
    }

    #[test]
    fn test_latest_frame_wins() {
        let mailbox = Arc::new(FrameMailbox::new());
        let mut reader = mailbox.reader();

        for value in 1..=5 {
            mailbox.publish(solid(2, 2, value)).unwrap();
        }

        let frame = reader.take_if_new().unwrap();
        assert_eq!(frame.pixels()[0], 5);
        assert!(reader.take_if_new().is_none());
        assert_eq!(mailbox.stats().published, 5);
    }

    #[test]
    fn test_readers_are_independent() {
        let mailbox = Arc::new(FrameMailbox::new());
        let mut display = mailbox.reader();
        let mut relay = mailbox.reader();

        mailbox.publish(solid(1, 1, 7)).unwrap();
        assert!(display.take_if_new().is_some());
        assert!(display.take_if_new().is_none());

        // The relay has not consumed it yet
        assert!(relay.has_new());
        assert_eq!(relay.take_if_new().unwrap().pixels()[0], 7);
        assert!(relay.take_if_new().is_none());
    }

    #[test]
    fn test_invalid_publish_keeps_previous_frame() {
        let mailbox = Arc::new(FrameMailbox::new());
        let mut reader = mailbox.reader();
        mailbox.publish(solid(2, 2, 9)).unwrap();

        let result = mailbox.publish_rgba(2, 2, vec![0; 15]);
        assert!(matches!(result, Err(FramecastError::InvalidFrame { .. })));
        assert_eq!(mailbox.stats().rejected, 1);
        assert_eq!(mailbox.stats().generation, 1);

        let frame = reader.take_if_new().unwrap();
        assert_eq!(frame.pixels(), &[9u8; 16][..]);
    }

    #[test]
    fn test_snapshot_survives_later_publish() {
        let mailbox = Arc::new(FrameMailbox::new());
        let mut reader = mailbox.reader();

        mailbox.publish(solid(1, 1, 1)).unwrap();
        let held = reader.take_if_new().unwrap();
        mailbox.publish(solid(1, 1, 2)).unwrap();

        assert_eq!(held.pixels()[0], 1);
        assert_eq!(mailbox.latest().unwrap().pixels()[0], 2);
    }

    #[test]
    fn test_replaced_buffer_returns_to_pool() {
        let mailbox = Arc::new(FrameMailbox::new());

        let buf = mailbox.acquire_buffer(4);
        mailbox.publish_rgba(1, 1, buf).unwrap();
        let buf = mailbox.acquire_buffer(4);
        mailbox.publish_rgba(1, 1, buf).unwrap();

        // First frame was released on the second publish
        let _buf = mailbox.acquire_buffer(4);
        assert_eq!(mailbox.pool().allocations(), 2);
        assert_eq!(mailbox.pool().reuses(), 1);
    }

    #[test]
    fn test_close_rejects_later_publishes() {
        let mailbox = Arc::new(FrameMailbox::new());
        let mut reader = mailbox.reader();
        mailbox.publish(solid(1, 1, 3)).unwrap();

        mailbox.close();
        assert!(mailbox.is_closed());
        assert!(matches!(
            mailbox.publish(solid(1, 1, 4)),
            Err(FramecastError::MailboxClosed)
        ));
        assert!(reader.take_if_new().is_none());
        assert!(mailbox.latest().is_none());
    }

    #[test]
    fn test_concurrent_publish_and_take_never_tears() {
        const FRAMES: u64 = 2000;
        let mailbox = Arc::new(FrameMailbox::new());
        let mut reader = mailbox.reader();
        let done = Arc::new(AtomicBool::new(false));

        let producer = std::thread::spawn({
            let mailbox = Arc::clone(&mailbox);
            let done = Arc::clone(&done);
            move || {
                for i in 0..FRAMES {
                    let mut buf = mailbox.acquire_buffer(16 * 16 * 4);
                    buf.fill((i % 251) as u8);
                    mailbox.publish_rgba(16, 16, buf).unwrap();
                    std::thread::yield_now();
                }
                done.store(true, Ordering::Release);
            }
        });

        let mut taken = 0u64;
        let mut check = |reader: &mut MailboxReader, last: &mut u64| {
            if let Some(frame) = reader.take_if_new() {
                let seen = reader.last_seen();
                assert!(seen > *last, "generation went from {} to {}", last, seen);
                *last = seen;

                // Generation n carries the fill of publish n - 1
                let expected = ((seen - 1) % 251) as u8;
                assert!(frame.pixels().iter().all(|&p| p == expected));
                taken += 1;
            }
        };

        let mut last = 0;
        while !done.load(Ordering::Acquire) {
            check(&mut reader, &mut last);
        }
        producer.join().unwrap();
        check(&mut reader, &mut last);

        assert_eq!(last, FRAMES);
        assert!(taken >= 1);
        assert!(mailbox.pool().reuses() > 0);
    }
}
