//! Render buffer: jitter-absorbing frame queue
//!
//! The presentation loop treats the buffer as a black box that answers two
//! questions on every wakeup: "which frame should be shown now?" and "how
//! long until the one after it?". [`RenderFrames`] is the default answer,
//! releasing frames by their render time minus a configurable render delay.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use log::debug;

use crate::config::{BufferConfig, ReleasePolicy};
use crate::error::{RejectReason, Result, StreamError};
use crate::pipeline::clock::Clock;
use crate::pipeline::types::VideoFrame;

/// Frame queue consumed by the presentation loop
///
/// Every method is called with the stream's buffer lock held, so
/// implementations need no synchronization of their own.
pub trait RenderBuffer: Send {
    /// Queue a frame and return the queue depth after insertion
    fn insert(&mut self, frame: VideoFrame) -> Result<usize>;

    /// Take the frame that should be shown now, if any
    fn next_frame_to_render(&mut self) -> Option<VideoFrame>;

    /// Time until the next queued frame becomes due
    fn delay_until_next_frame(&self) -> Duration;

    /// Change the render delay
    fn set_render_delay(&mut self, delay_ms: u32) -> Result<()>;

    /// Drop all queued frames and return how many were dropped
    fn flush(&mut self) -> usize;

    /// Number of queued frames
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Frames passed over or evicted since the last call
    fn take_skipped(&mut self) -> usize {
        0
    }
}

/// Default render buffer ordered by arrival
pub struct RenderFrames {
    frames: VecDeque<VideoFrame>,
    config: BufferConfig,
    render_delay_ms: u32,
    clock: Arc<dyn Clock>,
    skipped: usize,
}

impl RenderFrames {
    /// Create a new buffer reading time from `clock`
    pub fn new(config: BufferConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            frames: VecDeque::with_capacity(config.max_queued_frames.min(64)),
            render_delay_ms: config.render_delay_ms,
            config,
            clock,
            skipped: 0,
        }
    }

    /// Currently applied render delay
    pub fn render_delay_ms(&self) -> u32 {
        self.render_delay_ms
    }

    /// Milliseconds until `frame` is due, negative when overdue
    fn time_to_release(&self, frame: &VideoFrame) -> i64 {
        frame.render_time.millis - self.render_delay_ms as i64 - self.clock.now().millis
    }

    fn front_is_due(&self) -> bool {
        self.frames
            .front()
            .is_some_and(|front| self.time_to_release(front) <= 0)
    }
}

impl RenderBuffer for RenderFrames {
    fn insert(&mut self, frame: VideoFrame) -> Result<usize> {
        let now = self.clock.now();

        // An empty queue always accepts late frames, otherwise a slow system
        // would never render anything
        let late_ms = now.millis_since(frame.render_time);
        if !self.frames.is_empty() && late_ms > self.config.old_frame_threshold_ms as i64 {
            return Err(StreamError::FrameRejected(RejectReason::TooOld { late_ms }));
        }

        let ahead_ms = -late_ms;
        if ahead_ms > self.config.future_frame_threshold_ms as i64 {
            return Err(StreamError::FrameRejected(RejectReason::TooFarAhead {
                ahead_ms,
            }));
        }

        self.frames.push_back(frame);

        while self.frames.len() > self.config.max_queued_frames.max(1) {
            self.frames.pop_front();
            self.skipped += 1;
            debug!("RenderFrames: queue full, evicted oldest frame");
        }

        Ok(self.frames.len())
    }

    fn next_frame_to_render(&mut self) -> Option<VideoFrame> {
        match self.config.policy {
            ReleasePolicy::Sequential => {
                if self.front_is_due() {
                    self.frames.pop_front()
                } else {
                    None
                }
            }
            ReleasePolicy::LatestReady => {
                let mut newest = None;
                while self.front_is_due() {
                    if newest.is_some() {
                        self.skipped += 1;
                    }
                    newest = self.frames.pop_front();
                }
                newest
            }
        }
    }

    fn delay_until_next_frame(&self) -> Duration {
        match self.frames.front() {
            Some(front) => Duration::from_millis(self.time_to_release(front).max(0) as u64),
            None => Duration::from_millis(self.config.idle_wait_ms as u64),
        }
    }

    fn set_render_delay(&mut self, delay_ms: u32) -> Result<()> {
        self.config.check_render_delay(delay_ms)?;
        self.render_delay_ms = delay_ms;
        Ok(())
    }

    fn flush(&mut self) -> usize {
        let dropped = self.frames.len();
        self.frames.clear();
        dropped
    }

    fn len(&self) -> usize {
        self.frames.len()
    }

    fn take_skipped(&mut self) -> usize {
        std::mem::take(&mut self.skipped)
    }
}
