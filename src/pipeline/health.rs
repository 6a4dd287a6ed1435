//! Incoming-rate statistics and health counters for a stream

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use super::types::Timestamp;

/// Frames-per-second estimate over a fixed window
///
/// The rate is recomputed at most once per window boundary, so it always
/// reflects the last *completed* window rather than an instantaneous value.
///
/// Has no lock of its own: it lives inside the stream state and is only
/// touched while the stream lock is held.
#[derive(Debug, Clone)]
pub struct RateEstimator {
    /// Length of one measurement window
    period: Duration,

    /// Start of the current window
    window_start: Timestamp,

    /// Frames counted since `window_start`
    frames_in_window: u64,

    /// Rate of the last completed window, in frames per second
    rate: u32,
}

impl RateEstimator {
    /// Create an estimator whose first window starts at the clock base
    pub fn new(period: Duration) -> Self {
        Self::starting_at(period, Timestamp::default())
    }

    /// Create an estimator whose first window starts at `start`
    pub fn starting_at(period: Duration, start: Timestamp) -> Self {
        Self {
            period,
            window_start: start,
            frames_in_window: 0,
            rate: 0,
        }
    }

    /// Count one frame arriving at `now`
    ///
    /// Returns the freshly computed rate when this frame closed a window.
    pub fn record(&mut self, now: Timestamp) -> Option<u32> {
        self.frames_in_window += 1;

        let elapsed_ms = now.millis_since(self.window_start);
        if elapsed_ms < self.period.as_millis() as i64 || elapsed_ms <= 0 {
            return None;
        }

        self.rate = (1000 * self.frames_in_window / elapsed_ms as u64) as u32;
        self.frames_in_window = 0;
        self.window_start = now;
        Some(self.rate)
    }

    /// Rate of the last completed window
    pub fn rate(&self) -> u32 {
        self.rate
    }
}

/// Health counters for one stream
///
/// All fields use atomic operations so producers, the presentation thread and
/// observers can update and read them without extra locking.
#[derive(Debug, Default)]
pub struct StreamHealth {
    /// Frames accepted by `render_frame` while running
    pub frames_received: AtomicU64,

    /// Frames handed to a sink
    pub frames_delivered: AtomicU64,

    /// Frames the render buffer refused on insert
    pub frames_rejected: AtomicU64,

    /// Frames the render buffer passed over or evicted
    pub frames_skipped: AtomicU64,

    /// Frames discarded by `reset`
    pub frames_flushed: AtomicU64,

    /// Presentation loop iterations
    pub presenter_wakeups: AtomicU64,

    /// Total bytes of delivered frame data
    pub bytes_delivered: AtomicU64,
}

impl StreamHealth {
    /// Create a new set of zeroed counters
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_received(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_delivered(&self, size: usize) {
        self.frames_delivered.fetch_add(1, Ordering::Relaxed);
        self.bytes_delivered
            .fetch_add(size as u64, Ordering::Relaxed);
    }

    pub fn record_rejected(&self) {
        self.frames_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_skipped(&self, count: usize) {
        self.frames_skipped
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_flushed(&self, count: usize) {
        self.frames_flushed
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_wakeup(&self) {
        self.presenter_wakeups.fetch_add(1, Ordering::Relaxed);
    }

    /// Get a summary of health metrics
    pub fn summary(&self) -> HealthSummary {
        HealthSummary {
            frames_received: self.frames_received.load(Ordering::Relaxed),
            frames_delivered: self.frames_delivered.load(Ordering::Relaxed),
            frames_rejected: self.frames_rejected.load(Ordering::Relaxed),
            frames_skipped: self.frames_skipped.load(Ordering::Relaxed),
            frames_flushed: self.frames_flushed.load(Ordering::Relaxed),
            presenter_wakeups: self.presenter_wakeups.load(Ordering::Relaxed),
            bytes_delivered: self.bytes_delivered.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of health metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HealthSummary {
    pub frames_received: u64,
    pub frames_delivered: u64,
    pub frames_rejected: u64,
    pub frames_skipped: u64,
    pub frames_flushed: u64,
    pub presenter_wakeups: u64,
    pub bytes_delivered: u64,
}

impl HealthSummary {
    /// Share of received frames that never reached a sink, as a percentage
    pub fn loss_rate(&self) -> f64 {
        if self.frames_received == 0 {
            return 0.0;
        }
        let lost = self.frames_rejected + self.frames_skipped + self.frames_flushed;
        (lost as f64 / self.frames_received as f64) * 100.0
    }
}

impl std::fmt::Display for HealthSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Health: {} received, {} delivered ({} rejected, {} skipped, {} flushed, {:.2}% lost), {} wakeups, {} bytes",
            self.frames_received,
            self.frames_delivered,
            self.frames_rejected,
            self.frames_skipped,
            self.frames_flushed,
            self.loss_rate(),
            self.presenter_wakeups,
            self.bytes_delivered
        )
    }
}
