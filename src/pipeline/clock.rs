//! Stream clock used for render times and rate statistics

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{Duration, Instant};

use super::types::Timestamp;

/// Millisecond time source shared by a stream and its render buffer
///
/// Producers stamp frames with render times on this clock, the render buffer
/// compares them against `now()`, and the rate estimator measures its window
/// with it.
pub trait Clock: Send + Sync {
    /// Current time on this clock
    fn now(&self) -> Timestamp;
}

/// Monotonic wall clock
///
/// All timestamps are relative to the instant the clock was created.
#[derive(Clone)]
pub struct MonotonicClock {
    /// Base instant when the clock started
    base: Arc<Instant>,
}

impl MonotonicClock {
    /// Create a new clock starting now
    pub fn new() -> Self {
        Self {
            base: Arc::new(Instant::now()),
        }
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Timestamp {
        Timestamp::from_duration(self.base.elapsed())
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MonotonicClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MonotonicClock")
            .field("elapsed", &self.base.elapsed())
            .finish()
    }
}

/// Hand-driven clock for simulations and tests
///
/// Clones share the same time, so advancing one advances all of them.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now_ms: Arc<AtomicI64>,
}

impl ManualClock {
    /// Create a clock reading `start_ms`
    pub fn new(start_ms: i64) -> Self {
        Self {
            now_ms: Arc::new(AtomicI64::new(start_ms)),
        }
    }

    /// Move the clock forward
    pub fn advance(&self, by: Duration) {
        self.now_ms
            .fetch_add(by.as_millis() as i64, Ordering::SeqCst);
    }

    /// Jump to an absolute time
    pub fn set(&self, millis: i64) {
        self.now_ms.store(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        Timestamp::from_millis(self.now_ms.load(Ordering::SeqCst))
    }
}
