//! Timed wake event pacing the presentation thread
//!
//! A single primitive serves two triggers: an explicit `set()` when a frame
//! arrives sooner than the current schedule expected, and a one-shot deadline
//! armed by the presenter for the next due frame. The waiter cannot tell which
//! one fired with certainty and must re-derive ground truth from the render
//! buffer on every wakeup.

use log::warn;
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// What ended a call to [`WakeEvent::wait`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeReason {
    /// `set()` was called
    Signaled,
    /// The armed deadline passed
    Deadline,
    /// Neither happened within the wait ceiling
    Timeout,
}

#[derive(Debug, Default)]
struct WakeState {
    /// Auto-reset flag, consumed by the first waiter that sees it
    signaled: bool,
    /// One-shot timer
    deadline: Option<Instant>,
}

/// Signalable, re-armable timed wait
#[derive(Debug, Default)]
pub struct WakeEvent {
    state: Mutex<WakeState>,
    condvar: Condvar,
}

impl WakeEvent {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, WakeState> {
        self.state.lock().unwrap_or_else(|e| {
            warn!("WakeEvent: mutex poisoned; continuing");
            e.into_inner()
        })
    }

    /// Wake the waiter now
    pub fn set(&self) {
        let mut state = self.lock();
        state.signaled = true;
        self.condvar.notify_all();
    }

    /// Arm the one-shot timer, replacing any pending deadline
    pub fn start_timer(&self, delay: Duration) {
        let mut state = self.lock();
        state.deadline = Some(Instant::now() + delay);
        self.condvar.notify_all();
    }

    /// Disarm the timer
    pub fn stop_timer(&self) {
        self.lock().deadline = None;
    }

    /// Whether a deadline is pending
    pub fn is_armed(&self) -> bool {
        self.lock().deadline.is_some()
    }

    /// Block until signaled, the deadline passes, or `max_wait` elapses
    pub fn wait(&self, max_wait: Duration) -> WakeReason {
        let ceiling = Instant::now() + max_wait;
        let mut state = self.lock();

        loop {
            if state.signaled {
                state.signaled = false;
                return WakeReason::Signaled;
            }

            let now = Instant::now();
            if let Some(deadline) = state.deadline
                && deadline <= now
            {
                state.deadline = None;
                return WakeReason::Deadline;
            }
            if now >= ceiling {
                return WakeReason::Timeout;
            }

            let until = state.deadline.map_or(ceiling, |d| d.min(ceiling));
            state = match self.condvar.wait_timeout(state, until - now) {
                Ok((guard, _)) => guard,
                Err(e) => {
                    warn!("WakeEvent: condvar wait mutex poisoned; continuing");
                    e.into_inner().0
                }
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_wait_times_out_at_ceiling() {
        let event = WakeEvent::new();
        let started = Instant::now();

        assert_eq!(event.wait(Duration::from_millis(20)), WakeReason::Timeout);
        assert!(started.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_signal_before_wait_is_remembered() {
        let event = WakeEvent::new();
        event.set();

        assert_eq!(event.wait(Duration::from_secs(5)), WakeReason::Signaled);
        // Auto-reset: the second wait does not see the old signal
        assert_eq!(event.wait(Duration::from_millis(5)), WakeReason::Timeout);
    }

    #[test]
    fn test_signal_wakes_blocked_waiter() {
        let event = Arc::new(WakeEvent::new());
        let waiter = {
            let event = event.clone();
            thread::spawn(move || {
                let started = Instant::now();
                (event.wait(Duration::from_secs(5)), started.elapsed())
            })
        };

        thread::sleep(Duration::from_millis(20));
        event.set();

        let (reason, elapsed) = waiter.join().unwrap();
        assert_eq!(reason, WakeReason::Signaled);
        assert!(elapsed < Duration::from_secs(5));
    }

    #[test]
    fn test_deadline_fires_once() {
        let event = WakeEvent::new();
        event.start_timer(Duration::from_millis(10));
        assert!(event.is_armed());

        let started = Instant::now();
        assert_eq!(event.wait(Duration::from_secs(5)), WakeReason::Deadline);
        assert!(started.elapsed() >= Duration::from_millis(10));
        assert!(!event.is_armed());

        assert_eq!(event.wait(Duration::from_millis(5)), WakeReason::Timeout);
    }

    #[test]
    fn test_ceiling_caps_long_deadline() {
        let event = WakeEvent::new();
        event.start_timer(Duration::from_secs(10));

        assert_eq!(event.wait(Duration::from_millis(10)), WakeReason::Timeout);
        // The deadline is still pending after a ceiling timeout
        assert!(event.is_armed());
    }

    #[test]
    fn test_stop_timer_disarms() {
        let event = WakeEvent::new();
        event.start_timer(Duration::ZERO);
        event.stop_timer();

        assert_eq!(event.wait(Duration::from_millis(10)), WakeReason::Timeout);
    }

    #[test]
    fn test_rearm_from_other_thread_shortens_wait() {
        let event = Arc::new(WakeEvent::new());
        event.start_timer(Duration::from_secs(10));

        let waiter = {
            let event = event.clone();
            thread::spawn(move || event.wait(Duration::from_secs(5)))
        };

        thread::sleep(Duration::from_millis(20));
        event.start_timer(Duration::from_millis(1));

        assert_eq!(waiter.join().unwrap(), WakeReason::Deadline);
    }
}
