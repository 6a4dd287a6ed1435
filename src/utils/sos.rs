//! Cancellation latch shared between a controlling thread and workers

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

/// One-way stop signal
///
/// Clones share the same latch. Once cancelled it stays cancelled.
#[derive(Debug, Clone, Default)]
pub struct SignalOfStop {
    // Shared state between clones
    shared: Arc<SharedState>,
}

#[derive(Debug, Default)]
struct SharedState {
    closing: AtomicBool,
    mutex: Mutex<()>,
    condvar: Condvar,
}

impl SignalOfStop {
    pub fn new() -> SignalOfStop {
        SignalOfStop::default()
    }

    pub fn cancel(&self) {
        self.shared.closing.store(true, Ordering::SeqCst);

        // Lock briefly so a waiter between its check and its wait cannot miss the notification
        let _guard = self.shared.mutex.lock().unwrap_or_else(|e| e.into_inner());
        self.shared.condvar.notify_all();
    }

    pub fn cancelled(&self) -> bool {
        self.shared.closing.load(Ordering::SeqCst)
    }

    /// Sleep for `timeout` unless cancelled first. Returns whether cancelled.
    pub fn wait_cancellation_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut guard = self.shared.mutex.lock().unwrap_or_else(|e| e.into_inner());

        while !self.cancelled() {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            guard = match self.shared.condvar.wait_timeout(guard, deadline - now) {
                Ok((guard, _)) => guard,
                Err(e) => e.into_inner().0,
            };
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_timeout_without_cancel() {
        let sos = SignalOfStop::new();
        let started = Instant::now();

        assert!(!sos.wait_cancellation_timeout(Duration::from_millis(20)));
        assert!(started.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_cancel_wakes_waiters() {
        let sos = SignalOfStop::new();
        let waiter = {
            let sos = sos.clone();
            thread::spawn(move || sos.wait_cancellation_timeout(Duration::from_secs(5)))
        };
        let second = {
            let sos = sos.clone();
            thread::spawn(move || sos.wait_cancellation_timeout(Duration::from_secs(5)))
        };

        thread::sleep(Duration::from_millis(20));
        sos.cancel();

        assert!(waiter.join().unwrap());
        assert!(second.join().unwrap());
        assert!(sos.cancelled());
    }
}
