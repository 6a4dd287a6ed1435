//! Presentation loop run on the dedicated per-stream thread
//!
//! Each iteration waits on the wake event, checks for shutdown under the
//! delivery lock, pulls the next due frame from the render buffer, re-arms the
//! timer for the frame after it and finally dispatches. Every wakeup is
//! treated as advisory: the buffer is the only source of truth, so spurious
//! or coalesced wakeups are harmless.

use log::{debug, warn};
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

use thread_priority::{ThreadPriority, set_current_thread_priority};

use super::dispatch::DispatchGate;
use super::render_buffer::RenderBuffer;
use super::wake::{WakeEvent, WakeReason};
use crate::config::StreamConfig;
use crate::pipeline::health::StreamHealth;
use crate::pipeline::types::StreamId;

/// State shared between a stream controller and its presentation thread
///
/// Lock order: lifecycle lock, delivery lock, stream lock, slot lock, buffer
/// lock. The lifecycle and stream locks belong to the controller. Only the
/// delivery lock is held while a sink runs.
pub(crate) struct StreamShared {
    pub stream_id: StreamId,
    pub config: StreamConfig,
    pub dispatch: DispatchGate,
    pub buffer: Mutex<Box<dyn RenderBuffer>>,
    pub wake: WakeEvent,
    pub health: StreamHealth,
}

impl StreamShared {
    /// Acquire the buffer lock
    pub fn lock_buffer(&self) -> MutexGuard<'_, Box<dyn RenderBuffer>> {
        self.buffer.lock().unwrap_or_else(|e| {
            warn!("Stream {}: buffer mutex poisoned; continuing", self.stream_id);
            e.into_inner()
        })
    }
}

/// The presentation thread body
pub(crate) struct Presenter {
    shared: Arc<StreamShared>,
}

impl Presenter {
    /// Spawn the presentation thread for `shared`
    ///
    /// The caller must hold the slot lock and install the returned handle
    /// before releasing it.
    pub fn spawn(shared: Arc<StreamShared>) -> io::Result<JoinHandle<()>> {
        let name = shared.config.thread_name.clone();
        thread::Builder::new().name(name).spawn(move || {
            let presenter = Presenter { shared };
            if presenter.shared.config.elevate_priority {
                presenter.elevate_priority();
            }
            presenter.run();
        })
    }

    fn elevate_priority(&self) {
        if let Err(e) = set_current_thread_priority(ThreadPriority::Max) {
            warn!(
                "Presenter {}: could not raise thread priority: {:?}",
                self.shared.stream_id, e
            );
        }
    }

    fn run(&self) {
        debug!("Presenter {}: started", self.shared.stream_id);
        while self.process() {}
        debug!("Presenter {}: terminating", self.shared.stream_id);
    }

    /// One loop iteration. Returns `false` once shutdown was observed.
    pub(crate) fn process(&self) -> bool {
        let shared = &*self.shared;
        let max_wait = shared.config.max_wait();

        let reason = shared.wake.wait(max_wait);
        shared.health.record_wakeup();

        let delivery = shared.dispatch.begin_delivery();
        if shared.dispatch.is_terminating() {
            return false;
        }

        let (frame, delay) = {
            let mut buffer = shared.lock_buffer();
            let frame = buffer.next_frame_to_render();
            let delay = buffer.delay_until_next_frame();
            let skipped = buffer.take_skipped();
            if skipped > 0 {
                shared.health.record_skipped(skipped);
            }
            (frame, delay)
        };

        shared.wake.start_timer(delay.min(max_wait));

        match frame {
            Some(frame) => {
                if shared.dispatch.deliver(&delivery, shared.stream_id, &frame) {
                    shared.health.record_delivered(frame.size());
                }
            }
            None if reason == WakeReason::Signaled => {
                debug!(
                    "Presenter {}: woken with nothing due, next check in {:?}",
                    shared.stream_id,
                    delay.min(max_wait)
                );
            }
            None => {}
        }
        true
    }
}
