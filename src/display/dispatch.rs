//! Dispatch gate: delivery sinks and presentation thread ownership
//!
//! Two locks live here. The delivery lock is held for the whole of a frame
//! handoff, including the sink call, and is also taken by sink replacement and
//! shutdown; once either returns, the old sink or the stopped presenter is not
//! called again. It is reentrant, so a sink may replace a slot or push frames
//! into the stream that called it. The slot lock guards the two sinks, the
//! presentation thread handle and the presenter state, and is never held while
//! a sink runs.

use log::{trace, warn};
use parking_lot::{ReentrantMutex, ReentrantMutexGuard};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;

use super::wake::WakeEvent;
use crate::pipeline::state::PresenterState;
use crate::pipeline::types::{StreamId, VideoFrame};

/// Receiver of presented frames
///
/// Called synchronously with the delivery lock held; implementations should
/// return quickly. A sink may replace either callback slot, query the stream,
/// reset it, or push frames into it. It must not call `start` or `stop` on the
/// stream that is calling it.
pub trait RenderSink: Send + Sync {
    fn render_frame(&self, stream_id: StreamId, frame: &VideoFrame);
}

impl<F> RenderSink for F
where
    F: Fn(StreamId, &VideoFrame) + Send + Sync,
{
    fn render_frame(&self, stream_id: StreamId, frame: &VideoFrame) {
        self(stream_id, frame)
    }
}

/// Shared handle to a sink
pub type SinkRef = Arc<dyn RenderSink>;

/// Proof that the caller holds the delivery lock
pub type DeliveryGuard<'a> = ReentrantMutexGuard<'a, ()>;

/// State guarded by the slot lock
#[derive(Default)]
pub struct DispatchSlots {
    render: Option<SinkRef>,
    external: Option<SinkRef>,
    presenter: PresenterState,
    thread: Option<JoinHandle<()>>,
}

impl DispatchSlots {
    /// The external sink, or the render sink when no external sink is set
    pub fn active_sink(&self) -> Option<SinkRef> {
        self.external.as_ref().or(self.render.as_ref()).cloned()
    }

    /// Whether the presentation loop must exit
    pub fn is_terminating(&self) -> bool {
        self.presenter.is_terminating()
    }

    pub fn presenter_state(&self) -> PresenterState {
        self.presenter
    }

    pub fn has_thread(&self) -> bool {
        self.thread.is_some()
    }

    /// Record a freshly spawned presentation thread
    pub fn install_thread(&mut self, handle: JoinHandle<()>) {
        debug_assert!(self.thread.is_none());
        self.transition(PresenterState::Armed);
        self.thread = Some(handle);
    }

    fn transition(&mut self, target: PresenterState) {
        if !self.presenter.can_transition_to(&target) {
            warn!(
                "Dispatch: unexpected presenter transition {:?} -> {:?}",
                self.presenter, target
            );
        }
        self.presenter = target;
    }
}

/// The delivery and slot locks and what they guard
#[derive(Default)]
pub struct DispatchGate {
    delivery: ReentrantMutex<()>,
    slots: Mutex<DispatchSlots>,
}

impl DispatchGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the slot lock
    pub fn lock(&self) -> MutexGuard<'_, DispatchSlots> {
        self.slots.lock().unwrap_or_else(|e| {
            warn!("Dispatch: mutex poisoned; continuing");
            e.into_inner()
        })
    }

    /// Acquire the delivery lock; reentrant on the holding thread
    pub fn begin_delivery(&self) -> DeliveryGuard<'_> {
        self.delivery.lock()
    }

    /// Replace the primary sink once no delivery is in flight
    pub fn set_render_callback(&self, sink: Option<SinkRef>) {
        let _delivery = self.begin_delivery();
        self.lock().render = sink;
    }

    /// Replace the override sink once no delivery is in flight
    pub fn set_external_callback(&self, sink: Option<SinkRef>) {
        let _delivery = self.begin_delivery();
        self.lock().external = sink;
    }

    pub fn is_terminating(&self) -> bool {
        self.lock().is_terminating()
    }

    /// Hand a frame to the active sink. Returns whether a sink received it.
    ///
    /// The sink is resolved under the slot lock and called after it is
    /// released; a replacement made by the sink itself applies from the next
    /// frame.
    pub fn deliver(
        &self,
        _delivery: &DeliveryGuard<'_>,
        stream_id: StreamId,
        frame: &VideoFrame,
    ) -> bool {
        if frame.is_zero_size() {
            return false;
        }

        let Some(sink) = self.lock().active_sink() else {
            return false;
        };

        trace!("Dispatch: stream {} frame at {}", stream_id, frame.render_time);
        sink.render_frame(stream_id, frame);
        true
    }

    /// Deliver one frame under its own delivery lock
    pub fn dispatch(&self, stream_id: StreamId, frame: &VideoFrame) -> bool {
        let delivery = self.begin_delivery();
        self.deliver(&delivery, stream_id, frame)
    }

    /// Wait out any delivery in flight, mark the presenter as terminating and
    /// hand its thread to the caller
    ///
    /// The state flips before the wake event fires, so the presenter observes
    /// `Terminating` on the wakeup this call causes and exits instead of
    /// re-arming.
    pub fn begin_shutdown(&self, wake: &WakeEvent) -> Option<JoinHandle<()>> {
        let _delivery = self.begin_delivery();
        let mut slots = self.lock();
        let thread = slots.thread.take()?;

        slots.transition(PresenterState::Terminating);
        wake.stop_timer();
        wake.set();
        Some(thread)
    }

    /// Return to idle once the presentation thread has been joined
    pub fn finish_shutdown(&self) {
        let mut slots = self.lock();
        if slots.presenter.is_terminating() {
            slots.transition(PresenterState::Idle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::wake::WakeReason;
    use crate::pipeline::types::Timestamp;
    use bytes::Bytes;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    fn frame() -> VideoFrame {
        VideoFrame::new(Bytes::from_static(&[0; 4]), 2, 2, Timestamp::from_millis(0))
    }

    fn counting_sink() -> (SinkRef, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let sink_count = count.clone();
        let sink: SinkRef = Arc::new(move |_: StreamId, _: &VideoFrame| {
            sink_count.fetch_add(1, Ordering::SeqCst);
        });
        (sink, count)
    }

    #[test]
    fn test_no_sink_delivers_nothing() {
        let gate = DispatchGate::new();
        assert!(!gate.dispatch(StreamId(1), &frame()));
    }

    #[test]
    fn test_zero_size_frame_skipped() {
        let gate = DispatchGate::new();
        let (sink, count) = counting_sink();
        gate.set_render_callback(Some(sink));

        assert!(!gate.dispatch(StreamId(1), &VideoFrame::empty()));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_external_overrides_render() {
        let gate = DispatchGate::new();
        let (render, render_count) = counting_sink();
        let (external, external_count) = counting_sink();

        gate.set_render_callback(Some(render));
        gate.set_external_callback(Some(external));
        for _ in 0..3 {
            assert!(gate.dispatch(StreamId(7), &frame()));
        }
        assert_eq!(external_count.load(Ordering::SeqCst), 3);
        assert_eq!(render_count.load(Ordering::SeqCst), 0);

        // Clearing the override hands delivery back to the render sink
        gate.set_external_callback(None);
        assert!(gate.dispatch(StreamId(7), &frame()));
        assert_eq!(render_count.load(Ordering::SeqCst), 1);
        assert_eq!(external_count.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_sink_receives_stream_id() {
        let gate = DispatchGate::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink_seen = seen.clone();
        gate.set_render_callback(Some(Arc::new(move |id: StreamId, _: &VideoFrame| {
            sink_seen.lock().unwrap().push(id);
        })));

        gate.dispatch(StreamId(42), &frame());
        assert_eq!(*seen.lock().unwrap(), vec![StreamId(42)]);
    }

    #[test]
    fn test_shutdown_without_thread_is_noop() {
        let gate = DispatchGate::new();
        let wake = WakeEvent::new();

        assert!(gate.begin_shutdown(&wake).is_none());
        assert_eq!(gate.lock().presenter_state(), PresenterState::Idle);
        // No signal was raised
        assert_eq!(
            wake.wait(Duration::from_millis(5)),
            WakeReason::Timeout
        );
    }

    #[test]
    fn test_shutdown_marks_terminating_before_signal() {
        let gate = DispatchGate::new();
        let wake = WakeEvent::new();
        wake.start_timer(Duration::from_secs(10));

        gate.lock().install_thread(thread::spawn(|| {}));
        assert_eq!(gate.lock().presenter_state(), PresenterState::Armed);

        let handle = gate.begin_shutdown(&wake).unwrap();
        assert!(gate.is_terminating());
        assert!(!gate.lock().has_thread());
        assert!(!wake.is_armed());
        assert_eq!(
            wake.wait(Duration::from_secs(1)),
            WakeReason::Signaled
        );

        handle.join().unwrap();
        gate.finish_shutdown();
        assert_eq!(gate.lock().presenter_state(), PresenterState::Idle);
    }

    #[test]
    fn test_sink_may_replace_slots_while_called() {
        let gate = Arc::new(DispatchGate::new());
        let (replacement, replacement_count) = counting_sink();
        let calls = Arc::new(AtomicUsize::new(0));

        let sink_gate = Arc::downgrade(&gate);
        let sink_calls = calls.clone();
        gate.set_external_callback(Some(Arc::new(move |_: StreamId, _: &VideoFrame| {
            sink_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = sink_gate.upgrade() {
                gate.set_external_callback(None);
                gate.set_render_callback(Some(replacement.clone()));
            }
        })));

        assert!(gate.dispatch(StreamId(1), &frame()));
        assert!(gate.dispatch(StreamId(1), &frame()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(replacement_count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_delivery_lock_is_reentrant() {
        let gate = DispatchGate::new();
        let (sink, count) = counting_sink();
        gate.set_render_callback(Some(sink));

        let outer = gate.begin_delivery();
        assert!(gate.dispatch(StreamId(1), &frame()));
        assert!(gate.deliver(&outer, StreamId(1), &frame()));
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_shutdown_waits_for_delivery_in_flight() {
        let gate = Arc::new(DispatchGate::new());
        let wake = WakeEvent::new();
        let (entered_tx, entered_rx) = crossbeam::channel::bounded(1);
        let finished = Arc::new(AtomicUsize::new(0));

        let sink_finished = finished.clone();
        gate.set_render_callback(Some(Arc::new(move |_: StreamId, _: &VideoFrame| {
            let _ = entered_tx.send(());
            thread::sleep(Duration::from_millis(100));
            sink_finished.fetch_add(1, Ordering::SeqCst);
        })));
        gate.lock().install_thread(thread::spawn(|| {}));

        let deliverer = {
            let gate = gate.clone();
            thread::spawn(move || gate.dispatch(StreamId(1), &frame()))
        };
        entered_rx.recv_timeout(Duration::from_secs(2)).unwrap();

        let handle = gate.begin_shutdown(&wake).unwrap();
        assert_eq!(finished.load(Ordering::SeqCst), 1);
        handle.join().unwrap();
        assert!(deliverer.join().unwrap());
    }

    #[test]
    fn test_replacement_waits_for_delivery_in_flight() {
        let gate = Arc::new(DispatchGate::new());
        let (entered_tx, entered_rx) = crossbeam::channel::bounded(1);
        let finished = Arc::new(AtomicUsize::new(0));

        let sink_finished = finished.clone();
        gate.set_render_callback(Some(Arc::new(move |_: StreamId, _: &VideoFrame| {
            let _ = entered_tx.send(());
            thread::sleep(Duration::from_millis(100));
            sink_finished.fetch_add(1, Ordering::SeqCst);
        })));

        let deliverer = {
            let gate = gate.clone();
            thread::spawn(move || gate.dispatch(StreamId(1), &frame()))
        };
        entered_rx.recv_timeout(Duration::from_secs(2)).unwrap();

        gate.set_render_callback(None);
        assert_eq!(finished.load(Ordering::SeqCst), 1);
        assert!(deliverer.join().unwrap());
        assert!(!gate.dispatch(StreamId(1), &frame()));
    }
}
