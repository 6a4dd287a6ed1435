//! Incoming video stream: the per-stream frame scheduler
//!
//! Decouples the irregular arrival of decoded frames from their paced
//! handoff to a sink. In bypass mode frames are delivered synchronously on
//! the producer's thread; otherwise they go through a render buffer and are
//! released by a dedicated presentation thread.
//!
//! # Locking
//!
//! Locks are always acquired in this order:
//! 1. lifecycle lock: serializes `start` and `stop`
//! 2. delivery lock: held across a sink call (reentrant)
//! 3. stream lock: running state and rate statistics
//! 4. slot lock: sinks, presentation thread handle, presenter state
//! 5. buffer lock: the render buffer
//!
//! Only the delivery lock is held while a sink runs. A slow sink therefore
//! cannot stall producers calling [`IncomingVideoStream::render_frame`] in
//! buffered mode, and a sink may call back into its own stream. `stop`
//! releases the stream lock before it waits on the delivery lock.

use log::{debug, info, trace, warn};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use super::dispatch::{DispatchGate, RenderSink, SinkRef};
use super::presenter::{Presenter, StreamShared};
use super::render_buffer::{RenderBuffer, RenderFrames};
use super::wake::WakeEvent;
use crate::config::StreamConfig;
use crate::error::{Result, StreamError};
use crate::pipeline::clock::{Clock, MonotonicClock};
use crate::pipeline::health::{HealthSummary, RateEstimator, StreamHealth};
use crate::pipeline::state::StreamState;
use crate::pipeline::types::{StreamId, VideoFrame};

/// State guarded by the stream lock
struct StreamInner {
    state: StreamState,
    rate: RateEstimator,
}

impl StreamInner {
    fn transition(&mut self, stream_id: StreamId, target: StreamState) {
        if !self.state.can_transition_to(&target) {
            warn!("Stream {}: unexpected transition {} -> {}", stream_id, self.state, target);
        }
        self.state = target;
    }
}

/// Frame scheduler for one incoming stream
///
/// # Example
///
/// ```ignore
/// let stream = IncomingVideoStream::new(StreamId(1), false);
/// stream.set_render_callback(Some(Arc::new(|id, frame: &VideoFrame| {
///     println!("{id}: {}x{}", frame.width, frame.height);
/// })));
/// stream.start()?;
/// stream.render_frame(StreamId(1), frame)?;
/// stream.stop()?;
/// ```
pub struct IncomingVideoStream {
    shared: Arc<StreamShared>,
    lifecycle: Mutex<()>,
    inner: Mutex<StreamInner>,
    clock: Arc<dyn Clock>,
    smoothing_disabled: bool,
}

impl IncomingVideoStream {
    /// Create a stream with default configuration and a monotonic clock
    pub fn new(stream_id: StreamId, disable_smoothing: bool) -> Self {
        Self::with_config(stream_id, disable_smoothing, StreamConfig::default())
    }

    /// Create a stream with a custom configuration
    pub fn with_config(stream_id: StreamId, disable_smoothing: bool, config: StreamConfig) -> Self {
        Self::with_clock(stream_id, disable_smoothing, config, Arc::new(MonotonicClock::new()))
    }

    /// Create a stream reading time from `clock`, with the default render buffer
    pub fn with_clock(
        stream_id: StreamId,
        disable_smoothing: bool,
        config: StreamConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let buffer = RenderFrames::new(config.buffer.clone(), clock.clone());
        Self::with_buffer(stream_id, disable_smoothing, config, clock, Box::new(buffer))
    }

    /// Create a stream around a caller-supplied render buffer
    pub fn with_buffer(
        stream_id: StreamId,
        disable_smoothing: bool,
        config: StreamConfig,
        clock: Arc<dyn Clock>,
        buffer: Box<dyn RenderBuffer>,
    ) -> Self {
        let rate = RateEstimator::starting_at(config.rate_window(), clock.now());
        Self {
            shared: Arc::new(StreamShared {
                stream_id,
                config,
                dispatch: DispatchGate::new(),
                buffer: Mutex::new(buffer),
                wake: WakeEvent::new(),
                health: StreamHealth::new(),
            }),
            lifecycle: Mutex::new(()),
            inner: Mutex::new(StreamInner {
                state: StreamState::Stopped,
                rate,
            }),
            clock,
            smoothing_disabled: disable_smoothing,
        }
    }

    /// Acquire the lifecycle lock
    fn lock_lifecycle(&self) -> MutexGuard<'_, ()> {
        self.lifecycle.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Acquire the stream lock
    fn lock_inner(&self) -> MutexGuard<'_, StreamInner> {
        self.inner.lock().unwrap_or_else(|e| {
            warn!("Stream {}: state mutex poisoned; continuing", self.shared.stream_id);
            e.into_inner()
        })
    }

    /// Start accepting frames
    ///
    /// In buffered mode this spawns the presentation thread. Starting a
    /// running stream is a no-op. On failure the stream stays stopped and
    /// `start` may be retried.
    pub fn start(&self) -> Result<()> {
        let _lifecycle = self.lock_lifecycle();
        let mut inner = self.lock_inner();
        if inner.state.is_running() {
            return Ok(());
        }

        if !self.smoothing_disabled {
            let mut slots = self.shared.dispatch.lock();
            let handle = Presenter::spawn(self.shared.clone()).map_err(StreamError::ThreadSpawn)?;
            slots.install_thread(handle);
            self.shared
                .wake
                .start_timer(self.shared.config.startup_delay());
        }

        inner.transition(
            self.shared.stream_id,
            StreamState::Running {
                started_at: Instant::now(),
            },
        );
        info!(
            "Stream {}: started ({})",
            self.shared.stream_id,
            if self.smoothing_disabled { "bypass" } else { "buffered" }
        );
        Ok(())
    }

    /// Stop accepting frames and tear down the presentation thread
    ///
    /// Waits for a delivery in flight and for the presentation thread to
    /// exit; no sink is called for this stream after `stop` returns. Must not
    /// be called from a sink invoked by this stream.
    pub fn stop(&self) -> Result<()> {
        let _lifecycle = self.lock_lifecycle();
        let ran_for = {
            let mut inner = self.lock_inner();
            if !inner.state.is_running() {
                return Ok(());
            }
            let ran_for = inner.state.running_duration();
            inner.transition(self.shared.stream_id, StreamState::Stopped);
            ran_for
        };

        // Stopped is visible before the delivery lock is taken, so every
        // producer that gets the lock after this point is refused
        if let Some(thread) = self.shared.dispatch.begin_shutdown(&self.shared.wake) {
            if thread.join().is_err() {
                warn!("Stream {}: presentation thread panicked", self.shared.stream_id);
            }
            self.shared.dispatch.finish_shutdown();
        }

        if let Some(ran_for) = ran_for {
            info!("Stream {}: stopped after {:?}", self.shared.stream_id, ran_for);
        }
        Ok(())
    }

    /// Drop every queued frame
    ///
    /// Valid whether or not the stream is running; sinks and the presentation
    /// thread are untouched.
    pub fn reset(&self) -> Result<()> {
        let flushed = self.shared.lock_buffer().flush();
        if flushed > 0 {
            self.shared.health.record_flushed(flushed);
            debug!("Stream {}: reset dropped {} frames", self.shared.stream_id, flushed);
        }
        Ok(())
    }

    /// Replace the primary sink; `None` clears it
    ///
    /// Waits for a delivery in flight on another thread. May be called from a
    /// sink of this stream, in which case it applies from the next frame.
    pub fn set_render_callback(&self, sink: Option<SinkRef>) {
        self.shared.dispatch.set_render_callback(sink);
    }

    /// Replace the override sink; while set, the primary sink receives nothing
    pub fn set_external_callback(&self, sink: Option<SinkRef>) {
        self.shared.dispatch.set_external_callback(sink);
    }

    /// Change the render buffer's delay. Only allowed while stopped.
    pub fn set_expected_render_delay(&self, delay_ms: u32) -> Result<()> {
        let inner = self.lock_inner();
        if inner.state.is_running() {
            return Err(StreamError::AlreadyRunning);
        }
        self.shared.lock_buffer().set_render_delay(delay_ms)
    }

    /// Ingest one decoded frame
    ///
    /// Fails with [`StreamError::NotRunning`] while stopped. In bypass mode
    /// the frame is delivered before this returns. In buffered mode it is
    /// queued and the presentation thread is woken when the queue goes from
    /// empty to non-empty. A frame the buffer refuses is counted and logged
    /// but does not fail the call.
    ///
    /// Sinks always receive this stream's id; `_source_id` identifies the
    /// delivering stage only.
    pub fn render_frame(&self, _source_id: StreamId, frame: VideoFrame) -> Result<()> {
        if self.smoothing_disabled {
            let delivery = self.shared.dispatch.begin_delivery();
            // The stream lock is released before the sink runs
            drop(self.accept(&frame)?);
            if self.shared.dispatch.deliver(&delivery, self.shared.stream_id, &frame) {
                self.shared.health.record_delivered(frame.size());
            }
            return Ok(());
        }

        let _inner = self.accept(&frame)?;
        let mut buffer = self.shared.lock_buffer();
        match buffer.insert(frame) {
            Ok(1) => self.shared.wake.set(),
            Ok(_) => {}
            Err(e) => {
                self.shared.health.record_rejected();
                debug!("Stream {}: {}", self.shared.stream_id, e);
            }
        }
        let skipped = buffer.take_skipped();
        if skipped > 0 {
            self.shared.health.record_skipped(skipped);
        }
        Ok(())
    }

    /// Count an arriving frame, refusing it while stopped
    ///
    /// Returns the stream lock so buffered ingestion completes before a
    /// concurrent `stop` can observe the stream as stopped.
    fn accept(&self, frame: &VideoFrame) -> Result<MutexGuard<'_, StreamInner>> {
        let mut inner = self.lock_inner();
        if !inner.state.is_running() {
            return Err(StreamError::NotRunning);
        }

        if let Some(rate) = inner.rate.record(self.clock.now()) {
            debug!("Stream {}: incoming rate {} fps", self.shared.stream_id, rate);
        }
        self.shared.health.record_received();
        trace!("Stream {}: received frame at {}", self.shared.stream_id, frame.render_time);
        Ok(inner)
    }

    pub fn stream_id(&self) -> StreamId {
        self.shared.stream_id
    }

    /// Frames per second over the last completed rate window
    pub fn incoming_rate(&self) -> u32 {
        self.lock_inner().rate.rate()
    }

    pub fn is_running(&self) -> bool {
        self.lock_inner().state.is_running()
    }

    pub fn state(&self) -> StreamState {
        self.lock_inner().state
    }

    /// Whether frames bypass the render buffer
    pub fn smoothing_disabled(&self) -> bool {
        self.smoothing_disabled
    }

    /// Number of frames waiting in the render buffer
    pub fn queued_frames(&self) -> usize {
        self.shared.lock_buffer().len()
    }

    /// Clock that render times are measured against
    pub fn clock(&self) -> Arc<dyn Clock> {
        self.clock.clone()
    }

    pub fn config(&self) -> &StreamConfig {
        &self.shared.config
    }

    pub fn health(&self) -> HealthSummary {
        self.shared.health.summary()
    }
}

/// Lets an upstream stage deliver straight into this stream
impl RenderSink for IncomingVideoStream {
    fn render_frame(&self, stream_id: StreamId, frame: &VideoFrame) {
        if let Err(e) = IncomingVideoStream::render_frame(self, stream_id, frame.clone()) {
            debug!("Stream {}: dropped upstream frame: {}", self.shared.stream_id, e);
        }
    }
}

impl Drop for IncomingVideoStream {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!("Stream {}: stop on drop failed: {}", self.shared.stream_id, e);
        }
    }
}
