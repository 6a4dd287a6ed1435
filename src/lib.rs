//! Per-stream frame-delivery scheduler for live video
//!
//! An [`IncomingVideoStream`] absorbs arrival jitter by buffering decoded
//! frames and releasing them to a sink on a timed schedule, or hands them
//! over synchronously in bypass mode.

pub mod config;
pub mod display;
pub mod error;
pub mod pipeline;
pub mod utils;

pub use config::{BufferConfig, ReleasePolicy, StreamConfig};
pub use display::{IncomingVideoStream, RenderBuffer, RenderFrames, RenderSink, SinkRef};
pub use error::{RejectReason, Result, StreamError};
pub use pipeline::{Clock, HealthSummary, ManualClock, MonotonicClock, StreamId, Timestamp, VideoFrame};
