//! Presentation side of an incoming stream
//!
//! Frames enter through [`IncomingVideoStream`], wait in a [`RenderBuffer`],
//! and leave through a [`RenderSink`] either directly (bypass mode) or from
//! the per-stream presentation thread.

pub mod dispatch;
mod presenter;
pub mod render_buffer;
pub mod stream;
pub mod wake;

pub use dispatch::{DispatchGate, RenderSink, SinkRef};
pub use render_buffer::{RenderBuffer, RenderFrames};
pub use stream::IncomingVideoStream;
pub use wake::{WakeEvent, WakeReason};
