//! Core types for the presentation pipeline

use bytes::Bytes;
use std::time::Duration;

/// Opaque identifier of an incoming stream
///
/// Immutable for the lifetime of a stream and handed to every sink on dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct StreamId(pub u32);

impl From<u32> for StreamId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for StreamId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Timestamp on the stream clock
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Timestamp {
    /// Milliseconds since the clock base
    pub millis: i64,
}

impl Timestamp {
    /// Create a new timestamp from milliseconds
    pub fn from_millis(millis: i64) -> Self {
        Self { millis }
    }

    /// Create a timestamp from a duration since the clock base
    pub fn from_duration(duration: Duration) -> Self {
        Self {
            millis: duration.as_millis() as i64,
        }
    }

    /// Add a duration to this timestamp
    pub fn add(&self, duration: Duration) -> Self {
        Self {
            millis: self.millis + duration.as_millis() as i64,
        }
    }

    /// Signed distance `self - earlier` in milliseconds
    pub fn millis_since(&self, earlier: Timestamp) -> i64 {
        self.millis - earlier.millis
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}ms", self.millis)
    }
}

/// Decoded video frame waiting for presentation
///
/// The pixel payload is opaque to the scheduler; only the render time and the
/// frame dimensions are inspected. A zero-sized frame is the "nothing to show"
/// sentinel and is never dispatched.
#[derive(Clone, PartialEq, Eq)]
pub struct VideoFrame {
    /// Raw pixel data, layout owned by the producer
    pub data: Bytes,

    /// Frame width in pixels
    pub width: u32,

    /// Frame height in pixels
    pub height: u32,

    /// When the frame should be shown, on the stream clock
    pub render_time: Timestamp,
}

impl VideoFrame {
    /// Create a new frame scheduled for `render_time`
    pub fn new(data: Bytes, width: u32, height: u32, render_time: Timestamp) -> Self {
        Self {
            data,
            width,
            height,
            render_time,
        }
    }

    /// The empty sentinel frame
    pub fn empty() -> Self {
        Self {
            data: Bytes::new(),
            width: 0,
            height: 0,
            render_time: Timestamp::default(),
        }
    }

    /// Whether this frame has no pixels to show
    pub fn is_zero_size(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Get the size of the frame data in bytes
    pub fn size(&self) -> usize {
        self.data.len()
    }
}

impl std::fmt::Debug for VideoFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VideoFrame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("render_time", &self.render_time)
            .field("size", &self.size())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_size_sentinel() {
        assert!(VideoFrame::empty().is_zero_size());

        let frame = VideoFrame::new(Bytes::from_static(&[0; 4]), 2, 0, Timestamp::from_millis(5));
        assert!(frame.is_zero_size());

        let frame = VideoFrame::new(Bytes::from_static(&[0; 4]), 2, 2, Timestamp::from_millis(5));
        assert!(!frame.is_zero_size());
        assert_eq!(frame.size(), 4);
    }

    #[test]
    fn test_timestamp_arithmetic() {
        let ts = Timestamp::from_millis(100);
        assert_eq!(ts.add(Duration::from_millis(50)).millis, 150);
        assert_eq!(ts.millis_since(Timestamp::from_millis(40)), 60);
        assert_eq!(ts.millis_since(Timestamp::from_millis(150)), -50);
        assert_eq!(Timestamp::from_duration(Duration::from_secs(2)).millis, 2_000);
    }
}
