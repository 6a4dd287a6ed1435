//! Tunables for incoming streams and their render buffers

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{Result, StreamError};

/// How the render buffer picks a frame once several are due
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReleasePolicy {
    /// Release due frames one at a time, oldest first
    #[default]
    Sequential,
    /// Release only the newest due frame and skip the older ones
    LatestReady,
}

/// Render buffer configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferConfig {
    /// Initial render delay subtracted from each frame's render time
    pub render_delay_ms: u32,
    pub min_render_delay_ms: u32,
    pub max_render_delay_ms: u32,
    /// Frames this late are refused while other frames are queued
    pub old_frame_threshold_ms: u32,
    /// Frames this far ahead are refused
    pub future_frame_threshold_ms: u32,
    /// Delay reported while the queue is empty
    pub idle_wait_ms: u32,
    /// Queue depth above which the oldest frame is evicted
    pub max_queued_frames: usize,
    pub policy: ReleasePolicy,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            render_delay_ms: 10,
            min_render_delay_ms: 10,
            max_render_delay_ms: 500,
            old_frame_threshold_ms: 500,
            future_frame_threshold_ms: 10_000,
            idle_wait_ms: 200,
            max_queued_frames: 300,
            policy: ReleasePolicy::Sequential,
        }
    }
}

impl BufferConfig {
    /// Check a render delay against the configured range
    pub fn check_render_delay(&self, delay_ms: u32) -> Result<()> {
        if delay_ms < self.min_render_delay_ms || delay_ms > self.max_render_delay_ms {
            return Err(StreamError::RenderDelayOutOfRange {
                delay_ms,
                min_ms: self.min_render_delay_ms,
                max_ms: self.max_render_delay_ms,
            });
        }
        Ok(())
    }
}

/// Incoming stream configuration
///
/// All timing values are milliseconds so the struct round-trips through JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Length of the incoming-rate measurement window
    pub rate_window_ms: u32,
    /// Longest the presentation thread sleeps before re-checking liveness
    pub max_wait_ms: u32,
    /// First wakeup after `start`
    pub startup_delay_ms: u32,
    /// Ask the OS for the highest priority for the presentation thread
    pub elevate_priority: bool,
    pub thread_name: String,
    pub buffer: BufferConfig,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            rate_window_ms: 1000,
            max_wait_ms: 100,
            startup_delay_ms: 1,
            elevate_priority: true,
            thread_name: "IncomingVideoStreamThread".to_string(),
            buffer: BufferConfig::default(),
        }
    }
}

impl StreamConfig {
    /// Parse a configuration from JSON, filling missing fields with defaults
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: StreamConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration from a JSON file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Reject values the stream cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.rate_window_ms == 0 {
            return Err(StreamError::InvalidConfig(
                "rate_window_ms must be positive".into(),
            ));
        }
        if self.max_wait_ms == 0 {
            return Err(StreamError::InvalidConfig(
                "max_wait_ms must be positive".into(),
            ));
        }
        if self.buffer.min_render_delay_ms > self.buffer.max_render_delay_ms {
            return Err(StreamError::InvalidConfig(
                "min_render_delay_ms exceeds max_render_delay_ms".into(),
            ));
        }
        self.buffer.check_render_delay(self.buffer.render_delay_ms)?;
        Ok(())
    }

    pub fn rate_window(&self) -> Duration {
        Duration::from_millis(self.rate_window_ms as u64)
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_millis(self.max_wait_ms as u64)
    }

    pub fn startup_delay(&self) -> Duration {
        Duration::from_millis(self.startup_delay_ms as u64)
    }
}

/// Returns a version as specified in Cargo.toml
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

pub fn app_name() -> &'static str {
    env!("CARGO_PKG_NAME")
}
