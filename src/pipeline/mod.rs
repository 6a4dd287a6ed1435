//! Timing, state and statistics shared by the presentation pipeline
//!
//! - `types`: stream ids, timestamps and frames
//! - `clock`: the time base render times are measured against
//! - `state`: stream and presenter state machines
//! - `health`: incoming-rate estimation and delivery counters

pub mod clock;
pub mod health;
pub mod state;
pub mod types;

pub use clock::{Clock, ManualClock, MonotonicClock};
pub use health::{HealthSummary, RateEstimator, StreamHealth};
pub use state::{PresenterState, StreamState};
pub use types::{StreamId, Timestamp, VideoFrame};
