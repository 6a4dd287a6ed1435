//! Stream and presenter state machines

use std::time::Instant;

/// Running state of an incoming stream
///
/// Mutated only under the stream lock by `start` and `stop`. While `Running`,
/// the stream is either in bypass mode or its presentation thread is alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamState {
    /// Not accepting frames
    #[default]
    Stopped,

    /// Accepting and delivering frames
    Running {
        /// When the stream started running
        started_at: Instant,
    },
}

impl StreamState {
    /// Check if this state transition is valid
    pub fn can_transition_to(&self, target: &StreamState) -> bool {
        use StreamState::*;

        match (self, target) {
            (Stopped, Running { .. }) => true,
            (Running { .. }, Stopped) => true,
            (Stopped, Stopped) => true,
            // Restarting an already running stream is a no-op, not a new run
            (Running { .. }, Running { .. }) => false,
        }
    }

    /// Check if the stream is running
    pub fn is_running(&self) -> bool {
        matches!(self, StreamState::Running { .. })
    }

    /// Get the duration since the stream started (if running)
    pub fn running_duration(&self) -> Option<std::time::Duration> {
        if let StreamState::Running { started_at } = self {
            Some(started_at.elapsed())
        } else {
            None
        }
    }

    /// Get a human-readable description of this state
    pub fn description(&self) -> &'static str {
        match self {
            StreamState::Stopped => "Stopped",
            StreamState::Running { .. } => "Running",
        }
    }
}

impl std::fmt::Display for StreamState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// State of the presentation thread as seen through the dispatch lock
///
/// `Terminating` is terminal: a presenter that observes it exits its loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PresenterState {
    /// No presentation thread exists
    #[default]
    Idle,

    /// Thread is alive and waiting on the wake event
    Armed,

    /// Shutdown requested, the thread must exit on its next wakeup
    Terminating,
}

impl PresenterState {
    /// Check if this state transition is valid
    pub fn can_transition_to(&self, target: &PresenterState) -> bool {
        use PresenterState::*;

        matches!(
            (self, target),
            (Idle, Armed) | (Armed, Terminating) | (Terminating, Idle) | (Idle, Idle)
        )
    }

    /// Whether a running presenter must exit
    pub fn is_terminating(&self) -> bool {
        matches!(self, PresenterState::Terminating)
    }
}
