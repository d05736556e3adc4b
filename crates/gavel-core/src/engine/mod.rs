//! The turn engine and batch runners that drive records through a backend.

pub mod batch;
pub mod turn;

use std::time::Duration;

pub use batch::{BatchRequest, BatchRunner, LocalRunner, ProgressEvent, ProgressSink};
pub use turn::drive_record;

/// Per-(record, turn) processing state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    /// Not yet attempted.
    Pending,
    /// An attempt is outstanding.
    InFlight,
    /// Adapter call (and extraction, when configured) succeeded.
    Succeeded,
    /// Retry budget consumed without success; the last response (possibly
    /// unextractable, possibly none) and every failure message are kept.
    Exhausted,
}

impl TurnState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TurnState::Succeeded | TurnState::Exhausted)
    }
}

/// Retry and pacing configuration shared by all runners.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum total attempts per turn. One shared budget covers transient
    /// errors, rejected requests and extraction failures.
    pub max_retries: u32,
    /// Short cooldown after rejected requests and extraction failures; also
    /// the stagger unit between record starts and between turns.
    pub request_interval: Duration,
    /// Long cooldown after transient errors (rate limits, timeouts).
    pub transient_cooldown: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            request_interval: Duration::from_secs(1),
            transient_cooldown: Duration::from_secs(60),
        }
    }
}

impl EngineConfig {
    /// Zero-delay variant for tests.
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            request_interval: Duration::ZERO,
            transient_cooldown: Duration::ZERO,
        }
    }
}
