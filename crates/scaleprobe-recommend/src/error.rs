//! Recommendation engine error types.

use std::fmt;

use thiserror::Error;

/// Why a convergence wait stopped before the workload settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopCause {
    /// The per-wait budget (round or relocation timeout) elapsed.
    WaitDeadline,
    /// The run's overall deadline elapsed.
    RunDeadline,
}

impl fmt::Display for StopCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopCause::WaitDeadline => f.write_str("wait deadline exceeded"),
            StopCause::RunDeadline => f.write_str("run deadline exceeded"),
        }
    }
}

/// Errors that can occur during a recommendation run.
#[derive(Debug, Error)]
pub enum RecommendError {
    #[error("state store error: {0}")]
    State(#[from] scaleprobe_state::StateError),

    #[error("pool {0} has no unit to use as a template")]
    NoTemplate(String),

    #[error("convergence not reached ({cause}): {unscheduled} workload unit(s) still failing")]
    Timeout { cause: StopCause, unscheduled: usize },

    #[error("unit {unit} does not match any declared pool (pool label {pool:?})")]
    ScoringMismatch { unit: String, pool: Option<String> },

    #[error("run cancelled")]
    Cancelled,

    #[error("trial task failed: {0}")]
    Task(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

pub type RecommendResult<T> = Result<T, RecommendError>;
