//! Error types for state subjects.

use thiserror::Error;

/// Main error type for subject operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubjectError {
    /// Nothing has been published yet.
    #[error("No value present: nothing has been published yet")]
    NoValuePresent,

    /// The owner's lifecycle already reached the destroyed state.
    #[error("Lifecycle owner is already destroyed")]
    AlreadyTerminated,

    /// A worker pool refused a task because it was shutting down.
    #[error("Scheduler is shut down: {0}")]
    SchedulerShutdown(String),
}

/// Result type for subject operations.
pub type Result<T> = std::result::Result<T, SubjectError>;
