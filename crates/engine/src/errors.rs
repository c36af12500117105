//! Error types for performance execution.
//!
//! Build-time and start-time failures are returned synchronously as
//! [`PerformanceError`]. Once a performance runs, outcomes travel inside
//! steps as [`StepError`] values.

use thiserror::Error;

use crate::performer::PerformerType;

/// Why a cancel scope was cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CancelCause {
    /// Explicit cancellation by a caller or the cancel bus.
    #[error("canceled by request")]
    Requested,
    /// The flow timeout elapsed.
    #[error("deadline exceeded")]
    DeadlineExceeded,
}

/// Error attached to a step.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StepError {
    #[error("canceled")]
    Canceled(#[source] CancelCause),

    /// Expectation did not hold.
    #[error("failed: {0}")]
    Failed(String),

    /// The performer itself broke.
    #[error("crashed: {0}")]
    Crashed(String),
}

impl StepError {
    /// Cancellation cause when this is a [`StepError::Canceled`].
    pub fn cancel_cause(&self) -> Option<CancelCause> {
        match self {
            StepError::Canceled(cause) => Some(*cause),
            StepError::Failed(_) | StepError::Crashed(_) => None,
        }
    }
}

/// Errors returned before any step is emitted.
#[derive(Debug, Error)]
pub enum PerformanceError {
    #[error("performance already started")]
    AlreadyStarted,

    #[error("cyclic graph: `{from}` and `{to}` depend on each other")]
    CyclicGraph { from: String, to: String },

    #[error("no performer bound for {0:?} theses")]
    PerformerNotBound(PerformerType),

    #[error("performance guard error: {0}")]
    Guard(#[source] GuardError),

    #[error("cancel subscription error: {0}")]
    Subscription(#[from] CancelBusError),
}

impl From<GuardError> for PerformanceError {
    fn from(error: GuardError) -> Self {
        match error {
            GuardError::AlreadyStarted { .. } => PerformanceError::AlreadyStarted,
            other => PerformanceError::Guard(other),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GuardError {
    #[error("performance `{id}` is already held")]
    AlreadyStarted { id: String },

    #[error("performance `{id}` is not held")]
    NotHeld { id: String },

    #[error("guard backend error: {0}")]
    Backend(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CancelBusError {
    #[error("cancel bus backend error: {0}")]
    Backend(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FlowStoreError {
    #[error("flow `{id}` not found")]
    NotFound { id: String },

    #[error("flow store backend error: {0}")]
    Backend(String),
}
