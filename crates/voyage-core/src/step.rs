//! The `Step` capability and its result vocabulary.
//!
//! Replaces exception-as-control-flow with a tagged outcome: a step never
//! throws its way into a retry, it returns one.

use async_trait::async_trait;
use std::fmt;

use crate::context::StepContext;

/// A step's own description of what went wrong. Carries a human-readable
/// message; the engine never inspects anything else about it, it only
/// stores it (through an `ExceptionSerializer`) and chains it with any
/// undo-time failure for dismal-failure reporting.
#[derive(Debug, Clone)]
pub struct StepError {
    pub message: String,
}

impl StepError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

impl fmt::Display for StepError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for StepError {}

impl From<String> for StepError {
    fn from(message: String) -> Self {
        Self { message }
    }
}

impl From<&str> for StepError {
    fn from(message: &str) -> Self {
        Self { message: message.to_string() }
    }
}

/// The result of running one step body in one direction.
#[derive(Debug, Clone)]
pub enum StepOutcome {
    /// The action completed; advance the cursor (DO) or retreat it (UNDO).
    Success,
    /// Repeat the same step, same direction, without advancing the cursor.
    Rerun,
    /// Stop executing and release ownership; a later Ready message resumes it.
    Wait,
    /// Stop executing and release ownership immediately; returns to READY.
    Stop,
    /// Transient failure; consult the step's `RetryRule` before giving up.
    FailureRetry(StepError),
    /// Unrecoverable failure; switch direction to UNDO (if in DO) or finish
    /// FATAL (if already in UNDO).
    FailureFatal(StepError),
}

/// One unit of forward-plus-compensating work within an operation.
///
/// `undo_step` defaults to a no-op success: most steps have nothing to
/// compensate and only override `do_step`.
#[async_trait]
pub trait Step: Send + Sync {
    async fn do_step(&self, ctx: &mut StepContext<'_>) -> StepOutcome;

    async fn undo_step(&self, _ctx: &mut StepContext<'_>) -> StepOutcome {
        StepOutcome::Success
    }
}
