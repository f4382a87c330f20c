//! Small canned `Step` implementations for exercising the state machine
//! without a real workload.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use voyage_core::{Step, StepContext, StepError, StepOutcome};

/// Does nothing, succeeds immediately in both directions.
pub struct Noop;

#[async_trait]
impl Step for Noop {
    async fn do_step(&self, _ctx: &mut StepContext<'_>) -> StepOutcome {
        StepOutcome::Success
    }
}

/// Always fails fatally on DO; never reached on UNDO if placed first.
pub struct AlwaysFailFatal {
    pub message: String,
}

impl AlwaysFailFatal {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

#[async_trait]
impl Step for AlwaysFailFatal {
    async fn do_step(&self, _ctx: &mut StepContext<'_>) -> StepOutcome {
        StepOutcome::FailureFatal(StepError::new(self.message.clone()))
    }
}

/// Fails retryably on DO until it has been attempted `n` times, then
/// succeeds. The attempt counter survives across process-internal retries
/// within one `run_operation` call but is not durable.
pub struct FailNTimesThenSucceed {
    attempts: AtomicUsize,
    n: usize,
}

impl FailNTimesThenSucceed {
    pub fn new(n: usize) -> Self {
        Self { attempts: AtomicUsize::new(0), n }
    }
}

#[async_trait]
impl Step for FailNTimesThenSucceed {
    async fn do_step(&self, _ctx: &mut StepContext<'_>) -> StepOutcome {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if attempt < self.n {
            StepOutcome::FailureRetry(StepError::new(format!("attempt {} of {}", attempt + 1, self.n)))
        } else {
            StepOutcome::Success
        }
    }
}

/// Records whether its compensating action ran, for assertions.
pub struct RecordingUndo {
    pub undone: std::sync::Arc<AtomicUsize>,
}

impl RecordingUndo {
    pub fn new(undone: std::sync::Arc<AtomicUsize>) -> Self {
        Self { undone }
    }
}

#[async_trait]
impl Step for RecordingUndo {
    async fn do_step(&self, _ctx: &mut StepContext<'_>) -> StepOutcome {
        StepOutcome::Success
    }

    async fn undo_step(&self, _ctx: &mut StepContext<'_>) -> StepOutcome {
        self.undone.fetch_add(1, Ordering::SeqCst);
        StepOutcome::Success
    }
}

/// Fails fatally on UNDO, to exercise the dismal-failure path.
pub struct AlwaysFailUndo;

#[async_trait]
impl Step for AlwaysFailUndo {
    async fn do_step(&self, _ctx: &mut StepContext<'_>) -> StepOutcome {
        StepOutcome::Success
    }

    async fn undo_step(&self, _ctx: &mut StepContext<'_>) -> StepOutcome {
        StepOutcome::FailureFatal(StepError::new("compensation always fails"))
    }
}

/// Writes `(key, value)` into the working map, then succeeds. Used to
/// exercise that a value written at one step boundary is visible to the
/// next step after a reconstruct.
pub struct WriteWorkingValue {
    pub key: String,
    pub value: String,
}

impl WriteWorkingValue {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self { key: key.into(), value: value.into() }
    }
}

#[async_trait]
impl Step for WriteWorkingValue {
    async fn do_step(&self, ctx: &mut StepContext<'_>) -> StepOutcome {
        match ctx.set_working(self.key.clone(), &self.value) {
            Ok(()) => StepOutcome::Success,
            Err(err) => StepOutcome::FailureFatal(StepError::new(err.to_string())),
        }
    }
}

/// Reads `key` from the working map and records whether it was present
/// and what it held, then succeeds. Used as the second step in
/// crash-recovery tests, to assert the prior step's write survived a
/// reconstruct.
pub struct ReadWorkingValue {
    pub key: String,
    pub observed: std::sync::Arc<std::sync::Mutex<Option<String>>>,
}

impl ReadWorkingValue {
    pub fn new(key: impl Into<String>, observed: std::sync::Arc<std::sync::Mutex<Option<String>>>) -> Self {
        Self { key: key.into(), observed }
    }
}

#[async_trait]
impl Step for ReadWorkingValue {
    async fn do_step(&self, ctx: &mut StepContext<'_>) -> StepOutcome {
        let value: Option<String> = ctx.working(&self.key).unwrap_or(None);
        *self.observed.lock().unwrap() = value;
        StepOutcome::Success
    }
}

/// Returns `Stop` exactly once, then `Success`; models a step that yields
/// the worker and expects to be re-picked-up.
pub struct StopOnce {
    stopped: AtomicUsize,
}

impl Default for StopOnce {
    fn default() -> Self {
        Self { stopped: AtomicUsize::new(0) }
    }
}

#[async_trait]
impl Step for StopOnce {
    async fn do_step(&self, _ctx: &mut StepContext<'_>) -> StepOutcome {
        if self.stopped.fetch_add(1, Ordering::SeqCst) == 0 {
            StepOutcome::Stop
        } else {
            StepOutcome::Success
        }
    }
}

/// Returns `Wait` exactly once, then `Success`; models a step that must
/// pause for an external signal before it can proceed.
pub struct WaitOnce {
    waited: AtomicUsize,
}

impl Default for WaitOnce {
    fn default() -> Self {
        Self { waited: AtomicUsize::new(0) }
    }
}

#[async_trait]
impl Step for WaitOnce {
    async fn do_step(&self, _ctx: &mut StepContext<'_>) -> StepOutcome {
        if self.waited.fetch_add(1, Ordering::SeqCst) == 0 {
            StepOutcome::Wait
        } else {
            StepOutcome::Success
        }
    }
}
