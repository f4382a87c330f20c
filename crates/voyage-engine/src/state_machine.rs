//! The Flight State Machine: drives one operation from its current
//! `ExecutionState` to a terminal status, journaling at every boundary.
//!
//! This is the direct generalization of a linear DO-only replay loop into
//! the full bidirectional DO/UNDO machine: every outcome in
//! `voyage_core::StepOutcome` is handled, retries are consulted in memory
//! only, and a failure in DO pivots the cursor's direction without losing
//! its place.

use std::collections::BTreeMap;

use voyage_core::{
    Direction, ExecutionState, HookList, OperationDefinition, OperationStatus, Result,
    StepContext, StepOutcome,
};
use voyage_persistence::{Journal, StepLogWrite};

use crate::config::EngineConfig;

/// What the caller should do once `run_operation` returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Reached a terminal status (SUCCESS, ERROR, or FATAL).
    Terminal(TerminalStatus),
    /// Released ownership; an external Ready message is required to resume.
    Waiting,
    /// Released ownership; eligible for immediate re-pickup.
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalStatus {
    Success,
    Error,
    Fatal,
}

impl TerminalStatus {
    pub fn as_operation_status(self) -> OperationStatus {
        match self {
            Self::Success => OperationStatus::Success,
            Self::Error => OperationStatus::Error,
            Self::Fatal => OperationStatus::Fatal,
        }
    }
}

/// Runs one operation until it stops occupying a worker: either it reaches
/// a terminal status, or it releases ownership (WAIT/STOP).
pub async fn run_operation(
    op_id: &str,
    definition: &mut OperationDefinition,
    inputs: &voyage_core::InputParameters,
    mut state: ExecutionState,
    journal: &dyn Journal,
    config: &EngineConfig,
    hooks: &HookList,
) -> Result<RunOutcome> {
    let diag_base = voyage_core::DiagnosticContext::for_operation(op_id, &definition.class_name);
    hooks.flight_start(&diag_base).await;

    let mut entered_step: Option<(usize, Direction)> = None;

    loop {
        let step_count = definition.steps.len();
        if state.direction == Direction::Do && state.cursor >= step_count {
            let outcome = finish(op_id, TerminalStatus::Success, None, journal, config, &diag_base, hooks).await?;
            return Ok(outcome);
        }

        let spec = definition
            .steps
            .get_mut(state.cursor)
            .expect("cursor is kept within [0, step_count) by the transition logic below");

        if entered_step != Some((state.cursor, state.direction)) {
            spec.retry_rule.reset();
            entered_step = Some((state.cursor, state.direction));
        }

        let step_diag = diag_base.at_step(state.cursor, state.direction);
        hooks.step_start(&step_diag).await;

        let mut ctx = StepContext::new(
            &mut state.working_map,
            inputs,
            config.application_context.clone(),
            &step_diag,
            config.value_serializer.as_ref(),
        );

        let outcome = match state.direction {
            Direction::Do => spec.step.do_step(&mut ctx).await,
            Direction::Undo => spec.step.undo_step(&mut ctx).await,
        };

        hooks.step_end(&step_diag).await;

        match outcome {
            StepOutcome::Success => {
                log_boundary(op_id, state.cursor, state.direction, false, None, &state.working_map, journal)
                    .await?;
                match state.direction {
                    Direction::Do => {
                        state.cursor += 1;
                    }
                    Direction::Undo => {
                        if state.cursor == 0 {
                            let original = state.last_exception.clone();
                            let serialized = original
                                .as_ref()
                                .map(|e| config.exception_serializer.serialize_exception(e));
                            return Ok(finish(
                                op_id,
                                TerminalStatus::Error,
                                serialized,
                                journal,
                                config,
                                &diag_base,
                                hooks,
                            )
                            .await?);
                        }
                        state.cursor -= 1;
                    }
                }
            }
            StepOutcome::Rerun => {
                log_boundary(op_id, state.cursor, state.direction, true, None, &state.working_map, journal)
                    .await?;
            }
            StepOutcome::Wait => {
                // Releases ownership in the same write as the status
                // change: a follow-up `disown` would race it, since
                // `disown`'s precondition requires `status = RUNNING`,
                // which `log_status` has already moved off of.
                log_status(op_id, state.cursor, state.direction, OperationStatus::Waiting, &state.working_map, journal)
                    .await?;
                hooks.state_transition(&diag_base, OperationStatus::Running, OperationStatus::Waiting).await;
                hooks.flight_end(&diag_base, OperationStatus::Waiting).await;
                return Ok(RunOutcome::Waiting);
            }
            StepOutcome::Stop => {
                log_status(op_id, state.cursor, state.direction, OperationStatus::Ready, &state.working_map, journal)
                    .await?;
                hooks.state_transition(&diag_base, OperationStatus::Running, OperationStatus::Ready).await;
                hooks.flight_end(&diag_base, OperationStatus::Ready).await;
                return Ok(RunOutcome::Stopped);
            }
            StepOutcome::FailureRetry(err) => {
                if let Some(delay) = spec.retry_rule.next_delay() {
                    tokio::time::sleep(delay).await;
                    continue;
                }
                // Retry budget exhausted: treat exactly as FailureFatal.
                if let Some(outcome) =
                    handle_fatal(op_id, &mut state, err, journal, config, &diag_base, hooks).await?
                {
                    return Ok(outcome);
                }
                continue;
            }
            StepOutcome::FailureFatal(err) => {
                if let Some(outcome) = handle_fatal(
                    op_id,
                    &mut state,
                    err,
                    journal,
                    config,
                    &diag_base,
                    hooks,
                )
                .await?
                {
                    return Ok(outcome);
                }
                continue;
            }
        }
    }
}

/// Shared handling for a fatal (or retry-exhausted) failure: pivots DO to
/// UNDO at the same cursor, or finishes FATAL if already in UNDO.
/// Returns `Ok(Some(outcome))` when the operation reached a terminal state
/// (caller should return it), `Ok(None)` when the loop should continue in
/// the (possibly new) direction.
async fn handle_fatal(
    op_id: &str,
    state: &mut ExecutionState,
    err: voyage_core::StepError,
    journal: &dyn Journal,
    config: &EngineConfig,
    diag_base: &voyage_core::DiagnosticContext,
    hooks: &HookList,
) -> Result<Option<RunOutcome>> {
    let serialized = config.exception_serializer.serialize_exception(&err);

    match state.direction {
        Direction::Do => {
            // Direction-transition row: records the failed DO attempt and
            // the working map at the moment of the pivot.
            log_failure(op_id, state.cursor, Direction::Do, &serialized, &state.working_map, journal)
                .await?;
            state.direction = Direction::Undo;
            state.last_exception = Some(err);
            Ok(None)
        }
        Direction::Undo => {
            let combined = match &state.last_exception {
                Some(original) => format!(
                    "original failure: {} | undo failure at step {}: {}",
                    original.message, state.cursor, err.message
                ),
                None => serialized.clone(),
            };
            log_failure(op_id, state.cursor, Direction::Undo, &combined, &state.working_map, journal)
                .await?;
            tracing::error!(
                operation_id = op_id,
                step_index = state.cursor,
                "DISMAL FAILURE: compensation failed; operation forced to FATAL"
            );
            let outcome = finish(
                op_id,
                TerminalStatus::Fatal,
                Some(combined),
                journal,
                config,
                diag_base,
                hooks,
            )
            .await?;
            Ok(Some(outcome))
        }
    }
}

async fn log_boundary(
    op_id: &str,
    step_index: usize,
    direction: Direction,
    rerun: bool,
    serialized_exception: Option<String>,
    working_map: &voyage_core::WorkingMap,
    journal: &dyn Journal,
) -> Result<()> {
    journal
        .step_log(StepLogWrite {
            op_id: op_id.to_string(),
            step_index,
            direction,
            rerun,
            serialized_exception,
            working_map: snapshot(working_map),
            new_status: None,
            release_owner: false,
        })
        .await
}

/// Logs a WAIT/STOP boundary. These mark the step as *not* completed — the
/// worker that picks the operation back up must re-enter step `step_index`
/// from scratch, so the row is written with `rerun = true`: the same flag
/// `reconstruct` already uses to resume at the recorded cursor instead of
/// advancing past it. Both WAIT and STOP release ownership, so this write
/// clears it in the same transaction as the status change.
async fn log_status(
    op_id: &str,
    step_index: usize,
    direction: Direction,
    new_status: OperationStatus,
    working_map: &voyage_core::WorkingMap,
    journal: &dyn Journal,
) -> Result<()> {
    journal
        .step_log(StepLogWrite {
            op_id: op_id.to_string(),
            step_index,
            direction,
            rerun: true,
            serialized_exception: None,
            working_map: snapshot(working_map),
            new_status: Some(new_status),
            release_owner: true,
        })
        .await
}

async fn log_failure(
    op_id: &str,
    step_index: usize,
    direction: Direction,
    serialized_exception: &str,
    working_map: &voyage_core::WorkingMap,
    journal: &dyn Journal,
) -> Result<()> {
    journal
        .step_log(StepLogWrite {
            op_id: op_id.to_string(),
            step_index,
            direction,
            rerun: false,
            serialized_exception: Some(serialized_exception.to_string()),
            working_map: snapshot(working_map),
            new_status: None,
            release_owner: false,
        })
        .await
}

fn snapshot(working_map: &voyage_core::WorkingMap) -> BTreeMap<String, String> {
    working_map.as_map().clone()
}

async fn finish(
    op_id: &str,
    status: TerminalStatus,
    serialized_exception: Option<String>,
    journal: &dyn Journal,
    _config: &EngineConfig,
    diag_base: &voyage_core::DiagnosticContext,
    hooks: &HookList,
) -> Result<RunOutcome> {
    journal.exit(op_id, status.as_operation_status(), serialized_exception).await?;
    hooks.state_transition(diag_base, OperationStatus::Running, status.as_operation_status()).await;
    hooks.flight_end(diag_base, status.as_operation_status()).await;
    Ok(RunOutcome::Terminal(status))
}
