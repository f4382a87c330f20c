//! Shared vocabulary for the durable operation engine: the `Step` and
//! `RetryRule` capability traits, the operation/step data model, the
//! working map and its serializers, and the error taxonomy.
//!
//! Persistence, the worker pool, and the queue adapter are separate crates
//! that depend on this one; nothing here talks to a database or a queue.

pub mod constants;
pub mod context;
pub mod error;
pub mod execution;
pub mod hook;
pub mod operation;
pub mod retry;
pub mod status;
pub mod step;

pub use context::{
    ApplicationContext, ExceptionSerializer, InputParameters, JsonValueSerializer,
    PlainTextExceptionSerializer, StepContext, ValueSerializer, WorkingMap,
};
pub use error::{Error, Result};
pub use execution::ExecutionState;
pub use hook::{DiagnosticContext, Hook, HookList};
pub use operation::{Factory, OperationDefinition, StepSpec};
pub use retry::{ExponentialBackoffRetry, FixedRetry, NoRetry, RandomBackoffRetry, RetryRule};
pub use status::{Direction, OperationStatus};
pub use step::{Step, StepError, StepOutcome};
