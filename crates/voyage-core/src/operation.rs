//! Operation definitions and the `Factory` that produces them.

use std::sync::Arc;

use crate::context::{ApplicationContext, InputParameters};
use crate::error::Result;
use crate::retry::RetryRule;
use crate::step::Step;

/// One entry in an operation's step list: the step body paired with the
/// retry rule governing its `FailureRetry` outcomes.
pub struct StepSpec {
    pub step: Arc<dyn Step>,
    pub retry_rule: Box<dyn RetryRule>,
}

impl StepSpec {
    pub fn new(step: Arc<dyn Step>, retry_rule: Box<dyn RetryRule>) -> Self {
        Self { step, retry_rule }
    }
}

/// The step list for one operation, as deterministically produced by a
/// `Factory` from `(class_name, input_parameters)`.
pub struct OperationDefinition {
    pub class_name: String,
    pub steps: Vec<StepSpec>,
}

impl OperationDefinition {
    pub fn new(class_name: impl Into<String>, steps: Vec<StepSpec>) -> Self {
        Self { class_name: class_name.into(), steps }
    }
}

/// Reconstructs an operation's step list from its class name and inputs.
///
/// Contract: determinism. Two invocations with equal `class_name` and
/// `inputs` must produce step lists of identical length and retry-rule
/// kind at each index; the factory must not consult external state. A
/// failure here is fatal to submission (or, during recovery, leaves the
/// operation untouched for another instance to retry).
pub trait Factory: Send + Sync {
    fn create(
        &self,
        class_name: &str,
        inputs: &InputParameters,
        application_context: &ApplicationContext,
    ) -> Result<OperationDefinition>;
}
