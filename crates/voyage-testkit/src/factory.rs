//! A `Factory` adapter over a plain closure, for tests that only need one
//! or two operation classes.

use voyage_core::{ApplicationContext, Error, Factory, InputParameters, OperationDefinition, Result};

pub struct FnFactory<F>(F)
where
    F: Fn(&str, &InputParameters, &ApplicationContext) -> Result<OperationDefinition> + Send + Sync;

impl<F> FnFactory<F>
where
    F: Fn(&str, &InputParameters, &ApplicationContext) -> Result<OperationDefinition> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> Factory for FnFactory<F>
where
    F: Fn(&str, &InputParameters, &ApplicationContext) -> Result<OperationDefinition> + Send + Sync,
{
    fn create(
        &self,
        class_name: &str,
        inputs: &InputParameters,
        application_context: &ApplicationContext,
    ) -> Result<OperationDefinition> {
        (self.0)(class_name, inputs, application_context)
    }
}

/// A `Factory` resolving exactly one class name; anything else is
/// `Error::UnknownClass`.
pub struct SingleClassFactory<F>
where
    F: Fn(&InputParameters, &ApplicationContext) -> Result<OperationDefinition> + Send + Sync,
{
    class_name: String,
    build: F,
}

impl<F> SingleClassFactory<F>
where
    F: Fn(&InputParameters, &ApplicationContext) -> Result<OperationDefinition> + Send + Sync,
{
    pub fn new(class_name: impl Into<String>, build: F) -> Self {
        Self { class_name: class_name.into(), build }
    }
}

impl<F> Factory for SingleClassFactory<F>
where
    F: Fn(&InputParameters, &ApplicationContext) -> Result<OperationDefinition> + Send + Sync,
{
    fn create(
        &self,
        class_name: &str,
        inputs: &InputParameters,
        application_context: &ApplicationContext,
    ) -> Result<OperationDefinition> {
        if class_name != self.class_name {
            return Err(Error::UnknownClass(class_name.to_string()));
        }
        (self.build)(inputs, application_context)
    }
}
