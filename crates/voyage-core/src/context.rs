//! Working map, input parameters, and the pluggable (de)serializers.
//!
//! The engine treats every stored value as an opaque string; only the
//! serializer knows how to turn it into something a step can use.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::hook::DiagnosticContext;
use crate::step::StepError;

/// `(op_id, key) -> serialized_value`, immutable after an operation is created.
#[derive(Debug, Clone, Default)]
pub struct InputParameters(BTreeMap<String, String>);

impl InputParameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(map: BTreeMap<String, String>) -> Self {
        Self(map)
    }

    pub fn get_raw(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(|s| s.as_str())
    }

    pub fn insert_raw(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.0.iter()
    }

    pub fn as_map(&self) -> &BTreeMap<String, String> {
        &self.0
    }
}

/// The per-operation mutable scratchpad, snapshotted at every log boundary.
#[derive(Debug, Clone, Default)]
pub struct WorkingMap(BTreeMap<String, String>);

impl WorkingMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(map: BTreeMap<String, String>) -> Self {
        Self(map)
    }

    pub fn get_raw(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(|s| s.as_str())
    }

    pub fn set_raw(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) {
        self.0.remove(key);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.0.iter()
    }

    pub fn as_map(&self) -> &BTreeMap<String, String> {
        &self.0
    }

    pub fn into_map(self) -> BTreeMap<String, String> {
        self.0
    }
}

/// Converts typed values to and from the opaque strings the Journal stores.
/// The engine never inspects the encoding; it only round-trips it.
pub trait ValueSerializer: Send + Sync {
    fn serialize_value(&self, value: &serde_json::Value) -> String;
    fn deserialize_value(&self, raw: &str) -> Result<serde_json::Value>;
}

/// Default canonical-JSON serializer; good enough unless the application
/// needs a binary or versioned envelope.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonValueSerializer;

impl ValueSerializer for JsonValueSerializer {
    fn serialize_value(&self, value: &serde_json::Value) -> String {
        value.to_string()
    }

    fn deserialize_value(&self, raw: &str) -> Result<serde_json::Value> {
        serde_json::from_str(raw).map_err(|_| Error::UnrecoverableMap)
    }
}

/// Converts a `StepError` to and from the stored `serialized_exception`
/// column. Applications with their own exception hierarchy provide their
/// own implementation; the default wraps the message verbatim.
pub trait ExceptionSerializer: Send + Sync {
    fn serialize_exception(&self, err: &StepError) -> String;
    fn deserialize_exception(&self, raw: &str) -> StepError;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PlainTextExceptionSerializer;

impl ExceptionSerializer for PlainTextExceptionSerializer {
    fn serialize_exception(&self, err: &StepError) -> String {
        err.message.clone()
    }

    fn deserialize_exception(&self, raw: &str) -> StepError {
        StepError::new(raw.to_string())
    }
}

/// Opaque handle threaded through to every factory and step invocation.
pub type ApplicationContext = Arc<dyn std::any::Any + Send + Sync>;

/// Everything a step body needs to do its work.
pub struct StepContext<'a> {
    pub working_map: &'a mut WorkingMap,
    pub input_parameters: &'a InputParameters,
    pub application_context: ApplicationContext,
    pub diagnostics: &'a DiagnosticContext,
    value_serializer: &'a dyn ValueSerializer,
}

impl<'a> StepContext<'a> {
    pub fn new(
        working_map: &'a mut WorkingMap,
        input_parameters: &'a InputParameters,
        application_context: ApplicationContext,
        diagnostics: &'a DiagnosticContext,
        value_serializer: &'a dyn ValueSerializer,
    ) -> Self {
        Self { working_map, input_parameters, application_context, diagnostics, value_serializer }
    }

    pub fn input<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.input_parameters.get_raw(key) {
            None => Ok(None),
            Some(raw) => {
                let value = self.value_serializer.deserialize_value(raw)?;
                serde_json::from_value(value).map(Some).map_err(|_| Error::UnrecoverableMap)
            }
        }
    }

    pub fn working<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.working_map.get_raw(key) {
            None => Ok(None),
            Some(raw) => {
                let value = self.value_serializer.deserialize_value(raw)?;
                serde_json::from_value(value).map(Some).map_err(|_| Error::UnrecoverableMap)
            }
        }
    }

    pub fn set_working<T: Serialize>(&mut self, key: impl Into<String>, value: &T) -> Result<()> {
        let json = serde_json::to_value(value).map_err(|e| Error::Internal(e.to_string()))?;
        let raw = self.value_serializer.serialize_value(&json);
        self.working_map.set_raw(key, raw);
        Ok(())
    }

    pub fn downcast_app_context<T: 'static>(&self) -> Option<Arc<T>> {
        self.application_context.clone().downcast::<T>().ok()
    }
}
